//! # Robot discovery resolver
//!
//! Schedules discovery probing: which candidate address to probe on each
//! discovery tick, when the discovery window has expired, and the
//! best-effort name-service lookup that may contribute a late candidate.
//!
//! Probes themselves are neutral control frames sent through the
//! communications client so that they draw from the same sequence counter
//! as the steady-state send loop.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

// Internal
use comms_if::addr::{AddrError, ConnectionConfig};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Gap between successive discovery probes.
const PROBE_INTERVAL: Duration = Duration::from_secs(1);

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// State of one discovery attempt.
///
/// A resolver is created when the operator connects and dropped as soon as
/// an endpoint is selected, the window expires or the operator cancels.
pub struct Resolver {
    candidates: Vec<Ipv4Addr>,

    /// Index of the next candidate to probe.
    next_candidate: usize,

    /// No probes are sent before this time (discovery cooldown).
    earliest_probe: Instant,

    /// When the discovery window expires.
    window_end: Instant,

    last_probe: Option<Instant>,

    /// Pending name-service lookup result, `None` once collected.
    name_service_rx: Option<Receiver<Option<Ipv4Addr>>>
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Resolver {
    /// Start a discovery attempt for the given configuration.
    ///
    /// `earliest_probe` allows the caller to impose a cooldown after a
    /// failed attempt; the window runs from that time.
    pub fn begin(
        config: &ConnectionConfig,
        earliest_probe: Instant,
        window: Duration
    ) -> Result<Self, AddrError> {
        let candidates = config.candidates()?;

        info!(
            "Discovery started, {} initial candidate(s): {:?}",
            candidates.len(),
            candidates
        );

        let name_service_rx = config
            .name_service_host()
            .map(|host| spawn_name_service_lookup(host));

        Ok(Self {
            candidates,
            next_candidate: 0,
            earliest_probe,
            window_end: earliest_probe + window,
            last_probe: None,
            name_service_rx
        })
    }

    /// Collect a completed name-service lookup, if one has arrived.
    ///
    /// The lookup runs on a helper thread and is only ever polled here, so
    /// a slow or hung resolver library never stalls the executive. Lookup
    /// failure is silent.
    pub fn poll_name_service(&mut self) {
        let result = match &self.name_service_rx {
            Some(rx) => match rx.try_recv() {
                Ok(r) => r,
                Err(mpsc::TryRecvError::Empty) => return,
                Err(mpsc::TryRecvError::Disconnected) => None
            },
            None => return
        };

        self.name_service_rx = None;

        if let Some(address) = result {
            if !self.candidates.contains(&address) {
                info!("Name service contributed candidate {}", address);
                self.candidates.push(address);
            }
        }
        else {
            debug!("Name service lookup produced no address");
        }
    }

    /// The candidate to probe this tick, if one is due.
    ///
    /// Probes are spaced [`PROBE_INTERVAL`] apart and cycle through the
    /// candidate list in order, so every candidate is revisited while the
    /// window lasts.
    pub fn next_probe(&mut self, now: Instant) -> Option<Ipv4Addr> {
        if now < self.earliest_probe {
            return None
        }

        if let Some(last) = self.last_probe {
            if now.saturating_duration_since(last) < PROBE_INTERVAL {
                return None
            }
        }

        let address = self.candidates[self.next_candidate % self.candidates.len()];
        self.next_candidate += 1;
        self.last_probe = Some(now);

        Some(address)
    }

    /// Whether the discovery window has expired.
    pub fn expired(&self, now: Instant) -> bool {
        now >= self.window_end
    }

    /// Whether a reply from this address selects it as the endpoint.
    pub fn is_candidate(&self, address: Ipv4Addr) -> bool {
        self.candidates.contains(&address)
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Resolve a host name to an IPv4 address on a helper thread.
///
/// The port is irrelevant to the lookup but required by `ToSocketAddrs`.
fn spawn_name_service_lookup(host: String) -> Receiver<Option<Ipv4Addr>> {
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let address = (host.as_str(), 0u16)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.find_map(|a| match a {
                SocketAddr::V4(v4) => Some(*v4.ip()),
                SocketAddr::V6(_) => None
            }));

        // The receiver may be gone if discovery already ended
        tx.send(address).ok();
    });

    rx
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_probe_schedule() {
        let t0 = Instant::now();
        let mut resolver = Resolver::begin(
            &ConnectionConfig::Team { team: 254 },
            t0,
            Duration::from_secs(5)
        ).unwrap();

        // First probe is immediate, on the derived primary address
        assert_eq!(
            resolver.next_probe(t0),
            Some(Ipv4Addr::new(10, 2, 54, 2))
        );

        // No second probe within the probe interval
        assert_eq!(resolver.next_probe(t0 + Duration::from_millis(500)), None);

        // Fallbacks follow in order, then the list cycles
        assert_eq!(
            resolver.next_probe(t0 + Duration::from_secs(1)),
            Some(Ipv4Addr::new(172, 22, 11, 2))
        );
        assert_eq!(
            resolver.next_probe(t0 + Duration::from_secs(2)),
            Some(Ipv4Addr::new(192, 168, 1, 2))
        );
        assert_eq!(
            resolver.next_probe(t0 + Duration::from_secs(3)),
            Some(Ipv4Addr::new(10, 2, 54, 2))
        );

        assert!(!resolver.expired(t0 + Duration::from_millis(4999)));
        assert!(resolver.expired(t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_cooldown_delays_probing() {
        let t0 = Instant::now();
        let earliest = t0 + Duration::from_secs(1);

        let mut resolver = Resolver::begin(
            &ConnectionConfig::Team { team: 1 },
            earliest,
            Duration::from_secs(5)
        ).unwrap();

        assert_eq!(resolver.next_probe(t0), None);
        assert_eq!(
            resolver.next_probe(earliest),
            Some(Ipv4Addr::new(10, 0, 1, 2))
        );

        // The window runs from the cooldown end
        assert!(!resolver.expired(earliest + Duration::from_millis(4999)));
        assert!(resolver.expired(earliest + Duration::from_secs(5)));
    }

    #[test]
    fn test_candidate_membership() {
        let resolver = Resolver::begin(
            &ConnectionConfig::direct("10.9.9.9").unwrap(),
            Instant::now(),
            Duration::from_secs(5)
        ).unwrap();

        assert!(resolver.is_candidate(Ipv4Addr::new(10, 9, 9, 9)));
        assert!(!resolver.is_candidate(Ipv4Addr::new(10, 9, 9, 8)));
    }

    #[test]
    fn test_name_service_appends_candidate() {
        let t0 = Instant::now();
        let (tx, rx) = mpsc::channel();

        let mut resolver = Resolver {
            candidates: vec![Ipv4Addr::new(10, 0, 1, 2)],
            next_candidate: 0,
            earliest_probe: t0,
            window_end: t0 + Duration::from_secs(5),
            last_probe: None,
            name_service_rx: Some(rx)
        };

        // Nothing arrived yet
        resolver.poll_name_service();
        assert_eq!(resolver.candidates.len(), 1);

        tx.send(Some(Ipv4Addr::new(192, 168, 7, 7))).unwrap();
        resolver.poll_name_service();
        assert!(resolver.is_candidate(Ipv4Addr::new(192, 168, 7, 7)));

        // The channel is consumed once a result is collected
        assert!(resolver.name_service_rx.is_none());
    }

    #[test]
    fn test_name_service_lookup_thread() {
        let rx = spawn_name_service_lookup("localhost".to_string());

        // Bounded wait, the lookup thread answers quickly for localhost
        let result = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(result, Some(Ipv4Addr::new(127, 0, 0, 1)));
    }
}
