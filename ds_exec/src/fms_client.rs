//! # Field-control client
//!
//! Listens for field-control directives on a UDP port. Directives are JSON
//! snapshots which are considered fresh for a bounded time; once they go
//! stale the field controller is treated as detached and authority returns
//! to the operator.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::io::ErrorKind;
use std::net::UdpSocket;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

// Internal
use comms_if::fms::FmsDirective;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Age beyond which a directive is discarded and the field controller is
/// considered detached.
const DIRECTIVE_FRESH_FOR: Duration = Duration::from_secs(5);

/// Receive buffer size for directive datagrams.
const RECV_BUF_LEN: usize = 2048;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// The field-control directive listener.
pub struct FmsClient {
    /// Absent when field-control support is disabled by configuration.
    socket: Option<UdpSocket>,

    last: Option<(Instant, FmsDirective)>
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum FmsClientError {
    #[error("Could not bind the field-control socket: {0}")]
    BindError(std::io::Error),

    #[error("Could not configure the field-control socket: {0}")]
    SocketConfigError(std::io::Error)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl FmsClient {
    /// Create the listener. When disabled no socket is bound and
    /// [`FmsClient::poll`] always reports no directive.
    pub fn new(port: u16, enabled: bool) -> Result<Self, FmsClientError> {
        let socket = if enabled {
            let socket = UdpSocket::bind(("0.0.0.0", port))
                .map_err(FmsClientError::BindError)?;
            socket
                .set_nonblocking(true)
                .map_err(FmsClientError::SocketConfigError)?;

            info!("Field-control listener bound on port {}",
                socket.local_addr().map(|a| a.port()).unwrap_or(0));

            Some(socket)
        }
        else {
            None
        };

        Ok(Self {
            socket,
            last: None
        })
    }

    /// The port the listener actually bound, zero when disabled.
    pub fn local_port(&self) -> u16 {
        self.socket
            .as_ref()
            .and_then(|s| s.local_addr().ok())
            .map(|a| a.port())
            .unwrap_or(0)
    }

    /// Drain pending directives and return the current fresh one, if any.
    pub fn poll(&mut self, now: Instant) -> Option<FmsDirective> {
        let socket = self.socket.as_ref()?;

        let mut buf = [0u8; RECV_BUF_LEN];

        loop {
            let len = match socket.recv_from(&mut buf) {
                Ok((len, _)) => len,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("Receive error on the field-control socket: {}", e);
                    break
                }
            };

            match FmsDirective::from_datagram(&buf[..len]) {
                Ok(directive) => {
                    if directive.attached {
                        if self.last.is_none() {
                            info!(
                                "Field control attached (match {} {})",
                                directive.match_type,
                                directive.match_number
                            );
                        }
                        self.last = Some((now, directive));
                    }
                    else {
                        if self.last.is_some() {
                            info!("Field control detached");
                        }
                        self.last = None;
                    }
                },
                Err(e) => debug!("Dropped invalid field-control datagram: {}", e)
            }
        }

        // Stale directives read as a detached field controller
        if let Some((received, _)) = self.last {
            if now.saturating_duration_since(received) > DIRECTIVE_FRESH_FOR {
                info!("Field-control directive went stale");
                self.last = None;
            }
        }

        self.last.as_ref().map(|(_, directive)| directive.clone())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::wire::RobotMode;

    fn directive_json(attached: bool, enabled: bool) -> String {
        format!(
            r#"{{
                "attached": {},
                "enabled": {},
                "mode": "AUTO",
                "match_number": 3,
                "match_type": "Practice"
            }}"#,
            attached, enabled
        )
    }

    #[test]
    fn test_disabled_client() {
        let mut client = FmsClient::new(0, false).unwrap();
        assert_eq!(client.local_port(), 0);
        assert_eq!(client.poll(Instant::now()), None);
    }

    #[test]
    fn test_directive_flow() {
        let mut client = FmsClient::new(0, true).unwrap();
        let port = client.local_port();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let t0 = Instant::now();

        assert_eq!(client.poll(t0), None);

        sender
            .send_to(directive_json(true, true).as_bytes(), ("127.0.0.1", port))
            .unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let directive = client.poll(t0).unwrap();
        assert!(directive.enabled);
        assert_eq!(directive.mode, RobotMode::Autonomous);

        // Still fresh within the window without new datagrams
        assert!(client.poll(t0 + Duration::from_secs(4)).is_some());

        // Stale beyond it
        assert_eq!(client.poll(t0 + Duration::from_secs(6)), None);
    }

    #[test]
    fn test_explicit_detach() {
        let mut client = FmsClient::new(0, true).unwrap();
        let port = client.local_port();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let t0 = Instant::now();

        sender
            .send_to(directive_json(true, false).as_bytes(), ("127.0.0.1", port))
            .unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(client.poll(t0).is_some());

        sender
            .send_to(directive_json(false, false).as_bytes(), ("127.0.0.1", port))
            .unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(client.poll(t0), None);
    }

    #[test]
    fn test_invalid_datagram_ignored() {
        let mut client = FmsClient::new(0, true).unwrap();
        let port = client.local_port();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();

        sender.send_to(b"garbage", ("127.0.0.1", port)).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(client.poll(Instant::now()), None);
    }
}
