//! # Communications Client
//!
//! Owns the station's UDP socket. All control frames leave through this
//! module, which assigns their sequence numbers, and all inbound datagrams
//! are drained and decoded here. The client also keeps the link statistics:
//! a running latency average keyed on echoed sequence numbers, and sliding
//! windows for packet loss and bandwidth.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::collections::{HashMap, VecDeque};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::{Duration, Instant};

use log::{debug, warn};

// Internal
use comms_if::wire::{ControlFrame, StatusFrame};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Sliding window over which packet loss and bandwidth are computed.
const STATS_WINDOW: Duration = Duration::from_secs(5);

/// Age after which an unacknowledged sequence number is evicted from the
/// latency ledger.
const ACK_EVICT_AGE: Duration = Duration::from_secs(5);

/// Receive buffer size, comfortably above the largest frame.
const RECV_BUF_LEN: usize = 1500;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// The station's UDP communications client.
pub struct CommsClient {
    socket: UdpSocket,

    /// Sequence number the next emitted frame will carry.
    next_seq: u16,

    /// Send times of frames awaiting an echoed sequence number.
    pending_acks: HashMap<u16, Instant>,

    latency_sum_ms: f64,
    latency_count: u64,

    /// Send times within the stats window.
    sent_window: VecDeque<Instant>,

    /// Receive times and datagram sizes within the stats window.
    recv_window: VecDeque<(Instant, usize)>,

    decode_errors: u64,
    transmit_errors: u64
}

/// A snapshot of the link statistics.
#[derive(Clone, Copy, Debug, Default)]
pub struct NetworkStats {
    /// Running average round-trip latency in milliseconds.
    pub latency_ms: f64,

    /// Fraction of frames sent in the window with no reply, in [0, 1].
    pub packet_loss: f64,

    /// Inbound bandwidth over the window in kilobytes per second.
    pub bandwidth_kbps: f64
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CommsError {
    #[error("Could not bind the station socket: {0}")]
    BindError(std::io::Error),

    #[error("Could not configure the station socket: {0}")]
    SocketConfigError(std::io::Error),

    #[error("Could not send the frame: {0}")]
    SendError(std::io::Error)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CommsClient {
    /// Bind the station socket on the given local port.
    ///
    /// Port zero selects an ephemeral port, which the tests use.
    pub fn new(local_port: u16) -> Result<Self, CommsError> {
        let socket = UdpSocket::bind(("0.0.0.0", local_port))
            .map_err(CommsError::BindError)?;

        socket
            .set_nonblocking(true)
            .map_err(CommsError::SocketConfigError)?;

        Ok(Self {
            socket,
            next_seq: 0,
            pending_acks: HashMap::new(),
            latency_sum_ms: 0.0,
            latency_count: 0,
            sent_window: VecDeque::new(),
            recv_window: VecDeque::new(),
            decode_errors: 0,
            transmit_errors: 0
        })
    }

    /// The local port the socket actually bound.
    pub fn local_port(&self) -> u16 {
        self.socket
            .local_addr()
            .map(|a| a.port())
            .unwrap_or(0)
    }

    /// Assign the next sequence number to the frame, encode it and send it.
    ///
    /// The sequence counter only advances when the frame actually left the
    /// socket, so emitted frames are strictly consecutive.
    pub fn send_frame(
        &mut self,
        mut frame: ControlFrame,
        address: Ipv4Addr,
        port: u16,
        now: Instant
    ) -> Result<u16, CommsError> {
        frame.seq = self.next_seq;
        let bytes = frame.encode();

        match self.socket.send_to(&bytes, SocketAddrV4::new(address, port)) {
            Ok(_) => (),
            Err(e) => {
                self.transmit_errors += 1;
                return Err(CommsError::SendError(e))
            }
        }

        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);

        self.pending_acks.insert(seq, now);
        self.sent_window.push_back(now);

        Ok(seq)
    }

    /// Drain every pending datagram, decoding status frames.
    ///
    /// Undecodable datagrams are counted and dropped; the effect of a
    /// persistently garbled peer is therefore the same as silence.
    pub fn recv_all(&mut self, now: Instant) -> Vec<(Ipv4Addr, StatusFrame)> {
        let mut frames = vec![];
        let mut buf = [0u8; RECV_BUF_LEN];

        loop {
            let (len, src) = match self.socket.recv_from(&mut buf) {
                Ok(r) => r,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("Receive error on the station socket: {}", e);
                    break
                }
            };

            let src_addr = match src {
                SocketAddr::V4(v4) => *v4.ip(),
                SocketAddr::V6(_) => continue
            };

            match StatusFrame::decode(&buf[..len]) {
                Ok(frame) => {
                    self.recv_window.push_back((now, len));

                    // The echoed sequence number closes a latency probe
                    if let Some(sent) = self.pending_acks.remove(&frame.seq) {
                        let rtt_ms = now
                            .saturating_duration_since(sent)
                            .as_secs_f64() * 1000.0;
                        self.latency_sum_ms += rtt_ms;
                        self.latency_count += 1;
                    }

                    frames.push((src_addr, frame));
                },
                Err(e) => {
                    self.decode_errors += 1;
                    debug!("Dropped undecodable datagram from {}: {}", src, e);
                }
            }
        }

        frames
    }

    /// Evict stale window entries and unacknowledged sequence numbers.
    ///
    /// Called on the 1 Hz network statistics tick.
    pub fn prune(&mut self, now: Instant) {
        while let Some(t) = self.sent_window.front() {
            if now.saturating_duration_since(*t) > STATS_WINDOW {
                self.sent_window.pop_front();
            }
            else {
                break
            }
        }

        while let Some((t, _)) = self.recv_window.front() {
            if now.saturating_duration_since(*t) > STATS_WINDOW {
                self.recv_window.pop_front();
            }
            else {
                break
            }
        }

        self.pending_acks.retain(|_, sent|
            now.saturating_duration_since(*sent) <= ACK_EVICT_AGE
        );
    }

    /// Current link statistics.
    pub fn stats(&self) -> NetworkStats {
        let latency_ms = if self.latency_count > 0 {
            self.latency_sum_ms / self.latency_count as f64
        }
        else {
            0.0
        };

        let packet_loss = if !self.sent_window.is_empty() {
            let ratio = 1.0
                - self.recv_window.len() as f64
                / self.sent_window.len() as f64;
            ratio.max(0.0)
        }
        else {
            0.0
        };

        let bytes: usize = self.recv_window.iter().map(|(_, len)| len).sum();
        let bandwidth_kbps =
            bytes as f64 / STATS_WINDOW.as_secs_f64() / 1024.0;

        NetworkStats {
            latency_ms,
            packet_loss,
            bandwidth_kbps
        }
    }

    /// Clear the statistics, used on reconnection and disconnect.
    pub fn reset_stats(&mut self) {
        self.pending_acks.clear();
        self.latency_sum_ms = 0.0;
        self.latency_count = 0;
        self.sent_window.clear();
        self.recv_window.clear();
    }

    /// Total undecodable datagrams seen since start-up.
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    /// Total send failures seen since start-up.
    pub fn transmit_errors(&self) -> u64 {
        self.transmit_errors
    }

    #[cfg(test)]
    fn set_next_seq(&mut self, seq: u16) {
        self.next_seq = seq;
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::wire::{ControlFrame, StatusFrame, CONTROL_FRAME_LEN};

    /// A robot-side socket on the loopback interface.
    fn robot_socket() -> (UdpSocket, u16) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, port)
    }

    const LOOPBACK: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);

    #[test]
    fn test_sequence_monotonicity() {
        let mut client = CommsClient::new(0).unwrap();
        let (robot, robot_port) = robot_socket();
        let now = Instant::now();

        let mut buf = [0u8; 2048];
        let mut seqs = vec![];

        for _ in 0..5 {
            client
                .send_frame(ControlFrame::neutral(0), LOOPBACK, robot_port, now)
                .unwrap();

            let (len, _) = robot.recv_from(&mut buf).unwrap();
            assert_eq!(len, CONTROL_FRAME_LEN);
            seqs.push(ControlFrame::decode(&buf[..len]).unwrap().seq);
        }

        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_sequence_wraps() {
        let mut client = CommsClient::new(0).unwrap();
        let (robot, robot_port) = robot_socket();
        let now = Instant::now();

        client.set_next_seq(0xFFFF);

        let first = client
            .send_frame(ControlFrame::neutral(0), LOOPBACK, robot_port, now)
            .unwrap();
        let second = client
            .send_frame(ControlFrame::neutral(0), LOOPBACK, robot_port, now)
            .unwrap();

        assert_eq!(first, 0xFFFF);
        assert_eq!(second, 0);

        // Drain so nothing lingers in the robot socket's queue
        let mut buf = [0u8; 2048];
        robot.recv_from(&mut buf).unwrap();
        robot.recv_from(&mut buf).unwrap();
    }

    #[test]
    fn test_latency_and_loss_accounting() {
        let mut client = CommsClient::new(0).unwrap();
        let (robot, robot_port) = robot_socket();
        let t0 = Instant::now();

        // One answered frame
        let seq = client
            .send_frame(ControlFrame::neutral(0), LOOPBACK, robot_port, t0)
            .unwrap();

        let mut buf = [0u8; 2048];
        let (_, station_addr) = robot.recv_from(&mut buf).unwrap();

        let status = StatusFrame {
            seq,
            ..Default::default()
        };
        robot.send_to(&status.encode(), station_addr).unwrap();

        // Give the loopback a moment to deliver
        std::thread::sleep(Duration::from_millis(50));

        let received = client.recv_all(t0 + Duration::from_millis(50));
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, LOOPBACK);
        assert_eq!(received[0].1.seq, seq);

        // Two unanswered frames make the loss window read 2/3
        client
            .send_frame(ControlFrame::neutral(0), LOOPBACK, robot_port, t0)
            .unwrap();
        client
            .send_frame(ControlFrame::neutral(0), LOOPBACK, robot_port, t0)
            .unwrap();

        let stats = client.stats();
        assert!(stats.latency_ms > 0.0);
        assert!((stats.packet_loss - 2.0 / 3.0).abs() < 1e-9);
        assert!(stats.bandwidth_kbps > 0.0);

        client.reset_stats();
        let stats = client.stats();
        assert_eq!(stats.latency_ms, 0.0);
        assert_eq!(stats.packet_loss, 0.0);
    }

    #[test]
    fn test_decode_errors_counted() {
        let mut client = CommsClient::new(0).unwrap();
        let station_port = client.local_port();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender
            .send_to(b"junk", ("127.0.0.1", station_port))
            .unwrap();

        std::thread::sleep(Duration::from_millis(50));

        let frames = client.recv_all(Instant::now());
        assert!(frames.is_empty());
        assert_eq!(client.decode_errors(), 1);
    }

    #[test]
    fn test_ack_eviction() {
        let mut client = CommsClient::new(0).unwrap();
        let (robot, robot_port) = robot_socket();
        let t0 = Instant::now();

        let seq = client
            .send_frame(ControlFrame::neutral(0), LOOPBACK, robot_port, t0)
            .unwrap();

        let mut buf = [0u8; 2048];
        let (_, station_addr) = robot.recv_from(&mut buf).unwrap();

        // Prune six seconds later: the pending ack is gone, so a late reply
        // no longer updates the latency average
        client.prune(t0 + Duration::from_secs(6));

        let status = StatusFrame { seq, ..Default::default() };
        robot.send_to(&status.encode(), station_addr).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        client.recv_all(t0 + Duration::from_secs(6));
        assert_eq!(client.stats().latency_ms, 0.0);
    }
}
