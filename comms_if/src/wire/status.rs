//! Status frame definitions
//!
//! Status frames are sent by the robot in reply to control frames and carry
//! the robot's view of the control flags, its health flags, battery voltage,
//! resource diagnostics and match timing.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;

use super::{
    frame_checksum, read_u16, verify_checksum, ControlFlags, DecodeError,
    STATUS_FRAME_LEN
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Valid bits of the status byte.
const STATUS_BITS_MASK: u8 = 0x1F;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Flag bits of the status byte.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusFlags {
    /// The robot is currently enabled.
    pub enabled: bool,

    /// The robot considers the station link established.
    pub comms_up: bool,

    /// User code is running on the robot controller.
    pub code_running: bool,

    /// The robot has latched its own emergency stop.
    pub emergency_stop: bool,

    /// Brownout protection is active on the robot controller.
    pub brownout: bool
}

/// A status frame as sent from the robot to the station.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatusFrame {
    /// Sequence number of the control frame this status acknowledges.
    pub seq: u16,

    /// The control flags as the robot sees them.
    pub control: ControlFlags,

    pub status: StatusFlags,

    /// Battery voltage in millivolts.
    pub battery_mv: u16,

    /// CPU load in percent.
    pub cpu_pct: u8,

    /// RAM usage in percent.
    pub ram_pct: u8,

    /// Disk usage in percent.
    pub disk_pct: u8,

    /// CAN bus utilisation in tenths of a percent.
    pub can_util_tenths: u16,

    /// Number of CAN bus-off events since boot.
    pub can_bus_off: u8,

    /// User code running flag.
    pub code_running: bool,

    pub match_phase: MatchPhase,

    /// Seconds remaining in the current match phase.
    pub seconds_remaining: u16
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Phases of a match as carried in the status frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MatchPhase {
    PreMatch,
    Autonomous,
    Teleop,
    Endgame,
    PostMatch
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl StatusFlags {
    /// Pack the flags into the status byte.
    pub fn to_byte(&self) -> u8 {
        let mut byte = 0u8;
        if self.enabled { byte |= 0x01 }
        if self.comms_up { byte |= 0x02 }
        if self.code_running { byte |= 0x04 }
        if self.emergency_stop { byte |= 0x08 }
        if self.brownout { byte |= 0x10 }
        byte
    }

    /// Unpack a status byte, or `None` if reserved bits are set.
    pub fn from_byte(byte: u8) -> Option<Self> {
        if byte & !STATUS_BITS_MASK != 0 {
            return None
        }

        Some(Self {
            enabled: byte & 0x01 != 0,
            comms_up: byte & 0x02 != 0,
            code_running: byte & 0x04 != 0,
            emergency_stop: byte & 0x08 != 0,
            brownout: byte & 0x10 != 0
        })
    }
}

impl MatchPhase {
    pub fn to_byte(&self) -> u8 {
        match self {
            MatchPhase::PreMatch => 0,
            MatchPhase::Autonomous => 1,
            MatchPhase::Teleop => 2,
            MatchPhase::Endgame => 3,
            MatchPhase::PostMatch => 4
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(MatchPhase::PreMatch),
            1 => Some(MatchPhase::Autonomous),
            2 => Some(MatchPhase::Teleop),
            3 => Some(MatchPhase::Endgame),
            4 => Some(MatchPhase::PostMatch),
            _ => None
        }
    }
}

impl Default for MatchPhase {
    fn default() -> Self {
        MatchPhase::PreMatch
    }
}

impl StatusFrame {
    /// Battery voltage in volts.
    pub fn battery_volts(&self) -> f64 {
        self.battery_mv as f64 / 1000.0
    }

    /// CAN bus utilisation in percent.
    pub fn can_util_pct(&self) -> f64 {
        self.can_util_tenths as f64 / 10.0
    }

    /// Encode the frame into its wire representation.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(STATUS_FRAME_LEN);

        buf.extend_from_slice(&self.seq.to_be_bytes());
        buf.push(self.control.to_byte());
        buf.push(self.status.to_byte());
        buf.extend_from_slice(&self.battery_mv.to_be_bytes());
        buf.push(self.cpu_pct);
        buf.push(self.ram_pct);
        buf.push(self.disk_pct);
        buf.extend_from_slice(&self.can_util_tenths.to_be_bytes());
        buf.push(self.can_bus_off);
        buf.push(self.code_running as u8);
        buf.push(self.match_phase.to_byte());
        buf.extend_from_slice(&self.seconds_remaining.to_be_bytes());

        let checksum = frame_checksum(&buf);
        buf.extend_from_slice(&checksum.to_be_bytes());

        buf
    }

    /// Decode a frame from its wire representation.
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        if frame.len() < STATUS_FRAME_LEN {
            return Err(DecodeError::TooShort {
                expected: STATUS_FRAME_LEN,
                actual: frame.len()
            })
        }
        if frame.len() > STATUS_FRAME_LEN {
            return Err(DecodeError::Malformed(format!(
                "status frame is {} bytes, expected {}",
                frame.len(),
                STATUS_FRAME_LEN
            )))
        }

        verify_checksum(frame)?;

        let control = ControlFlags::from_byte(frame[2]).ok_or_else(||
            DecodeError::Malformed(format!(
                "reserved control bits set ({:#04x})", frame[2]
            ))
        )?;

        let status = StatusFlags::from_byte(frame[3]).ok_or_else(||
            DecodeError::Malformed(format!(
                "reserved status bits set ({:#04x})", frame[3]
            ))
        )?;

        let code_running = match frame[12] {
            0 => false,
            1 => true,
            v => return Err(DecodeError::Malformed(format!(
                "code running flag is {}, expected 0 or 1", v
            )))
        };

        let match_phase = MatchPhase::from_byte(frame[13]).ok_or_else(||
            DecodeError::Malformed(format!(
                "match phase out of range ({})", frame[13]
            ))
        )?;

        Ok(Self {
            seq: read_u16(frame, 0),
            control,
            status,
            battery_mv: read_u16(frame, 4),
            cpu_pct: frame[6],
            ram_pct: frame[7],
            disk_pct: frame[8],
            can_util_tenths: read_u16(frame, 9),
            can_bus_off: frame[11],
            code_running,
            match_phase,
            seconds_remaining: read_u16(frame, 14)
        })
    }
}

impl Default for StatusFrame {
    fn default() -> Self {
        Self {
            seq: 0,
            control: ControlFlags::default(),
            status: StatusFlags::default(),
            battery_mv: 0,
            cpu_pct: 0,
            ram_pct: 0,
            disk_pct: 0,
            can_util_tenths: 0,
            can_bus_off: 0,
            code_running: false,
            match_phase: MatchPhase::PreMatch,
            seconds_remaining: 0
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn example_frame() -> StatusFrame {
        StatusFrame {
            seq: 0x0102,
            control: ControlFlags {
                enabled: true,
                ds_attached: true,
                ..Default::default()
            },
            status: StatusFlags {
                enabled: true,
                comms_up: true,
                code_running: true,
                ..Default::default()
            },
            battery_mv: 12345,
            cpu_pct: 42,
            ram_pct: 61,
            disk_pct: 17,
            can_util_tenths: 335,
            can_bus_off: 2,
            code_running: true,
            match_phase: MatchPhase::Teleop,
            seconds_remaining: 97
        }
    }

    #[test]
    fn test_encode_layout() {
        let bytes = example_frame().encode();

        assert_eq!(bytes.len(), STATUS_FRAME_LEN);
        assert_eq!(&bytes[0..2], &[0x01, 0x02]);
        assert_eq!(bytes[2], 0x01 | 0x20);
        assert_eq!(bytes[3], 0x01 | 0x02 | 0x04);
        assert_eq!(&bytes[4..6], &12345u16.to_be_bytes());
        assert_eq!(bytes[6], 42);
        assert_eq!(bytes[7], 61);
        assert_eq!(bytes[8], 17);
        assert_eq!(&bytes[9..11], &335u16.to_be_bytes());
        assert_eq!(bytes[11], 2);
        assert_eq!(bytes[12], 1);
        assert_eq!(bytes[13], 2);
        assert_eq!(&bytes[14..16], &97u16.to_be_bytes());

        let expected = frame_checksum(&bytes[..16]);
        assert_eq!(&bytes[16..18], &expected.to_be_bytes());
    }

    #[test]
    fn test_roundtrip() {
        let frame = example_frame();
        assert_eq!(StatusFrame::decode(&frame.encode()).unwrap(), frame);

        let zero = StatusFrame::default();
        assert_eq!(StatusFrame::decode(&zero.encode()).unwrap(), zero);
    }

    #[test]
    fn test_checksum_sensitivity() {
        let bytes = example_frame().encode();

        for byte in 0..STATUS_FRAME_LEN - 2 {
            for bit in 0..8 {
                let mut corrupt = bytes.clone();
                corrupt[byte] ^= 1 << bit;

                match StatusFrame::decode(&corrupt) {
                    Err(DecodeError::InvalidChecksum { .. }) => (),
                    other => panic!(
                        "byte {} bit {} not rejected: {:?}", byte, bit, other
                    )
                }
            }
        }
    }

    #[test]
    fn test_malformed_fields() {
        let rewrite = |byte: usize, value: u8| {
            let mut bytes = example_frame().encode();
            bytes[byte] = value;
            let checksum = frame_checksum(&bytes[..STATUS_FRAME_LEN - 2]);
            bytes[16..18].copy_from_slice(&checksum.to_be_bytes());
            StatusFrame::decode(&bytes)
        };

        assert!(matches!(rewrite(2, 0x80), Err(DecodeError::Malformed(_))));
        assert!(matches!(rewrite(3, 0x20), Err(DecodeError::Malformed(_))));
        assert!(matches!(rewrite(12, 2), Err(DecodeError::Malformed(_))));
        assert!(matches!(rewrite(13, 5), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_length_checks() {
        let bytes = example_frame().encode();

        assert_eq!(
            StatusFrame::decode(&bytes[..10]),
            Err(DecodeError::TooShort { expected: STATUS_FRAME_LEN, actual: 10 })
        );

        let mut long = bytes.clone();
        long.push(0);
        assert!(matches!(
            StatusFrame::decode(&long),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_unit_conversions() {
        let frame = example_frame();
        assert!((frame.battery_volts() - 12.345).abs() < 1e-9);
        assert!((frame.can_util_pct() - 33.5).abs() < 1e-9);
    }
}
