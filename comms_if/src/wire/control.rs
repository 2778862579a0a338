//! Control frame definitions
//!
//! One control frame is sent to the robot on every tick of the station's
//! send loop. Discovery probes and heartbeats are plain control frames with
//! all-neutral operator intent, there is no separate packet type.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};

use super::{
    frame_checksum, read_f32, read_i16, read_u16, verify_checksum, DecodeError,
    CONTROL_FRAME_LEN, JOYSTICK_BLOCK_LEN, NUM_AXES, NUM_JOYSTICKS, NUM_POVS
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Valid bits of the control byte.
const CONTROL_BITS_MASK: u8 = 0x3F;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Flag bits of the control byte.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ControlFlags {
    /// Robot actuation is permitted.
    pub enabled: bool,

    /// Robot is to run its autonomous routine.
    pub autonomous: bool,

    /// Robot is to run in test mode.
    pub test: bool,

    /// The emergency stop is latched, the robot must disable until reboot.
    pub emergency_stop: bool,

    /// A field controller is attached to the station.
    pub field_attached: bool,

    /// The driver station is attached (always set by the station).
    pub ds_attached: bool
}

/// Driver station to robot alliance station assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub alliance: Alliance,

    /// Position within the alliance, 1 to 3.
    pub position: u8
}

/// A single joystick block within a control frame.
///
/// Slots with no bound device carry the neutral sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct JoystickSample {
    /// Axis values normalised to [-1, 1].
    pub axes: [f32; NUM_AXES],

    /// Button bitmap, bit 0 is button 1.
    pub buttons: u16,

    /// POV hat angles in degrees, -1 when not pressed.
    pub povs: [i16; NUM_POVS]
}

/// A control frame as sent from the station to the robot.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlFrame {
    /// Sequence number, incremented by one for every frame emitted.
    pub seq: u16,

    pub flags: ControlFlags,

    pub request: RequestType,

    pub station: Station,

    /// Exactly [`NUM_JOYSTICKS`] blocks are always carried.
    pub joysticks: [JoystickSample; NUM_JOYSTICKS]
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The robot operating mode demanded by the station.
///
/// Modes are mutually exclusive, teleoperation is the absence of both the
/// autonomous and test control bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RobotMode {
    #[serde(rename = "TELEOP")]
    Teleop,

    #[serde(rename = "AUTO")]
    Autonomous,

    #[serde(rename = "TEST")]
    Test
}

/// Alliance colours.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alliance {
    #[serde(rename = "RED")]
    Red,

    #[serde(rename = "BLUE")]
    Blue
}

/// One-shot request carried in a control frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RequestType {
    Normal,
    Reboot,
    RestartCode
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ControlFlags {
    /// Pack the flags into the control byte.
    pub fn to_byte(&self) -> u8 {
        let mut byte = 0u8;
        if self.enabled { byte |= 0x01 }
        if self.autonomous { byte |= 0x02 }
        if self.test { byte |= 0x04 }
        if self.emergency_stop { byte |= 0x08 }
        if self.field_attached { byte |= 0x10 }
        if self.ds_attached { byte |= 0x20 }
        byte
    }

    /// Unpack a control byte, or `None` if reserved bits are set.
    pub fn from_byte(byte: u8) -> Option<Self> {
        if byte & !CONTROL_BITS_MASK != 0 {
            return None
        }

        Some(Self {
            enabled: byte & 0x01 != 0,
            autonomous: byte & 0x02 != 0,
            test: byte & 0x04 != 0,
            emergency_stop: byte & 0x08 != 0,
            field_attached: byte & 0x10 != 0,
            ds_attached: byte & 0x20 != 0
        })
    }

    /// The mode encoded in the autonomous/test bits.
    pub fn mode(&self) -> RobotMode {
        if self.autonomous {
            RobotMode::Autonomous
        }
        else if self.test {
            RobotMode::Test
        }
        else {
            RobotMode::Teleop
        }
    }

    /// Set the autonomous/test bits for the given mode, keeping exclusivity.
    pub fn set_mode(&mut self, mode: RobotMode) {
        self.autonomous = mode == RobotMode::Autonomous;
        self.test = mode == RobotMode::Test;
    }
}

impl RobotMode {
    /// Parse a mode from its command string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "TELEOP" => Some(RobotMode::Teleop),
            "AUTO" => Some(RobotMode::Autonomous),
            "TEST" => Some(RobotMode::Test),
            _ => None
        }
    }
}

impl Default for RobotMode {
    fn default() -> Self {
        RobotMode::Teleop
    }
}

impl Station {
    /// Pack the station into its wire byte (0 to 5).
    pub fn to_byte(&self) -> u8 {
        let alliance = match self.alliance {
            Alliance::Red => 0,
            Alliance::Blue => 1
        };

        alliance * 3 + (self.position - 1)
    }

    /// Unpack a station byte, or `None` if it is out of range.
    pub fn from_byte(byte: u8) -> Option<Self> {
        if byte > 5 {
            return None
        }

        Some(Self {
            alliance: match byte / 3 {
                0 => Alliance::Red,
                _ => Alliance::Blue
            },
            position: byte % 3 + 1
        })
    }

    /// Build a station, or `None` if the position is out of range.
    pub fn new(alliance: Alliance, position: u8) -> Option<Self> {
        if position < 1 || position > 3 {
            return None
        }

        Some(Self { alliance, position })
    }
}

impl Default for Station {
    fn default() -> Self {
        Self {
            alliance: Alliance::Red,
            position: 1
        }
    }
}

impl RequestType {
    pub fn to_byte(&self) -> u8 {
        match self {
            RequestType::Normal => 0,
            RequestType::Reboot => 1,
            RequestType::RestartCode => 2
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(RequestType::Normal),
            1 => Some(RequestType::Reboot),
            2 => Some(RequestType::RestartCode),
            _ => None
        }
    }
}

impl Default for RequestType {
    fn default() -> Self {
        RequestType::Normal
    }
}

impl JoystickSample {
    /// The sample emitted for slots with no bound device.
    pub fn neutral() -> Self {
        Self {
            axes: [0.0; NUM_AXES],
            buttons: 0,
            povs: [-1; NUM_POVS]
        }
    }

    /// Append this block to an encode buffer.
    fn write_into(&self, buf: &mut Vec<u8>) {
        for axis in self.axes.iter() {
            buf.extend_from_slice(&axis.to_be_bytes());
        }

        buf.extend_from_slice(&self.buttons.to_be_bytes());

        for pov in self.povs.iter() {
            buf.extend_from_slice(&pov.to_be_bytes());
        }
    }

    /// Read one block starting at the given offset. The caller must have
    /// bounds checked the slice.
    fn read_from(frame: &[u8], offset: usize) -> Self {
        let mut axes = [0f32; NUM_AXES];
        for (i, axis) in axes.iter_mut().enumerate() {
            *axis = read_f32(frame, offset + i * 4);
        }

        let buttons = read_u16(frame, offset + NUM_AXES * 4);

        let mut povs = [0i16; NUM_POVS];
        for (i, pov) in povs.iter_mut().enumerate() {
            *pov = read_i16(frame, offset + NUM_AXES * 4 + 2 + i * 2);
        }

        Self { axes, buttons, povs }
    }
}

impl Default for JoystickSample {
    fn default() -> Self {
        Self::neutral()
    }
}

impl ControlFrame {
    /// A frame carrying no operator intent, used for discovery probes and
    /// heartbeats.
    pub fn neutral(seq: u16) -> Self {
        Self {
            seq,
            flags: ControlFlags {
                ds_attached: true,
                ..Default::default()
            },
            request: RequestType::Normal,
            station: Station::default(),
            joysticks: [JoystickSample::neutral(); NUM_JOYSTICKS]
        }
    }

    /// Encode the frame into its wire representation.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(CONTROL_FRAME_LEN);

        buf.extend_from_slice(&self.seq.to_be_bytes());
        buf.push(self.flags.to_byte());
        buf.push(self.request.to_byte());
        buf.push(self.station.to_byte());
        buf.push(NUM_JOYSTICKS as u8);

        for joystick in self.joysticks.iter() {
            joystick.write_into(&mut buf);
        }

        let checksum = frame_checksum(&buf);
        buf.extend_from_slice(&checksum.to_be_bytes());

        buf
    }

    /// Decode a frame from its wire representation.
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        if frame.len() < CONTROL_FRAME_LEN {
            return Err(DecodeError::TooShort {
                expected: CONTROL_FRAME_LEN,
                actual: frame.len()
            })
        }
        if frame.len() > CONTROL_FRAME_LEN {
            return Err(DecodeError::Malformed(format!(
                "control frame is {} bytes, expected {}",
                frame.len(),
                CONTROL_FRAME_LEN
            )))
        }

        verify_checksum(frame)?;

        let flags = ControlFlags::from_byte(frame[2]).ok_or_else(||
            DecodeError::Malformed(format!(
                "reserved control bits set ({:#04x})", frame[2]
            ))
        )?;

        let request = RequestType::from_byte(frame[3]).ok_or_else(||
            DecodeError::Malformed(format!(
                "unrecognised request type ({})", frame[3]
            ))
        )?;

        let station = Station::from_byte(frame[4]).ok_or_else(||
            DecodeError::Malformed(format!(
                "station out of range ({})", frame[4]
            ))
        )?;

        if frame[5] as usize != NUM_JOYSTICKS {
            return Err(DecodeError::Malformed(format!(
                "joystick count is {}, expected {}", frame[5], NUM_JOYSTICKS
            )))
        }

        let mut joysticks = [JoystickSample::neutral(); NUM_JOYSTICKS];
        for (i, joystick) in joysticks.iter_mut().enumerate() {
            *joystick = JoystickSample::read_from(
                frame,
                6 + i * JOYSTICK_BLOCK_LEN
            );
        }

        Ok(Self {
            seq: read_u16(frame, 0),
            flags,
            request,
            station,
            joysticks
        })
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn example_frame() -> ControlFrame {
        let mut joysticks = [JoystickSample::neutral(); NUM_JOYSTICKS];
        joysticks[0] = JoystickSample {
            axes: [0.5, -1.0, 0.25, 0.0, 1.0, -0.125],
            buttons: 0b1010_0000_0000_0101,
            povs: [90, -1, 270, -1]
        };
        joysticks[3] = JoystickSample {
            axes: [-0.75, 0.0, 0.0, 0.0, 0.0, 0.0],
            buttons: 1,
            povs: [-1; NUM_POVS]
        };

        ControlFrame {
            seq: 0xBEEF,
            flags: ControlFlags {
                enabled: true,
                autonomous: true,
                ds_attached: true,
                ..Default::default()
            },
            request: RequestType::RestartCode,
            station: Station::new(Alliance::Blue, 2).unwrap(),
            joysticks
        }
    }

    #[test]
    fn test_encode_layout() {
        let frame = example_frame();
        let bytes = frame.encode();

        assert_eq!(bytes.len(), CONTROL_FRAME_LEN);

        // Header
        assert_eq!(&bytes[0..2], &[0xBE, 0xEF]);
        assert_eq!(bytes[2], 0x01 | 0x02 | 0x20);
        assert_eq!(bytes[3], 2);
        assert_eq!(bytes[4], 4);
        assert_eq!(bytes[5], NUM_JOYSTICKS as u8);

        // First axis of the first joystick block
        assert_eq!(&bytes[6..10], &0.5f32.to_be_bytes());

        // Buttons and first POV of the first block
        assert_eq!(&bytes[30..32], &[0xA0, 0x05]);
        assert_eq!(&bytes[32..34], &90i16.to_be_bytes());

        // Trailing checksum covers everything before it
        let expected = frame_checksum(&bytes[..CONTROL_FRAME_LEN - 2]);
        assert_eq!(&bytes[210..212], &expected.to_be_bytes());
    }

    #[test]
    fn test_roundtrip() {
        let frame = example_frame();
        assert_eq!(ControlFrame::decode(&frame.encode()).unwrap(), frame);

        let neutral = ControlFrame::neutral(0);
        assert_eq!(ControlFrame::decode(&neutral.encode()).unwrap(), neutral);
    }

    #[test]
    fn test_neutral_sample() {
        let sample = JoystickSample::neutral();
        assert_eq!(sample.axes, [0.0; NUM_AXES]);
        assert_eq!(sample.buttons, 0);
        assert_eq!(sample.povs, [-1; NUM_POVS]);
    }

    #[test]
    fn test_checksum_sensitivity() {
        // Flipping any single bit outside the checksum field must be caught
        let bytes = example_frame().encode();

        for byte in 0..CONTROL_FRAME_LEN - 2 {
            for bit in 0..8 {
                let mut corrupt = bytes.clone();
                corrupt[byte] ^= 1 << bit;

                match ControlFrame::decode(&corrupt) {
                    Err(DecodeError::InvalidChecksum { .. }) => (),
                    other => panic!(
                        "byte {} bit {} not rejected: {:?}", byte, bit, other
                    )
                }
            }
        }
    }

    #[test]
    fn test_axis_corruption_rejected() {
        // Offset 10 falls within the second axis of joystick 0
        let mut bytes = example_frame().encode();
        bytes[10] ^= 0xFF;

        assert!(matches!(
            ControlFrame::decode(&bytes),
            Err(DecodeError::InvalidChecksum { .. })
        ));
    }

    #[test]
    fn test_malformed_fields() {
        // Corrupt a field and repair the checksum so the parse itself fails
        let rewrite = |byte: usize, value: u8| {
            let mut bytes = example_frame().encode();
            bytes[byte] = value;
            let checksum = frame_checksum(&bytes[..CONTROL_FRAME_LEN - 2]);
            bytes[210..212].copy_from_slice(&checksum.to_be_bytes());
            ControlFrame::decode(&bytes)
        };

        assert!(matches!(rewrite(2, 0x40), Err(DecodeError::Malformed(_))));
        assert!(matches!(rewrite(3, 3), Err(DecodeError::Malformed(_))));
        assert!(matches!(rewrite(4, 6), Err(DecodeError::Malformed(_))));
        assert!(matches!(rewrite(5, 5), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_too_short() {
        let bytes = example_frame().encode();

        assert_eq!(
            ControlFrame::decode(&bytes[..CONTROL_FRAME_LEN - 1]),
            Err(DecodeError::TooShort {
                expected: CONTROL_FRAME_LEN,
                actual: CONTROL_FRAME_LEN - 1
            })
        );
    }

    #[test]
    fn test_station_encoding() {
        assert_eq!(Station::new(Alliance::Red, 1).unwrap().to_byte(), 0);
        assert_eq!(Station::new(Alliance::Red, 3).unwrap().to_byte(), 2);
        assert_eq!(Station::new(Alliance::Blue, 1).unwrap().to_byte(), 3);
        assert_eq!(Station::new(Alliance::Blue, 3).unwrap().to_byte(), 5);
        assert_eq!(Station::new(Alliance::Red, 0), None);
        assert_eq!(Station::new(Alliance::Red, 4), None);

        for byte in 0..6u8 {
            assert_eq!(Station::from_byte(byte).unwrap().to_byte(), byte);
        }
        assert_eq!(Station::from_byte(6), None);
    }

    #[test]
    fn test_mode_exclusivity() {
        let mut flags = ControlFlags::default();

        flags.set_mode(RobotMode::Autonomous);
        assert!(flags.autonomous && !flags.test);

        flags.set_mode(RobotMode::Test);
        assert!(!flags.autonomous && flags.test);

        flags.set_mode(RobotMode::Teleop);
        assert!(!flags.autonomous && !flags.test);
    }
}
