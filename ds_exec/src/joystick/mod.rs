//! Joystick aggregator module
//!
//! Binds operator input devices into the six joystick slots of the outgoing
//! control frame. The platform layer enumerates devices and feeds this module
//! normalised attach/detach/sample events; the aggregator holds the slot
//! table and produces the per-tick snapshot, with the neutral sample filling
//! every slot that has no live device.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::collections::HashMap;

use log::debug;
use thiserror::Error;

// Internal
use comms_if::wire::{JoystickSample, NUM_AXES, NUM_BUTTONS, NUM_JOYSTICKS, NUM_POVS};
use util::maths::clamp;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Identifier assigned to an input device by the platform layer.
pub type DeviceId = u32;

/// Capabilities reported for an attached device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub axes: usize,
    pub buttons: usize,
    pub povs: usize
}

/// A raw sample from the device feed.
///
/// Axis values arrive normalised to [-1, 1] and POVs as angles in degrees
/// (multiples of 45) or -1.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceSample {
    pub axes: Vec<f32>,
    pub buttons: Vec<bool>,
    pub povs: Vec<i16>
}

/// The joystick slot table and device records.
#[derive(Default)]
pub struct JoystickAggregator {
    /// Device bound into each slot. Bindings persist while a device is
    /// absent, the slot simply reads neutral until it returns.
    slots: [Option<DeviceId>; NUM_JOYSTICKS],

    devices: HashMap<DeviceId, DeviceRecord>
}

struct DeviceRecord {
    capabilities: DeviceCapabilities,
    connected: bool,
    last_sample: JoystickSample
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// An event from the platform device feed.
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceEvent {
    Attached { device_id: DeviceId, capabilities: DeviceCapabilities },
    Detached { device_id: DeviceId },
    Sample { device_id: DeviceId, sample: DeviceSample }
}

/// Possible errors that can occur during joystick aggregation.
#[derive(Debug, Error, PartialEq)]
pub enum JoystickError {
    #[error("Slot {0} is outside the valid range [0, {}]", NUM_JOYSTICKS - 1)]
    SlotOutOfRange(usize)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl JoystickAggregator {
    /// Bind a device into a slot.
    ///
    /// Any device previously in the slot is unbound, and any slot the device
    /// previously occupied is cleared, so a device is only ever in one slot
    /// and a slot only ever holds one device.
    pub fn bind(
        &mut self, device_id: DeviceId, slot: usize
    ) -> Result<(), JoystickError> {
        if slot >= NUM_JOYSTICKS {
            return Err(JoystickError::SlotOutOfRange(slot))
        }

        for existing in self.slots.iter_mut() {
            if *existing == Some(device_id) {
                *existing = None;
            }
        }

        self.slots[slot] = Some(device_id);

        debug!("Device {} bound to slot {}", device_id, slot);

        Ok(())
    }

    /// Clear a slot.
    pub fn unbind(&mut self, slot: usize) -> Result<(), JoystickError> {
        if slot >= NUM_JOYSTICKS {
            return Err(JoystickError::SlotOutOfRange(slot))
        }

        self.slots[slot] = None;

        Ok(())
    }

    /// Process one event from the device feed.
    pub fn handle_event(&mut self, event: &DeviceEvent) {
        match event {
            DeviceEvent::Attached { device_id, capabilities } => {
                debug!(
                    "Device {} attached ({} axes, {} buttons, {} POVs)",
                    device_id,
                    capabilities.axes,
                    capabilities.buttons,
                    capabilities.povs
                );

                let record = self.devices
                    .entry(*device_id)
                    .or_insert(DeviceRecord {
                        capabilities: *capabilities,
                        connected: false,
                        last_sample: JoystickSample::neutral()
                    });

                record.capabilities = *capabilities;
                record.connected = true;
                record.last_sample = JoystickSample::neutral();
            },

            DeviceEvent::Detached { device_id } => {
                debug!("Device {} detached", device_id);

                if let Some(record) = self.devices.get_mut(device_id) {
                    record.connected = false;
                    record.last_sample = JoystickSample::neutral();
                }
            },

            DeviceEvent::Sample { device_id, sample } => {
                if let Some(record) = self.devices.get_mut(device_id) {
                    if record.connected {
                        record.last_sample = condition_sample(sample);
                    }
                }
            }
        }
    }

    /// Produce the six samples for this tick's control frame.
    ///
    /// Unbound slots, and slots whose device is currently absent, yield the
    /// neutral sample.
    pub fn snapshot(&self) -> [JoystickSample; NUM_JOYSTICKS] {
        let mut samples = [JoystickSample::neutral(); NUM_JOYSTICKS];

        for (slot, bound) in self.slots.iter().enumerate() {
            if let Some(device_id) = bound {
                if let Some(record) = self.devices.get(device_id) {
                    if record.connected {
                        samples[slot] = record.last_sample;
                    }
                }
            }
        }

        samples
    }

    /// The device bound into a slot, if any.
    pub fn slot_device(&self, slot: usize) -> Option<DeviceId> {
        self.slots.get(slot).copied().flatten()
    }

    /// Number of slots with a bound and present device.
    pub fn bound_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|bound| match bound {
                Some(id) => self.devices
                    .get(id)
                    .map(|r| r.connected)
                    .unwrap_or(false),
                None => false
            })
            .count()
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Condition a raw device sample into a frame-shaped one.
///
/// Short devices pad with neutral values up to the packet's fixed widths,
/// long devices are truncated. Axis values are clamped to [-1, 1] and
/// non-finite values read as neutral.
fn condition_sample(sample: &DeviceSample) -> JoystickSample {
    let mut out = JoystickSample::neutral();

    for (i, axis) in sample.axes.iter().take(NUM_AXES).enumerate() {
        out.axes[i] = if axis.is_finite() {
            clamp(axis, &-1.0, &1.0)
        }
        else {
            0.0
        };
    }

    for (i, pressed) in sample.buttons.iter().take(NUM_BUTTONS).enumerate() {
        if *pressed {
            out.buttons |= 1 << i;
        }
    }

    for (i, pov) in sample.povs.iter().take(NUM_POVS).enumerate() {
        out.povs[i] = *pov;
    }

    out
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
