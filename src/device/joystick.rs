//! Generic joystick emulation (vJoy style unsigned axes)

use crate::control::state::ControlState;
use crate::device::DeviceError;
use tracing::{debug, error};

/// Scale applied to a unit value before the +1 offset.
pub const AXIS_SCALE: u32 = 32767;

/// Largest value an axis takes. Axis values live in `1..=AXIS_MAX`; 0 is
/// reserved as invalid by vJoy-like APIs, hence the +1 offset in
/// [`unit_to_axis`].
pub const AXIS_MAX: u32 = AXIS_SCALE + 1;

/// Axis neutral positions used on reset: centered wheel, released pedals.
pub const STEERING_CENTER: u32 = AXIS_SCALE / 2 + 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoystickAxis {
    /// Steering
    X,
    /// Accelerator, inverted
    Y,
    /// Brake
    Z,
}

/// 1-based button ids, as joystick APIs number them
pub const HANDBRAKE_BUTTON: u8 = 1;
pub const HORN_BUTTON: u8 = 2;

pub trait JoystickDriver: Send {
    fn set_axis(&mut self, axis: JoystickAxis, value: u32) -> Result<(), DeviceError>;

    fn set_button(&mut self, button: u8, pressed: bool) -> Result<(), DeviceError>;

    /// Commits staged writes. Drivers that write through immediately keep the default.
    fn flush(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// Maps `[0, 1]` to `1..=AXIS_MAX`.
pub fn unit_to_axis(unit: f64) -> u32 {
    (unit.clamp(0.0, 1.0) * f64::from(AXIS_SCALE)) as u32 + 1
}

/// Maps normalized steering `[-1, 1]` to `1..=AXIS_MAX`.
pub fn steering_to_axis(normalized: f64) -> u32 {
    unit_to_axis((normalized.clamp(-1.0, 1.0) + 1.0) / 2.0)
}

/// Accelerator uses "pulled = low value".
pub fn accelerator_to_axis(unit: f64) -> u32 {
    AXIS_MAX - unit_to_axis(unit)
}

pub struct JoystickOutput {
    driver: Box<dyn JoystickDriver>,
}

impl JoystickOutput {
    pub fn new(driver: Box<dyn JoystickDriver>) -> Self {
        Self { driver }
    }

    pub fn apply(&mut self, state: &ControlState) -> Result<(), DeviceError> {
        let steering = steering_to_axis(state.normalized_steering());
        let accelerator = accelerator_to_axis(state.accelerator());
        let brake = unit_to_axis(state.brake());
        debug!("Joystick apply: x={} y={} z={}", steering, accelerator, brake);

        let result = self.write(
            steering,
            accelerator,
            brake,
            state.handbrake_engaged(),
            state.horn_engaged(),
        );
        if let Err(e) = &result {
            error!("Joystick error: {}", e);
        }
        result
    }

    pub fn reset(&mut self) -> Result<(), DeviceError> {
        let result = self.write(
            STEERING_CENTER,
            accelerator_to_axis(0.0),
            unit_to_axis(0.0),
            false,
            false,
        );
        if let Err(e) = &result {
            error!("Joystick reset failed: {}", e);
        }
        result
    }

    fn write(
        &mut self,
        steering: u32,
        accelerator: u32,
        brake: u32,
        handbrake: bool,
        horn: bool,
    ) -> Result<(), DeviceError> {
        self.driver.set_axis(JoystickAxis::X, steering)?;
        self.driver.set_axis(JoystickAxis::Y, accelerator)?;
        self.driver.set_axis(JoystickAxis::Z, brake)?;
        self.driver.set_button(HANDBRAKE_BUTTON, handbrake)?;
        self.driver.set_button(HORN_BUTTON, horn)?;
        self.driver.flush()
    }
}
