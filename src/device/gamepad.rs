//! Full-axis virtual gamepad output (Xbox 360 layout)

use crate::control::state::ControlState;
use crate::device::DeviceError;
use tracing::{debug, error};

/// Analog triggers of the emulated pad
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Trigger {
    Left,
    Right,
}

/// Digital buttons the bridge drives
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PadButton {
    A,
    X,
}

/// Low level capability of a virtual gamepad driver.
///
/// Setters only stage values; nothing reaches the downlevel driver before
/// [`GamepadDriver::flush`].
pub trait GamepadDriver: Send {
    /// Left stick X in `[-1, 1]`
    fn set_steering(&mut self, value: f32) -> Result<(), DeviceError>;

    /// Trigger position in `[0, 1]`
    fn set_trigger(&mut self, trigger: Trigger, value: f32) -> Result<(), DeviceError>;

    fn set_button(&mut self, button: PadButton, pressed: bool) -> Result<(), DeviceError>;

    /// Stages the neutral report (centered sticks, released triggers and buttons)
    fn reset(&mut self) -> Result<(), DeviceError>;

    /// Commits all staged writes
    fn flush(&mut self) -> Result<(), DeviceError>;
}

/// Button carrying the handbrake
pub const HANDBRAKE_BUTTON: PadButton = PadButton::A;
/// Button carrying the horn
pub const HORN_BUTTON: PadButton = PadButton::X;

pub struct PadOutput {
    driver: Box<dyn GamepadDriver>,
}

impl PadOutput {
    pub fn new(driver: Box<dyn GamepadDriver>) -> Self {
        Self { driver }
    }

    pub fn apply(&mut self, state: &ControlState) -> Result<(), DeviceError> {
        let steering = state.normalized_steering() as f32;
        debug!(
            "Pad apply: steering={:.3} accel={:.3} brake={:.3}",
            steering,
            state.accelerator(),
            state.brake()
        );

        let result = self.stage(state, steering).and_then(|_| self.driver.flush());
        if let Err(e) = &result {
            error!("Gamepad error: {}", e);
        }
        result
    }

    fn stage(&mut self, state: &ControlState, steering: f32) -> Result<(), DeviceError> {
        self.driver.set_steering(steering)?;
        self.driver
            .set_trigger(Trigger::Right, state.accelerator() as f32)?;
        self.driver.set_trigger(Trigger::Left, state.brake() as f32)?;
        self.driver
            .set_button(HANDBRAKE_BUTTON, state.handbrake_engaged())?;
        self.driver.set_button(HORN_BUTTON, state.horn_engaged())
    }

    pub fn reset(&mut self) -> Result<(), DeviceError> {
        let result = self.driver.reset().and_then(|_| self.driver.flush());
        if let Err(e) = &result {
            error!("Gamepad reset failed: {}", e);
        }
        result
    }
}
