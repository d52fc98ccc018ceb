//! Output device layer
//!
//! Projects the [`ControlState`] onto exactly one virtual input backend. The
//! backend is chosen once at startup by [`select_output`], which walks a fixed
//! priority list:
//!
//! ```text
//! XboxPad (full axes) ──► Joystick (vJoy style) ──► Keyboard ──► None
//! ```
//!
//! Drivers are reached through narrow traits ([`GamepadDriver`],
//! [`JoystickDriver`], [`KeyboardDriver`]) handed out by a [`DeviceProbe`].
//! Output is best effort: every failure is logged and returned, but callers
//! keep going and the next apply is a fresh attempt.

pub mod error;
pub mod gamepad;
pub mod joystick;
pub mod keyboard;
#[cfg(target_os = "linux")]
pub mod uinput;

#[cfg(test)]
pub mod testing;

pub use error::DeviceError;
pub use gamepad::{GamepadDriver, PadOutput};
pub use joystick::{JoystickDriver, JoystickOutput};
pub use keyboard::{KeyboardDriver, KeyboardOutput, KeyboardSettings};

use crate::control::state::ControlState;
use std::fmt::{self, Display};
use tracing::{debug, error, info, warn};

/// The backend variants, in selection priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    XboxPad,
    Joystick,
    Keyboard,
    None,
}

impl Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::XboxPad => write!(f, "Xbox pad"),
            DeviceKind::Joystick => write!(f, "Joystick"),
            DeviceKind::Keyboard => write!(f, "Keyboard"),
            DeviceKind::None => write!(f, "None"),
        }
    }
}

/// Creates backend drivers on demand
///
/// Each method either returns a ready driver or explains why the backend
/// cannot be used on this machine.
pub trait DeviceProbe {
    fn open_gamepad(&self) -> Result<Box<dyn GamepadDriver>, DeviceError>;

    fn open_joystick(&self) -> Result<Box<dyn JoystickDriver>, DeviceError>;

    fn open_keyboard(&self) -> Result<Box<dyn KeyboardDriver>, DeviceError>;
}

/// Probe for hosts without any supported virtual input facility
#[cfg_attr(target_os = "linux", allow(dead_code))]
pub struct NoBackends;

impl DeviceProbe for NoBackends {
    fn open_gamepad(&self) -> Result<Box<dyn GamepadDriver>, DeviceError> {
        Err(DeviceError::unavailable("gamepad", "not supported on this platform"))
    }

    fn open_joystick(&self) -> Result<Box<dyn JoystickDriver>, DeviceError> {
        Err(DeviceError::unavailable("joystick", "not supported on this platform"))
    }

    fn open_keyboard(&self) -> Result<Box<dyn KeyboardDriver>, DeviceError> {
        Err(DeviceError::unavailable("keyboard", "not supported on this platform"))
    }
}

/// Returns the probe for the platform the bridge runs on
pub fn platform_probe() -> Box<dyn DeviceProbe> {
    #[cfg(target_os = "linux")]
    {
        Box::new(uinput::UinputProbe::default())
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(NoBackends)
    }
}

/// The bound output backend
pub enum OutputDevice {
    XboxPad(PadOutput),
    Joystick(JoystickOutput),
    Keyboard(KeyboardOutput),
    None,
}

impl OutputDevice {
    pub fn kind(&self) -> DeviceKind {
        match self {
            OutputDevice::XboxPad(_) => DeviceKind::XboxPad,
            OutputDevice::Joystick(_) => DeviceKind::Joystick,
            OutputDevice::Keyboard(_) => DeviceKind::Keyboard,
            OutputDevice::None => DeviceKind::None,
        }
    }

    /// Commits the full state to the backend
    pub fn apply(&mut self, state: &ControlState) -> Result<(), DeviceError> {
        match self {
            OutputDevice::XboxPad(pad) => pad.apply(state),
            OutputDevice::Joystick(joystick) => joystick.apply(state),
            OutputDevice::Keyboard(keyboard) => keyboard.apply(state),
            OutputDevice::None => {
                debug!("No output device bound, dropping state {:?}", state);
                Ok(())
            }
        }
    }

    /// Puts the backend into its neutral state. Idempotent.
    pub fn reset(&mut self) -> Result<(), DeviceError> {
        match self {
            OutputDevice::XboxPad(pad) => pad.reset(),
            OutputDevice::Joystick(joystick) => joystick.reset(),
            OutputDevice::Keyboard(keyboard) => keyboard.reset(),
            OutputDevice::None => Ok(()),
        }
    }
}

/// Binds the first backend that initializes, in priority order.
///
/// Never fails: without any backend the bridge still serves clients and
/// the [`OutputDevice::None`] variant swallows applies.
pub fn select_output(probe: &dyn DeviceProbe, keyboard: KeyboardSettings) -> OutputDevice {
    match probe.open_gamepad() {
        Ok(driver) => {
            info!("Virtual Xbox pad initialized");
            return OutputDevice::XboxPad(PadOutput::new(driver));
        }
        Err(e) => warn!("Gamepad backend failed: {}", e),
    }

    match probe.open_joystick() {
        Ok(driver) => {
            info!("Virtual joystick initialized");
            return OutputDevice::Joystick(JoystickOutput::new(driver));
        }
        Err(e) => warn!("Joystick backend failed: {}", e),
    }

    match probe.open_keyboard() {
        Ok(driver) => {
            info!(
                "Keyboard fallback initialized (deadzone {}°, pedal threshold {})",
                keyboard.deadzone, keyboard.pedal_threshold
            );
            return OutputDevice::Keyboard(KeyboardOutput::new(driver, keyboard));
        }
        Err(e) => warn!("Keyboard backend failed: {}", e),
    }

    error!("No output backend available, control input will be discarded");
    OutputDevice::None
}
