//! Linux drivers on top of `/dev/uinput`
//!
//! Each backend is a separate virtual device created through `evdev`. Writes
//! are batched into one `emit` call, which the kernel sees followed by a
//! single `SYN_REPORT`.

use super::gamepad::{GamepadDriver, PadButton, Trigger};
use super::joystick::{self, JoystickAxis, JoystickDriver};
use super::keyboard::{DriveKey, KeyboardDriver};
use super::{DeviceError, DeviceProbe};
use evdev::uinput::VirtualDevice;
use evdev::{
    AbsInfo, AbsoluteAxisCode, AttributeSet, BusType, EventType, InputEvent, InputId, KeyCode,
    UinputAbsSetup,
};
use std::io;
use tracing::{debug, info};

const STICK_MAX: i32 = 32767;
const STICK_MIN: i32 = -32768;
const TRIGGER_MAX: i32 = 255;
/// errno once the uinput node behind a device is gone
const ENODEV: i32 = 19;

fn emit_error(backend: &'static str, e: io::Error) -> DeviceError {
    if e.raw_os_error() == Some(ENODEV) {
        DeviceError::HandleLost(backend)
    } else {
        DeviceError::write(backend, e)
    }
}

fn abs_event(axis: AbsoluteAxisCode, value: i32) -> InputEvent {
    InputEvent::new(EventType::ABSOLUTE.0, axis.0, value)
}

fn key_event(key: KeyCode, pressed: bool) -> InputEvent {
    InputEvent::new(EventType::KEY.0, key.0, i32::from(pressed))
}

/// Xbox 360 pad as the `xpad` driver exposes it
pub struct UinputPad {
    device: VirtualDevice,
    pending: Vec<InputEvent>,
}

impl UinputPad {
    pub fn create() -> io::Result<Self> {
        let mut keys = AttributeSet::<KeyCode>::new();
        keys.insert(KeyCode::BTN_SOUTH);
        // xpad reports X as BTN_NORTH
        keys.insert(KeyCode::BTN_NORTH);

        let stick = AbsInfo::new(0, STICK_MIN, STICK_MAX, 16, 128, 0);
        let trigger = AbsInfo::new(0, 0, TRIGGER_MAX, 0, 0, 0);

        let device = VirtualDevice::builder()?
            .name("wheelbridge Xbox 360 pad")
            .input_id(InputId::new(BusType::BUS_USB, 0x045e, 0x028e, 0x0110))
            .with_keys(&keys)?
            .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_X, stick))?
            .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_Y, stick))?
            .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_Z, trigger))?
            .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_RZ, trigger))?
            .build()?;

        Ok(Self {
            device,
            pending: Vec::with_capacity(8),
        })
    }

    fn button_code(button: PadButton) -> KeyCode {
        match button {
            PadButton::A => KeyCode::BTN_SOUTH,
            PadButton::X => KeyCode::BTN_NORTH,
        }
    }
}

impl GamepadDriver for UinputPad {
    fn set_steering(&mut self, value: f32) -> Result<(), DeviceError> {
        let raw = (value.clamp(-1.0, 1.0) * STICK_MAX as f32).round() as i32;
        self.pending.push(abs_event(AbsoluteAxisCode::ABS_X, raw));
        Ok(())
    }

    fn set_trigger(&mut self, trigger: Trigger, value: f32) -> Result<(), DeviceError> {
        let raw = (value.clamp(0.0, 1.0) * TRIGGER_MAX as f32).round() as i32;
        let axis = match trigger {
            Trigger::Left => AbsoluteAxisCode::ABS_Z,
            Trigger::Right => AbsoluteAxisCode::ABS_RZ,
        };
        self.pending.push(abs_event(axis, raw));
        Ok(())
    }

    fn set_button(&mut self, button: PadButton, pressed: bool) -> Result<(), DeviceError> {
        self.pending
            .push(key_event(Self::button_code(button), pressed));
        Ok(())
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        self.pending.clear();
        for axis in [
            AbsoluteAxisCode::ABS_X,
            AbsoluteAxisCode::ABS_Y,
            AbsoluteAxisCode::ABS_Z,
            AbsoluteAxisCode::ABS_RZ,
        ] {
            self.pending.push(abs_event(axis, 0));
        }
        self.pending.push(key_event(KeyCode::BTN_SOUTH, false));
        self.pending.push(key_event(KeyCode::BTN_NORTH, false));
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let result = self
            .device
            .emit(&self.pending)
            .map_err(|e| emit_error("gamepad", e));
        self.pending.clear();
        result
    }
}

/// Generic joystick with unsigned axes in `0..=AXIS_MAX`
pub struct UinputJoystick {
    device: VirtualDevice,
    pending: Vec<InputEvent>,
}

impl UinputJoystick {
    pub fn create() -> io::Result<Self> {
        let mut keys = AttributeSet::<KeyCode>::new();
        keys.insert(KeyCode::BTN_TRIGGER);
        keys.insert(KeyCode::BTN_THUMB);

        let axis = AbsInfo::new(
            joystick::STEERING_CENTER as i32,
            0,
            joystick::AXIS_MAX as i32,
            0,
            0,
            0,
        );

        let device = VirtualDevice::builder()?
            .name("wheelbridge joystick")
            .input_id(InputId::new(BusType::BUS_VIRTUAL, 0x1234, 0xbead, 1))
            .with_keys(&keys)?
            .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_X, axis))?
            .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_Y, axis))?
            .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_Z, axis))?
            .build()?;

        Ok(Self {
            device,
            pending: Vec::with_capacity(8),
        })
    }
}

impl JoystickDriver for UinputJoystick {
    fn set_axis(&mut self, axis: JoystickAxis, value: u32) -> Result<(), DeviceError> {
        let code = match axis {
            JoystickAxis::X => AbsoluteAxisCode::ABS_X,
            JoystickAxis::Y => AbsoluteAxisCode::ABS_Y,
            JoystickAxis::Z => AbsoluteAxisCode::ABS_Z,
        };
        let value = value.min(joystick::AXIS_MAX) as i32;
        self.pending.push(abs_event(code, value));
        Ok(())
    }

    fn set_button(&mut self, button: u8, pressed: bool) -> Result<(), DeviceError> {
        let code = match button {
            joystick::HANDBRAKE_BUTTON => KeyCode::BTN_TRIGGER,
            joystick::HORN_BUTTON => KeyCode::BTN_THUMB,
            other => {
                return Err(DeviceError::write(
                    "joystick",
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("button {} not configured", other),
                    ),
                ))
            }
        };
        self.pending.push(key_event(code, pressed));
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let result = self
            .device
            .emit(&self.pending)
            .map_err(|e| emit_error("joystick", e));
        self.pending.clear();
        result
    }
}

pub struct UinputKeyboard {
    device: VirtualDevice,
}

impl UinputKeyboard {
    pub fn create() -> io::Result<Self> {
        let mut keys = AttributeSet::<KeyCode>::new();
        for key in [
            DriveKey::SteerLeft,
            DriveKey::SteerRight,
            DriveKey::Throttle,
            DriveKey::Brake,
            DriveKey::Handbrake,
            DriveKey::Horn,
        ] {
            keys.insert(Self::key_code(key));
        }

        let device = VirtualDevice::builder()?
            .name("wheelbridge keyboard")
            .input_id(InputId::new(BusType::BUS_VIRTUAL, 0x1234, 0xbeae, 1))
            .with_keys(&keys)?
            .build()?;

        Ok(Self { device })
    }

    fn key_code(key: DriveKey) -> KeyCode {
        match key {
            DriveKey::SteerLeft => KeyCode::KEY_A,
            DriveKey::SteerRight => KeyCode::KEY_D,
            DriveKey::Throttle => KeyCode::KEY_W,
            DriveKey::Brake => KeyCode::KEY_S,
            DriveKey::Handbrake => KeyCode::KEY_SPACE,
            DriveKey::Horn => KeyCode::KEY_H,
        }
    }

    fn send(&mut self, key: DriveKey, pressed: bool) -> Result<(), DeviceError> {
        self.device
            .emit(&[key_event(Self::key_code(key), pressed)])
            .map_err(|e| emit_error("keyboard", e))
    }
}

impl KeyboardDriver for UinputKeyboard {
    fn key_down(&mut self, key: DriveKey) -> Result<(), DeviceError> {
        self.send(key, true)
    }

    fn key_up(&mut self, key: DriveKey) -> Result<(), DeviceError> {
        self.send(key, false)
    }
}

/// Creates uinput devices; needs write access to `/dev/uinput`
#[derive(Default)]
pub struct UinputProbe;

impl DeviceProbe for UinputProbe {
    fn open_gamepad(&self) -> Result<Box<dyn GamepadDriver>, DeviceError> {
        debug!("Probing uinput gamepad");
        let pad = UinputPad::create()
            .map_err(|e| DeviceError::unavailable("gamepad", e.to_string()))?;
        info!("Created uinput Xbox 360 pad");
        Ok(Box::new(pad))
    }

    fn open_joystick(&self) -> Result<Box<dyn JoystickDriver>, DeviceError> {
        debug!("Probing uinput joystick");
        let joystick = UinputJoystick::create()
            .map_err(|e| DeviceError::unavailable("joystick", e.to_string()))?;
        info!("Created uinput joystick");
        Ok(Box::new(joystick))
    }

    fn open_keyboard(&self) -> Result<Box<dyn KeyboardDriver>, DeviceError> {
        debug!("Probing uinput keyboard");
        let keyboard = UinputKeyboard::create()
            .map_err(|e| DeviceError::unavailable("keyboard", e.to_string()))?;
        info!("Created uinput keyboard");
        Ok(Box::new(keyboard))
    }
}
