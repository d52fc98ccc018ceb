//! Recording drivers for tests

use super::gamepad::{GamepadDriver, PadButton, Trigger};
use super::joystick::{JoystickAxis, JoystickDriver};
use super::keyboard::{DriveKey, KeyboardDriver};
use super::{DeviceError, DeviceProbe};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug, PartialEq)]
pub enum PadCall {
    Steering(f32),
    Trigger(Trigger, f32),
    Button(PadButton, bool),
    Reset,
    Flush,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PadReport {
    pub steering: f32,
    pub left_trigger: f32,
    pub right_trigger: f32,
    pub a: bool,
    pub x: bool,
}

#[derive(Default)]
struct PadLog {
    calls: Vec<PadCall>,
    staged: PadReport,
    committed: PadReport,
    fail: bool,
}

/// Gamepad driver that stages like a real pad and records every call
#[derive(Clone, Default)]
pub struct RecordingPad {
    log: Arc<Mutex<PadLog>>,
}

impl RecordingPad {
    pub fn failing() -> Self {
        let pad = Self::default();
        pad.log.lock().unwrap().fail = true;
        pad
    }

    pub fn calls(&self) -> Vec<PadCall> {
        self.log.lock().unwrap().calls.clone()
    }

    /// Report as of the last flush
    pub fn committed(&self) -> PadReport {
        self.log.lock().unwrap().committed.clone()
    }

    fn record(&self, call: PadCall) -> Result<(), DeviceError> {
        let mut log = self.log.lock().unwrap();
        if log.fail {
            return Err(DeviceError::HandleLost("gamepad"));
        }
        match &call {
            PadCall::Steering(v) => log.staged.steering = *v,
            PadCall::Trigger(Trigger::Left, v) => log.staged.left_trigger = *v,
            PadCall::Trigger(Trigger::Right, v) => log.staged.right_trigger = *v,
            PadCall::Button(PadButton::A, p) => log.staged.a = *p,
            PadCall::Button(PadButton::X, p) => log.staged.x = *p,
            PadCall::Reset => log.staged = PadReport::default(),
            PadCall::Flush => log.committed = log.staged.clone(),
        }
        log.calls.push(call);
        Ok(())
    }
}

impl GamepadDriver for RecordingPad {
    fn set_steering(&mut self, value: f32) -> Result<(), DeviceError> {
        self.record(PadCall::Steering(value))
    }

    fn set_trigger(&mut self, trigger: Trigger, value: f32) -> Result<(), DeviceError> {
        self.record(PadCall::Trigger(trigger, value))
    }

    fn set_button(&mut self, button: PadButton, pressed: bool) -> Result<(), DeviceError> {
        self.record(PadCall::Button(button, pressed))
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        self.record(PadCall::Reset)
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        self.record(PadCall::Flush)
    }
}

#[derive(Default)]
struct JoystickLog {
    axes: HashMap<JoystickAxis, u32>,
    buttons: HashMap<u8, bool>,
    flushes: usize,
}

#[derive(Clone, Default)]
pub struct RecordingJoystick {
    log: Arc<Mutex<JoystickLog>>,
}

impl RecordingJoystick {
    pub fn axis(&self, axis: JoystickAxis) -> Option<u32> {
        self.log.lock().unwrap().axes.get(&axis).copied()
    }

    pub fn button(&self, button: u8) -> Option<bool> {
        self.log.lock().unwrap().buttons.get(&button).copied()
    }

    pub fn flushes(&self) -> usize {
        self.log.lock().unwrap().flushes
    }
}

impl JoystickDriver for RecordingJoystick {
    fn set_axis(&mut self, axis: JoystickAxis, value: u32) -> Result<(), DeviceError> {
        self.log.lock().unwrap().axes.insert(axis, value);
        Ok(())
    }

    fn set_button(&mut self, button: u8, pressed: bool) -> Result<(), DeviceError> {
        self.log.lock().unwrap().buttons.insert(button, pressed);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        self.log.lock().unwrap().flushes += 1;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyEvent {
    Down(DriveKey),
    Up(DriveKey),
}

#[derive(Default)]
struct KeyboardLog {
    events: Vec<KeyEvent>,
    fail: bool,
}

#[derive(Clone, Default)]
pub struct RecordingKeyboard {
    log: Arc<Mutex<KeyboardLog>>,
}

impl RecordingKeyboard {
    pub fn failing() -> Self {
        let keyboard = Self::default();
        keyboard.log.lock().unwrap().fail = true;
        keyboard
    }

    pub fn events(&self) -> Vec<KeyEvent> {
        self.log.lock().unwrap().events.clone()
    }

    fn record(&self, event: KeyEvent) -> Result<(), DeviceError> {
        let mut log = self.log.lock().unwrap();
        if log.fail {
            return Err(DeviceError::HandleLost("keyboard"));
        }
        log.events.push(event);
        Ok(())
    }
}

impl KeyboardDriver for RecordingKeyboard {
    fn key_down(&mut self, key: DriveKey) -> Result<(), DeviceError> {
        self.record(KeyEvent::Down(key))
    }

    fn key_up(&mut self, key: DriveKey) -> Result<(), DeviceError> {
        self.record(KeyEvent::Up(key))
    }
}

/// Probe handing out clones of its recording drivers
#[derive(Clone, Default)]
pub struct FakeProbe {
    pub gamepad: bool,
    pub joystick: bool,
    pub keyboard: bool,
    pub pad: RecordingPad,
    pub stick: RecordingJoystick,
    pub keys: RecordingKeyboard,
}

impl FakeProbe {
    pub fn all() -> Self {
        Self {
            gamepad: true,
            joystick: true,
            keyboard: true,
            ..Self::default()
        }
    }

    pub fn keyboard_only() -> Self {
        Self {
            keyboard: true,
            ..Self::default()
        }
    }
}

impl DeviceProbe for FakeProbe {
    fn open_gamepad(&self) -> Result<Box<dyn GamepadDriver>, DeviceError> {
        if self.gamepad {
            Ok(Box::new(self.pad.clone()))
        } else {
            Err(DeviceError::unavailable("gamepad", "disabled in test"))
        }
    }

    fn open_joystick(&self) -> Result<Box<dyn JoystickDriver>, DeviceError> {
        if self.joystick {
            Ok(Box::new(self.stick.clone()))
        } else {
            Err(DeviceError::unavailable("joystick", "disabled in test"))
        }
    }

    fn open_keyboard(&self) -> Result<Box<dyn KeyboardDriver>, DeviceError> {
        if self.keyboard {
            Ok(Box::new(self.keys.clone()))
        } else {
            Err(DeviceError::unavailable("keyboard", "disabled in test"))
        }
    }
}
