//! Mutation pipeline: command -> state change -> device apply
//!
//! [`ControlCore`] owns everything that must never be touched concurrently:
//! the control state, the output device handle and the session registry. It
//! is synchronous; serialization is provided by whoever owns it
//! (the control worker in production, the test itself in unit tests).

use crate::control::state::ControlState;
use crate::device::{DeviceError, DeviceKind, OutputDevice};
use crate::protocol::{Command, UpdateData};
use crate::session::{ClientId, SessionRegistry};
use std::net::SocketAddr;
use tracing::{debug, info, warn};

pub struct ControlCore {
    state: ControlState,
    device: OutputDevice,
    sessions: SessionRegistry,
}

impl ControlCore {
    pub fn new(state: ControlState, device: OutputDevice) -> Self {
        Self {
            state,
            device,
            sessions: SessionRegistry::new(),
        }
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn device_kind(&self) -> DeviceKind {
        self.device.kind()
    }

    pub fn client_count(&self) -> usize {
        self.sessions.len()
    }

    /// Applies one decoded command. Returns whether the state was touched.
    ///
    /// Device failures are logged and otherwise ignored here; the state
    /// change stands and the next command tries the device again.
    pub fn execute(&mut self, command: Command) -> bool {
        match command {
            Command::Update(data) => {
                self.update(data);
                self.apply();
            }
            Command::HandbrakePress => {
                self.state.set_handbrake(true);
                self.apply();
            }
            Command::HandbrakeRelease => {
                self.state.set_handbrake(false);
                self.apply();
            }
            Command::HornPress => {
                self.state.set_horn(true);
                self.apply();
            }
            Command::HornRelease => {
                self.state.set_horn(false);
                self.apply();
            }
            Command::Reset => {
                info!("Reset requested by client");
                self.release_all();
            }
            Command::Unknown(name) => {
                debug!("Ignoring unknown command '{}'", name);
                return false;
            }
        }
        true
    }

    fn update(&mut self, data: UpdateData) {
        if data.is_empty() {
            debug!("Update without fields");
        }
        if let Some(steering) = data.steering {
            let stored = self.state.set_steering(steering);
            if stored != steering {
                debug!("Steering {} clamped to {}", steering, stored);
            }
        }
        if let Some(accelerator) = data.accelerator {
            self.state.set_accelerator_percent(accelerator);
        }
        if let Some(brake) = data.brake {
            self.state.set_brake_percent(brake);
        }
    }

    fn apply(&mut self) -> Option<DeviceError> {
        self.device.apply(&self.state).err()
    }

    /// Neutral state, device reset, then one apply of the neutral state.
    pub fn release_all(&mut self) {
        self.state.reset();
        if let Err(e) = self.device.reset() {
            warn!("Device reset failed: {}", e);
        }
        if let Some(e) = self.apply() {
            warn!("Applying neutral state failed: {}", e);
        }
    }

    pub fn connect(&mut self, peer: SocketAddr) -> ClientId {
        self.sessions.register(peer)
    }

    /// Unregisters a client; releases all inputs when it was the last one.
    pub fn disconnect(&mut self, id: ClientId) {
        if self.sessions.unregister(id) {
            info!("Last client left, releasing all inputs");
            self.release_all();
        }
    }

    /// Best-effort neutralization before the process exits.
    pub fn shutdown(&mut self) {
        info!(
            "Releasing all inputs before shutdown ({} client(s) still connected)",
            self.client_count()
        );
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::keyboard::DriveKey;
    use crate::device::testing::{FakeProbe, KeyEvent, PadCall, RecordingKeyboard};
    use crate::device::{select_output, KeyboardSettings};

    fn peer() -> SocketAddr {
        SocketAddr::from(([192, 168, 1, 20], 50000))
    }

    fn core_with(probe: &FakeProbe) -> ControlCore {
        ControlCore::new(
            ControlState::new(900.0),
            select_output(probe, KeyboardSettings::default()),
        )
    }

    fn decode(json: &str) -> Command {
        Command::decode(json.as_bytes()).unwrap()
    }

    #[test]
    fn partial_update_keeps_other_fields() {
        let probe = FakeProbe::all();
        let mut core = core_with(&probe);

        core.execute(decode(
            r#"{"command":"update","data":{"steering":-300,"accelerator":40}}"#,
        ));
        core.execute(decode(r#"{"command":"update","data":{"brake":50}}"#));

        assert_eq!(core.state().steering_angle(), -300.0);
        assert!((core.state().accelerator() - 0.4).abs() < 1e-9);
        assert!((core.state().brake() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn each_mutating_command_applies_exactly_once() {
        let probe = FakeProbe::all();
        let mut core = core_with(&probe);

        core.execute(decode(
            r#"{"command":"update","data":{"steering":10,"accelerator":10,"brake":10}}"#,
        ));
        core.execute(Command::HornPress);
        core.execute(Command::Unknown("wipers".into()));

        let flushes = probe
            .pad
            .calls()
            .into_iter()
            .filter(|c| *c == PadCall::Flush)
            .count();
        assert_eq!(flushes, 2);
        assert!(probe.pad.committed().x);
    }

    #[test]
    fn buttons_toggle_state() {
        let probe = FakeProbe::all();
        let mut core = core_with(&probe);

        core.execute(Command::HandbrakePress);
        core.execute(Command::HornPress);
        assert!(core.state().handbrake_engaged());
        assert!(core.state().horn_engaged());

        core.execute(Command::HandbrakeRelease);
        core.execute(Command::HornRelease);
        assert!(!core.state().handbrake_engaged());
        assert!(!core.state().horn_engaged());
    }

    #[test]
    fn reset_command_is_idempotent() {
        let probe = FakeProbe::all();
        let mut core = core_with(&probe);
        core.execute(decode(
            r#"{"command":"update","data":{"steering":700,"accelerator":100}}"#,
        ));

        core.execute(Command::Reset);
        let first = core.state().clone();
        core.execute(Command::Reset);

        assert!(first.is_neutral());
        assert_eq!(&first, core.state());
        assert_eq!(probe.pad.committed(), Default::default());
    }

    #[test]
    fn last_disconnect_resets_state_and_device() {
        let probe = FakeProbe::all();
        let mut core = core_with(&probe);
        let id = core.connect(peer());
        core.execute(decode(r#"{"command":"update","data":{"accelerator":100}}"#));
        assert_eq!(core.state().accelerator(), 1.0);

        core.disconnect(id);

        assert!(core.state().is_neutral());
        let calls = probe.pad.calls();
        let reset_at = calls.iter().position(|c| *c == PadCall::Reset).unwrap();
        assert_eq!(calls.last(), Some(&PadCall::Flush));
        assert!(reset_at > 0);
        assert_eq!(probe.pad.committed(), Default::default());
    }

    #[test]
    fn remaining_client_keeps_state() {
        let probe = FakeProbe::all();
        let mut core = core_with(&probe);
        let first = core.connect(peer());
        let _second = core.connect(peer());
        core.execute(decode(r#"{"command":"update","data":{"steering":90}}"#));

        core.disconnect(first);

        assert_eq!(core.state().steering_angle(), 90.0);
        assert_eq!(core.client_count(), 1);
    }

    #[test]
    fn keyboard_variant_does_not_repeat_presses() {
        let probe = FakeProbe::keyboard_only();
        let mut core = core_with(&probe);
        assert_eq!(core.device_kind(), DeviceKind::Keyboard);

        core.execute(decode(r#"{"command":"update","data":{"steering":50}}"#));
        core.execute(decode(r#"{"command":"update","data":{"steering":60}}"#));

        assert_eq!(
            probe.keys.events(),
            vec![KeyEvent::Down(DriveKey::SteerRight)]
        );
    }

    #[test]
    fn device_failure_does_not_block_state_updates() {
        let probe = FakeProbe {
            gamepad: false,
            joystick: false,
            keys: RecordingKeyboard::failing(),
            ..FakeProbe::keyboard_only()
        };
        let mut core = core_with(&probe);

        assert!(core.execute(Command::HornPress));
        assert!(core.state().horn_engaged());
        core.execute(decode(r#"{"command":"update","data":{"brake":30}}"#));
        assert!((core.state().brake() - 0.3).abs() < 1e-9);
    }
}
