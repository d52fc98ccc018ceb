//! Keyboard fallback output
//!
//! Continuous inputs are discretized into held keys. Steering has three
//! states around a deadzone, pedals switch at a threshold and the buttons map
//! 1:1. The output remembers which keys it holds and only emits transitions,
//! so a stream of updates on the same side of the deadzone produces a single
//! key press.

use crate::control::state::ControlState;
use crate::device::DeviceError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{self, Display};
use tracing::{debug, error};

/// Steering deadzone in degrees
pub const DEFAULT_DEADZONE: f64 = 10.0;
/// Pedal value (unit range) above which the pedal key is held
pub const DEFAULT_PEDAL_THRESHOLD: f64 = 0.1;

/// Logical keys of the fallback layout
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DriveKey {
    SteerLeft,
    SteerRight,
    Throttle,
    Brake,
    Handbrake,
    Horn,
}

impl Display for DriveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriveKey::SteerLeft => write!(f, "a"),
            DriveKey::SteerRight => write!(f, "d"),
            DriveKey::Throttle => write!(f, "w"),
            DriveKey::Brake => write!(f, "s"),
            DriveKey::Handbrake => write!(f, "space"),
            DriveKey::Horn => write!(f, "h"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct KeyboardSettings {
    /// Steering angle in degrees below which both steering keys are released
    pub deadzone: f64,
    /// Pedal key is held while the pedal is strictly above this value
    pub pedal_threshold: f64,
}

impl Default for KeyboardSettings {
    fn default() -> Self {
        Self {
            deadzone: DEFAULT_DEADZONE,
            pedal_threshold: DEFAULT_PEDAL_THRESHOLD,
        }
    }
}

pub trait KeyboardDriver: Send {
    fn key_down(&mut self, key: DriveKey) -> Result<(), DeviceError>;

    fn key_up(&mut self, key: DriveKey) -> Result<(), DeviceError>;
}

pub struct KeyboardOutput {
    driver: Box<dyn KeyboardDriver>,
    settings: KeyboardSettings,
    held: BTreeSet<DriveKey>,
}

impl KeyboardOutput {
    pub fn new(driver: Box<dyn KeyboardDriver>, settings: KeyboardSettings) -> Self {
        Self {
            driver,
            settings,
            held: BTreeSet::new(),
        }
    }

    pub fn held_keys(&self) -> impl Iterator<Item = DriveKey> + '_ {
        self.held.iter().copied()
    }

    /// Desired key states for `state`, releases first.
    fn targets(&self, state: &ControlState) -> [(DriveKey, bool); 6] {
        let angle = state.steering_angle();
        let deadzone = self.settings.deadzone;
        let (left, right) = if angle >= deadzone {
            (false, true)
        } else if angle <= -deadzone {
            (true, false)
        } else {
            (false, false)
        };
        let (first, second) = if left {
            ((DriveKey::SteerRight, right), (DriveKey::SteerLeft, left))
        } else {
            ((DriveKey::SteerLeft, left), (DriveKey::SteerRight, right))
        };

        [
            first,
            second,
            (
                DriveKey::Throttle,
                state.accelerator() > self.settings.pedal_threshold,
            ),
            (DriveKey::Brake, state.brake() > self.settings.pedal_threshold),
            (DriveKey::Handbrake, state.handbrake_engaged()),
            (DriveKey::Horn, state.horn_engaged()),
        ]
    }

    pub fn apply(&mut self, state: &ControlState) -> Result<(), DeviceError> {
        let mut outcome = Ok(());
        for (key, pressed) in self.targets(state) {
            if let Err(e) = self.set_key(key, pressed) {
                error!("Keyboard error on {}: {}", key, e);
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }
        outcome
    }

    /// Releases every held key.
    pub fn reset(&mut self) -> Result<(), DeviceError> {
        let held: Vec<DriveKey> = self.held_keys().collect();
        let mut outcome = Ok(());
        for key in held {
            if let Err(e) = self.set_key(key, false) {
                error!("Error releasing {}: {}", key, e);
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }
        outcome
    }

    fn set_key(&mut self, key: DriveKey, pressed: bool) -> Result<(), DeviceError> {
        match (pressed, self.held.contains(&key)) {
            (true, false) => {
                self.driver.key_down(key)?;
                debug!("Key down: {}", key);
                self.held.insert(key);
            }
            (false, true) => {
                self.driver.key_up(key)?;
                debug!("Key up: {}", key);
                self.held.remove(&key);
            }
            _ => {}
        }
        Ok(())
    }
}
