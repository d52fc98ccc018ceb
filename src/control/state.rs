//! The authoritative control state and its clamping rules.
//!
//! Steering is carried as a signed, multi-rotation angle in degrees. The
//! client accumulates physical rotation past a single turn, so nothing here
//! wraps angles; values are only clamped to `±max_rotation`.

use serde::Serialize;

/// Default steering range in degrees (a 900° road wheel).
pub const DEFAULT_MAX_ROTATION: f64 = 900.0;

/// Clamps a raw steering angle to `[-max_rotation, max_rotation]`.
pub fn clamp_steering(raw: f64, max_rotation: f64) -> f64 {
    raw.clamp(-max_rotation, max_rotation)
}

/// Converts a pedal percentage (`0..=100`) into the unit range.
pub fn percent_to_unit(percent: f64) -> f64 {
    (percent / 100.0).clamp(0.0, 1.0)
}

/// Current steering, pedal and button state of the single modeled driver.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ControlState {
    steering_angle: f64,
    max_rotation: f64,
    accelerator: f64,
    brake: f64,
    handbrake_engaged: bool,
    horn_engaged: bool,
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ROTATION)
    }
}

impl ControlState {
    /// Creates a neutral state. `max_rotation` must be positive and finite,
    /// which the config layer guarantees.
    pub fn new(max_rotation: f64) -> Self {
        Self {
            steering_angle: 0.0,
            max_rotation,
            accelerator: 0.0,
            brake: 0.0,
            handbrake_engaged: false,
            horn_engaged: false,
        }
    }

    pub fn steering_angle(&self) -> f64 {
        self.steering_angle
    }

    pub fn max_rotation(&self) -> f64 {
        self.max_rotation
    }

    pub fn accelerator(&self) -> f64 {
        self.accelerator
    }

    pub fn brake(&self) -> f64 {
        self.brake
    }

    pub fn handbrake_engaged(&self) -> bool {
        self.handbrake_engaged
    }

    pub fn horn_engaged(&self) -> bool {
        self.horn_engaged
    }

    /// Steering mapped onto `[-1, 1]` for axis-based outputs.
    pub fn normalized_steering(&self) -> f64 {
        (self.steering_angle / self.max_rotation).clamp(-1.0, 1.0)
    }

    /// Stores a steering angle in degrees and returns the clamped value.
    pub fn set_steering(&mut self, degrees: f64) -> f64 {
        self.steering_angle = clamp_steering(degrees, self.max_rotation);
        self.steering_angle
    }

    /// Stores the accelerator from a percentage and returns the unit value.
    pub fn set_accelerator_percent(&mut self, percent: f64) -> f64 {
        self.accelerator = percent_to_unit(percent);
        self.accelerator
    }

    /// Stores the brake from a percentage and returns the unit value.
    pub fn set_brake_percent(&mut self, percent: f64) -> f64 {
        self.brake = percent_to_unit(percent);
        self.brake
    }

    pub fn set_handbrake(&mut self, engaged: bool) {
        self.handbrake_engaged = engaged;
    }

    pub fn set_horn(&mut self, engaged: bool) {
        self.horn_engaged = engaged;
    }

    /// Returns every field to neutral. The configured range is kept.
    pub fn reset(&mut self) {
        *self = Self::new(self.max_rotation);
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::new(self.max_rotation)
    }
}
