//! Control subsystem: state, mutation pipeline and its owning worker
//!
//! ```text
//! connection tasks ──[ControlAction]──► worker ──► ControlCore ──► OutputDevice
//!                      (mpsc queue)      (one at a time)
//! ```
//!
//! 1. [`state`] - the clamped steering/pedal/button record
//! 2. [`core`] - applies decoded commands and session changes to it
//! 3. [`worker`] - owns the core and serializes all access

pub mod core;
pub mod state;
pub mod worker;

pub use self::core::ControlCore;
pub use self::state::ControlState;
pub use self::worker::{ControlError, ControlHandle};
