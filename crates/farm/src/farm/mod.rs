//! The farm: lifecycle state machine around one dispatch loop and its workers.
//!
//! Split into focused submodules:
//! - `core`: Farm struct, constructor, status and metrics accessors
//! - `lifecycle`: init, start, shutdown, reset
//! - `submit`: job submission

mod core;
mod lifecycle;
mod submit;
#[cfg(test)]
mod tests;

pub use self::core::{Farm, FarmStatus};
pub(crate) use self::core::FarmState;
