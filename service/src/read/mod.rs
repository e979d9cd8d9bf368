//! Read entities definitions.

pub mod availability;
pub mod capacity;
pub mod overlap;

pub use self::availability::{Availability, Shortage};
