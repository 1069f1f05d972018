//! # bond-core
//! Foundation types, traits and the emission schedule for the Bond protocol.
//!
//! All calculations use integer arithmetic only for determinism.

pub mod constants;
pub mod emission;
pub mod error;
pub mod math;
pub mod traits;
pub mod types;

pub use emission::{EmissionParams, EmissionScheduler};
pub use types::{AccountId, Epoch, LockedBalance, Point, Timestamp};
