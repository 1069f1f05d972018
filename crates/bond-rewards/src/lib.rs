//! # bond-rewards: Utilization-gated reward eligibility.
//!
//! A user's reward for a finished epoch is the epoch's emissions scaled by
//! their share of voting power at the epoch end, then gated by how much they
//! (and the protocol as a whole) used the vault layer during that epoch:
//!
//! ```text
//! reward = emissions(e) * balance(user, end) / supply(end)
//!        * min(personal_ratio, system_ratio)
//!        - already_claimed(user, e)
//! ```
//!
//! Ledger and utilization data are read through the `bond-core` trait seams,
//! so the engine itself holds only the schedule, the policy and the claim book.

pub mod claims;
pub mod eligibility;
pub mod utilization;

pub use claims::ClaimBook;
pub use eligibility::{ClaimReceipt, ClaimWindow, EligibilityEngine, UserInfo};
pub use utilization::{normalize, MemoryUtilizationFeed, TargetSource, UtilizationPolicy};
