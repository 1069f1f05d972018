//! # bond-ledger: Checkpointed decaying-balance ledger.
//!
//! All calculations use integer arithmetic only for determinism.
//!
//! A lock of `amount` until `end` carries voting power that decays linearly
//! to zero at `end`. The ledger keeps:
//! - **Point logs**: an append-only sequence of checkpoints per account and
//!   one global sequence for the aggregate supply. Checkpoints are never
//!   rewritten, so any past instant can be queried.
//! - **Slope-change schedule**: the decay rate each expiry removes from the
//!   aggregate curve, so the global supply can be projected forward without
//!   touching individual accounts.

pub mod history;
pub mod ledger;
pub mod schedule;

pub use history::{Anchor, PointLog};
pub use ledger::{DecayLedger, LedgerConfig, LedgerSnapshot, LedgerUpdate};
pub use schedule::SlopeSchedule;
