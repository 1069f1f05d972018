//! Integration and property test suite for the bonding core.
//!
//! Exercises the ledger, emission schedule and eligibility engine together
//! through their public APIs. The tests live under `tests/`; this crate only
//! exports shared fixtures.

pub mod helpers;
