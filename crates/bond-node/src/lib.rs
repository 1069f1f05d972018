//! # bond-node-lib
//! Composition layer for the Bond bonding service.
//!
//! - [`config`]: layered configuration (defaults, TOML file, `BOND_*` env)
//! - [`storage`]: RocksDB persistence of checkpoints, locks, slope changes,
//!   claims and utilization
//! - [`service`]: [`BondingService`], the thread-safe facade that persists
//!   every mutation before applying it in memory

pub mod config;
pub mod service;
pub mod storage;

pub use crate::config::NodeConfig;
pub use service::BondingService;
pub use storage::RocksStore;
