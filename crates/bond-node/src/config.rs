//! Configuration for the bonding service.
//!
//! [`NodeConfig`] is assembled from built-in defaults, an optional TOML file
//! and `BOND_*` environment variables, in that order of precedence (later
//! sources win). Nested keys use `__` in the environment, e.g.
//! `BOND_LEDGER__MAX_LOCK_DURATION=31536000`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use bond_core::constants::{
    DEFAULT_EMISSIONS_PER_EPOCH, DEFAULT_EPOCH_LENGTH, DEFAULT_PERSONAL_LOWER_BOUND_BPS,
    DEFAULT_REDUCTION_BPS, DEFAULT_REDUCTION_CLIFF, DEFAULT_SYSTEM_LOWER_BOUND_BPS,
};
use bond_core::emission::EmissionParams;
use bond_core::error::BondError;
use bond_core::types::Timestamp;
use bond_ledger::LedgerConfig;
use bond_rewards::{ClaimWindow, TargetSource, UtilizationPolicy};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "BOND";

/// Configuration for a bonding service instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Log level filter string (e.g. "info", "bond_node_lib=debug").
    pub log_level: String,
    /// Lock duration rules.
    pub ledger: LedgerConfig,
    /// Emission schedule used when the store is first initialized.
    pub emission: EmissionConfig,
    /// Reward gating and claim policy.
    pub rewards: RewardsConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bond");

        Self {
            data_dir,
            log_level: "info".to_string(),
            ledger: LedgerConfig::default(),
            emission: EmissionConfig::default(),
            rewards: RewardsConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load defaults, then `path` (if given), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, BondError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        let config: Self = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| BondError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section.
    pub fn validate(&self) -> Result<(), BondError> {
        self.ledger.validate()?;
        self.emission.params(0).validate()?;
        self.rewards.policy().validate()?;
        Ok(())
    }

    /// Path to the RocksDB data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("bonddata")
    }
}

/// Emission schedule settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EmissionConfig {
    /// Start of epoch 0. Defaults to the moment the store is initialized.
    pub start: Option<Timestamp>,
    pub epoch_length: u64,
    pub emissions_per_epoch: u64,
    pub reduction_cliff: u64,
    pub reduction_bps: u64,
}

impl Default for EmissionConfig {
    fn default() -> Self {
        Self {
            start: None,
            epoch_length: DEFAULT_EPOCH_LENGTH,
            emissions_per_epoch: DEFAULT_EMISSIONS_PER_EPOCH,
            reduction_cliff: DEFAULT_REDUCTION_CLIFF,
            reduction_bps: DEFAULT_REDUCTION_BPS,
        }
    }
}

impl EmissionConfig {
    /// Parameters for a schedule initialized at `now`.
    pub fn params(&self, now: Timestamp) -> EmissionParams {
        EmissionParams {
            start: self.start.unwrap_or(now),
            epoch_length: self.epoch_length,
            emissions_per_epoch: self.emissions_per_epoch,
            reduction_cliff: self.reduction_cliff,
            reduction_bps: self.reduction_bps,
        }
    }

    /// Whether `stored` agrees with this configuration. An unset start
    /// matches any stored start.
    pub fn matches(&self, stored: &EmissionParams) -> bool {
        self.start.is_none_or(|s| s == stored.start)
            && self.epoch_length == stored.epoch_length
            && self.emissions_per_epoch == stored.emissions_per_epoch
            && self.reduction_cliff == stored.reduction_cliff
            && self.reduction_bps == stored.reduction_bps
    }
}

/// Reward gating settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RewardsConfig {
    pub target: TargetSource,
    pub personal_lower_bound_bps: u64,
    pub system_lower_bound_bps: u64,
    pub claim_window: ClaimWindow,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            target: TargetSource::PreviousEpochClaims,
            personal_lower_bound_bps: DEFAULT_PERSONAL_LOWER_BOUND_BPS,
            system_lower_bound_bps: DEFAULT_SYSTEM_LOWER_BOUND_BPS,
            claim_window: ClaimWindow::Unbounded,
        }
    }
}

impl RewardsConfig {
    pub fn policy(&self) -> UtilizationPolicy {
        UtilizationPolicy {
            target: self.target,
            personal_lower_bound_bps: self.personal_lower_bound_bps,
            system_lower_bound_bps: self.system_lower_bound_bps,
        }
    }
}
