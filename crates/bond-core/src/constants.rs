//! Protocol constants. All principal amounts in base units (1 BOND = 10^8 base units).

pub const COIN: u64 = 100_000_000;

/// Basis-point denominator: 10 000 BPS = 100%.
pub const BPS_PRECISION: u64 = 10_000;

/// Fixed-point scale of voting power per base unit of principal.
///
/// Checkpoint `bias` and `slope` are stored in this scale so that a lock of a
/// few base units still decays smoothly over a multi-year duration.
pub const POWER_PRECISION: u128 = 1_000_000_000_000_000_000;

/// Fixed-point scale for dimensionless ratios (retention factor, utilization).
pub const RATIO_PRECISION: u128 = 1_000_000_000_000_000_000;

// --- Time ---

pub const DAY: u64 = 86_400;
pub const WEEK: u64 = 7 * DAY;
/// A 365-day year, used for lock durations and APY annualization.
pub const YEAR: u64 = 365 * DAY;

/// Default maximum lock duration: two years.
pub const DEFAULT_MAX_LOCK_DURATION: u64 = 2 * YEAR;

/// Default minimum lock duration: two weeks.
pub const DEFAULT_MIN_LOCK_DURATION: u64 = 2 * WEEK;

/// Lock expiries are rounded down to this unit to keep the slope-change
/// schedule sparse.
pub const DEFAULT_LOCK_TIME_UNIT: u64 = WEEK;

// --- Emission schedule ---

/// Default epoch length: two weeks.
pub const DEFAULT_EPOCH_LENGTH: u64 = 2 * WEEK;

/// Default base emissions per epoch (1,000,000 BOND).
pub const DEFAULT_EMISSIONS_PER_EPOCH: u64 = 1_000_000 * COIN;

/// Default number of epochs between emission reductions.
pub const DEFAULT_REDUCTION_CLIFF: u64 = 26;

/// Default reduction applied at each cliff, in basis points.
pub const DEFAULT_REDUCTION_BPS: u64 = 500;

/// Smallest allowed reduction cliff, in epochs.
pub const MIN_REDUCTION_CLIFF: u64 = 1;

/// Largest allowed reduction cliff, in epochs.
pub const MAX_REDUCTION_CLIFF: u64 = 365;

/// Upper bound on the per-cliff reduction (10%).
pub const MAX_REDUCTION_BPS: u64 = 1_000;

// --- Utilization ---

/// Default personal utilization lower bound, as BPS of the personal target.
pub const DEFAULT_PERSONAL_LOWER_BOUND_BPS: u64 = 2_500;

/// Default system utilization lower bound, as BPS of the system target.
pub const DEFAULT_SYSTEM_LOWER_BOUND_BPS: u64 = 4_000;
