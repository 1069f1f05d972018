//! Epoch emission schedule with compounding cliff reductions.
//!
//! Time after `start` is divided into fixed-length epochs. Every
//! `reduction_cliff` epochs, per-epoch emissions are multiplied by the
//! retention factor `1 - reduction_bps / 10_000`:
//!
//! - Epochs `0 .. cliff`: `emissions_per_epoch`
//! - Epochs `cliff .. 2*cliff`: `emissions_per_epoch * r`
//! - Epochs `2*cliff .. 3*cliff`: `emissions_per_epoch * r^2`
//! - …
//!
//! `r^n` is evaluated from scratch for each query with binary
//! exponentiation, so emissions for epoch `e` never depend on how many earlier
//! epochs were queried and carry no accumulated rounding drift.

use serde::{Deserialize, Serialize};

use crate::constants::{
    BPS_PRECISION, MAX_REDUCTION_BPS, MAX_REDUCTION_CLIFF, MIN_REDUCTION_CLIFF, RATIO_PRECISION,
    YEAR,
};
use crate::error::ScheduleError;
use crate::math::{bps_to_ratio, fixed_pow, mul_div};
use crate::types::{Epoch, Timestamp};

/// Immutable parameters of an emission schedule.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct EmissionParams {
    /// Start of epoch 0.
    pub start: Timestamp,
    /// Epoch length in seconds.
    pub epoch_length: u64,
    /// Emissions of every epoch before the first cliff, in base units.
    pub emissions_per_epoch: u64,
    /// Number of epochs between reductions.
    pub reduction_cliff: u64,
    /// Reduction applied at each cliff, in basis points.
    pub reduction_bps: u64,
}

impl EmissionParams {
    /// Check every bound except the start time.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.epoch_length == 0 {
            return Err(ScheduleError::ZeroEpochLength);
        }
        if !(MIN_REDUCTION_CLIFF..=MAX_REDUCTION_CLIFF).contains(&self.reduction_cliff) {
            return Err(ScheduleError::InvalidReductionCliff(self.reduction_cliff));
        }
        if self.reduction_bps > MAX_REDUCTION_BPS {
            return Err(ScheduleError::ReductionTooLarge(self.reduction_bps));
        }
        if self.emissions_per_epoch == 0 {
            return Err(ScheduleError::ZeroEmissions);
        }
        Ok(())
    }
}

/// Pure emission calculator over a fixed [`EmissionParams`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmissionScheduler {
    params: EmissionParams,
    /// `1 - reduction_bps / 10_000`, scaled by `RATIO_PRECISION`.
    retention: u128,
}

impl EmissionScheduler {
    /// Initialize a new schedule at `now`.
    ///
    /// # Errors
    ///
    /// Any [`EmissionParams::validate`] failure, or
    /// [`ScheduleError::StartInPast`] when `start < now`.
    pub fn new(params: EmissionParams, now: Timestamp) -> Result<Self, ScheduleError> {
        if params.start < now {
            return Err(ScheduleError::StartInPast {
                start: params.start,
                now,
            });
        }
        Self::from_params(params)
    }

    /// Rebuild a schedule from parameters accepted by an earlier [`new`](Self::new).
    ///
    /// Skips the start-time check, which only applies at initialization.
    pub fn from_params(params: EmissionParams) -> Result<Self, ScheduleError> {
        params.validate()?;
        let retention = bps_to_ratio(BPS_PRECISION - params.reduction_bps);
        Ok(Self { params, retention })
    }

    /// The schedule parameters.
    pub fn params(&self) -> &EmissionParams {
        &self.params
    }

    /// Retention factor per cliff, scaled by `RATIO_PRECISION`.
    pub fn retention_factor(&self) -> u128 {
        self.retention
    }

    /// Epoch containing `t`. Timestamps before `start` map to epoch 0.
    pub fn epoch_at(&self, t: Timestamp) -> Epoch {
        match t.checked_sub(self.params.start) {
            Some(elapsed) => elapsed / self.params.epoch_length,
            None => 0,
        }
    }

    /// First second of epoch `e`.
    pub fn epoch_start(&self, e: Epoch) -> Timestamp {
        self.params
            .start
            .saturating_add(e.saturating_mul(self.params.epoch_length))
    }

    /// End of epoch `e` (exclusive), i.e. the start of epoch `e + 1`.
    pub fn epoch_end(&self, e: Epoch) -> Timestamp {
        self.epoch_start(e.saturating_add(1))
    }

    /// Epoch in progress at `now`.
    pub fn current_epoch(&self, now: Timestamp) -> Epoch {
        self.epoch_at(now)
    }

    /// The most recently completed epoch at `now`, or `None` during epoch 0.
    pub fn previous_epoch(&self, now: Timestamp) -> Option<Epoch> {
        self.current_epoch(now).checked_sub(1)
    }

    /// Number of reduction cliffs passed by epoch `e`.
    pub fn cliffs_passed(&self, e: Epoch) -> u64 {
        e / self.params.reduction_cliff
    }

    /// Emissions for epoch `e` in base units.
    ///
    /// `emissions_per_epoch * retention^(e / reduction_cliff)`, floored.
    pub fn emissions_for_epoch(&self, e: Epoch) -> Result<u64, ScheduleError> {
        self.emissions_after_cliffs(self.cliffs_passed(e))
    }

    fn emissions_after_cliffs(&self, cliffs: u64) -> Result<u64, ScheduleError> {
        let factor = fixed_pow(self.retention, cliffs, RATIO_PRECISION)
            .ok_or(ScheduleError::ArithmeticOverflow)?;
        let emissions = mul_div(
            self.params.emissions_per_epoch as u128,
            factor,
            RATIO_PRECISION,
        )
        .ok_or(ScheduleError::ArithmeticOverflow)?;
        // factor <= 1.0, so the result never exceeds the u64 base amount.
        Ok(emissions as u64)
    }

    /// First epoch of the next reduction after `e`.
    ///
    /// Returns `None` if emissions are already exhausted at `e`, or if the
    /// next cliff lies beyond the last representable epoch.
    pub fn next_cliff_epoch(&self, e: Epoch) -> Result<Option<Epoch>, ScheduleError> {
        if self.emissions_for_epoch(e)? == 0 {
            return Ok(None);
        }
        let next = self
            .cliffs_passed(e)
            .checked_add(1)
            .and_then(|c| c.checked_mul(self.params.reduction_cliff));
        Ok(next)
    }

    /// Epochs remaining from `e` until the next reduction.
    pub fn epochs_until_cliff(&self, e: Epoch) -> Result<Option<u64>, ScheduleError> {
        Ok(self.next_cliff_epoch(e)?.and_then(|next| next.checked_sub(e)))
    }

    /// Total emissions of epochs `0..=e`.
    ///
    /// Walks the schedule one cliff segment at a time rather than one epoch
    /// at a time, and stops early once emissions reach zero. A schedule
    /// without reductions is summed directly.
    pub fn cumulative_emissions(&self, e: Epoch) -> Result<u128, ScheduleError> {
        if self.retention == RATIO_PRECISION {
            let epochs = e as u128 + 1;
            return Ok(self.params.emissions_per_epoch as u128 * epochs);
        }

        let cliff = self.params.reduction_cliff;
        let final_cliff = self.cliffs_passed(e);
        let mut total: u128 = 0;

        for c in 0..=final_cliff {
            let amount = self.emissions_after_cliffs(c)?;
            if amount == 0 {
                break;
            }
            let first = c * cliff;
            let last = if c == final_cliff { e } else { first + cliff - 1 };
            let epochs = (last - first + 1) as u128;
            total = total.saturating_add(amount as u128 * epochs);
        }

        Ok(total)
    }

    /// Whole epochs per 365-day year, used to annualize rewards.
    pub fn epochs_per_year(&self) -> u64 {
        YEAR / self.params.epoch_length
    }
}
