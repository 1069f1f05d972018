//! Sparse schedule of future slope decrements.
//!
//! Maps an expiry timestamp to the total slope of all locks ending there.
//! Walking the entries between two instants is how the aggregate curve is
//! projected forward without iterating accounts.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included};

use bond_core::types::Timestamp;

/// Expiry timestamp → net slope decrement, scaled like `Point::slope`.
///
/// Zero entries are never stored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlopeSchedule {
    changes: BTreeMap<Timestamp, u128>,
}

impl SlopeSchedule {
    /// Create an empty schedule.
    pub fn new() -> Self {
        Self {
            changes: BTreeMap::new(),
        }
    }

    /// Decrement scheduled at exactly `ts` (0 if none).
    pub fn get(&self, ts: Timestamp) -> u128 {
        self.changes.get(&ts).copied().unwrap_or(0)
    }

    /// Overwrite the decrement at `ts`. A zero value removes the entry.
    pub fn set(&mut self, ts: Timestamp, value: u128) {
        if value == 0 {
            self.changes.remove(&ts);
        } else {
            self.changes.insert(ts, value);
        }
    }

    /// Entries with `after < ts <= through`, in ascending order.
    pub fn between(
        &self,
        after: Timestamp,
        through: Timestamp,
    ) -> impl Iterator<Item = (Timestamp, u128)> + '_ {
        (after < through)
            .then(|| self.changes.range((Excluded(after), Included(through))))
            .into_iter()
            .flatten()
            .map(|(ts, slope)| (*ts, *slope))
    }

    /// Sum of decrements still pending strictly after `now`.
    pub fn pending_after(&self, now: Timestamp) -> u128 {
        self.changes
            .range((Excluded(now), std::ops::Bound::Unbounded))
            .fold(0u128, |acc, (_, s)| acc.saturating_add(*s))
    }

    /// All entries in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, u128)> + '_ {
        self.changes.iter().map(|(ts, slope)| (*ts, *slope))
    }

    /// Number of scheduled expiries.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl FromIterator<(Timestamp, u128)> for SlopeSchedule {
    fn from_iter<I: IntoIterator<Item = (Timestamp, u128)>>(iter: I) -> Self {
        let mut schedule = Self::new();
        for (ts, slope) in iter {
            schedule.set(ts, slope);
        }
        schedule
    }
}
