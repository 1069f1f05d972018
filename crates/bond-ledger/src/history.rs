//! Append-only checkpoint logs.
//!
//! A [`PointLog`] holds checkpoints ordered by `(ts, seq)`: timestamps never
//! decrease and sequence numbers strictly increase. Several checkpoints may
//! share a timestamp when more than one mutation lands in the same second; the
//! one with the highest `seq` describes the state after that second.
//!
//! Historical lookups go through [`PointLog::anchor`], which is the only place
//! that relates a query time to a checkpoint time. It selects the latest
//! checkpoint with `ts <= t` and hands back the elapsed time alongside it, so
//! no caller ever subtracts a checkpoint timestamp from a query timestamp
//! itself.

use bond_core::error::LedgerError;
use bond_core::types::{Point, Timestamp};

/// A checkpoint selected for a query time, with the time elapsed since it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Anchor {
    point: Point,
    elapsed: u64,
}

impl Anchor {
    /// The selected checkpoint.
    pub fn point(&self) -> &Point {
        &self.point
    }

    /// Seconds between the checkpoint and the query time.
    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    /// Power of the checkpoint's ray at the query time.
    pub fn power(&self) -> u128 {
        self.point.power_after(self.elapsed)
    }
}

/// Ordered, append-only sequence of checkpoints.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PointLog {
    points: Vec<Point>,
}

impl PointLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Rebuild a log from stored checkpoints, verifying their order.
    ///
    /// # Errors
    ///
    /// [`LedgerError::CorruptHistory`] if timestamps decrease or sequence
    /// numbers do not strictly increase.
    pub fn from_points(points: Vec<Point>) -> Result<Self, LedgerError> {
        for pair in points.windows(2) {
            if !follows(&pair[0], &pair[1]) {
                return Err(LedgerError::CorruptHistory(format!(
                    "point (ts {}, seq {}) after (ts {}, seq {})",
                    pair[1].ts, pair[1].seq, pair[0].ts, pair[0].seq
                )));
            }
        }
        Ok(Self { points })
    }

    /// Append a checkpoint.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NonMonotonicTimestamp`] if `point.ts` precedes the last
    /// checkpoint, [`LedgerError::CorruptHistory`] if its sequence number does
    /// not advance.
    pub fn push(&mut self, point: Point) -> Result<(), LedgerError> {
        if let Some(last) = self.points.last() {
            if point.ts < last.ts {
                return Err(LedgerError::NonMonotonicTimestamp {
                    now: point.ts,
                    last: last.ts,
                });
            }
            if point.seq <= last.seq {
                return Err(LedgerError::CorruptHistory(format!(
                    "seq {} does not follow {}",
                    point.seq, last.seq
                )));
            }
        }
        self.points.push(point);
        Ok(())
    }

    /// Select the latest checkpoint with `ts <= t`.
    ///
    /// Returns `None` when `t` precedes every checkpoint (or the log is
    /// empty). O(log n).
    pub fn anchor(&self, t: Timestamp) -> Option<Anchor> {
        let idx = self.points.partition_point(|p| p.ts <= t);
        let point = *self.points.get(idx.checked_sub(1)?)?;
        // partition_point guarantees point.ts <= t.
        Some(Anchor {
            point,
            elapsed: t - point.ts,
        })
    }

    /// Timestamp of the first checkpoint.
    pub fn genesis(&self) -> Option<Timestamp> {
        self.points.first().map(|p| p.ts)
    }

    /// Most recently appended checkpoint.
    pub fn last(&self) -> Option<&Point> {
        self.points.last()
    }

    /// All checkpoints in order.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Number of checkpoints.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no checkpoint has been written.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn follows(prev: &Point, next: &Point) -> bool {
    next.ts >= prev.ts && next.seq > prev.seq
}
