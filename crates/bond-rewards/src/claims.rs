//! Record of claimed rewards.

use std::collections::HashMap;

use bond_core::types::{AccountId, Epoch};

/// `(account, epoch) → claimed amount`, plus per-epoch totals.
///
/// Entries are written once and never removed or overwritten.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClaimBook {
    claims: HashMap<(AccountId, Epoch), u64>,
    totals: HashMap<Epoch, u128>,
}

impl ClaimBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted `(account, epoch, amount)` records.
    ///
    /// Duplicate keys keep the first record.
    pub fn from_records(records: impl IntoIterator<Item = (AccountId, Epoch, u64)>) -> Self {
        let mut book = Self::new();
        for (account, epoch, amount) in records {
            book.record(account, epoch, amount);
        }
        book
    }

    /// Amount claimed by `account` for `epoch` (0 if unclaimed).
    pub fn claimed(&self, account: &AccountId, epoch: Epoch) -> u64 {
        self.claims.get(&(*account, epoch)).copied().unwrap_or(0)
    }

    /// Whether `account` has claimed `epoch`.
    pub fn is_claimed(&self, account: &AccountId, epoch: Epoch) -> bool {
        self.claims.contains_key(&(*account, epoch))
    }

    /// Sum of every claim recorded for `epoch`.
    pub fn total_claimed(&self, epoch: Epoch) -> u128 {
        self.totals.get(&epoch).copied().unwrap_or(0)
    }

    /// Record a claim. Returns `false` (and changes nothing) if the pair was
    /// already claimed.
    pub fn record(&mut self, account: AccountId, epoch: Epoch, amount: u64) -> bool {
        if self.is_claimed(&account, epoch) {
            return false;
        }
        self.claims.insert((account, epoch), amount);
        *self.totals.entry(epoch).or_default() += amount as u128;
        true
    }

    /// All records, ordered by epoch then account.
    pub fn records(&self) -> Vec<(AccountId, Epoch, u64)> {
        let mut out: Vec<_> = self
            .claims
            .iter()
            .map(|((account, epoch), amount)| (*account, *epoch, *amount))
            .collect();
        out.sort_by_key(|(account, epoch, _)| (*epoch, *account));
        out
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}
