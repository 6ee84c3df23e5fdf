use std::collections::HashMap;

use piclaim_core::Address;

/// Highest sequence number each account has consumed through this process.
///
/// A ledger view that reports an older sequence is lagging; building on it
/// would produce a transaction the ledger rejects with `tx_bad_seq`.
#[derive(Debug, Default)]
pub struct SequenceGuard {
    consumed: HashMap<Address, i64>,
}

impl SequenceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sequence consumed by an accepted transaction
    pub fn record(&mut self, account: &Address, sequence: i64) {
        let entry = self.consumed.entry(*account).or_insert(sequence);
        if sequence > *entry {
            *entry = sequence;
        }
    }

    pub fn consumed(&self, account: &Address) -> Option<i64> {
        self.consumed.get(account).copied()
    }

    /// `Err(consumed)` when `fetched` is behind what was already consumed
    pub fn check(&self, account: &Address, fetched: i64) -> Result<(), i64> {
        match self.consumed(account) {
            Some(consumed) if fetched < consumed => Err(consumed),
            _ => Ok(()),
        }
    }
}
