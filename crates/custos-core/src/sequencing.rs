//! The sequencing ledger threaded through consecutive signing calls.
//!
//! Account-model signing is ordered by a per-wallet nonce; output-model
//! signing must never reuse an outpoint consumed by an earlier batch. Both
//! pieces of ordering state live here, as an explicit value rather than a
//! shared mutable field: every signing call consumes the ledger and returns
//! the advanced one inside the signed transaction. The type is deliberately
//! not `Clone` — duplicating the ledger is exactly the nonce-collision /
//! double-spend hazard the design rules out.

use std::collections::{HashMap, HashSet};

use crate::types::OutPoint;

/// Mutable ordering state for a signing stream.
///
/// Obtain the initial ledger from payment preparation, feed it to the first
/// signing call, and feed each call's returned ledger to the next. Signing
/// calls for the same wallet or the same pooled output set must be strictly
/// sequential; the move-only API makes skipping a returned ledger a compile
/// error rather than a runtime race.
#[must_use = "the advanced ledger must be threaded into the next signing call"]
#[derive(Debug, Default)]
pub struct SequencingLedger {
    nonces: HashMap<String, u64>,
    consumed: HashSet<OutPoint>,
}

impl SequencingLedger {
    /// Account-model ledger seeded with each wallet's pending
    /// transaction count.
    pub fn from_nonces(nonces: HashMap<String, u64>) -> Self {
        Self { nonces, consumed: HashSet::new() }
    }

    /// Output-model ledger seeded with the outpoints already claimed by
    /// prior unbroadcast batches.
    pub fn from_consumed(consumed: HashSet<OutPoint>) -> Self {
        Self { nonces: HashMap::new(), consumed }
    }

    /// Next nonce for a wallet, if the wallet is tracked.
    pub fn nonce(&self, address: &str) -> Option<u64> {
        self.nonces.get(address).copied()
    }

    /// Consume the current nonce for a wallet, incrementing it by exactly
    /// one. Returns the nonce that was consumed, or `None` for an untracked
    /// wallet.
    pub fn advance(&mut self, address: &str) -> Option<u64> {
        let slot = self.nonces.get_mut(address)?;
        let used = *slot;
        *slot += 1;
        Some(used)
    }

    pub fn is_consumed(&self, outpoint: &OutPoint) -> bool {
        self.consumed.contains(outpoint)
    }

    /// Mark an outpoint as consumed. Returns `false` if it was already
    /// consumed — the caller must treat that as a fatal stale-state signal.
    pub fn mark_consumed(&mut self, outpoint: OutPoint) -> bool {
        self.consumed.insert(outpoint)
    }

    /// Number of outpoints consumed so far.
    pub fn consumed_count(&self) -> usize {
        self.consumed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outpoint(txid: &str, vout: u32) -> OutPoint {
        OutPoint { txid: txid.into(), vout }
    }

    #[test]
    fn advance_increments_by_one() {
        let mut ledger =
            SequencingLedger::from_nonces(HashMap::from([("w1".to_string(), 7)]));
        assert_eq!(ledger.advance("w1"), Some(7));
        assert_eq!(ledger.advance("w1"), Some(8));
        assert_eq!(ledger.advance("w1"), Some(9));
        assert_eq!(ledger.nonce("w1"), Some(10));
    }

    #[test]
    fn advance_unknown_wallet() {
        let mut ledger = SequencingLedger::from_nonces(HashMap::new());
        assert_eq!(ledger.advance("w1"), None);
    }

    #[test]
    fn wallets_advance_independently() {
        let mut ledger = SequencingLedger::from_nonces(HashMap::from([
            ("w1".to_string(), 0),
            ("w2".to_string(), 100),
        ]));
        assert_eq!(ledger.advance("w1"), Some(0));
        assert_eq!(ledger.advance("w2"), Some(100));
        assert_eq!(ledger.nonce("w1"), Some(1));
        assert_eq!(ledger.nonce("w2"), Some(101));
    }

    #[test]
    fn mark_consumed_rejects_reuse() {
        let mut ledger = SequencingLedger::from_consumed(HashSet::new());
        assert!(ledger.mark_consumed(outpoint("t1", 0)));
        assert!(!ledger.mark_consumed(outpoint("t1", 0)));
        assert!(ledger.is_consumed(&outpoint("t1", 0)));
        assert!(!ledger.is_consumed(&outpoint("t1", 1)));
    }

    #[test]
    fn seeded_consumed_set_is_respected() {
        let seed = HashSet::from([outpoint("prior", 2)]);
        let ledger = SequencingLedger::from_consumed(seed);
        assert!(ledger.is_consumed(&outpoint("prior", 2)));
        assert_eq!(ledger.consumed_count(), 1);
    }
}
