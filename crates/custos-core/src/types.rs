//! Domain types shared by the providers and chain adapters.
//!
//! Amounts at the provider façade are decimal major units; amounts on the
//! wire types mirror what the chain reports (wei as `u128`, satoshi as
//! `u64`). Conversion lives in [`crate::amount`].

use std::collections::{HashMap, HashSet};
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::keys::PrivateKey;
use crate::sequencing::SequencingLedger;

/// A custodially-held address/key pair used to aggregate deposits and fund
/// outbound payments.
///
/// Immutable once minted by the key-derivation collaborator. Balance is a
/// derived read against the chain, never stored here.
#[derive(Debug, Clone)]
pub struct ReserveWallet {
    pub address: String,
    pub private_key: PrivateKey,
}

/// A caller-supplied request for one outbound transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub id: String,
    pub to_address: String,
    /// Requested amount in major units. The network fee is deducted from
    /// this amount; the recipient receives `amount - fee`.
    pub amount: Decimal,
}

/// Reference to a transaction output: `(txid, output index)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: String,
    pub vout: u32,
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// A spendable output owned by one of the reserve wallets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub outpoint: OutPoint,
    /// Reserve address that owns this output (selects the signing key).
    pub address: String,
    /// Value in satoshi.
    pub value: u64,
    pub confirmations: u64,
}

/// Funds already earmarked by prepared-but-not-yet-confirmed payments.
///
/// Supplied by the caller on every preparation call; the provider itself
/// holds no persistent state. Account-model entries are keyed by wallet
/// address, output-model entries by outpoint.
#[derive(Debug, Clone, Default)]
pub struct PendingSpends {
    by_address: HashMap<String, Decimal>,
    by_outpoint: HashMap<OutPoint, Decimal>,
}

impl PendingSpends {
    pub fn new() -> Self {
        Self::default()
    }

    /// Earmark an amount against a wallet address (account model).
    pub fn add_for_address(&mut self, address: impl Into<String>, amount: Decimal) {
        *self.by_address.entry(address.into()).or_default() += amount;
    }

    /// Earmark an output as claimed by a still-unbroadcast batch (output model).
    pub fn add_for_outpoint(&mut self, outpoint: OutPoint, amount: Decimal) {
        self.by_outpoint.insert(outpoint, amount);
    }

    /// Committed-but-unconfirmed spend for a wallet, zero if absent.
    pub fn pending_for(&self, address: &str) -> Decimal {
        self.by_address.get(address).copied().unwrap_or_default()
    }

    pub fn is_consumed(&self, outpoint: &OutPoint) -> bool {
        self.by_outpoint.contains_key(outpoint)
    }

    /// The set of outpoints claimed by prior unbroadcast batches.
    pub fn consumed_outpoints(&self) -> HashSet<OutPoint> {
        self.by_outpoint.keys().cloned().collect()
    }
}

/// A classified inbound deposit to a reserve address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingTransaction {
    pub hash: String,
    pub from_address: String,
    pub reserve_address: String,
    /// Value received by the reserve address, in major units.
    pub amount: Decimal,
    /// Network fee paid by the sender, in major units.
    pub fee: Decimal,
    /// Chain-reported confirmation count at query time (a snapshot).
    pub confirmations: u64,
}

/// A raw account-model transaction as reported by the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTransaction {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    /// Transferred value in wei.
    pub value: u128,
    /// Gas price in wei.
    pub gas_price: u128,
    /// Call data, hex-encoded. Empty (`""` or `"0x"`) for plain transfers.
    pub input: String,
    /// Block the transaction was mined in; `None` while pending.
    pub block_number: Option<u64>,
    /// On-chain execution status.
    pub succeeded: bool,
}

/// One side entry (input or output) of a raw output-model transaction.
///
/// Explorers report the addresses of an entry as a list; a deposit is only
/// attributable when that list has exactly one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSideEntry {
    pub addresses: Vec<String>,
    /// Value in satoshi.
    pub value: u64,
}

/// A raw output-model transaction as reported by the explorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTransaction {
    pub txid: String,
    pub confirmations: u64,
    pub inputs: Vec<TxSideEntry>,
    pub outputs: Vec<TxSideEntry>,
}

/// Execution receipt for an account-model transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub block_number: Option<u64>,
    pub succeeded: bool,
}

/// One page of a paginated explorer query. Pages may overlap; consumers
/// deduplicate by transaction id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_pages: u32,
}

/// An unsigned account-model transfer, fully determined at allocation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountTransfer {
    pub from: String,
    pub to: String,
    /// Value in wei (requested amount net of fee).
    pub value: u128,
    pub gas_price: u128,
    pub gas_limit: u64,
    /// Nonce assigned at allocation; checked against the ledger at signing.
    pub nonce: u64,
}

/// A planned output of an output-model batch transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOutput {
    pub address: String,
    /// Value in satoshi.
    pub value: u64,
    /// The payment request this output satisfies; `None` for change.
    pub request_id: Option<String>,
}

/// An unsigned output-model batch: pooled inputs, one output per satisfied
/// request, plus an optional change output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub inputs: Vec<UnspentOutput>,
    pub outputs: Vec<PlannedOutput>,
    /// Batch fee in satoshi.
    pub fee: u64,
}

/// An unsigned payment produced by preparation, ready for the signing fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedPayment {
    /// The payment requests this transaction settles.
    pub request_ids: Vec<String>,
    pub kind: UnsignedKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsignedKind {
    /// Account model: one transfer per funded request.
    Transfer(AccountTransfer),
    /// Output model: one transaction settles the whole batch.
    Batch(BatchPlan),
}

/// The funding resource assigned to a satisfied request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundingSource {
    /// Account model: a single reserve wallet funds the request.
    Wallet { address: String },
    /// Output model: the request is settled by the batch's pooled inputs.
    Pooled,
}

/// A request the allocator satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundedRequest {
    pub request: PaymentRequest,
    pub source: FundingSource,
    /// Amount the recipient actually receives (requested amount net of fee),
    /// in major units.
    pub net_amount: Decimal,
}

/// Why a request could not be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// No wallet (or pooled output set) covers the requested amount.
    InsufficientFunds,
    /// The destination address failed validation.
    InvalidAddress,
    /// The network fee consumes the entire requested amount.
    FeeExceedsAmount,
}

/// A request the allocator could not satisfy, with its requested amount
/// untouched inside [`FailedRequest::request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRequest {
    pub request: PaymentRequest,
    pub reason: FailureReason,
}

/// Result of payment preparation.
///
/// Every submitted request appears in exactly one of `funded` and `failed`.
/// The ledger carries the initial sequencing state and must be threaded
/// through the signing calls in order.
#[derive(Debug)]
pub struct PaymentPlan {
    pub funded: Vec<FundedRequest>,
    pub failed: Vec<FailedRequest>,
    /// Fee in major units: per transaction (account) or per batch (output).
    pub fee: Decimal,
    pub unsigned: Vec<UnsignedPayment>,
    pub ledger: SequencingLedger,
}

/// Raw signed bytes and hash as produced by the signing collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    pub hash: String,
    /// Serialized signed transaction, hex-encoded.
    pub raw: String,
}

/// A signed transaction plus the advanced sequencing ledger.
///
/// The embedded ledger is the only valid input to the next signing call for
/// the same currency; dropping it and reusing an older ledger risks a nonce
/// collision or a double-spent output.
#[derive(Debug)]
pub struct SignedTransaction {
    pub hash: String,
    pub raw: String,
    pub ledger: SequencingLedger,
}

/// Per-currency configuration consumed, not computed, by this core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyConfig {
    pub ticker: String,
    /// Decimal places of the minor unit (18 for wei, 8 for satoshi).
    pub decimals: u32,
    /// Confirmations required before a transaction counts as final.
    pub confirmation_threshold: u64,
    /// Base derivation path; wallet index is appended per wallet.
    pub derivation_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn outpoint_display() {
        let op = OutPoint { txid: "ab12".into(), vout: 3 };
        assert_eq!(op.to_string(), "ab12:3");
    }

    #[test]
    fn pending_spends_accumulate_per_address() {
        let mut pending = PendingSpends::new();
        pending.add_for_address("w1", Decimal::from_str("1.5").unwrap());
        pending.add_for_address("w1", Decimal::from_str("0.5").unwrap());
        assert_eq!(pending.pending_for("w1"), Decimal::from(2));
        assert_eq!(pending.pending_for("w2"), Decimal::ZERO);
    }

    #[test]
    fn pending_spends_track_outpoints() {
        let mut pending = PendingSpends::new();
        let op = OutPoint { txid: "t".into(), vout: 0 };
        assert!(!pending.is_consumed(&op));
        pending.add_for_outpoint(op.clone(), Decimal::ONE);
        assert!(pending.is_consumed(&op));
        assert_eq!(pending.consumed_outpoints().len(), 1);
    }

    #[test]
    fn reserve_wallet_debug_hides_key() {
        let wallet = ReserveWallet {
            address: "0xabc".into(),
            private_key: crate::keys::PrivateKey::new("deadbeef".into()),
        };
        let debug = format!("{wallet:?}");
        assert!(debug.contains("0xabc"));
        assert!(!debug.contains("deadbeef"));
    }
}
