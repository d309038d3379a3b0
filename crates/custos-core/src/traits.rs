//! Trait contracts between the Custos crates and their collaborators.
//!
//! - [`AccountChainClient`] / [`OutputChainClient`] — node/explorer access
//!   (custos-chain implements)
//! - [`TransactionSigner`] — elliptic-curve signing (external collaborator)
//! - [`AddressValidator`] — address-format validation (external collaborator)
//! - [`PaymentProvider`] — the uniform per-currency capability set
//!   (custos-provider implements, once per ledger model)

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::{ChainError, ProviderError, SignerError};
use crate::keys::{PrivateKey, Seed};
use crate::sequencing::SequencingLedger;
use crate::types::{
    AccountTransaction, AccountTransfer, BatchPlan, CurrencyConfig, IncomingTransaction,
    OutputTransaction, Page, PaymentPlan, PaymentRequest, PendingSpends, ReserveWallet,
    SignedPayload, SignedTransaction, TransactionReceipt, UnsignedPayment, UnspentOutput,
};

/// Node access for an account-model chain (RPC-style).
///
/// Amounts are in wei. Transport-level timeouts and retries belong to the
/// implementation; the core treats every error as a retryable I/O failure
/// and never retries on its own.
#[async_trait]
pub trait AccountChainClient: Send + Sync {
    /// Confirmed balance of an address.
    async fn balance(&self, address: &str) -> Result<u128, ChainError>;

    /// Confirmed balances for several addresses.
    ///
    /// Default implementation queries one by one; implementations are
    /// expected to override with a batched request (one round trip).
    async fn balances(&self, addresses: &[String]) -> Result<Vec<u128>, ChainError> {
        let mut out = Vec::with_capacity(addresses.len());
        for address in addresses {
            out.push(self.balance(address).await?);
        }
        Ok(out)
    }

    /// Balance including pending transactions.
    async fn pending_balance(&self, address: &str) -> Result<u128, ChainError>;

    /// Execution receipt by transaction hash; `None` if unknown.
    async fn transaction_receipt(
        &self,
        hash: &str,
    ) -> Result<Option<TransactionReceipt>, ChainError>;

    /// Current chain height.
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// Current gas price in wei.
    async fn gas_price(&self) -> Result<u128, ChainError>;

    /// Pending transaction count of an address — the next usable nonce.
    async fn transaction_count(&self, address: &str) -> Result<u64, ChainError>;

    /// Transaction history touching an address, for deposit classification.
    async fn transactions_by_address(
        &self,
        address: &str,
    ) -> Result<Vec<AccountTransaction>, ChainError>;

    /// Broadcast a raw signed transaction; returns its hash.
    async fn send_raw_transaction(&self, raw: &str) -> Result<String, ChainError>;
}

/// Explorer access for an output-model chain (REST-style).
///
/// Amounts are in satoshi.
#[async_trait]
pub trait OutputChainClient: Send + Sync {
    /// Unspent outputs held by an address.
    async fn unspent_outputs(&self, address: &str) -> Result<Vec<UnspentOutput>, ChainError>;

    /// Fee-rate estimate in satoshi per byte for confirmation within
    /// `target_blocks` blocks, floored at 2.
    async fn fee_rate(&self, target_blocks: u16) -> Result<u64, ChainError>;

    /// One page of the transaction history touching an address. Pages may
    /// overlap; callers deduplicate by txid.
    async fn transactions_by_address(
        &self,
        address: &str,
        page: u32,
    ) -> Result<Page<OutputTransaction>, ChainError>;

    /// Full transaction detail by id, including per-input/output addresses
    /// and the confirmation count.
    async fn transaction_by_id(&self, txid: &str) -> Result<OutputTransaction, ChainError>;

    /// Broadcast a raw signed transaction hex; returns its txid.
    async fn send_raw_transaction(&self, hex: &str) -> Result<String, ChainError>;
}

/// Elliptic-curve signing, delegated to an external collaborator.
///
/// The sequencing decisions (which nonce, which inputs) are made before
/// these calls; implementations only apply key material to a fully
/// determined transaction.
pub trait TransactionSigner: Send + Sync {
    /// Sign a single account-model transfer.
    fn sign_transfer(
        &self,
        key: &PrivateKey,
        transfer: &AccountTransfer,
    ) -> Result<SignedPayload, SignerError>;

    /// Sign an output-model batch: each input is signed individually, in
    /// input order, with the key of the reserve wallet owning it.
    fn sign_batch(
        &self,
        wallets: &[ReserveWallet],
        batch: &BatchPlan,
    ) -> Result<SignedPayload, SignerError>;
}

/// Address-format validation for a currency.
///
/// Checksum and encoding rules live in external libraries; this core only
/// consumes the verdict. Invalid addresses never raise — validation returns
/// `false` and allocation reports the request as failed.
pub trait AddressValidator: Send + Sync {
    fn is_valid(&self, address: &str) -> bool;
}

/// Account-model address shape: `0x` followed by 40 hex digits.
pub struct HexAddressValidator;

impl AddressValidator for HexAddressValidator {
    fn is_valid(&self, address: &str) -> bool {
        let Some(hex) = address.strip_prefix("0x") else {
            return false;
        };
        hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

/// The uniform per-currency contract, regardless of ledger model.
///
/// Implementations hold no mutable state across calls: all sequencing state
/// is explicit input/output, so the pipeline is safe to run in parallel
/// across currencies or wallets. Within one wallet's signing stream the
/// caller must execute calls strictly sequentially, threading each returned
/// ledger into the next call — this is a caller obligation, not a library
/// lock, because the provider has no persistent process to lock in.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn config(&self) -> &CurrencyConfig;

    /// `false` rather than an error for malformed addresses.
    fn is_valid_address(&self, address: &str) -> bool;

    /// Mint a reserve wallet at the given derivation index.
    fn generate_wallet(&self, seed: &Seed, index: u32) -> Result<ReserveWallet, ProviderError>;

    /// Confirmed on-chain balance in major units.
    async fn get_balance(&self, address: &str) -> Result<Decimal, ProviderError>;

    /// Whether a transaction has reached the currency's confirmation
    /// threshold (and, for the account model, executed successfully).
    /// The threshold boundary itself counts as confirmed.
    async fn is_confirmed_transaction(&self, hash: &str) -> Result<bool, ProviderError>;

    /// Classified inbound deposits to one reserve address.
    async fn get_received_transactions(
        &self,
        reserve_address: &str,
    ) -> Result<Vec<IncomingTransaction>, ProviderError>;

    /// Classified inbound deposits across the reserve pool.
    async fn get_received_reserves_transactions(
        &self,
        reserve_addresses: &[String],
    ) -> Result<Vec<IncomingTransaction>, ProviderError>;

    /// Reconcile balances, allocate requests to funding resources, and
    /// return the unsigned payments plus the initial sequencing ledger.
    async fn prepare_payment(
        &self,
        wallets: &[ReserveWallet],
        requests: &[PaymentRequest],
        pending: &PendingSpends,
    ) -> Result<PaymentPlan, ProviderError>;

    /// Sign one prepared payment, consuming the ledger and returning the
    /// advanced one inside the signed transaction.
    fn sign_transaction(
        &self,
        wallets: &[ReserveWallet],
        unsigned: &UnsignedPayment,
        ledger: SequencingLedger,
    ) -> Result<SignedTransaction, ProviderError>;

    /// Broadcast a signed transaction; fire-and-forget, returns the hash.
    /// Confirmation tracking is polled later via
    /// [`is_confirmed_transaction`](Self::is_confirmed_transaction).
    async fn send_signed_transaction(&self, raw: &str) -> Result<String, ProviderError>;
}
