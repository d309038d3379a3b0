//! Error types shared across the Custos crates.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors from a chain client (node RPC or explorer REST).
///
/// Transport failures and empty/null result sets are retryable from the
/// caller's perspective; the core never retries on its own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("http transport: {0}")] Http(String),
    #[error("rpc error {code}: {message}")] Rpc { code: i64, message: String },
    #[error("invalid response: {0}")] InvalidResponse(String),
    #[error("empty result for {0}")] EmptyResult(String),
}

/// Errors converting between major and minor currency units.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("unsupported precision: {0} decimal places")] UnsupportedPrecision(u32),
    #[error("negative amount: {0}")] NegativeAmount(Decimal),
    #[error("amount out of range: {0}")] OutOfRange(String),
}

/// Errors from the external key-derivation collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid derivation path: {0}")] InvalidPath(String),
    #[error("derivation failed: {0}")] Failed(String),
}

/// Errors from the external transaction-signing collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("invalid private key")] InvalidKey,
    #[error("signing failed: {0}")] Failed(String),
}

/// Errors surfaced by a [`PaymentProvider`](crate::traits::PaymentProvider).
///
/// Insufficient funds for an individual request is not an error: the
/// request lands in the failed list of the returned plan instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    /// The caller's bookkeeping claims more committed than exists on chain.
    /// Reported distinctly from ordinary insufficient funds since clamping
    /// would hide double-spend risk.
    #[error("inconsistent pending spend for {address}: pending {pending} exceeds confirmed {confirmed}")]
    InconsistentPendingSpend {
        address: String,
        confirmed: Decimal,
        pending: Decimal,
    },

    /// A signing call was issued with sequencing state that no longer
    /// matches the unsigned transaction. Fatal for that transaction;
    /// retrying with the same state would repeat the collision.
    #[error("stale sequencing state: {0}")]
    StaleSequencing(String),

    #[error("unknown wallet: {0}")]
    UnknownWallet(String),

    /// An unsigned payment of the other ledger model was handed to this
    /// provider.
    #[error("unsigned payment kind does not match this provider's ledger model")]
    MismatchedPaymentKind,

    #[error("no payment requests supplied")]
    EmptyBatch,
}
