//! # custos-core
//! Foundation types and trait contracts for the Custos payment core.
//!
//! # Modules
//!
//! - [`amount`] — exact major/minor unit conversion
//! - [`error`] — error enums shared across crates
//! - [`keys`] — seed and private-key handling, key-derivation contract
//! - [`sequencing`] — the move-only sequencing ledger
//! - [`traits`] — chain-client, signer, validator, and provider contracts
//! - [`types`] — domain and wire types

pub mod amount;
pub mod error;
pub mod keys;
pub mod sequencing;
pub mod traits;
pub mod types;

// Re-exports for convenient access
pub use amount::{from_minor_units, to_minor_units, MAX_DECIMALS};
pub use error::{AmountError, ChainError, KeyError, ProviderError, SignerError};
pub use keys::{KeyDerivation, PrivateKey, Seed};
pub use sequencing::SequencingLedger;
pub use traits::{
    AccountChainClient, AddressValidator, HexAddressValidator, OutputChainClient,
    PaymentProvider, TransactionSigner,
};
pub use types::{
    AccountTransaction, AccountTransfer, BatchPlan, CurrencyConfig, FailedRequest,
    FailureReason, FundedRequest, FundingSource, IncomingTransaction, OutPoint,
    OutputTransaction, Page, PaymentPlan, PaymentRequest, PendingSpends, PlannedOutput,
    ReserveWallet, SignedPayload, SignedTransaction, TransactionReceipt, TxSideEntry,
    UnsignedKind, UnsignedPayment, UnspentOutput,
};
