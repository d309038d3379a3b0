//! Payment providers for Custos.
//!
//! This crate turns the contracts in `custos-core` into working pipelines,
//! one per ledger model:
//!
//! - [`AccountProvider`] — nonce-sequenced single transfers, one reserve
//!   wallet per payment
//! - [`OutputProvider`] — pooled unspent outputs, one batch transaction per
//!   preparation
//!
//! Both implement [`custos_core::traits::PaymentProvider`], so callers treat
//! every currency uniformly. The building blocks (classification,
//! reconciliation, allocation, the signing fold) are public for callers that
//! need finer-grained control.
//!
//! Providers hold no mutable state across calls. All sequencing state moves
//! through [`custos_core::sequencing::SequencingLedger`] values; see the
//! trait docs for the caller's threading obligation.

pub mod account;
pub mod classify;
pub mod coin_selection;
pub mod output;
pub mod reconcile;
pub mod signing;
pub mod wallet_selection;

pub use account::AccountProvider;
pub use output::OutputProvider;

/// Gas consumed by a plain account-model value transfer.
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;
