//! # custos-chain
//! Chain-client adapters for the Custos payment core.
//!
//! Two transport shapes, matching the two ledger models:
//!
//! - [`AccountRpcClient`] — JSON-RPC 2.0 node access for account-model
//!   chains, with batched balance queries and an explorer history endpoint.
//! - [`OutputRestClient`] — insight-style REST explorer access for
//!   output-model chains.
//!
//! Both implement the client traits from `custos-core`; the providers never
//! see the transport.

pub mod account;
pub mod output;

pub use account::AccountRpcClient;
pub use output::{OutputRestClient, MIN_FEE_RATE};
