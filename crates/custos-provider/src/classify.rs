//! Deposit classification: filtering raw chain transactions into confirmed
//! inbound deposits to reserve addresses.
//!
//! Each rule is a named predicate with its own unit test rather than an
//! inline filter chain. Both classifiers deduplicate by transaction id,
//! since paginated chain APIs may return overlapping pages.

use std::collections::HashSet;

use custos_core::amount::from_minor_units;
use custos_core::error::ProviderError;
use custos_core::types::{AccountTransaction, IncomingTransaction, OutputTransaction};

use crate::TRANSFER_GAS_LIMIT;

// --- Account-model predicates ---

/// A deposit must be a plain value transfer: no call data.
pub fn is_plain_transfer(tx: &AccountTransaction) -> bool {
    tx.input.is_empty() || tx.input == "0x"
}

/// Self-transfers (internal sweeps) are not deposits.
pub fn is_external_sender(sender: &str, reserve: &str) -> bool {
    !sender.eq_ignore_ascii_case(reserve)
}

/// The recipient must be the reserve address, case-normalized.
pub fn pays_reserve(tx: &AccountTransaction, reserve: &str) -> bool {
    tx.to
        .as_deref()
        .is_some_and(|to| to.eq_ignore_ascii_case(reserve))
}

/// Classify raw account-model transactions as deposits to `reserve`.
///
/// Confirmation counts are a snapshot computed against `chain_height` at
/// query time. Pending (unmined) and failed transactions never qualify.
pub fn classify_account(
    reserve: &str,
    transactions: &[AccountTransaction],
    chain_height: u64,
    decimals: u32,
) -> Result<Vec<IncomingTransaction>, ProviderError> {
    let mut seen = HashSet::new();
    let mut deposits = Vec::new();
    for tx in transactions {
        if !seen.insert(tx.hash.to_ascii_lowercase()) {
            continue;
        }
        let Some(block_number) = tx.block_number else {
            continue;
        };
        if !tx.succeeded
            || !is_plain_transfer(tx)
            || !pays_reserve(tx, reserve)
            || !is_external_sender(&tx.from, reserve)
        {
            continue;
        }
        let fee_wei = tx.gas_price.saturating_mul(TRANSFER_GAS_LIMIT as u128);
        deposits.push(IncomingTransaction {
            hash: tx.hash.clone(),
            from_address: tx.from.clone(),
            reserve_address: reserve.to_string(),
            amount: from_minor_units(tx.value, decimals)?,
            fee: from_minor_units(fee_wei, decimals)?,
            confirmations: chain_height.saturating_sub(block_number) + 1,
        });
    }
    Ok(deposits)
}

// --- Output-model predicates ---

/// The single distinct sending address of a transaction, if exactly one
/// input address is identifiable.
pub fn single_sender(tx: &OutputTransaction) -> Option<&str> {
    let mut distinct: HashSet<&str> = HashSet::new();
    for input in &tx.inputs {
        for address in &input.addresses {
            distinct.insert(address.as_str());
        }
    }
    if distinct.len() == 1 {
        distinct.into_iter().next()
    } else {
        None
    }
}

/// Every output must name exactly one address; value in an output carrying
/// several addresses cannot be attributed unambiguously.
pub fn outputs_unambiguous(tx: &OutputTransaction) -> bool {
    tx.outputs.iter().all(|out| out.addresses.len() == 1)
}

/// Total value, in satoshi, a transaction pays to an address.
pub fn value_paid_to(tx: &OutputTransaction, address: &str) -> u64 {
    tx.outputs
        .iter()
        .filter(|out| out.addresses.len() == 1 && out.addresses[0] == address)
        .map(|out| out.value)
        .sum()
}

/// Network fee actually paid by the sender: inputs minus outputs.
pub fn network_fee(tx: &OutputTransaction) -> u64 {
    let inputs: u64 = tx.inputs.iter().map(|i| i.value).sum();
    let outputs: u64 = tx.outputs.iter().map(|o| o.value).sum();
    inputs.saturating_sub(outputs)
}

/// Classify raw output-model transactions as deposits to `reserve`.
pub fn classify_output(
    reserve: &str,
    transactions: &[OutputTransaction],
    decimals: u32,
) -> Result<Vec<IncomingTransaction>, ProviderError> {
    let mut seen = HashSet::new();
    let mut deposits = Vec::new();
    for tx in transactions {
        if !seen.insert(tx.txid.clone()) {
            continue;
        }
        let Some(sender) = single_sender(tx) else {
            continue;
        };
        if sender == reserve || !outputs_unambiguous(tx) {
            continue;
        }
        let amount = value_paid_to(tx, reserve);
        if amount == 0 {
            continue;
        }
        deposits.push(IncomingTransaction {
            hash: tx.txid.clone(),
            from_address: sender.to_string(),
            reserve_address: reserve.to_string(),
            amount: from_minor_units(amount as u128, decimals)?,
            fee: from_minor_units(network_fee(tx) as u128, decimals)?,
            confirmations: tx.confirmations,
        });
    }
    Ok(deposits)
}
