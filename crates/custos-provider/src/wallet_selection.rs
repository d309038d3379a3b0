//! Account-model allocation: one reserve wallet funds one payment.
//!
//! First-fit in caller-supplied wallet order, requests processed in
//! caller-supplied order, so the outcome is deterministic given both
//! orderings. A request is never split across wallets and never partially
//! funded. The network fee is subtracted from the transferred amount, not
//! added on top: the wallet is debited the requested amount and the
//! recipient receives `amount - fee`.

use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use custos_core::amount::to_minor_units;
use custos_core::error::ProviderError;
use custos_core::traits::AddressValidator;
use custos_core::types::{
    AccountTransfer, FailedRequest, FailureReason, FundedRequest, FundingSource,
    PaymentRequest,
};

use crate::TRANSFER_GAS_LIMIT;

/// One wallet's reconciled spendable balance, in major units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletFunds {
    pub address: String,
    pub spendable: Decimal,
}

/// Outcome of account-model allocation. `transfers` aligns with `funded`.
#[derive(Debug)]
pub struct AccountAllocation {
    pub funded: Vec<FundedRequest>,
    pub failed: Vec<FailedRequest>,
    pub transfers: Vec<AccountTransfer>,
}

/// Assign each payment request to the first wallet, in caller order, whose
/// remaining spendable balance covers the requested amount.
///
/// `nonces` must hold the pre-fetched pending transaction count for every
/// wallet; successive requests funded by the same wallet receive successive
/// nonces starting there.
pub fn allocate(
    wallets: &[WalletFunds],
    requests: &[PaymentRequest],
    fee: Decimal,
    gas_price: u128,
    nonces: &HashMap<String, u64>,
    validator: &dyn AddressValidator,
    decimals: u32,
) -> Result<AccountAllocation, ProviderError> {
    let mut remaining: Vec<Decimal> = wallets.iter().map(|w| w.spendable).collect();
    let mut assigned: HashMap<&str, u64> = HashMap::new();

    let mut funded = Vec::new();
    let mut failed = Vec::new();
    let mut transfers = Vec::new();

    for request in requests {
        if !validator.is_valid(&request.to_address) {
            warn!(request_id = %request.id, "invalid destination address");
            failed.push(FailedRequest {
                request: request.clone(),
                reason: FailureReason::InvalidAddress,
            });
            continue;
        }
        let net = request.amount - fee;
        if net <= Decimal::ZERO {
            warn!(request_id = %request.id, %fee, "fee consumes requested amount");
            failed.push(FailedRequest {
                request: request.clone(),
                reason: FailureReason::FeeExceedsAmount,
            });
            continue;
        }

        let Some(slot) = remaining.iter().position(|r| *r >= request.amount) else {
            debug!(request_id = %request.id, amount = %request.amount, "no wallet covers request");
            failed.push(FailedRequest {
                request: request.clone(),
                reason: FailureReason::InsufficientFunds,
            });
            continue;
        };

        let wallet = &wallets[slot];
        remaining[slot] -= request.amount;

        let offset = assigned.entry(wallet.address.as_str()).or_insert(0);
        let base = nonces
            .get(&wallet.address)
            .copied()
            .ok_or_else(|| ProviderError::UnknownWallet(wallet.address.clone()))?;
        let nonce = base + *offset;
        *offset += 1;

        debug!(
            request_id = %request.id,
            wallet = %wallet.address,
            nonce,
            remaining = %remaining[slot],
            "funded payment request"
        );
        transfers.push(AccountTransfer {
            from: wallet.address.clone(),
            to: request.to_address.clone(),
            value: to_minor_units(net, decimals)?,
            gas_price,
            gas_limit: TRANSFER_GAS_LIMIT,
            nonce,
        });
        funded.push(FundedRequest {
            request: request.clone(),
            source: FundingSource::Wallet { address: wallet.address.clone() },
            net_amount: net,
        });
    }

    Ok(AccountAllocation { funded, failed, transfers })
}
