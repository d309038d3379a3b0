//! Output-model allocation: pooled inputs fund one batch transaction.
//!
//! Candidate outputs must be confirmed and not claimed by a prior
//! unbroadcast batch. Requests are processed smallest-first — a deliberate,
//! deterministic tie-break, not an optimal coin-selection algorithm. The
//! batch is funded all-or-nothing: if the pooled outputs cannot cover every
//! requested amount plus the batch fee, every request fails together. The
//! fee is computed once from the estimated fee rate and a fixed size model,
//! deducted evenly from the recipient outputs, and leftover value returns to
//! a reserve address as a single change output.

use std::collections::HashSet;

use tracing::{debug, warn};

use custos_core::amount::{from_minor_units, to_minor_units};
use custos_core::error::{AmountError, ProviderError};
use custos_core::traits::AddressValidator;
use custos_core::types::{
    BatchPlan, FailedRequest, FailureReason, FundedRequest, FundingSource, OutPoint,
    PaymentRequest, PlannedOutput, UnspentOutput,
};

/// Fixed transaction size model, in bytes.
pub const TX_OVERHEAD_BYTES: u64 = 10;
pub const INPUT_BYTES: u64 = 148;
pub const OUTPUT_BYTES: u64 = 34;

/// Estimated serialized size of a transaction with the given shape.
pub fn estimate_tx_size(inputs: usize, outputs: usize) -> u64 {
    TX_OVERHEAD_BYTES + INPUT_BYTES * inputs as u64 + OUTPUT_BYTES * outputs as u64
}

/// Whether an output may fund this batch: confirmed and not already claimed.
pub fn is_eligible(utxo: &UnspentOutput, consumed: &HashSet<OutPoint>) -> bool {
    utxo.confirmations > 0 && !consumed.contains(&utxo.outpoint)
}

/// Outcome of output-model allocation. `batch` is `None` when nothing was
/// funded.
#[derive(Debug)]
pub struct BatchAllocation {
    pub funded: Vec<FundedRequest>,
    pub failed: Vec<FailedRequest>,
    pub batch: Option<BatchPlan>,
    /// Batch fee in satoshi; zero when nothing was funded.
    pub fee: u64,
}

/// A request with its amount converted to satoshi.
#[derive(Debug, Clone)]
struct SatsRequest {
    request: PaymentRequest,
    sats: u64,
}

fn to_sats(request: &PaymentRequest, decimals: u32) -> Result<u64, ProviderError> {
    let wide = to_minor_units(request.amount, decimals)?;
    u64::try_from(wide)
        .map_err(|_| AmountError::OutOfRange(request.amount.to_string()).into())
}

/// Accumulate eligible outputs, in caller order, until they cover the target
/// plus the fee implied by the selection's own size. Returns the selection
/// and the final fee, or `None` when the pool is exhausted short.
fn select_inputs(
    candidates: &[&UnspentOutput],
    target: u64,
    fee_rate: u64,
    output_count: usize,
) -> Option<(Vec<UnspentOutput>, u64)> {
    let mut selected: Vec<UnspentOutput> = Vec::new();
    let mut total: u64 = 0;
    for candidate in candidates {
        selected.push((*candidate).clone());
        total = total.saturating_add(candidate.value);
        let fee = fee_rate * estimate_tx_size(selected.len(), output_count);
        if total >= target.saturating_add(fee) {
            return Some((selected, fee));
        }
    }
    None
}

/// Allocate payment requests against the pooled unspent outputs of all
/// reserve wallets.
pub fn allocate(
    utxos: &[UnspentOutput],
    requests: &[PaymentRequest],
    fee_rate: u64,
    consumed: &HashSet<OutPoint>,
    validator: &dyn AddressValidator,
    decimals: u32,
) -> Result<BatchAllocation, ProviderError> {
    let mut failed = Vec::new();
    let mut active: Vec<SatsRequest> = Vec::new();
    for request in requests {
        if !validator.is_valid(&request.to_address) {
            warn!(request_id = %request.id, "invalid destination address");
            failed.push(FailedRequest {
                request: request.clone(),
                reason: FailureReason::InvalidAddress,
            });
            continue;
        }
        let sats = to_sats(request, decimals)?;
        if sats == 0 {
            failed.push(FailedRequest {
                request: request.clone(),
                reason: FailureReason::FeeExceedsAmount,
            });
            continue;
        }
        active.push(SatsRequest { request: request.clone(), sats });
    }

    // Smallest-first processing order; stable, so equal amounts keep the
    // caller's relative order.
    active.sort_by_key(|r| r.sats);

    let candidates: Vec<&UnspentOutput> =
        utxos.iter().filter(|u| is_eligible(u, consumed)).collect();

    // Requests whose amount cannot carry their fee share drop out, which
    // shrinks the batch and changes the fee; re-run until the set is stable.
    let (selected, fee) = loop {
        if active.is_empty() {
            return Ok(BatchAllocation { funded: Vec::new(), failed, batch: None, fee: 0 });
        }
        let target: u64 = active.iter().map(|r| r.sats).sum();
        let Some((selected, fee)) = select_inputs(
            &candidates,
            target,
            fee_rate,
            active.len() + 1, // one output per request plus change
        ) else {
            debug!(target, "pooled outputs cannot cover batch; failing all requests");
            failed.extend(active.into_iter().map(|r| FailedRequest {
                request: r.request,
                reason: FailureReason::InsufficientFunds,
            }));
            return Ok(BatchAllocation { funded: Vec::new(), failed, batch: None, fee: 0 });
        };
        let share = fee / active.len() as u64;
        let (kept, dropped): (Vec<_>, Vec<_>) =
            active.into_iter().partition(|r| r.sats > share);
        if dropped.is_empty() {
            active = kept;
            break (selected, fee);
        }
        failed.extend(dropped.into_iter().map(|r| FailedRequest {
            request: r.request,
            reason: FailureReason::FeeExceedsAmount,
        }));
        active = kept;
    };

    let count = active.len() as u64;
    let target: u64 = active.iter().map(|r| r.sats).sum();
    let total_in: u64 = selected.iter().map(|u| u.value).sum();
    let share = fee / count;
    let remainder = fee - share * count;

    let mut outputs = Vec::with_capacity(active.len() + 1);
    let mut funded = Vec::with_capacity(active.len());
    for entry in &active {
        let net_sats = entry.sats - share;
        outputs.push(PlannedOutput {
            address: entry.request.to_address.clone(),
            value: net_sats,
            request_id: Some(entry.request.id.clone()),
        });
        funded.push(FundedRequest {
            request: entry.request.clone(),
            source: FundingSource::Pooled,
            net_amount: from_minor_units(net_sats as u128, decimals)?,
        });
    }

    // Leftover value (including the fee-split remainder) returns to the
    // reserve address owning the first selected input.
    let change = total_in - target - remainder;
    if change > 0 {
        outputs.push(PlannedOutput {
            address: selected[0].address.clone(),
            value: change,
            request_id: None,
        });
    }

    debug!(
        inputs = selected.len(),
        outputs = outputs.len(),
        fee,
        change,
        "allocated batch"
    );
    Ok(BatchAllocation {
        funded,
        failed,
        batch: Some(BatchPlan { inputs: selected, outputs, fee }),
        fee,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    struct AcceptAll;
    impl AddressValidator for AcceptAll {
        fn is_valid(&self, _: &str) -> bool {
            true
        }
    }

    struct RejectPrefix(&'static str);
    impl AddressValidator for RejectPrefix {
        fn is_valid(&self, address: &str) -> bool {
            !address.starts_with(self.0)
        }
    }

    fn utxo(txid: &str, vout: u32, address: &str, value: u64) -> UnspentOutput {
        UnspentOutput {
            outpoint: OutPoint { txid: txid.into(), vout },
            address: address.into(),
            value,
            confirmations: 6,
        }
    }

    fn request(id: &str, sats: u64) -> PaymentRequest {
        PaymentRequest {
            id: id.into(),
            to_address: format!("dest-{id}"),
            // 8-decimal currency: sats -> major units.
            amount: Decimal::new(sats as i64, 8),
        }
    }

    fn no_consumed() -> HashSet<OutPoint> {
        HashSet::new()
    }

    #[test]
    fn size_model() {
        assert_eq!(estimate_tx_size(1, 2), 10 + 148 + 68);
        assert_eq!(estimate_tx_size(3, 4), 10 + 444 + 136);
    }

    #[test]
    fn requests_processed_smallest_first() {
        let utxos = vec![utxo("t1", 0, "r1", 100_000_000)];
        let requests = vec![request("X", 5_000_000), request("Y", 2_000_000)];
        let allocation =
            allocate(&utxos, &requests, 10, &no_consumed(), &AcceptAll, 8).unwrap();

        let funded_ids: Vec<&str> =
            allocation.funded.iter().map(|f| f.request.id.as_str()).collect();
        assert_eq!(funded_ids, vec!["Y", "X"]);
        let batch = allocation.batch.unwrap();
        assert_eq!(batch.outputs[0].request_id.as_deref(), Some("Y"));
        assert_eq!(batch.outputs[1].request_id.as_deref(), Some("X"));
    }

    #[test]
    fn batch_fails_together_on_shortfall() {
        let utxos = vec![utxo("t1", 0, "r1", 4_000_000)];
        let requests = vec![request("A", 1_000_000), request("B", 5_000_000)];
        let allocation =
            allocate(&utxos, &requests, 10, &no_consumed(), &AcceptAll, 8).unwrap();

        assert!(allocation.funded.is_empty());
        assert!(allocation.batch.is_none());
        assert_eq!(allocation.fee, 0);
        assert_eq!(allocation.failed.len(), 2);
        assert!(allocation
            .failed
            .iter()
            .all(|f| f.reason == FailureReason::InsufficientFunds));
    }

    #[test]
    fn unconfirmed_outputs_are_ineligible() {
        let mut fresh = utxo("t1", 0, "r1", 100_000_000);
        fresh.confirmations = 0;
        let requests = vec![request("A", 1_000_000)];
        let allocation =
            allocate(&[fresh], &requests, 10, &no_consumed(), &AcceptAll, 8).unwrap();
        assert!(allocation.batch.is_none());
        assert_eq!(allocation.failed[0].reason, FailureReason::InsufficientFunds);
    }

    #[test]
    fn consumed_outputs_are_ineligible() {
        let spent = utxo("t1", 0, "r1", 100_000_000);
        let consumed = HashSet::from([spent.outpoint.clone()]);
        let requests = vec![request("A", 1_000_000)];
        let allocation = allocate(&[spent], &requests, 10, &consumed, &AcceptAll, 8).unwrap();
        assert!(allocation.batch.is_none());
    }

    #[test]
    fn value_is_conserved() {
        let utxos = vec![
            utxo("t1", 0, "r1", 3_000_000),
            utxo("t2", 1, "r2", 4_000_000),
        ];
        let requests = vec![request("A", 2_500_000), request("B", 3_000_000)];
        let allocation =
            allocate(&utxos, &requests, 10, &no_consumed(), &AcceptAll, 8).unwrap();

        let batch = allocation.batch.unwrap();
        let total_in: u64 = batch.inputs.iter().map(|u| u.value).sum();
        let total_out: u64 = batch.outputs.iter().map(|o| o.value).sum();
        assert_eq!(total_in, total_out + batch.fee);
    }

    #[test]
    fn change_returns_to_reserve_address() {
        let utxos = vec![utxo("t1", 0, "reserve-1", 100_000_000)];
        let requests = vec![request("A", 1_000_000)];
        let allocation =
            allocate(&utxos, &requests, 10, &no_consumed(), &AcceptAll, 8).unwrap();

        let batch = allocation.batch.unwrap();
        let change = batch.outputs.last().unwrap();
        assert_eq!(change.request_id, None);
        assert_eq!(change.address, "reserve-1");
    }

    #[test]
    fn fee_deducted_from_recipient_outputs() {
        let utxos = vec![utxo("t1", 0, "r1", 100_000_000)];
        let requests = vec![request("A", 1_000_000), request("B", 2_000_000)];
        let fee_rate = 10;
        let allocation =
            allocate(&utxos, &requests, fee_rate, &no_consumed(), &AcceptAll, 8).unwrap();

        let batch = allocation.batch.unwrap();
        // 1 input, 3 outputs (two payments plus change).
        let fee = fee_rate * estimate_tx_size(1, 3);
        assert_eq!(batch.fee, fee);
        let share = fee / 2;
        assert_eq!(batch.outputs[0].value, 1_000_000 - share);
        assert_eq!(batch.outputs[1].value, 2_000_000 - share);
    }

    #[test]
    fn invalid_address_fails_only_that_request() {
        let utxos = vec![utxo("t1", 0, "r1", 100_000_000)];
        let requests = vec![request("bad", 1_000_000), request("ok", 2_000_000)];
        let allocation = allocate(
            &utxos,
            &requests,
            10,
            &no_consumed(),
            &RejectPrefix("dest-bad"),
            8,
        )
        .unwrap();

        assert_eq!(allocation.failed.len(), 1);
        assert_eq!(allocation.failed[0].reason, FailureReason::InvalidAddress);
        assert_eq!(allocation.funded.len(), 1);
        assert_eq!(allocation.funded[0].request.id, "ok");
    }

    #[test]
    fn accumulates_inputs_until_covered() {
        let utxos = vec![
            utxo("t1", 0, "r1", 1_000_000),
            utxo("t2", 0, "r1", 1_000_000),
            utxo("t3", 0, "r1", 1_000_000),
        ];
        let requests = vec![request("A", 2_500_000)];
        let allocation =
            allocate(&utxos, &requests, 1, &no_consumed(), &AcceptAll, 8).unwrap();

        let batch = allocation.batch.unwrap();
        assert_eq!(batch.inputs.len(), 3);
    }

    #[test]
    fn dust_request_drops_out_and_batch_recomputes() {
        let utxos = vec![utxo("t1", 0, "r1", 100_000_000)];
        // Fee share will exceed the 100-sat request; the 1_000_000-sat one
        // must still be funded.
        let requests = vec![request("tiny", 100), request("A", 1_000_000)];
        let allocation =
            allocate(&utxos, &requests, 10, &no_consumed(), &AcceptAll, 8).unwrap();

        assert_eq!(allocation.failed.len(), 1);
        assert_eq!(allocation.failed[0].request.id, "tiny");
        assert_eq!(allocation.failed[0].reason, FailureReason::FeeExceedsAmount);
        assert_eq!(allocation.funded.len(), 1);
        assert_eq!(allocation.funded[0].request.id, "A");
    }
}
