//! The signing fold: apply keys to a prepared payment and advance the
//! sequencing ledger.
//!
//! Sequencing state is verified against the unsigned transaction before the
//! signer is invoked. A mismatch means the caller skipped or reordered a
//! returned ledger; that is fatal for the transaction, never retried, since
//! retrying with the same state would repeat the nonce collision or the
//! double spend.

use tracing::{debug, error};

use custos_core::error::ProviderError;
use custos_core::sequencing::SequencingLedger;
use custos_core::traits::TransactionSigner;
use custos_core::types::{
    AccountTransfer, BatchPlan, ReserveWallet, SignedTransaction,
};

/// Sign one account-model transfer.
///
/// The transfer's nonce, fixed at allocation, must equal the ledger's next
/// nonce for the funding wallet. On success the ledger advances by exactly
/// one and rides home inside the signed transaction.
pub fn sign_account_transfer(
    signer: &dyn TransactionSigner,
    wallets: &[ReserveWallet],
    transfer: &AccountTransfer,
    mut ledger: SequencingLedger,
) -> Result<SignedTransaction, ProviderError> {
    let wallet = wallets
        .iter()
        .find(|w| w.address.eq_ignore_ascii_case(&transfer.from))
        .ok_or_else(|| ProviderError::UnknownWallet(transfer.from.clone()))?;

    let expected = ledger
        .nonce(&wallet.address)
        .ok_or_else(|| ProviderError::UnknownWallet(wallet.address.clone()))?;
    if transfer.nonce != expected {
        error!(
            wallet = %wallet.address,
            transfer_nonce = transfer.nonce,
            ledger_nonce = expected,
            "sequencing state does not match unsigned transfer"
        );
        return Err(ProviderError::StaleSequencing(format!(
            "wallet {} expects nonce {expected}, unsigned transfer carries {}",
            wallet.address, transfer.nonce
        )));
    }

    let payload = signer.sign_transfer(&wallet.private_key, transfer)?;
    ledger.advance(&wallet.address);
    debug!(wallet = %wallet.address, nonce = transfer.nonce, hash = %payload.hash, "signed transfer");
    Ok(SignedTransaction { hash: payload.hash, raw: payload.raw, ledger })
}

/// Sign one output-model batch.
///
/// Every input must still be unconsumed in the ledger; any overlap with an
/// earlier batch is a double-spend in the making and fails the whole batch.
/// On success all inputs are marked consumed.
pub fn sign_output_batch(
    signer: &dyn TransactionSigner,
    wallets: &[ReserveWallet],
    batch: &BatchPlan,
    mut ledger: SequencingLedger,
) -> Result<SignedTransaction, ProviderError> {
    for input in &batch.inputs {
        if ledger.is_consumed(&input.outpoint) {
            error!(outpoint = %input.outpoint, "batch input already consumed by an earlier batch");
            return Err(ProviderError::StaleSequencing(format!(
                "output {} already consumed",
                input.outpoint
            )));
        }
    }

    let payload = signer.sign_batch(wallets, batch)?;
    for input in &batch.inputs {
        ledger.mark_consumed(input.outpoint.clone());
    }
    debug!(
        inputs = batch.inputs.len(),
        outputs = batch.outputs.len(),
        hash = %payload.hash,
        "signed batch"
    );
    Ok(SignedTransaction { hash: payload.hash, raw: payload.raw, ledger })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    use custos_core::error::SignerError;
    use custos_core::keys::PrivateKey;
    use custos_core::types::{OutPoint, SignedPayload, UnspentOutput};

    /// Records which key signed and returns a canned payload.
    struct RecordingSigner;

    impl TransactionSigner for RecordingSigner {
        fn sign_transfer(
            &self,
            key: &PrivateKey,
            transfer: &AccountTransfer,
        ) -> Result<SignedPayload, SignerError> {
            Ok(SignedPayload {
                hash: format!("hash-{}-{}", key.expose(), transfer.nonce),
                raw: "rawtx".into(),
            })
        }

        fn sign_batch(
            &self,
            _wallets: &[ReserveWallet],
            batch: &BatchPlan,
        ) -> Result<SignedPayload, SignerError> {
            Ok(SignedPayload {
                hash: format!("batch-{}-inputs", batch.inputs.len()),
                raw: "rawbatch".into(),
            })
        }
    }

    fn wallet(address: &str, key: &str) -> ReserveWallet {
        ReserveWallet {
            address: address.into(),
            private_key: PrivateKey::new(key.into()),
        }
    }

    fn transfer(from: &str, nonce: u64) -> AccountTransfer {
        AccountTransfer {
            from: from.into(),
            to: "0xdest".into(),
            value: 1,
            gas_price: 1,
            gas_limit: 21_000,
            nonce,
        }
    }

    fn utxo(txid: &str, vout: u32) -> UnspentOutput {
        UnspentOutput {
            outpoint: OutPoint { txid: txid.into(), vout },
            address: "reserve".into(),
            value: 10_000,
            confirmations: 6,
        }
    }

    #[test]
    fn sequential_signing_threads_nonces() {
        let wallets = vec![wallet("w1", "k1")];
        let ledger = SequencingLedger::from_nonces(HashMap::from([("w1".to_string(), 7)]));

        let first =
            sign_account_transfer(&RecordingSigner, &wallets, &transfer("w1", 7), ledger)
                .unwrap();
        let second = sign_account_transfer(
            &RecordingSigner,
            &wallets,
            &transfer("w1", 8),
            first.ledger,
        )
        .unwrap();
        assert_eq!(second.ledger.nonce("w1"), Some(9));
    }

    #[test]
    fn nonce_mismatch_is_stale() {
        let wallets = vec![wallet("w1", "k1")];
        let ledger = SequencingLedger::from_nonces(HashMap::from([("w1".to_string(), 7)]));

        let err =
            sign_account_transfer(&RecordingSigner, &wallets, &transfer("w1", 8), ledger)
                .unwrap_err();
        assert!(matches!(err, ProviderError::StaleSequencing(_)));
    }

    #[test]
    fn unknown_funding_wallet_is_rejected() {
        let wallets = vec![wallet("w1", "k1")];
        let ledger = SequencingLedger::from_nonces(HashMap::from([("w1".to_string(), 0)]));
        let err =
            sign_account_transfer(&RecordingSigner, &wallets, &transfer("w9", 0), ledger)
                .unwrap_err();
        assert_eq!(err, ProviderError::UnknownWallet("w9".into()));
    }

    #[test]
    fn batch_consumes_all_inputs() {
        let wallets = vec![wallet("reserve", "k1")];
        let batch = BatchPlan {
            inputs: vec![utxo("t1", 0), utxo("t2", 1)],
            outputs: Vec::new(),
            fee: 100,
        };
        let ledger = SequencingLedger::from_consumed(HashSet::new());

        let signed = sign_output_batch(&RecordingSigner, &wallets, &batch, ledger).unwrap();
        assert!(signed.ledger.is_consumed(&OutPoint { txid: "t1".into(), vout: 0 }));
        assert!(signed.ledger.is_consumed(&OutPoint { txid: "t2".into(), vout: 1 }));
        assert_eq!(signed.ledger.consumed_count(), 2);
    }

    #[test]
    fn consumed_input_is_stale() {
        let wallets = vec![wallet("reserve", "k1")];
        let batch = BatchPlan { inputs: vec![utxo("t1", 0)], outputs: Vec::new(), fee: 100 };
        let seeded = HashSet::from([OutPoint { txid: "t1".into(), vout: 0 }]);
        let ledger = SequencingLedger::from_consumed(seeded);

        let err =
            sign_output_batch(&RecordingSigner, &wallets, &batch, ledger).unwrap_err();
        assert!(matches!(err, ProviderError::StaleSequencing(_)));
    }
}
