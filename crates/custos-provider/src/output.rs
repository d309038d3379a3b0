//! Output-model payment provider: pooled unspent outputs fund one batch
//! transaction per preparation.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use rust_decimal::Decimal;
use tracing::{debug, info};

use custos_core::amount::from_minor_units;
use custos_core::error::ProviderError;
use custos_core::keys::{KeyDerivation, Seed};
use custos_core::sequencing::SequencingLedger;
use custos_core::traits::{
    AddressValidator, OutputChainClient, PaymentProvider, TransactionSigner,
};
use custos_core::types::{
    CurrencyConfig, IncomingTransaction, OutputTransaction, PaymentPlan, PaymentRequest,
    PendingSpends, ReserveWallet, SignedTransaction, UnsignedKind, UnsignedPayment,
    UnspentOutput,
};

use crate::classify::classify_output;
use crate::coin_selection;
use crate::signing::sign_output_batch;

/// Confirmation-target window for the fee-rate estimate.
const FEE_TARGET_BLOCKS: u16 = 2;

/// Payment provider for output-model currencies (UTXO batches).
pub struct OutputProvider<C> {
    client: C,
    signer: Arc<dyn TransactionSigner>,
    derivation: Arc<dyn KeyDerivation>,
    validator: Arc<dyn AddressValidator>,
    config: CurrencyConfig,
}

impl<C: OutputChainClient> OutputProvider<C> {
    pub fn new(
        client: C,
        signer: Arc<dyn TransactionSigner>,
        derivation: Arc<dyn KeyDerivation>,
        validator: Arc<dyn AddressValidator>,
        config: CurrencyConfig,
    ) -> Self {
        Self { client, signer, derivation, validator, config }
    }

    /// Unspent outputs across the whole reserve pool, fetched concurrently.
    async fn pooled_outputs(
        &self,
        wallets: &[ReserveWallet],
    ) -> Result<Vec<UnspentOutput>, ProviderError> {
        let fetches = wallets.iter().map(|w| self.client.unspent_outputs(&w.address));
        let per_wallet = try_join_all(fetches).await?;
        Ok(per_wallet.into_iter().flatten().collect())
    }

    /// Full paginated history of an address. Pages may overlap; the
    /// classifier deduplicates by txid.
    async fn full_history(
        &self,
        address: &str,
    ) -> Result<Vec<OutputTransaction>, ProviderError> {
        let first = self.client.transactions_by_address(address, 1).await?;
        let total_pages = first.total_pages;
        let mut transactions = first.items;
        for page in 2..=total_pages {
            let next = self.client.transactions_by_address(address, page).await?;
            transactions.extend(next.items);
        }
        debug!(%address, total_pages, count = transactions.len(), "walked history pages");
        Ok(transactions)
    }
}

#[async_trait]
impl<C: OutputChainClient> PaymentProvider for OutputProvider<C> {
    fn config(&self) -> &CurrencyConfig {
        &self.config
    }

    fn is_valid_address(&self, address: &str) -> bool {
        self.validator.is_valid(address)
    }

    fn generate_wallet(&self, seed: &Seed, index: u32) -> Result<ReserveWallet, ProviderError> {
        let path = format!("{}/{index}", self.config.derivation_path);
        Ok(self.derivation.derive(seed, &path)?)
    }

    async fn get_balance(&self, address: &str) -> Result<Decimal, ProviderError> {
        let outputs = self.client.unspent_outputs(address).await?;
        let sats: u64 = outputs
            .iter()
            .filter(|o| o.confirmations > 0)
            .map(|o| o.value)
            .sum();
        Ok(from_minor_units(sats as u128, self.config.decimals)?)
    }

    async fn is_confirmed_transaction(&self, hash: &str) -> Result<bool, ProviderError> {
        let tx = self.client.transaction_by_id(hash).await?;
        Ok(tx.confirmations >= self.config.confirmation_threshold)
    }

    async fn get_received_transactions(
        &self,
        reserve_address: &str,
    ) -> Result<Vec<IncomingTransaction>, ProviderError> {
        let history = self.full_history(reserve_address).await?;
        classify_output(reserve_address, &history, self.config.decimals)
    }

    async fn get_received_reserves_transactions(
        &self,
        reserve_addresses: &[String],
    ) -> Result<Vec<IncomingTransaction>, ProviderError> {
        let fetches = reserve_addresses
            .iter()
            .map(|address| self.get_received_transactions(address));
        let per_reserve = try_join_all(fetches).await?;
        Ok(per_reserve.into_iter().flatten().collect())
    }

    async fn prepare_payment(
        &self,
        wallets: &[ReserveWallet],
        requests: &[PaymentRequest],
        pending: &PendingSpends,
    ) -> Result<PaymentPlan, ProviderError> {
        if requests.is_empty() {
            return Err(ProviderError::EmptyBatch);
        }

        let fee_rate = self.client.fee_rate(FEE_TARGET_BLOCKS).await?;
        let utxos = self.pooled_outputs(wallets).await?;
        let consumed = pending.consumed_outpoints();

        let allocation = coin_selection::allocate(
            &utxos,
            requests,
            fee_rate,
            &consumed,
            self.validator.as_ref(),
            self.config.decimals,
        )?;

        let fee = from_minor_units(allocation.fee as u128, self.config.decimals)?;
        let unsigned = match allocation.batch {
            Some(batch) => vec![UnsignedPayment {
                request_ids: allocation
                    .funded
                    .iter()
                    .map(|f| f.request.id.clone())
                    .collect(),
                kind: UnsignedKind::Batch(batch),
            }],
            None => Vec::new(),
        };

        info!(
            ticker = %self.config.ticker,
            funded = allocation.funded.len(),
            failed = allocation.failed.len(),
            %fee,
            "prepared output-model payment"
        );
        Ok(PaymentPlan {
            funded: allocation.funded,
            failed: allocation.failed,
            fee,
            unsigned,
            ledger: SequencingLedger::from_consumed(consumed),
        })
    }

    fn sign_transaction(
        &self,
        wallets: &[ReserveWallet],
        unsigned: &UnsignedPayment,
        ledger: SequencingLedger,
    ) -> Result<SignedTransaction, ProviderError> {
        match &unsigned.kind {
            UnsignedKind::Batch(batch) => {
                sign_output_batch(self.signer.as_ref(), wallets, batch, ledger)
            }
            UnsignedKind::Transfer(_) => Err(ProviderError::MismatchedPaymentKind),
        }
    }

    async fn send_signed_transaction(&self, raw: &str) -> Result<String, ProviderError> {
        let txid = self.client.send_raw_transaction(raw).await?;
        debug!(ticker = %self.config.ticker, %txid, "broadcast transaction");
        Ok(txid)
    }
}
