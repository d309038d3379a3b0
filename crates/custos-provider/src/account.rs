//! Account-model payment provider: one reserve wallet funds one payment,
//! ordered by a per-wallet nonce.

use std::collections::HashMap;
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
    AccountChainClient, AddressValidator, PaymentProvider, TransactionSigner,
};
use custos_core::types::{
    CurrencyConfig, IncomingTransaction, PaymentPlan, PaymentRequest, PendingSpends,
    ReserveWallet, SignedTransaction, UnsignedKind, UnsignedPayment,
};

use crate::classify::classify_account;
use crate::reconcile::{next_nonces, spendable_balances};
use crate::signing::sign_account_transfer;
use crate::wallet_selection;
use crate::TRANSFER_GAS_LIMIT;

/// Payment provider for account-model currencies (nonce-sequenced transfers).
pub struct AccountProvider<C> {
    client: C,
    signer: Arc<dyn TransactionSigner>,
    derivation: Arc<dyn KeyDerivation>,
    validator: Arc<dyn AddressValidator>,
    config: CurrencyConfig,
}

impl<C: AccountChainClient> AccountProvider<C> {
    pub fn new(
        client: C,
        signer: Arc<dyn TransactionSigner>,
        derivation: Arc<dyn KeyDerivation>,
        validator: Arc<dyn AddressValidator>,
        config: CurrencyConfig,
    ) -> Self {
        Self { client, signer, derivation, validator, config }
    }
}

#[async_trait]
impl<C: AccountChainClient> PaymentProvider for AccountProvider<C> {
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
        let wei = self.client.balance(address).await?;
        Ok(from_minor_units(wei, self.config.decimals)?)
    }

    async fn is_confirmed_transaction(&self, hash: &str) -> Result<bool, ProviderError> {
        let Some(receipt) = self.client.transaction_receipt(hash).await? else {
            return Ok(false);
        };
        if !receipt.succeeded {
            return Ok(false);
        }
        let Some(mined_at) = receipt.block_number else {
            return Ok(false);
        };
        let height = self.client.block_number().await?;
        Ok(height.saturating_sub(mined_at) >= self.config.confirmation_threshold)
    }

    async fn get_received_transactions(
        &self,
        reserve_address: &str,
    ) -> Result<Vec<IncomingTransaction>, ProviderError> {
        let transactions = self.client.transactions_by_address(reserve_address).await?;
        let height = self.client.block_number().await?;
        classify_account(reserve_address, &transactions, height, self.config.decimals)
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

        let gas_price = self.client.gas_price().await?;
        let fee_wei = gas_price.saturating_mul(TRANSFER_GAS_LIMIT as u128);
        let fee = from_minor_units(fee_wei, self.config.decimals)?;

        let funds =
            spendable_balances(&self.client, wallets, pending, self.config.decimals).await?;
        let nonces: HashMap<String, u64> =
            next_nonces(&self.client, wallets).await?.into_iter().collect();

        let allocation = wallet_selection::allocate(
            &funds,
            requests,
            fee,
            gas_price,
            &nonces,
            self.validator.as_ref(),
            self.config.decimals,
        )?;

        let unsigned: Vec<UnsignedPayment> = allocation
            .transfers
            .into_iter()
            .zip(&allocation.funded)
            .map(|(transfer, funded)| UnsignedPayment {
                request_ids: vec![funded.request.id.clone()],
                kind: UnsignedKind::Transfer(transfer),
            })
            .collect();

        info!(
            ticker = %self.config.ticker,
            funded = allocation.funded.len(),
            failed = allocation.failed.len(),
            %fee,
            "prepared account-model payment"
        );
        Ok(PaymentPlan {
            funded: allocation.funded,
            failed: allocation.failed,
            fee,
            unsigned,
            ledger: SequencingLedger::from_nonces(nonces),
        })
    }

    fn sign_transaction(
        &self,
        wallets: &[ReserveWallet],
        unsigned: &UnsignedPayment,
        ledger: SequencingLedger,
    ) -> Result<SignedTransaction, ProviderError> {
        match &unsigned.kind {
            UnsignedKind::Transfer(transfer) => {
                sign_account_transfer(self.signer.as_ref(), wallets, transfer, ledger)
            }
            UnsignedKind::Batch(_) => Err(ProviderError::MismatchedPaymentKind),
        }
    }

    async fn send_signed_transaction(&self, raw: &str) -> Result<String, ProviderError> {
        let hash = self.client.send_raw_transaction(raw).await?;
        debug!(ticker = %self.config.ticker, %hash, "broadcast transaction");
        Ok(hash)
    }
}
