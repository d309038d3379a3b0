//! REST explorer client for output-model chains (insight-style API).
//!
//! Endpoints: UTXOs by address, paginated history, transaction detail,
//! fee estimate, raw-hex broadcast. Explorer amounts arrive as coin-unit
//! decimal strings or satoshi integers; everything leaves this module in
//! satoshi.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use custos_core::error::ChainError;
use custos_core::traits::OutputChainClient;
use custos_core::types::{OutPoint, OutputTransaction, Page, TxSideEntry, UnspentOutput};

/// Minimum accepted fee rate in satoshi per byte.
pub const MIN_FEE_RATE: u64 = 2;

const SATS_PER_COIN: u64 = 100_000_000;

/// Async output-model explorer client.
pub struct OutputRestClient {
    client: reqwest::Client,
    base_url: String,
}

impl OutputRestClient {
    pub fn new(base_url: &str) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ChainError::Http(e.to_string()))?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ChainError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(%path, "explorer query");
        self.client
            .get(&url)
            .send()
            .await
            .map_err(|e| ChainError::Http(e.to_string()))?
            .json()
            .await
            .map_err(|e| ChainError::Http(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct RestUtxo {
    txid: String,
    vout: u32,
    address: String,
    satoshis: u64,
    #[serde(default)]
    confirmations: u64,
}

#[derive(Debug, Deserialize)]
struct RestVin {
    #[serde(default)]
    addr: Option<String>,
    #[serde(rename = "valueSat", default)]
    value_sat: u64,
}

#[derive(Debug, Deserialize)]
struct RestScriptPubKey {
    #[serde(default)]
    addresses: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RestVout {
    /// Coin-unit decimal string, e.g. `"0.05000000"`.
    value: String,
    #[serde(rename = "scriptPubKey", default)]
    script_pub_key: Option<RestScriptPubKey>,
}

#[derive(Debug, Deserialize)]
struct RestTx {
    txid: String,
    #[serde(default)]
    confirmations: u64,
    #[serde(default)]
    vin: Vec<RestVin>,
    #[serde(default)]
    vout: Vec<RestVout>,
}

#[derive(Debug, Deserialize)]
struct RestHistoryPage {
    #[serde(rename = "pagesTotal")]
    pages_total: u32,
    txs: Vec<RestTx>,
}

#[derive(Debug, Deserialize)]
struct RestBroadcastReply {
    txid: String,
}

fn coin_string_to_sats(text: &str) -> Result<u64, ChainError> {
    let coins: Decimal = text
        .parse()
        .map_err(|e| ChainError::InvalidResponse(format!("bad coin value {text}: {e}")))?;
    (coins * Decimal::from(SATS_PER_COIN))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
        .ok_or_else(|| ChainError::InvalidResponse(format!("coin value out of range: {text}")))
}

impl TryFrom<RestTx> for OutputTransaction {
    type Error = ChainError;

    fn try_from(tx: RestTx) -> Result<Self, ChainError> {
        let inputs = tx
            .vin
            .into_iter()
            .map(|vin| TxSideEntry {
                addresses: vin.addr.into_iter().collect(),
                value: vin.value_sat,
            })
            .collect();
        let outputs = tx
            .vout
            .into_iter()
            .map(|vout| {
                Ok(TxSideEntry {
                    addresses: vout.script_pub_key.map(|s| s.addresses).unwrap_or_default(),
                    value: coin_string_to_sats(&vout.value)?,
                })
            })
            .collect::<Result<Vec<_>, ChainError>>()?;
        Ok(OutputTransaction { txid: tx.txid, confirmations: tx.confirmations, inputs, outputs })
    }
}

/// Convert an explorer fee estimate (coin per kilobyte) to satoshi per byte,
/// floored at [`MIN_FEE_RATE`].
fn fee_rate_sat_per_byte(coin_per_kb: Decimal) -> Result<u64, ChainError> {
    let rate = (coin_per_kb * Decimal::from(SATS_PER_COIN) / Decimal::from(1000u32))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
        .ok_or_else(|| {
            ChainError::InvalidResponse(format!("fee estimate out of range: {coin_per_kb}"))
        })?;
    Ok(rate.max(MIN_FEE_RATE))
}

#[async_trait]
impl OutputChainClient for OutputRestClient {
    async fn unspent_outputs(&self, address: &str) -> Result<Vec<UnspentOutput>, ChainError> {
        let utxos: Vec<RestUtxo> = self.get_json(&format!("addr/{address}/utxo")).await?;
        Ok(utxos
            .into_iter()
            .map(|u| UnspentOutput {
                outpoint: OutPoint { txid: u.txid, vout: u.vout },
                address: u.address,
                value: u.satoshis,
                confirmations: u.confirmations,
            })
            .collect())
    }

    async fn fee_rate(&self, target_blocks: u16) -> Result<u64, ChainError> {
        let reply: HashMap<String, Decimal> = self
            .get_json(&format!("utils/estimatefee?nbBlocks={target_blocks}"))
            .await?;
        let estimate = reply
            .get(&target_blocks.to_string())
            .copied()
            .ok_or_else(|| ChainError::EmptyResult("estimatefee".to_string()))?;
        // A node without enough fee data reports a negative estimate.
        if estimate.is_sign_negative() {
            return Ok(MIN_FEE_RATE);
        }
        fee_rate_sat_per_byte(estimate)
    }

    async fn transactions_by_address(
        &self,
        address: &str,
        page: u32,
    ) -> Result<Page<OutputTransaction>, ChainError> {
        let history: RestHistoryPage = self
            .get_json(&format!("txs?address={address}&pageNum={page}"))
            .await?;
        let items = history
            .txs
            .into_iter()
            .map(OutputTransaction::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page { items, total_pages: history.pages_total })
    }

    async fn transaction_by_id(&self, txid: &str) -> Result<OutputTransaction, ChainError> {
        let tx: RestTx = self.get_json(&format!("tx/{txid}")).await?;
        OutputTransaction::try_from(tx)
    }

    async fn send_raw_transaction(&self, hex: &str) -> Result<String, ChainError> {
        let url = format!("{}/tx/send", self.base_url);
        debug!("broadcasting raw transaction");
        let reply: RestBroadcastReply = self
            .client
            .post(&url)
            .json(&json!({ "rawtx": hex }))
            .send()
            .await
            .map_err(|e| ChainError::Http(e.to_string()))?
            .json()
            .await
            .map_err(|e| ChainError::Http(e.to_string()))?;
        Ok(reply.txid)
    }
}
