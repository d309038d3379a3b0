//! JSON-RPC 2.0 client for account-model chains.
//!
//! Node access (balances, receipts, gas price, nonces, broadcast) goes over
//! JSON-RPC; per-address transaction history comes from an explorer REST
//! endpoint, since account-model nodes do not index history by address.
//! Balance queries for many wallets are batched into one round trip.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use custos_core::error::ChainError;
use custos_core::traits::AccountChainClient;
use custos_core::types::{AccountTransaction, TransactionReceipt};

/// JSON-RPC 2.0 request envelope.
#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

/// JSON-RPC 2.0 response envelope.
#[derive(Deserialize)]
struct RpcResponse {
    id: u64,
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Async account-model chain client over JSON-RPC plus an explorer endpoint.
pub struct AccountRpcClient {
    client: reqwest::Client,
    rpc_url: String,
    explorer_url: String,
    request_id: AtomicU64,
}

impl AccountRpcClient {
    /// Create a client for a node RPC endpoint and an explorer history API.
    pub fn new(rpc_url: &str, explorer_url: &str) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ChainError::Http(e.to_string()))?;
        Ok(Self {
            client,
            rpc_url: rpc_url.trim_end_matches('/').to_string(),
            explorer_url: explorer_url.trim_end_matches('/').to_string(),
            request_id: AtomicU64::new(0),
        })
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let request = RpcRequest { jsonrpc: "2.0", id: self.next_id(), method, params };
        debug!(method, "rpc call");
        let response: RpcResponse = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChainError::Http(e.to_string()))?
            .json()
            .await
            .map_err(|e| ChainError::Http(e.to_string()))?;
        unwrap_result(response, method)
    }

    /// Issue several JSON-RPC calls in a single HTTP round trip.
    ///
    /// Responses may arrive out of order; they are matched back to requests
    /// by id.
    async fn call_batch(&self, calls: &[(&str, Value)]) -> Result<Vec<Value>, ChainError> {
        let requests: Vec<RpcRequest<'_>> = calls
            .iter()
            .map(|(method, params)| RpcRequest {
                jsonrpc: "2.0",
                id: self.next_id(),
                method,
                params: params.clone(),
            })
            .collect();
        debug!(count = requests.len(), "rpc batch call");
        let mut responses: Vec<RpcResponse> = self
            .client
            .post(&self.rpc_url)
            .json(&requests)
            .send()
            .await
            .map_err(|e| ChainError::Http(e.to_string()))?
            .json()
            .await
            .map_err(|e| ChainError::Http(e.to_string()))?;
        if responses.len() != requests.len() {
            return Err(ChainError::InvalidResponse(format!(
                "batch returned {} responses for {} requests",
                responses.len(),
                requests.len()
            )));
        }
        responses.sort_by_key(|r| r.id);
        responses
            .into_iter()
            .zip(calls)
            .map(|(response, (method, _))| unwrap_result(response, method))
            .collect()
    }
}

fn unwrap_result(response: RpcResponse, method: &str) -> Result<Value, ChainError> {
    if let Some(err) = response.error {
        return Err(ChainError::Rpc { code: err.code, message: err.message });
    }
    match response.result {
        Some(Value::Null) | None => Err(ChainError::EmptyResult(method.to_string())),
        Some(value) => Ok(value),
    }
}

/// Parse a `0x`-prefixed hex quantity.
pub(crate) fn parse_quantity(value: &Value) -> Result<u128, ChainError> {
    let text = value
        .as_str()
        .ok_or_else(|| ChainError::InvalidResponse(format!("expected hex quantity, got {value}")))?;
    let hex = text.strip_prefix("0x").unwrap_or(text);
    u128::from_str_radix(hex, 16)
        .map_err(|e| ChainError::InvalidResponse(format!("bad hex quantity {text}: {e}")))
}

fn parse_quantity_u64(value: &Value) -> Result<u64, ChainError> {
    let wide = parse_quantity(value)?;
    u64::try_from(wide)
        .map_err(|_| ChainError::InvalidResponse(format!("quantity too large: {wide}")))
}

/// One transaction row from the explorer history API.
#[derive(Debug, Deserialize)]
struct ExplorerTx {
    hash: String,
    from: String,
    #[serde(default)]
    to: Option<String>,
    /// Decimal wei string.
    value: String,
    #[serde(rename = "gasPrice")]
    gas_price: String,
    input: String,
    #[serde(rename = "blockNumber", default)]
    block_number: Option<String>,
    #[serde(rename = "isError", default)]
    is_error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExplorerHistory {
    result: Vec<ExplorerTx>,
}

fn decimal_u128(text: &str, field: &str) -> Result<u128, ChainError> {
    text.parse::<u128>()
        .map_err(|e| ChainError::InvalidResponse(format!("bad {field} {text}: {e}")))
}

impl TryFrom<ExplorerTx> for AccountTransaction {
    type Error = ChainError;

    fn try_from(tx: ExplorerTx) -> Result<Self, ChainError> {
        let block_number = tx
            .block_number
            .as_deref()
            .map(|n| {
                n.parse::<u64>()
                    .map_err(|e| ChainError::InvalidResponse(format!("bad blockNumber {n}: {e}")))
            })
            .transpose()?;
        Ok(AccountTransaction {
            value: decimal_u128(&tx.value, "value")?,
            gas_price: decimal_u128(&tx.gas_price, "gasPrice")?,
            succeeded: tx.is_error.as_deref() != Some("1"),
            hash: tx.hash,
            from: tx.from,
            to: tx.to,
            input: tx.input,
            block_number,
        })
    }
}

#[async_trait]
impl AccountChainClient for AccountRpcClient {
    async fn balance(&self, address: &str) -> Result<u128, ChainError> {
        let result = self.call("eth_getBalance", json!([address, "latest"])).await?;
        parse_quantity(&result)
    }

    async fn balances(&self, addresses: &[String]) -> Result<Vec<u128>, ChainError> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        let calls: Vec<(&str, Value)> = addresses
            .iter()
            .map(|address| ("eth_getBalance", json!([address, "latest"])))
            .collect();
        let results = self.call_batch(&calls).await?;
        results.iter().map(parse_quantity).collect()
    }

    async fn pending_balance(&self, address: &str) -> Result<u128, ChainError> {
        let result = self.call("eth_getBalance", json!([address, "pending"])).await?;
        parse_quantity(&result)
    }

    async fn transaction_receipt(
        &self,
        hash: &str,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        let result = match self.call("eth_getTransactionReceipt", json!([hash])).await {
            Ok(value) => value,
            // An unknown hash comes back as a null result.
            Err(ChainError::EmptyResult(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let block_number = match result.get("blockNumber") {
            Some(Value::Null) | None => None,
            Some(value) => Some(parse_quantity_u64(value)?),
        };
        let succeeded = match result.get("status") {
            Some(Value::Null) | None => false,
            Some(value) => parse_quantity(value)? == 1,
        };
        Ok(Some(TransactionReceipt { block_number, succeeded }))
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity_u64(&result)
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        let result = self.call("eth_gasPrice", json!([])).await?;
        parse_quantity(&result)
    }

    async fn transaction_count(&self, address: &str) -> Result<u64, ChainError> {
        let result = self
            .call("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        parse_quantity_u64(&result)
    }

    async fn transactions_by_address(
        &self,
        address: &str,
    ) -> Result<Vec<AccountTransaction>, ChainError> {
        let url = format!(
            "{}/api?module=account&action=txlist&address={}&sort=asc",
            self.explorer_url, address
        );
        debug!(%address, "explorer history query");
        let history: ExplorerHistory = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ChainError::Http(e.to_string()))?
            .json()
            .await
            .map_err(|e| ChainError::Http(e.to_string()))?;
        history.result.into_iter().map(AccountTransaction::try_from).collect()
    }

    async fn send_raw_transaction(&self, raw: &str) -> Result<String, ChainError> {
        let result = self.call("eth_sendRawTransaction", json!([raw])).await?;
        result
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| ChainError::InvalidResponse(format!("expected tx hash, got {result}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_quantities() {
        assert_eq!(parse_quantity(&json!("0x0")).unwrap(), 0);
        assert_eq!(parse_quantity(&json!("0xde0b6b3a7640000")).unwrap(), 10u128.pow(18));
        assert_eq!(parse_quantity_u64(&json!("0x10")).unwrap(), 16);
    }

    #[test]
    fn parse_quantity_rejects_garbage() {
        assert!(parse_quantity(&json!("0xzz")).is_err());
        assert!(parse_quantity(&json!(42)).is_err());
    }

    #[test]
    fn explorer_tx_maps_to_account_transaction() {
        let raw = json!({
            "hash": "0xh1",
            "from": "0xSender",
            "to": "0xReserve",
            "value": "1000000000000000000",
            "gasPrice": "20000000000",
            "input": "0x",
            "blockNumber": "1200",
            "isError": "0"
        });
        let tx: ExplorerTx = serde_json::from_value(raw).unwrap();
        let tx = AccountTransaction::try_from(tx).unwrap();
        assert_eq!(tx.value, 10u128.pow(18));
        assert_eq!(tx.gas_price, 20_000_000_000);
        assert_eq!(tx.block_number, Some(1200));
        assert!(tx.succeeded);
    }

    #[test]
    fn explorer_tx_failed_execution() {
        let raw = json!({
            "hash": "0xh2",
            "from": "0xSender",
            "to": "0xReserve",
            "value": "0",
            "gasPrice": "1",
            "input": "0x",
            "isError": "1"
        });
        let tx: ExplorerTx = serde_json::from_value(raw).unwrap();
        let tx = AccountTransaction::try_from(tx).unwrap();
        assert!(!tx.succeeded);
        assert_eq!(tx.block_number, None);
    }

    #[test]
    fn null_rpc_result_is_empty() {
        let response = RpcResponse { id: 0, result: Some(Value::Null), error: None };
        assert!(matches!(
            unwrap_result(response, "eth_getBalance"),
            Err(ChainError::EmptyResult(_))
        ));
    }

    #[test]
    fn rpc_error_surfaces_code_and_message() {
        let response = RpcResponse {
            id: 0,
            result: None,
            error: Some(RpcErrorBody { code: -32000, message: "nonce too low".into() }),
        };
        assert_eq!(
            unwrap_result(response, "eth_sendRawTransaction").unwrap_err(),
            ChainError::Rpc { code: -32000, message: "nonce too low".into() }
        );
    }
}
