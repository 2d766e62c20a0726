//! On-chain holding check: ERC-20 `balanceOf` over JSON-RPC.

use crate::config::ChainEndpoints;
use crate::ownership::OwnershipError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// `balanceOf(address)` selector.
const BALANCE_OF_SELECTOR: &str = "70a08231";

/// Chains with configurable endpoints that do not speak the EVM JSON-RPC dialect.
const NON_EVM_CHAINS: &[&str] = &["solana", "tron"];

/// Answers "does this wallet hold this asset".
#[async_trait]
pub trait BalanceOracle: Send + Sync {
    /// True when `wallet` holds a non-zero balance of `contract` on `chain`.
    async fn holds(&self, chain: &str, contract: &str, wallet: &str) -> Result<bool, OwnershipError>;
}

/// `eth_call` oracle over the configured chain endpoints.
#[derive(Debug, Clone)]
pub struct RpcBalanceOracle {
    client: Client,
    endpoints: ChainEndpoints,
}

impl RpcBalanceOracle {
    /// Oracle using `client` against `endpoints`.
    pub fn new(client: Client, endpoints: ChainEndpoints) -> Self {
        Self { client, endpoints }
    }

    fn endpoint(&self, chain: &str) -> Result<&str, OwnershipError> {
        let chain = chain.trim().to_lowercase();
        if NON_EVM_CHAINS.contains(&chain.as_str()) {
            return Err(OwnershipError::UnsupportedChain(chain));
        }
        self.endpoints
            .get(&chain)
            .ok_or(OwnershipError::UnsupportedChain(chain))
    }
}

/// ABI-encodes `balanceOf(wallet)`.
pub fn balance_of_call(wallet: &str) -> Result<String, OwnershipError> {
    let raw = strip_hex_prefix(wallet.trim());
    if raw.len() != 40 || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(OwnershipError::Encoding(format!("invalid wallet address {wallet}")));
    }
    Ok(format!("0x{BALANCE_OF_SELECTOR}{:0>64}", raw.to_lowercase()))
}

/// True when a hex `uint256` quantity is non-zero.
pub fn quantity_is_positive(quantity: &str) -> Result<bool, OwnershipError> {
    let raw = strip_hex_prefix(quantity.trim());
    if !raw.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(OwnershipError::Rpc(format!("invalid hex quantity {quantity}")));
    }
    Ok(raw.chars().any(|c| c != '0'))
}

fn strip_hex_prefix(input: &str) -> &str {
    input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input)
}

#[async_trait]
impl BalanceOracle for RpcBalanceOracle {
    async fn holds(&self, chain: &str, contract: &str, wallet: &str) -> Result<bool, OwnershipError> {
        let rpc = self.endpoint(chain)?;
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1u64,
            "method": "eth_call",
            "params": [{"to": contract.trim(), "data": balance_of_call(wallet)?}, "latest"]
        });
        let resp = self
            .client
            .post(rpc)
            .json(&payload)
            .send()
            .await
            .map_err(|e| OwnershipError::Rpc(format!("balance request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(OwnershipError::Rpc(format!("balance rpc status {}", resp.status())));
        }
        let value: Value = resp
            .json()
            .await
            .map_err(|e| OwnershipError::Rpc(format!("balance decode failed: {e}")))?;
        if let Some(error) = value.get("error") {
            return Err(OwnershipError::Rpc(format!("balance rpc error: {error}")));
        }
        let result = value
            .get("result")
            .and_then(Value::as_str)
            .ok_or_else(|| OwnershipError::Rpc("balance rpc missing result".to_string()))?;
        quantity_is_positive(result)
    }
}
