//! EVM transaction path
//!
//! Estimate gas through the signer, add a safety margin, send, return the
//! hash. Revert reasons from the router are classified into a small set of
//! tags for logs and metrics.

use crate::config::EvmConfig;
use crate::metrics::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

/// EIP-1193 "user rejected request"
pub const USER_REJECTED_CODE: i64 = 4001;

/// Transaction object in JSON-RPC form (hex quantities)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmTxRequest {
    pub from: String,
    pub to: String,
    pub data: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<String>,
}

/// Provider answer to a send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvmTxResponse {
    pub hash: String,
    /// Untouched provider payload
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("provider error (code {code:?}): {message}")]
pub struct ProviderError {
    pub code: Option<i64>,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The user declined in the wallet
    pub fn is_rejection(&self) -> bool {
        if self.code == Some(USER_REJECTED_CODE) {
            return true;
        }
        let lower = self.message.to_lowercase();
        self.message.contains("ACTION_REJECTED")
            || lower.contains("user rejected")
            || lower.contains("user denied")
    }
}

/// Wallet / provider seam
#[async_trait]
pub trait EvmSigner: Send + Sync {
    async fn estimate_gas(&self, tx: &EvmTxRequest) -> Result<u64, ProviderError>;

    async fn send_transaction(&self, tx: &EvmTxRequest) -> Result<EvmTxResponse, ProviderError>;
}

/// Classified revert reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureTag {
    /// Router minimum-output check
    MinTotalAmountOut,
    /// Output below the limit
    LimitOut,
    /// Aggregated RFQ venue rejected the quote
    Rfq,
    Other,
}

impl FailureTag {
    pub fn classify(message: &str) -> Self {
        if message.contains("minTotalAmountOut") {
            Self::MinTotalAmountOut
        } else if message.contains("ERR_LIMIT_OUT") {
            Self::LimitOut
        } else if message.contains("RFQ") {
            Self::Rfq
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MinTotalAmountOut => "minTotalAmountOut",
            Self::LimitOut => "ERR_LIMIT_OUT",
            Self::Rfq => "rfq",
            Self::Other => "other",
        }
    }

    /// The price moved past the slippage tolerance
    pub fn is_slippage(&self) -> bool {
        matches!(self, Self::MinTotalAmountOut | Self::LimitOut)
    }
}

impl fmt::Display for FailureTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum EvmTxError {
    #[error("Gas estimation failed. Try refreshing the price or increasing max slippage")]
    EstimateFailed { tag: FailureTag, message: String },

    #[error("Transaction rejected")]
    Rejected,

    #[error("Swap failed: {message}")]
    SendFailed { tag: FailureTag, message: String },
}

impl EvmTxError {
    pub fn tag(&self) -> Option<FailureTag> {
        match self {
            Self::EstimateFailed { tag, .. } | Self::SendFailed { tag, .. } => Some(*tag),
            Self::Rejected => None,
        }
    }
}

/// `estimate + max(estimate * bps / 10000, min_margin)`, saturating at `u64::MAX`
pub fn gas_with_margin(estimate: u64, margin_bps: u64, min_margin: u64) -> u64 {
    let proportional =
        u64::try_from(estimate as u128 * margin_bps as u128 / 10_000).unwrap_or(u64::MAX);
    estimate.saturating_add(proportional.max(min_margin))
}

pub fn to_hex_quantity(value: u128) -> String {
    format!("{:#x}", value)
}

pub fn parse_hex_quantity(s: &str) -> Option<u64> {
    let digits = s.trim().strip_prefix("0x").unwrap_or(s.trim());
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

pub struct EvmTxBuilder {
    gas_margin_bps: u64,
    min_gas_margin: u64,
}

impl EvmTxBuilder {
    pub fn new(config: &EvmConfig) -> Self {
        Self {
            gas_margin_bps: config.gas_margin_bps,
            min_gas_margin: config.min_gas_margin,
        }
    }

    /// Estimate, pad, send. Returns the transaction hash.
    pub async fn send(
        &self,
        account: &str,
        signer: &dyn EvmSigner,
        contract: &str,
        encoded_data: &str,
        value: u128,
        on_response: Option<&(dyn Fn(&EvmTxResponse) + Sync)>,
    ) -> Result<String, EvmTxError> {
        let mut tx = EvmTxRequest {
            from: account.to_string(),
            to: contract.to_string(),
            data: encoded_data.to_string(),
            value: to_hex_quantity(value),
            gas: None,
        };

        let estimate = match signer.estimate_gas(&tx).await {
            Ok(estimate) => estimate,
            Err(e) => {
                let tag = FailureTag::classify(&e.message);
                error!(
                    stage = "estimate",
                    tag = %tag,
                    from = %account,
                    to = %contract,
                    value = %tx.value,
                    error = %e,
                    "Gas estimation failed"
                );
                metrics().evm_failed("estimate", tag.as_str());
                return Err(EvmTxError::EstimateFailed {
                    tag,
                    message: e.message,
                });
            }
        };

        let gas = gas_with_margin(estimate, self.gas_margin_bps, self.min_gas_margin);
        debug!(estimate, gas, "Gas limit with margin");
        tx.gas = Some(to_hex_quantity(gas as u128));

        let response = match signer.send_transaction(&tx).await {
            Ok(response) => response,
            Err(e) if e.is_rejection() => {
                debug!(from = %account, "Transaction rejected by user");
                return Err(EvmTxError::Rejected);
            }
            Err(e) => {
                let tag = FailureTag::classify(&e.message);
                error!(
                    stage = "send",
                    tag = %tag,
                    from = %account,
                    to = %contract,
                    gas,
                    error = %e,
                    "Swap transaction failed"
                );
                metrics().evm_failed("send", tag.as_str());
                return Err(EvmTxError::SendFailed {
                    tag,
                    message: e.message,
                });
            }
        };

        if let Some(hook) = on_response {
            hook(&response);
        }

        info!(hash = %response.hash, gas, "Swap transaction sent");
        Ok(response.hash)
    }
}

/// [`EvmSigner`] for a node that holds the account (`eth_sendTransaction`)
pub struct JsonRpcEvmSigner {
    http: reqwest::Client,
    rpc_url: String,
}

impl JsonRpcEvmSigner {
    pub fn new(rpc_url: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            rpc_url: rpc_url.into(),
        })
    }

    /// Signer for the configured `evm.rpc_url`
    pub fn from_config(config: &EvmConfig) -> anyhow::Result<Self> {
        match config.rpc_url.as_deref().filter(|url| !url.trim().is_empty()) {
            Some(url) => Self::new(url),
            None => anyhow::bail!("evm.rpc_url is not configured"),
        }
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn rpc_call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let resp = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::new(None, e.to_string()))?;

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::new(None, e.to_string()))?;

        if let Some(err) = json.get("error") {
            let code = err.get("code").and_then(|c| c.as_i64());
            let mut message = err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error")
                .to_string();
            // revert payloads usually ride in `data`
            if let Some(data) = err.get("data").and_then(|d| d.as_str()) {
                message = format!("{}: {}", message, data);
            }
            return Err(ProviderError::new(code, message));
        }

        json.get("result")
            .cloned()
            .ok_or_else(|| ProviderError::new(None, "missing 'result' field"))
    }
}

#[async_trait]
impl EvmSigner for JsonRpcEvmSigner {
    async fn estimate_gas(&self, tx: &EvmTxRequest) -> Result<u64, ProviderError> {
        let result = self
            .rpc_call("eth_estimateGas", serde_json::json!([tx]))
            .await?;
        result
            .as_str()
            .and_then(parse_hex_quantity)
            .ok_or_else(|| ProviderError::new(None, format!("invalid gas estimate: {}", result)))
    }

    async fn send_transaction(&self, tx: &EvmTxRequest) -> Result<EvmTxResponse, ProviderError> {
        let result = self
            .rpc_call("eth_sendTransaction", serde_json::json!([tx]))
            .await?;
        let hash = result
            .as_str()
            .ok_or_else(|| ProviderError::new(None, format!("invalid tx hash: {}", result)))?
            .to_string();
        Ok(EvmTxResponse { hash, raw: result })
    }
}
