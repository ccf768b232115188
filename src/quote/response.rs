//! Typed schema of the routing service responses
//!
//! Decoding fails closed: a missing required field, a wrong type or a
//! malformed amount is a decode error, never a partially-filled value.

use crate::trade::{Swap, TokenInfo};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

/// Base-unit amount sent either as a decimal string or a JSON integer
fn de_amount<'de, D>(deserializer: D) -> Result<u128, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s.trim().parse::<u128>().map_err(serde::de::Error::custom),
        Raw::Int(n) => Ok(u128::from(n)),
    }
}

/// USD valuations arrive as numbers or numeric strings
fn de_usd<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Str(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Num(n)) => Ok(Some(n)),
        Some(Raw::Str(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Str(s)) => s.trim().parse::<f64>().map(Some).map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapResponse {
    pub pool: String,
    pub token_in: String,
    pub token_out: String,
    #[serde(deserialize_with = "de_amount")]
    pub swap_amount: u128,
    #[serde(deserialize_with = "de_amount")]
    pub amount_out: u128,
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub pool_type: String,
    #[serde(default)]
    pub extra: Option<serde_json::Value>,
}

impl From<SwapResponse> for Swap {
    fn from(s: SwapResponse) -> Self {
        Self {
            pool: s.pool,
            token_in: s.token_in,
            token_out: s.token_out,
            swap_amount: s.swap_amount,
            amount_out: s.amount_out,
            exchange: s.exchange,
            pool_type: s.pool_type,
            extra: s.extra,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub decimals: u8,
    #[serde(default)]
    pub symbol: String,
}

impl From<TokenResponse> for TokenInfo {
    fn from(t: TokenResponse) -> Self {
        Self {
            decimals: t.decimals,
            symbol: t.symbol,
        }
    }
}

/// Full aggregator route response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    #[serde(deserialize_with = "de_amount")]
    pub input_amount: u128,
    #[serde(deserialize_with = "de_amount")]
    pub output_amount: u128,
    #[serde(default, deserialize_with = "de_usd")]
    pub amount_in_usd: Option<f64>,
    #[serde(default, deserialize_with = "de_usd")]
    pub amount_out_usd: Option<f64>,
    #[serde(default, deserialize_with = "de_usd")]
    pub received_usd: Option<f64>,
    #[serde(default, deserialize_with = "de_usd")]
    pub gas_usd: Option<f64>,
    pub swaps: Vec<Vec<SwapResponse>>,
    #[serde(default)]
    pub tokens: HashMap<String, TokenResponse>,
    #[serde(default)]
    pub encoded_swap_data: String,
    #[serde(default)]
    pub router_address: String,
    #[serde(default)]
    pub encoded_message: Option<String>,
    #[serde(default)]
    pub serum_open_orders_account_by_market: Option<HashMap<String, String>>,
}

/// Why a decoded response was still rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    ZeroAmount,
    EmptySwaps,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ZeroAmount => "zero_amount",
            Self::EmptySwaps => "empty_swaps",
        }
    }
}

impl QuoteResponse {
    /// Post-decode checks the schema alone cannot express
    pub fn check(&self) -> Result<(), Rejection> {
        if self.input_amount == 0 || self.output_amount == 0 {
            return Err(Rejection::ZeroAmount);
        }
        match self.swaps.first() {
            Some(first) if !first.is_empty() => Ok(()),
            _ => Err(Rejection::EmptySwaps),
        }
    }
}

/// Narrower response used for the reference-venue comparison
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResponse {
    #[serde(deserialize_with = "de_amount")]
    pub input_amount: u128,
    #[serde(deserialize_with = "de_amount")]
    pub output_amount: u128,
    #[serde(default, deserialize_with = "de_usd")]
    pub amount_in_usd: Option<f64>,
    #[serde(default, deserialize_with = "de_usd")]
    pub amount_out_usd: Option<f64>,
    #[serde(default, deserialize_with = "de_usd")]
    pub received_usd: Option<f64>,
}
