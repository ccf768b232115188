//! Priced trade value object
//!
//! A [`Trade`] is built once per quote response and never mutated afterwards;
//! a new quote produces a new `Trade`. The only interior state is the cached
//! Solana bundle slot, which is guarded by [`AssemblyState`].

use crate::tx_builder::bundle::{AssemblyState, SolanaTxBundle};
use crate::types::{CurrencyAmount, TradeType};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, signature::Keypair};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// One pool swap inside a route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Swap {
    pub pool: String,
    pub token_in: String,
    pub token_out: String,
    pub swap_amount: u128,
    pub amount_out: u128,
    pub exchange: String,
    pub pool_type: String,
    /// Venue-specific payload for indexed pools
    pub extra: Option<serde_json::Value>,
}

/// Token metadata from the quote's registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub decimals: u8,
    pub symbol: String,
}

/// Price impact of a trade in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PriceImpact {
    Known(f64),
    /// USD pricing was unavailable at quote time
    Unknown,
}

/// Warning level derived from the price impact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceImpactSeverity {
    Unknown,
    Normal,
    High,
    VeryHigh,
}

/// Thresholds, in percent, for price impact warnings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceImpactThresholds {
    #[serde(default = "default_high")]
    pub high: f64,
    #[serde(default = "default_very_high")]
    pub very_high: f64,
}

fn default_high() -> f64 {
    5.0
}
fn default_very_high() -> f64 {
    15.0
}

impl Default for PriceImpactThresholds {
    fn default() -> Self {
        Self {
            high: default_high(),
            very_high: default_very_high(),
        }
    }
}

impl PriceImpact {
    /// `(in - out) * 100 / in`, or `Unknown` when either side is missing,
    /// zero, or the result is not finite.
    pub fn from_usd(amount_in_usd: Option<f64>, amount_out_usd: Option<f64>) -> Self {
        match (amount_in_usd, amount_out_usd) {
            (Some(usd_in), Some(usd_out)) if usd_out != 0.0 && usd_in != 0.0 => {
                let impact = (usd_in - usd_out) * 100.0 / usd_in;
                if impact.is_finite() {
                    Self::Known(impact)
                } else {
                    Self::Unknown
                }
            }
            _ => Self::Unknown,
        }
    }

    /// Wire/UI representation: `-1` means unknown
    pub fn as_sentinel(&self) -> f64 {
        match self {
            Self::Known(v) => *v,
            Self::Unknown => -1.0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// `Unknown` never compares against a threshold
    pub fn severity(&self, thresholds: &PriceImpactThresholds) -> PriceImpactSeverity {
        match self {
            Self::Unknown => PriceImpactSeverity::Unknown,
            Self::Known(v) if *v > thresholds.very_high => PriceImpactSeverity::VeryHigh,
            Self::Known(v) if *v > thresholds.high => PriceImpactSeverity::High,
            Self::Known(_) => PriceImpactSeverity::Normal,
        }
    }

    /// `Some(within)` for a known impact, `None` when unknown
    pub fn within(&self, max_percent: f64) -> Option<bool> {
        match self {
            Self::Known(v) => Some(*v <= max_percent),
            Self::Unknown => None,
        }
    }
}

/// Solana-only execution context attached to a quote
#[derive(Debug)]
pub struct SolanaContext {
    /// Recipient / fee payer
    pub to: Pubkey,
    /// Ephemeral key generated at quote time; signs the swap before the user
    pub program_state: Keypair,
    /// base64 legacy message built by the routing service
    pub encoded_message: String,
    /// market -> placeholder open-orders key used inside the encoded message
    pub serum_open_orders_by_market: HashMap<Pubkey, Pubkey>,
}

/// Everything needed to build a [`Trade`]
#[derive(Debug)]
pub struct TradeParts {
    pub trade_type: TradeType,
    pub input_amount: CurrencyAmount,
    pub output_amount: CurrencyAmount,
    pub swaps: Vec<Vec<Swap>>,
    pub tokens: HashMap<String, TokenInfo>,
    pub amount_in_usd: Option<f64>,
    pub amount_out_usd: Option<f64>,
    pub received_usd: Option<f64>,
    pub gas_usd: Option<f64>,
    pub price_impact: PriceImpact,
    pub encoded_swap_data: String,
    pub router_address: String,
    pub solana: Option<SolanaContext>,
}

/// Immutable priced trade
#[derive(Debug)]
pub struct Trade {
    parts: TradeParts,
    assembly: Mutex<AssemblyState>,
}

impl Trade {
    pub fn from_parts(parts: TradeParts) -> Self {
        Self {
            parts,
            assembly: Mutex::new(AssemblyState::Unbuilt),
        }
    }

    pub fn trade_type(&self) -> TradeType {
        self.parts.trade_type
    }

    pub fn input_amount(&self) -> &CurrencyAmount {
        &self.parts.input_amount
    }

    pub fn output_amount(&self) -> &CurrencyAmount {
        &self.parts.output_amount
    }

    pub fn swaps(&self) -> &[Vec<Swap>] {
        &self.parts.swaps
    }

    pub fn tokens(&self) -> &HashMap<String, TokenInfo> {
        &self.parts.tokens
    }

    pub fn amount_in_usd(&self) -> Option<f64> {
        self.parts.amount_in_usd
    }

    pub fn amount_out_usd(&self) -> Option<f64> {
        self.parts.amount_out_usd
    }

    pub fn received_usd(&self) -> Option<f64> {
        self.parts.received_usd
    }

    pub fn gas_usd(&self) -> Option<f64> {
        self.parts.gas_usd
    }

    pub fn price_impact(&self) -> PriceImpact {
        self.parts.price_impact
    }

    pub fn encoded_swap_data(&self) -> &str {
        &self.parts.encoded_swap_data
    }

    pub fn router_address(&self) -> &str {
        &self.parts.router_address
    }

    pub fn solana(&self) -> Option<&SolanaContext> {
        self.parts.solana.as_ref()
    }

    /// Output per unit of input in human units. Display only.
    pub fn execution_price(&self) -> Option<f64> {
        let input = self.parts.input_amount.to_f64();
        if input == 0.0 {
            return None;
        }
        Some(self.parts.output_amount.to_f64() / input)
    }

    /// Every token address the route touches, sorted
    pub fn route_tokens(&self) -> BTreeSet<&str> {
        self.parts
            .swaps
            .iter()
            .flatten()
            .flat_map(|s| [s.token_in.as_str(), s.token_out.as_str()])
            .collect()
    }

    /// The cached Solana bundle, if assembly already completed
    pub fn solana_bundle(&self) -> Option<Arc<SolanaTxBundle>> {
        match &*self.assembly.lock() {
            AssemblyState::Built(bundle) => Some(Arc::clone(bundle)),
            _ => None,
        }
    }

    pub(crate) fn assembly_state(&self) -> &Mutex<AssemblyState> {
        &self.assembly
    }
}
