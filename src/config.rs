//! Configuration for the swap engine
//!
//! Loaded from TOML, with optional `.env` / environment overrides. Fee
//! parameters are passed explicitly through [`FeeConfig`], never read from
//! ambient state.

use crate::trade::PriceImpactThresholds;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::str::FromStr;

/// Serum / OpenBook v1 order-book program
pub const DEFAULT_OPEN_ORDERS_PROGRAM: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";

/// Custom program error raised by the swap program when the realized output
/// is below the minimum (0x1771)
pub const DEFAULT_SLIPPAGE_ERROR_CODE: u32 = 6001;

/// Upper bound for `evm.gas_margin_bps` (10x the estimate)
pub const MAX_GAS_MARGIN_BPS: u64 = 100_000;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Routing service
    pub quote: QuoteConfig,

    /// Optional fee charged on every quote
    #[serde(default)]
    pub fees: Option<FeeConfig>,

    /// Solana assembly
    #[serde(default)]
    pub solana: SolanaConfig,

    /// EVM sending
    #[serde(default)]
    pub evm: EvmConfig,

    /// Price impact warning thresholds
    #[serde(default)]
    pub price_impact: PriceImpactThresholds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteConfig {
    /// Route endpoint of the routing service
    pub base_url: String,

    /// Attribution string sent as `clientData`
    #[serde(default = "default_client_data")]
    pub client_data: String,

    /// Value of the `Accept-Version` header
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// HTTP timeout in seconds
    #[serde(default = "default_quote_timeout")]
    pub timeout_secs: u64,

    /// Minimum time a quote takes, for UI smoothness
    #[serde(default)]
    pub min_loading_ms: u64,

    /// Venue used by `compare_dex`
    #[serde(default = "default_reference_venue")]
    pub reference_venue: String,
}

/// Which side of the trade the fee is taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeFeeBy {
    CurrencyIn,
    CurrencyOut,
}

impl ChargeFeeBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CurrencyIn => "currency_in",
            Self::CurrencyOut => "currency_out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    pub charge_fee_by: ChargeFeeBy,
    pub fee_receiver: String,
    /// `fee_amount` is in basis points rather than base units
    #[serde(default)]
    pub is_in_bps: bool,
    pub fee_amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolanaConfig {
    #[serde(default = "default_solana_rpc")]
    pub rpc_url: String,

    /// Order-book program owning open-orders accounts
    #[serde(default = "default_open_orders_program")]
    pub open_orders_program: String,

    /// account -> lookup table compressing it (base58 keys)
    #[serde(default)]
    pub lookup_tables: HashMap<String, String>,

    /// Custom program error meaning "slippage exceeded"
    #[serde(default = "default_slippage_error_code")]
    pub slippage_error_code: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvmConfig {
    #[serde(default)]
    pub rpc_url: Option<String>,

    /// Proportional gas buffer in basis points of the estimate
    #[serde(default = "default_gas_margin_bps")]
    pub gas_margin_bps: u64,

    /// Lower bound of the gas buffer
    #[serde(default = "default_min_gas_margin")]
    pub min_gas_margin: u64,
}

// Default value functions
fn default_client_data() -> String { "swap-engine".to_string() }
fn default_api_version() -> String { "Latest".to_string() }
fn default_quote_timeout() -> u64 { 20 }
fn default_reference_venue() -> String { "uniswap".to_string() }
fn default_solana_rpc() -> String { "https://api.mainnet-beta.solana.com".to_string() }
fn default_open_orders_program() -> String { DEFAULT_OPEN_ORDERS_PROGRAM.to_string() }
fn default_slippage_error_code() -> u32 { DEFAULT_SLIPPAGE_ERROR_CODE }
fn default_gas_margin_bps() -> u64 { 2_000 }
fn default_min_gas_margin() -> u64 { 20_000 }

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/route".to_string(),
            client_data: default_client_data(),
            api_version: default_api_version(),
            timeout_secs: default_quote_timeout(),
            min_loading_ms: 0,
            reference_venue: default_reference_venue(),
        }
    }
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_solana_rpc(),
            open_orders_program: default_open_orders_program(),
            lookup_tables: HashMap::new(),
            slippage_error_code: default_slippage_error_code(),
        }
    }
}

impl Default for EvmConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            gas_margin_bps: default_gas_margin_bps(),
            min_gas_margin: default_min_gas_margin(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quote: QuoteConfig::default(),
            fees: None,
            solana: SolanaConfig::default(),
            evm: EvmConfig::default(),
            price_impact: PriceImpactThresholds::default(),
        }
    }
}

impl SolanaConfig {
    pub fn open_orders_program_id(&self) -> anyhow::Result<Pubkey> {
        Pubkey::from_str(&self.open_orders_program)
            .with_context(|| format!("invalid open_orders_program: {}", self.open_orders_program))
    }

    /// Parsed lookup-table registry
    pub fn lookup_table_registry(&self) -> anyhow::Result<HashMap<Pubkey, Pubkey>> {
        self.lookup_tables
            .iter()
            .map(|(account, table)| {
                let account = Pubkey::from_str(account)
                    .with_context(|| format!("invalid lookup-table account key: {}", account))?;
                let table = Pubkey::from_str(table)
                    .with_context(|| format!("invalid lookup-table address: {}", table))?;
                Ok((account, table))
            })
            .collect()
    }
}

impl EngineConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: EngineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, then apply `.env` and environment overrides
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override endpoints from `SWAP_ENGINE_*` variables
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SWAP_ENGINE_QUOTE_URL") {
            self.quote.base_url = url;
        }
        if let Some(url) = lookup("SWAP_ENGINE_SOLANA_RPC") {
            self.solana.rpc_url = url;
        }
        if let Some(url) = lookup("SWAP_ENGINE_EVM_RPC") {
            self.evm.rpc_url = Some(url);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.quote.base_url.trim().is_empty() {
            anyhow::bail!("quote.base_url must not be empty");
        }
        if self.quote.timeout_secs == 0 {
            anyhow::bail!("quote.timeout_secs must be greater than 0");
        }
        if let Some(fees) = &self.fees {
            if fees.fee_receiver.trim().is_empty() {
                anyhow::bail!("fees.fee_receiver must not be empty");
            }
            if fees.fee_amount.trim().parse::<u128>().is_err() {
                anyhow::bail!("fees.fee_amount must be an integer, got {}", fees.fee_amount);
            }
        }
        if self.price_impact.high > self.price_impact.very_high {
            anyhow::bail!("price_impact.high must not exceed price_impact.very_high");
        }
        if self.evm.gas_margin_bps > MAX_GAS_MARGIN_BPS {
            anyhow::bail!(
                "evm.gas_margin_bps must not exceed {}, got {}",
                MAX_GAS_MARGIN_BPS,
                self.evm.gas_margin_bps
            );
        }
        self.solana.open_orders_program_id()?;
        self.solana.lookup_table_registry()?;
        Ok(())
    }
}
