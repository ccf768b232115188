//! Common types used throughout the engine
//!
//! Amounts are always integer base units (`u128`) of the currency's decimals.
//! Nothing in this module rounds.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::str::FromStr;

/// Reserved address the routing service uses for the native asset on EVM chains
pub const EVM_NATIVE_SENTINEL: &str = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE";

/// Wrapped SOL mint
pub const WRAPPED_SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Wrapped SOL mint as a [`Pubkey`]
pub fn wrapped_sol_mint() -> Pubkey {
    spl_token::native_mint::id()
}

/// Chain family and id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainId {
    /// EVM chain with its numeric chain id
    Evm(u64),
    /// Solana mainnet
    Solana,
}

impl ChainId {
    pub fn is_evm(&self) -> bool {
        matches!(self, ChainId::Evm(_))
    }

    pub fn is_solana(&self) -> bool {
        matches!(self, ChainId::Solana)
    }
}

/// Native asset or token on a chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    Native {
        chain: ChainId,
        decimals: u8,
        symbol: String,
    },
    Token {
        chain: ChainId,
        address: String,
        decimals: u8,
        symbol: String,
    },
}

impl Currency {
    pub fn native(chain: ChainId, decimals: u8, symbol: impl Into<String>) -> Self {
        Self::Native {
            chain,
            decimals,
            symbol: symbol.into(),
        }
    }

    pub fn token(
        chain: ChainId,
        address: impl Into<String>,
        decimals: u8,
        symbol: impl Into<String>,
    ) -> Self {
        Self::Token {
            chain,
            address: address.into(),
            decimals,
            symbol: symbol.into(),
        }
    }

    /// SOL with 9 decimals
    pub fn sol() -> Self {
        Self::native(ChainId::Solana, 9, "SOL")
    }

    pub fn chain(&self) -> ChainId {
        match self {
            Self::Native { chain, .. } | Self::Token { chain, .. } => *chain,
        }
    }

    pub fn decimals(&self) -> u8 {
        match self {
            Self::Native { decimals, .. } | Self::Token { decimals, .. } => *decimals,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Self::Native { symbol, .. } | Self::Token { symbol, .. } => symbol,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native { .. })
    }

    /// Address the routing service expects for this currency.
    ///
    /// Native currencies map to the EVM sentinel or the wrapped-SOL mint.
    /// Returns `None` for a token without an address. EVM addresses are
    /// lowercased; Solana keys are case-sensitive and kept as-is.
    pub fn routing_address(&self) -> Option<String> {
        match self {
            Self::Native {
                chain: ChainId::Evm(_),
                ..
            } => Some(EVM_NATIVE_SENTINEL.to_lowercase()),
            Self::Native {
                chain: ChainId::Solana,
                ..
            } => Some(WRAPPED_SOL_MINT.to_string()),
            Self::Token { address, chain, .. } => {
                let address = address.trim();
                if address.is_empty() {
                    return None;
                }
                match chain {
                    ChainId::Evm(_) => Some(address.to_lowercase()),
                    ChainId::Solana => Some(address.to_string()),
                }
            }
        }
    }

    /// Mint key for Solana currencies (wrapped SOL for the native asset)
    pub fn solana_mint(&self) -> Option<Pubkey> {
        match self {
            Self::Native {
                chain: ChainId::Solana,
                ..
            } => Some(wrapped_sol_mint()),
            Self::Token {
                chain: ChainId::Solana,
                address,
                ..
            } => Pubkey::from_str(address).ok(),
            _ => None,
        }
    }
}

/// Integer amount of a currency in base units
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyAmount {
    pub currency: Currency,
    pub raw: u128,
}

impl CurrencyAmount {
    pub fn new(currency: Currency, raw: u128) -> Self {
        Self { currency, raw }
    }

    pub fn is_zero(&self) -> bool {
        self.raw == 0
    }

    /// Lossy human-unit value, for display and price ratios only
    pub fn to_f64(&self) -> f64 {
        self.raw as f64 / 10f64.powi(self.currency.decimals() as i32)
    }
}

impl fmt::Display for CurrencyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.raw, self.currency.symbol())
    }
}

/// Which side of the trade is fixed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeType {
    ExactIn,
    ExactOut,
}

/// Exact fraction used for slippage tolerances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Percent {
    pub numerator: i128,
    pub denominator: i128,
}

impl Percent {
    pub const BIPS_BASE: i128 = 10_000;

    pub fn new(numerator: i128, denominator: i128) -> Self {
        assert!(denominator != 0, "percent denominator must be non-zero");
        Self {
            numerator,
            denominator,
        }
    }

    pub fn from_bips(bips: i128) -> Self {
        Self::new(bips, Self::BIPS_BASE)
    }

    pub fn is_negative(&self) -> bool {
        (self.numerator < 0) != (self.denominator < 0) && self.numerator != 0
    }

    /// Value in percent, lossy
    pub fn to_f64(&self) -> f64 {
        self.numerator as f64 * 100.0 / self.denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_routing_addresses() {
        let eth = Currency::native(ChainId::Evm(1), 18, "ETH");
        assert_eq!(
            eth.routing_address().as_deref(),
            Some("0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee")
        );
        assert_eq!(
            Currency::sol().routing_address().as_deref(),
            Some(WRAPPED_SOL_MINT)
        );
        assert_eq!(Currency::sol().solana_mint(), Some(wrapped_sol_mint()));
    }

    #[test]
    fn test_token_without_address_is_unresolvable() {
        let token = Currency::token(ChainId::Evm(1), "  ", 6, "USDC");
        assert!(token.routing_address().is_none());
    }

    #[test]
    fn test_solana_addresses_keep_case() {
        let mint = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
        let usdc = Currency::token(ChainId::Solana, mint, 6, "USDC");
        assert_eq!(usdc.routing_address().as_deref(), Some(mint));

        let evm = Currency::token(ChainId::Evm(1), "0xA0b8", 6, "USDC");
        assert_eq!(evm.routing_address().as_deref(), Some("0xa0b8"));
    }

    #[test]
    fn test_percent_sign() {
        assert!(!Percent::from_bips(50).is_negative());
        assert!(!Percent::from_bips(0).is_negative());
        assert!(Percent::from_bips(-1).is_negative());
        assert!(!Percent::new(-1, -100).is_negative());
    }
}
