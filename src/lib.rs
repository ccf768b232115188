//! Swap Engine - cross-chain swap quoting and execution library
//!
//! Quotes exact-input trades from a routing aggregator, derives slippage
//! bounds and route diagrams, and executes trades on EVM chains (one router
//! call) and Solana (setup / swap / cleanup bundle).

pub mod compat;
pub mod config;
pub mod evm;
pub mod metrics;
pub mod observability;
pub mod quote;
pub mod route;
pub mod rpc;
pub mod sender;
pub mod slippage;
pub mod trade;
pub mod tx_builder;
pub mod types;
pub mod wallet;

// Mocks and fixtures for tests and downstream integration suites
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::EngineConfig;
pub use quote::{QuoteClient, QuoteRequest, QuoteSession};
pub use sender::{SendError, SwapStage, TxSender};
pub use trade::{PriceImpact, Trade};
pub use tx_builder::{AssemblyOutcome, SolanaTxAssembler, SolanaTxBundle};
pub use types::{ChainId, Currency, CurrencyAmount, Percent, TradeType};
