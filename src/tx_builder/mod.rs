//! Solana transaction assembly
//!
//! - **assembler**: `SolanaTxAssembler`, builds the setup / swap / cleanup
//!   bundle for a quoted trade
//! - **bundle**: bundle type and the per-trade assembly state machine
//! - **instructions**: open-orders, wrap/unwrap and ATA instructions plus the
//!   debug-only setup order check
//! - **message**: decoding and decompiling the routing service's legacy
//!   message, placeholder substitution, lookup-table selection
//! - **errors**: error taxonomy with retryability and metrics categories
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use solana_client::nonblocking::rpc_client::RpcClient;
//! use swap_engine::config::SolanaConfig;
//! use swap_engine::trade::Trade;
//! use swap_engine::tx_builder::{AssemblyOutcome, SolanaTxAssembler};
//!
//! # async fn example(trade: &Trade) -> anyhow::Result<()> {
//! let config = SolanaConfig::default();
//! let rpc = Arc::new(RpcClient::new(config.rpc_url.clone()));
//! let assembler = SolanaTxAssembler::new(rpc, &config)?;
//!
//! if let AssemblyOutcome::Built(bundle) = assembler.assemble(trade).await? {
//!     println!("{} transactions", bundle.transactions().len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod bundle;
pub mod errors;
pub mod instructions;
pub mod message;

pub use assembler::SolanaTxAssembler;
pub use bundle::{AssemblyOutcome, AssemblyState, SolanaTxBundle};
pub use errors::TransactionBuilderError;
