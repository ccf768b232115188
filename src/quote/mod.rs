//! Routing-service quote client
//!
//! - **client**: `QuoteClient` (best trade, reference-venue comparison) and
//!   the last-write-wins `QuoteSession`
//! - **response**: strict serde schema of the service's JSON
//! - **compare**: reference-venue comparison result

pub mod client;
pub mod compare;
pub mod response;

pub use client::{QuoteClient, QuoteError, QuoteRequest, QuoteSession};
pub use compare::{DexComparison, TradeSaved};
