//! Reference-venue comparison ("you could have gotten X on venue Y")

use crate::trade::Trade;
use crate::types::CurrencyAmount;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DexComparison {
    pub input_amount: CurrencyAmount,
    pub output_amount: CurrencyAmount,
    pub amount_in_usd: Option<f64>,
    pub amount_out_usd: Option<f64>,
    pub received_usd: Option<f64>,
    pub compared_dex: String,
}

/// USD gained by taking the aggregated trade over the reference venue
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TradeSaved {
    pub usd: f64,
    pub percent: f64,
}

impl DexComparison {
    /// `None` when either side lacks a USD valuation
    pub fn trade_saved(&self, trade: &Trade) -> Option<TradeSaved> {
        let ours = trade.received_usd()?;
        let theirs = self.received_usd.filter(|v| *v > 0.0)?;
        let usd = ours - theirs;
        Some(TradeSaved {
            usd,
            percent: usd * 100.0 / theirs,
        })
    }
}
