//! Display-oriented route composition
//!
//! Turns `trade.swaps` into ordered token paths with parallel pool edges per
//! hop. Percentages are cosmetic: nothing here feeds back into execution
//! amounts.

use crate::trade::{Swap, TokenInfo, Trade};
use serde::Serialize;
use std::collections::HashMap;

/// Lowest / highest percentage shown for a route that shares the flow
pub const MIN_SPLIT_PERCENT: f64 = 0.01;
pub const MAX_SPLIT_PERCENT: f64 = 99.99;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenNode {
    pub address: String,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolEdge {
    pub id: String,
    pub exchange: String,
    pub swap_amount: u128,
    /// Share of this hop's input routed through the pool
    pub swap_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hop {
    pub pools: Vec<PoolEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposedRoute {
    /// First is the input token, last the output token
    pub path: Vec<TokenNode>,
    /// `hops[i]` connects `path[i]` and `path[i + 1]`
    pub hops: Vec<Hop>,
    /// Computed share of the trade input
    pub swap_percentage: f64,
    /// What the UI shows: pinned to 100 or clamped to the split range
    pub display_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteComposition {
    /// `None` only when there is no route at all
    pub input_token: Option<TokenNode>,
    pub output_token: Option<TokenNode>,
    pub routes: Vec<ComposedRoute>,
}

/// Compose the display route for a trade
pub fn compose_route(trade: &Trade) -> RouteComposition {
    compose(trade.swaps(), trade.tokens(), trade.input_amount().raw)
}

/// Compose from raw route groups. Routes with an identical token path merge,
/// so their pools become parallel edges of the same hop.
pub fn compose(
    swaps: &[Vec<Swap>],
    tokens: &HashMap<String, TokenInfo>,
    total_input: u128,
) -> RouteComposition {
    struct Draft {
        path: Vec<String>,
        hops: Vec<Vec<(String, String, u128)>>,
        input: u128,
    }

    let mut drafts: Vec<Draft> = Vec::new();
    let mut by_slug: HashMap<String, usize> = HashMap::new();

    for route in swaps.iter().filter(|r| !r.is_empty()) {
        let mut path = Vec::with_capacity(route.len() + 1);
        path.push(route[0].token_in.clone());
        path.extend(route.iter().map(|s| s.token_out.clone()));
        let slug = path.join("-");

        let idx = *by_slug.entry(slug).or_insert_with(|| {
            drafts.push(Draft {
                path,
                hops: vec![Vec::new(); route.len()],
                input: 0,
            });
            drafts.len() - 1
        });

        let draft = &mut drafts[idx];
        draft.input = draft.input.saturating_add(route[0].swap_amount);
        for (hop, swap) in draft.hops.iter_mut().zip(route) {
            match hop.iter_mut().find(|(pool, _, _)| *pool == swap.pool) {
                Some(existing) => existing.2 = existing.2.saturating_add(swap.swap_amount),
                None => hop.push((swap.pool.clone(), swap.exchange.clone(), swap.swap_amount)),
            }
        }
    }

    let total = if total_input > 0 {
        total_input
    } else {
        drafts.iter().map(|d| d.input).sum()
    };
    let single = drafts.len() == 1;
    let input_token = drafts
        .first()
        .and_then(|d| d.path.first())
        .map(|a| token_node(a, tokens));
    let output_token = drafts
        .first()
        .and_then(|d| d.path.last())
        .map(|a| token_node(a, tokens));

    let routes = drafts
        .into_iter()
        .map(|draft| {
            let swap_percentage = percentage(draft.input, total);
            let display_percentage = if single {
                100.0
            } else {
                swap_percentage.clamp(MIN_SPLIT_PERCENT, MAX_SPLIT_PERCENT)
            };
            let hops = draft
                .hops
                .into_iter()
                .map(|pools| {
                    let hop_total: u128 = pools.iter().map(|p| p.2).sum();
                    Hop {
                        pools: pools
                            .into_iter()
                            .map(|(id, exchange, swap_amount)| PoolEdge {
                                swap_percentage: percentage(swap_amount, hop_total),
                                id,
                                exchange,
                                swap_amount,
                            })
                            .collect(),
                    }
                })
                .collect();
            ComposedRoute {
                path: draft.path.iter().map(|a| token_node(a, tokens)).collect(),
                hops,
                swap_percentage,
                display_percentage,
            }
        })
        .collect();

    RouteComposition {
        input_token,
        output_token,
        routes,
    }
}

/// Display string, e.g. `"42.5%"`
pub fn format_percentage(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    format!("{}%", rounded)
}

fn percentage(part: u128, total: u128) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 * 100.0 / total as f64
}

fn token_node(address: &str, tokens: &HashMap<String, TokenInfo>) -> TokenNode {
    let info = tokens
        .get(address)
        .or_else(|| tokens.get(&address.to_lowercase()));
    TokenNode {
        address: address.to_string(),
        symbol: info.map(|t| t.symbol.clone()),
        decimals: info.map(|t| t.decimals),
    }
}
