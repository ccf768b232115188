//! Slippage bounds, route composition and price impact through the public API

use proptest::prelude::*;
use std::collections::HashMap;
use swap_engine::route::{compose_route, format_percentage};
use swap_engine::slippage::{maximum_amount_in, minimum_amount_out};
use swap_engine::trade::{PriceImpactSeverity, PriceImpactThresholds, Swap, TokenInfo, TradeParts};
use swap_engine::{ChainId, Currency, CurrencyAmount, Percent, PriceImpact, Trade, TradeType};

fn usdc() -> Currency {
    Currency::token(ChainId::Evm(1), "0xusdc", 6, "USDC")
}

fn dai() -> Currency {
    Currency::token(ChainId::Evm(1), "0xdai", 18, "DAI")
}

fn swap(pool: &str, token_in: &str, token_out: &str, amount: u128) -> Swap {
    Swap {
        pool: pool.to_string(),
        token_in: token_in.to_string(),
        token_out: token_out.to_string(),
        swap_amount: amount,
        amount_out: amount,
        exchange: "curve".to_string(),
        pool_type: "curve-stable".to_string(),
        extra: None,
    }
}

fn trade(trade_type: TradeType, input: u128, output: u128, swaps: Vec<Vec<Swap>>) -> Trade {
    Trade::from_parts(TradeParts {
        trade_type,
        input_amount: CurrencyAmount::new(usdc(), input),
        output_amount: CurrencyAmount::new(dai(), output),
        swaps,
        tokens: HashMap::from([
            ("0xusdc".to_string(), TokenInfo { decimals: 6, symbol: "USDC".into() }),
            ("0xdai".to_string(), TokenInfo { decimals: 18, symbol: "DAI".into() }),
        ]),
        amount_in_usd: Some(1000.0),
        amount_out_usd: Some(990.0),
        received_usd: Some(989.0),
        gas_usd: Some(1.0),
        price_impact: PriceImpact::from_usd(Some(1000.0), Some(990.0)),
        encoded_swap_data: "0x".to_string(),
        router_address: "0xrouter".to_string(),
        solana: None,
    })
}

#[test]
fn test_half_percent_slippage_bounds() {
    let tolerance = Percent::from_bips(50);

    let exact_in = trade(TradeType::ExactIn, 1_000_000, 1_005_000, vec![]);
    // 1_005_000 / 1.005
    assert_eq!(minimum_amount_out(&exact_in, &tolerance).raw, 1_000_000);
    assert_eq!(maximum_amount_in(&exact_in, &tolerance).raw, 1_000_000);

    let exact_out = trade(TradeType::ExactOut, 1_000_000, 2_000, vec![]);
    assert_eq!(maximum_amount_in(&exact_out, &tolerance).raw, 1_005_000);
    assert_eq!(minimum_amount_out(&exact_out, &tolerance).raw, 2_000);
}

#[test]
fn test_split_route_composition() {
    let t = trade(
        TradeType::ExactIn,
        1_000,
        1_000,
        vec![
            vec![swap("p1", "0xusdc", "0xdai", 600)],
            vec![swap("p2", "0xusdc", "0xweth", 400), swap("p3", "0xweth", "0xdai", 400)],
        ],
    );

    let composition = compose_route(&t);
    assert_eq!(composition.routes.len(), 2);
    assert_eq!(composition.input_token.unwrap().symbol.as_deref(), Some("USDC"));
    assert_eq!(composition.output_token.unwrap().address, "0xdai");

    let direct = &composition.routes[0];
    assert!((direct.swap_percentage - 60.0).abs() < 1e-9);
    assert_eq!(format_percentage(direct.display_percentage), "60%");
    assert_eq!(composition.routes[1].hops.len(), 2);
    // unknown token keeps its address only
    assert_eq!(composition.routes[1].path[1].symbol, None);
}

#[test]
fn test_price_impact_from_valuations() {
    let t = trade(TradeType::ExactIn, 1, 1, vec![]);
    let thresholds = PriceImpactThresholds::default();
    match t.price_impact() {
        PriceImpact::Known(v) => assert!((v - 1.0).abs() < 1e-9),
        PriceImpact::Unknown => panic!("impact should be known"),
    }
    assert_eq!(t.price_impact().severity(&thresholds), PriceImpactSeverity::Normal);
}

proptest! {
    #[test]
    fn prop_exact_in_minimum_never_exceeds_quote(
        output in 1u128..=u64::MAX as u128,
        bips in 0i128..=5_000,
    ) {
        let t = trade(TradeType::ExactIn, 1, output, vec![]);
        let min = minimum_amount_out(&t, &Percent::from_bips(bips)).raw;
        prop_assert!(min <= output);
        if bips == 0 {
            prop_assert_eq!(min, output);
        }
    }

    #[test]
    fn prop_exact_out_maximum_never_below_quote(
        input in 1u128..=u64::MAX as u128,
        bips in 0i128..=5_000,
    ) {
        let t = trade(TradeType::ExactOut, input, 1, vec![]);
        let max = maximum_amount_in(&t, &Percent::from_bips(bips)).raw;
        prop_assert!(max >= input);
    }
}
