//! Price computation tests across the curve decoder, swap extraction and
//! the SOL/USD cache

use geyser_sentinel::constants::mints::WSOL;
use geyser_sentinel::pricing::bonding_curve::{encode, BondingCurveState, BONDING_CURVE_MIN_LEN};
use geyser_sentinel::pricing::{decode_price_sol, extract_swap_price, token_flow, SolPriceCache, SolPriceSource};
use geyser_sentinel::stream::{TokenBalance, TransactionUpdate};

const MINT_A: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";
const MINT_B: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

fn curve(virtual_sol: u64, virtual_tokens: u64) -> BondingCurveState {
    BondingCurveState {
        virtual_token_reserves: virtual_tokens,
        virtual_sol_reserves: virtual_sol,
        real_token_reserves: 0,
        real_sol_reserves: 0,
        token_total_supply: 1_000_000_000_000_000,
        complete: false,
    }
}

fn balance(mint: &str, amount: &str, decimals: Option<u32>) -> TokenBalance {
    TokenBalance {
        mint: mint.to_string(),
        amount: amount.to_string(),
        decimals,
        ..Default::default()
    }
}

#[test]
fn test_fresh_curve_price() {
    // 30 SOL against 1,000,000 tokens
    let data = encode(&curve(30_000_000_000, 1_000_000_000_000));
    let price = decode_price_sol(&data).unwrap();
    assert!((price - 0.00003).abs() < 1e-12);
}

#[test]
fn test_curve_buffer_edge_cases() {
    let data = encode(&curve(30_000_000_000, 1_000_000_000_000));
    assert!(decode_price_sol(&data[..BONDING_CURVE_MIN_LEN - 1]).is_none());
    assert!(decode_price_sol(&encode(&curve(0, 1_000_000_000_000))).is_none());
    assert!(decode_price_sol(&encode(&curve(30_000_000_000, 0))).is_none());

    let mut long = data.clone();
    long.extend_from_slice(&[0xAB; 32]);
    assert_eq!(decode_price_sol(&long), decode_price_sol(&data));
}

#[test]
fn test_swap_price_picks_first_touched_mint() {
    let tx = TransactionUpdate {
        signature: "sig".to_string(),
        pre_token_balances: vec![
            balance(MINT_B, "2000000", Some(6)),
            balance(WSOL, "1000000000", Some(9)),
        ],
        post_token_balances: vec![
            balance(MINT_B, "1000000", Some(6)),
            balance(WSOL, "1500000000", Some(9)),
        ],
        ..Default::default()
    };

    // MINT_A is monitored but absent, MINT_B moved 1 token for 0.5 SOL
    let price = extract_swap_price(&tx, [MINT_A, MINT_B], WSOL, 200.0).unwrap();
    assert_eq!(price.mint, MINT_B);
    assert!((price.price_sol - 0.5).abs() < 1e-12);
    assert!((price.price_usd - 100.0).abs() < 1e-9);
    assert!((price.volume_usd - 100.0).abs() < 1e-9);

    let flow = token_flow(&tx, MINT_B).unwrap();
    assert!(flow.is_sell);
    assert_eq!(flow.token_delta, 1_000_000);
}

#[test]
fn test_swap_without_wsol_records_is_skipped() {
    let tx = TransactionUpdate {
        pre_token_balances: vec![balance(MINT_A, "10", Some(6))],
        post_token_balances: vec![balance(MINT_A, "5", Some(6))],
        ..Default::default()
    };
    assert!(extract_swap_price(&tx, [MINT_A], WSOL, 200.0).is_none());
    assert!(token_flow(&tx, MINT_B).is_none());
}

#[test]
fn test_sol_price_cache_feeds_conversion() {
    let cache = SolPriceCache::new(218.0);
    assert_eq!(cache.source(), SolPriceSource::Config);

    assert!(cache.set(150.0, SolPriceSource::Feed));
    assert!(!cache.set(f64::INFINITY, SolPriceSource::Feed));
    assert_eq!(cache.get(), 150.0);
    assert_eq!(cache.source(), SolPriceSource::Feed);

    let data = encode(&curve(30_000_000_000, 1_000_000_000_000));
    let usd = decode_price_sol(&data).unwrap() * cache.get();
    assert!((usd - 0.0045).abs() < 1e-12);
}
