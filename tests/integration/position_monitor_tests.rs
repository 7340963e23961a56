//! Position monitor tests
//!
//! Registry bookkeeping, the three price layers and the transaction
//! precedence window, driven through the in-memory transport.

use crate::common::{account, balance, settle, transaction, MockTransport, MINT, POOL, WSOL};
use async_trait::async_trait;
use geyser_sentinel::clock::ManualClock;
use geyser_sentinel::config::{
    AppConfig, DetectionConfig, FallbackConfig, HealthConfig, HooksConfig, MetadataConfig, PositionConfig,
    StreamConfig,
};
use geyser_sentinel::constants::filters;
use geyser_sentinel::context::SentinelContext;
use geyser_sentinel::derivation::{derive_bonding_curve, DexKind};
use geyser_sentinel::detection::metadata::{derive_metadata_pda, encode_metadata_account};
use geyser_sentinel::error::PriceApiError;
use geyser_sentinel::monitoring::{MonitoredPosition, PositionMonitor, PriceLookup, PriceSource};
use geyser_sentinel::pricing::bonding_curve::{encode, BondingCurveState};
use geyser_sentinel::stream::{Commitment, TransactionUpdate};
use parking_lot::Mutex;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const START_MS: i64 = 1_700_000_000_000;

struct MockLookup {
    calls: Mutex<Vec<String>>,
    price: Mutex<Result<f64, PriceApiError>>,
}

#[async_trait]
impl PriceLookup for MockLookup {
    async fn fetch_price_usd(&self, mint: &str) -> Result<f64, PriceApiError> {
        self.calls.lock().push(mint.to_string());
        self.price.lock().clone()
    }
}

struct Harness {
    monitor: PositionMonitor,
    transport: Arc<MockTransport>,
    clock: Arc<ManualClock>,
    lookup: Arc<MockLookup>,
    ctx: Arc<SentinelContext>,
    prices: Arc<Mutex<Vec<(String, f64)>>>,
}

fn config() -> AppConfig {
    AppConfig {
        stream: StreamConfig {
            endpoint: "http://127.0.0.1:10000".to_string(),
            x_token: None,
            commitment: Commitment::Processed,
            connect_timeout_secs: 5,
        },
        detection: DetectionConfig::default(),
        position: PositionConfig::default(),
        fallback: FallbackConfig::default(),
        health: HealthConfig::default(),
        metadata: MetadataConfig::default(),
        hooks: HooksConfig::default(),
    }
}

fn harness() -> Harness {
    let clock = ManualClock::new(START_MS);
    let ctx = SentinelContext::with_clock(config(), clock.clone());
    let transport = MockTransport::new();
    let lookup = Arc::new(MockLookup {
        calls: Mutex::new(Vec::new()),
        price: Mutex::new(Ok(0.5)),
    });
    let monitor = PositionMonitor::new(ctx.clone(), transport.clone(), lookup.clone());

    let prices = Arc::new(Mutex::new(Vec::new()));
    let sink = prices.clone();
    monitor.on_price_update(move |mint, price_usd| sink.lock().push((mint.to_string(), price_usd)));

    Harness {
        monitor,
        transport,
        clock,
        lookup,
        ctx,
        prices,
    }
}

fn position(dex: DexKind) -> MonitoredPosition {
    MonitoredPosition {
        mint: MINT.to_string(),
        pool_address: POOL.to_string(),
        entry_price_sol: 0.02,
        entry_price_usd: 4.36,
        token_amount: 1_000.0,
        entry_time_ms: START_MS,
        dex,
    }
}

/// 100 tokens (6 decimals) for 3 SOL
fn swap_tx(signature: &str) -> TransactionUpdate {
    TransactionUpdate {
        signature: signature.to_string(),
        pre_token_balances: vec![balance(MINT, 1_000_000_000, 6), balance(WSOL, 10_000_000_000, 9)],
        post_token_balances: vec![balance(MINT, 900_000_000, 6), balance(WSOL, 13_000_000_000, 9)],
        ..Default::default()
    }
}

/// 30 SOL against 1,000,000 tokens
fn curve_data() -> Vec<u8> {
    encode(&BondingCurveState {
        virtual_token_reserves: 1_000_000_000_000,
        virtual_sol_reserves: 30_000_000_000,
        real_token_reserves: 800_000_000_000,
        real_sol_reserves: 0,
        token_total_supply: 1_000_000_000_000_000,
        complete: false,
    })
}

fn curve_address() -> String {
    derive_bonding_curve(MINT).unwrap().to_string()
}

#[tokio::test(start_paused = true)]
async fn test_add_position_is_idempotent() {
    let h = harness();
    assert!(h.monitor.add_position(position(DexKind::PumpFun)).await);
    assert!(h.monitor.add_position(position(DexKind::PumpFun)).await);

    let targets = h.monitor.subscription_targets();
    assert_eq!(targets.pools, vec![POOL.to_string()]);
    assert_eq!(targets.bonding_curves, vec![curve_address()]);

    let snapshot = h.monitor.get_current_price(MINT).unwrap();
    assert_eq!(snapshot.source, PriceSource::Initial);
    assert_eq!(snapshot.current_price_usd, 4.36);
    assert_eq!(h.monitor.get_all_prices().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_mint_rejected() {
    let h = harness();
    let mut bad = position(DexKind::Raydium);
    bad.mint = "not-a-mint".to_string();
    assert!(!h.monitor.add_position(bad).await);
    assert!(h.monitor.subscription_targets().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_add_then_remove_leaves_no_targets() {
    let h = harness();
    h.monitor.start().await.unwrap();

    assert!(h.monitor.add_position(position(DexKind::PumpFun)).await);
    h.monitor.remove_position(MINT).await;

    assert!(h.monitor.subscription_targets().is_empty());
    assert!(h.monitor.get_current_price(MINT).is_none());
    assert!(h.monitor.is_running());

    // one rewrite for the add, none for removing the last position
    let requests = h.transport.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].accounts.contains_key(filters::BONDING_CURVE_MONITOR));

    h.monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_running_monitor_rewrites_subscription() {
    let h = harness();
    h.monitor.add_position(position(DexKind::Raydium)).await;
    h.monitor.start().await.unwrap();

    let initial = h.transport.last_request().unwrap();
    assert_eq!(initial.accounts[filters::POOL_MONITOR].account, vec![POOL.to_string()]);
    assert!(!initial.accounts.contains_key(filters::BONDING_CURVE_MONITOR));

    h.monitor.add_position(position(DexKind::PumpFun)).await;
    let rewritten = h.transport.last_request().unwrap();
    assert_eq!(
        rewritten.accounts[filters::BONDING_CURVE_MONITOR].account,
        vec![curve_address()]
    );
    assert_eq!(h.transport.connect_count(), 1);

    h.monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_missing_pool_address_uses_derived_pool() {
    let h = harness();
    let mut raydium = position(DexKind::Raydium);
    raydium.pool_address = String::new();
    assert!(h.monitor.add_position(raydium).await);
    assert_eq!(h.monitor.get_position(MINT).unwrap().pool_address, MINT);

    h.monitor.start().await.unwrap();
    let request = h.transport.last_request().unwrap();
    assert_eq!(request.accounts[filters::POOL_MONITOR].account, vec![MINT.to_string()]);
    assert_eq!(
        request.transactions[filters::SWAP_MONITOR].account_include,
        vec![MINT.to_string()]
    );
    assert!(request.accounts.values().all(|f| !f.account.is_empty()));
    assert!(request.transactions.values().all(|f| !f.account_include.is_empty()));

    let mut pumpfun = position(DexKind::PumpFun);
    pumpfun.pool_address = "not-a-pool".to_string();
    assert!(h.monitor.add_position(pumpfun).await);
    assert_eq!(h.monitor.get_position(MINT).unwrap().pool_address, curve_address());

    h.monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_swap_transaction_updates_price_and_health() {
    let h = harness();
    h.monitor.add_position(position(DexKind::PumpFun)).await;
    h.monitor.start().await.unwrap();

    h.transport.push(transaction(filters::SWAP_MONITOR, swap_tx("sig-1")));
    settle().await;

    let snapshot = h.monitor.get_current_price(MINT).unwrap();
    assert_eq!(snapshot.source, PriceSource::Transaction("sig-1".to_string()));
    assert!((snapshot.current_price_sol - 0.03).abs() < 1e-12);
    assert!((snapshot.current_price_usd - 0.03 * 218.0).abs() < 1e-9);

    let prices = h.prices.lock().clone();
    assert_eq!(prices.len(), 1);
    assert_eq!(prices[0].0, MINT);

    let activity = h.ctx.health.activity(MINT).unwrap();
    assert_eq!(activity.swap_count_1m, 1);
    assert!((activity.volume_1m - 3.0 * 218.0).abs() < 1e-9);

    h.monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_transaction_wins_over_account_inside_window() {
    let h = harness();
    h.monitor.add_position(position(DexKind::PumpFun)).await;
    h.monitor.start().await.unwrap();

    h.transport.push(transaction(filters::SWAP_MONITOR, swap_tx("sig-1")));
    settle().await;

    h.clock.advance(999);
    h.transport.push(account(filters::BONDING_CURVE_MONITOR, &curve_address(), curve_data()));
    settle().await;

    let snapshot = h.monitor.get_current_price(MINT).unwrap();
    assert_eq!(snapshot.source, PriceSource::Transaction("sig-1".to_string()));
    assert_eq!(h.prices.lock().len(), 1);

    h.clock.advance(1);
    h.transport.push(account(filters::BONDING_CURVE_MONITOR, &curve_address(), curve_data()));
    settle().await;

    let snapshot = h.monitor.get_current_price(MINT).unwrap();
    assert_eq!(snapshot.source, PriceSource::BondingCurveAccount);
    assert!((snapshot.current_price_sol - 0.00003).abs() < 1e-12);
    assert_eq!(h.prices.lock().len(), 2);

    h.monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_malformed_curve_keeps_last_price() {
    let h = harness();
    h.monitor.add_position(position(DexKind::PumpFun)).await;
    h.monitor.start().await.unwrap();

    h.transport.push(account(filters::BONDING_CURVE_MONITOR, &curve_address(), vec![0u8; 20]));
    let mut empty = curve_data();
    empty[16..24].copy_from_slice(&0u64.to_le_bytes());
    h.transport.push(account(filters::BONDING_CURVE_MONITOR, &curve_address(), empty));
    settle().await;

    let snapshot = h.monitor.get_current_price(MINT).unwrap();
    assert_eq!(snapshot.source, PriceSource::Initial);
    assert_eq!(snapshot.current_price_sol, 0.02);
    assert!(h.prices.lock().is_empty());
    assert!(h.monitor.is_running());

    h.monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_metadata_account_goes_to_cache() {
    let h = harness();
    h.monitor.add_position(position(DexKind::PumpFun)).await;
    h.monitor.start().await.unwrap();

    let pda = derive_metadata_pda(MINT).unwrap().to_string();
    let mint = Pubkey::from_str(MINT).unwrap();
    h.transport.push(account(filters::POOL_MONITOR, &pda, encode_metadata_account(&mint, "Bonk", "BONK")));
    settle().await;

    assert_eq!(h.ctx.metadata.get(MINT).unwrap().symbol, "BONK");
    assert_eq!(h.monitor.get_current_price(MINT).unwrap().source, PriceSource::Initial);

    h.monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stale_position_uses_fallback_once_per_cycle() {
    let h = harness();
    h.monitor.add_position(position(DexKind::Raydium)).await;
    h.monitor.start().await.unwrap();

    h.clock.advance(10_001);
    tokio::time::sleep(Duration::from_millis(10_100)).await;

    assert_eq!(h.lookup.calls.lock().len(), 1);
    let snapshot = h.monitor.get_current_price(MINT).unwrap();
    assert_eq!(snapshot.source, PriceSource::ApiFallback);
    assert_eq!(snapshot.current_price_usd, 0.5);
    assert!((snapshot.current_price_sol - 0.5 / 218.0).abs() < 1e-12);

    h.monitor.stop().await;
    h.clock.advance(60_000);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.lookup.calls.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_fallback_keeps_last_price() {
    let h = harness();
    *h.lookup.price.lock() = Err(PriceApiError::RateLimited);
    h.monitor.add_position(position(DexKind::Raydium)).await;
    h.monitor.start().await.unwrap();

    h.clock.advance(10_001);
    tokio::time::sleep(Duration::from_millis(10_100)).await;
    assert_eq!(h.lookup.calls.lock().len(), 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.lookup.calls.lock().len(), 2);

    let snapshot = h.monitor.get_current_price(MINT).unwrap();
    assert_eq!(snapshot.source, PriceSource::Initial);
    assert_eq!(snapshot.current_price_usd, 4.36);

    h.monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stats_count_updated_prices() {
    let h = harness();
    h.monitor.add_position(position(DexKind::PumpFun)).await;

    let stats = h.monitor.get_stats();
    assert_eq!(stats.total_positions, 1);
    assert_eq!(stats.prices_updated, 0);
    assert_eq!(stats.oldest_update_ms, Some(START_MS));

    h.monitor.start().await.unwrap();
    h.clock.advance(2_000);
    h.transport.push(transaction(filters::SWAP_MONITOR, swap_tx("sig-1")));
    settle().await;

    let stats = h.monitor.get_stats();
    assert_eq!(stats.prices_updated, 1);
    assert_eq!(stats.newest_update_ms, Some(START_MS + 2_000));

    h.monitor.stop().await;
    h.monitor.stop().await;
    assert!(!h.monitor.is_running());
}
