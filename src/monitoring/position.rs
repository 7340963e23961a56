//! Real-time position price monitoring
//!
//! Three price layers feed one snapshot table:
//! - swap transactions on the monitored pools (authoritative)
//! - bonding-curve account writes for Pump.fun positions, ignored for a
//!   short window after a transaction price
//! - REST fallback for mints that went quiet
//!
//! Registry mutation and target computation happen under one lock, so a
//! subscription rewrite always reflects the newest registry.

use crate::constants::filters;
use crate::context::SentinelContext;
use crate::derivation::{
    derive_bonding_curve, derive_pool_address, is_reliable, is_valid_address, validate_pubkeys, DexKind,
};
use crate::detection::is_metadata_account;
use crate::error::StreamError;
use crate::monitoring::fallback::{FallbackPoller, FallbackTarget, PriceLookup};
use crate::pricing::{extract_swap_price, BondingCurveState, SwapPrice};
use crate::stream::{
    position_request, AccountUpdate, SessionState, StreamSession, StreamUpdate, SubscriptionSource,
    TransactionUpdate, Transport, UpdateHandler, UpdatePayload,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use yellowstone_grpc_proto::prelude::SubscribeRequest;

/// An open position handed over by the trading side
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoredPosition {
    pub mint: String,
    pub pool_address: String,
    pub entry_price_sol: f64,
    pub entry_price_usd: f64,
    pub token_amount: f64,
    pub entry_time_ms: i64,
    pub dex: DexKind,
}

/// Origin of the current price
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Entry price, nothing observed yet
    Initial,
    /// Executed swap, carries the signature
    Transaction(String),
    /// Bonding-curve reserves
    BondingCurveAccount,
    /// REST fallback
    ApiFallback,
}

impl PriceSource {
    pub fn is_transaction(&self) -> bool {
        matches!(self, Self::Transaction(_))
    }
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Transaction(signature) => write!(f, "{}", signature),
            Self::BondingCurveAccount => write!(f, "bonding-curve-account"),
            Self::ApiFallback => write!(f, "api-fallback"),
        }
    }
}

/// Latest known price of a monitored mint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSnapshot {
    pub mint: String,
    pub pool_address: String,
    pub current_price_sol: f64,
    pub current_price_usd: f64,
    pub last_update_ms: i64,
    pub source: PriceSource,
    /// Swap volume of the last transaction update
    pub volume_usd: Option<f64>,
    pub dex: DexKind,
}

/// Monitoring statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PositionStats {
    pub total_positions: usize,
    /// Snapshots moved off the entry price
    pub prices_updated: usize,
    pub oldest_update_ms: Option<i64>,
    pub newest_update_ms: Option<i64>,
}

/// Addresses the position stream subscribes to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionTargets {
    pub pools: Vec<String>,
    pub bonding_curves: Vec<String>,
}

impl SubscriptionTargets {
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty() && self.bonding_curves.is_empty()
    }
}

/// Callback for accepted price changes: `(mint, price_usd)`
pub type PriceCallback = Arc<dyn Fn(&str, f64) + Send + Sync>;

#[derive(Default)]
struct PositionBook {
    positions: HashMap<String, MonitoredPosition>,
    snapshots: HashMap<String, PriceSnapshot>,
    /// mint -> bonding curve
    curves: HashMap<String, String>,
    /// bonding curve -> mint
    curve_owners: HashMap<String, String>,
    last_update: HashMap<String, i64>,
    last_curve_log: HashMap<String, i64>,
}

impl PositionBook {
    fn targets(&self) -> SubscriptionTargets {
        let pools: BTreeSet<&String> = self.positions.values().map(|p| &p.pool_address).collect();
        let curves: BTreeSet<&String> = self.curves.values().collect();
        SubscriptionTargets {
            pools: pools.into_iter().cloned().collect(),
            bonding_curves: curves.into_iter().cloned().collect(),
        }
    }

    fn remove(&mut self, mint: &str) -> bool {
        let existed = self.positions.remove(mint).is_some();
        self.snapshots.remove(mint);
        if let Some(curve) = self.curves.remove(mint) {
            self.curve_owners.remove(&curve);
        }
        self.last_update.remove(mint);
        self.last_curve_log.remove(mint);
        existed
    }
}

struct PositionCore {
    ctx: Arc<SentinelContext>,
    book: RwLock<PositionBook>,
    callback: RwLock<Option<PriceCallback>>,
}

impl PositionCore {
    fn notify(&self, snapshot: &PriceSnapshot) {
        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            callback(&snapshot.mint, snapshot.current_price_usd);
        }
        self.ctx.observer.on_price_update(snapshot);
    }

    fn on_transaction(&self, tx: &TransactionUpdate) {
        let mints: Vec<String> = self.book.read().positions.keys().cloned().collect();
        if mints.is_empty() {
            return;
        }

        let sol_price = self.ctx.sol_price.get();
        let wsol = &self.ctx.config.detection.wsol_mint;
        let Some(swap) = extract_swap_price(tx, mints.iter().map(String::as_str), wsol, sol_price) else {
            return;
        };

        let Some(snapshot) = self.apply_swap(&swap) else {
            return;
        };

        if swap.volume_usd > 0.0 {
            self.ctx.health.record_swap(&swap.mint, swap.volume_usd);
        }

        tracing::debug!(
            mint = %swap.mint,
            price_usd = swap.price_usd,
            price_sol = swap.price_sol,
            signature = %swap.signature,
            "Swap price update"
        );
        self.notify(&snapshot);
    }

    fn apply_swap(&self, swap: &SwapPrice) -> Option<PriceSnapshot> {
        let now = self.ctx.now_ms();
        let mut book = self.book.write();
        let snapshot = book.snapshots.get_mut(&swap.mint)?;
        snapshot.current_price_sol = swap.price_sol;
        snapshot.current_price_usd = swap.price_usd;
        snapshot.last_update_ms = now;
        snapshot.source = PriceSource::Transaction(swap.signature.clone());
        snapshot.volume_usd = Some(swap.volume_usd);
        let snapshot = snapshot.clone();
        book.last_update.insert(swap.mint.clone(), now);
        Some(snapshot)
    }

    fn on_account(&self, account: &AccountUpdate) {
        if is_metadata_account(&account.data) {
            if let Some(metadata) = self.ctx.metadata.ingest_account(&account.pubkey, &account.data) {
                tracing::debug!(
                    account = %account.pubkey,
                    symbol = %metadata.symbol,
                    "Metadata account cached"
                );
            }
            return;
        }

        let Some(mint) = self.book.read().curve_owners.get(&account.pubkey).cloned() else {
            return;
        };

        let Some(price_sol) = BondingCurveState::decode(&account.data).and_then(|s| s.price_sol()) else {
            tracing::debug!(mint = %mint, len = account.data.len(), "Discarded bonding curve update");
            return;
        };

        if let Some(snapshot) = self.apply_curve_price(&mint, price_sol) {
            self.notify(&snapshot);
        }
    }

    /// Store a bonding-curve price unless a transaction price is still fresh
    fn apply_curve_price(&self, mint: &str, price_sol: f64) -> Option<PriceSnapshot> {
        let now = self.ctx.now_ms();
        let window = self.ctx.config.position.precedence_window_ms;
        let log_interval = self.ctx.config.position.price_log_interval_ms;
        let price_usd = price_sol * self.ctx.sol_price.get();

        let mut book = self.book.write();
        let snapshot = book.snapshots.get_mut(mint)?;

        let age = now - snapshot.last_update_ms;
        if snapshot.source.is_transaction() && age < window {
            tracing::trace!(mint = %mint, age_ms = age, "Skipping account update, recent transaction price");
            return None;
        }

        snapshot.current_price_sol = price_sol;
        snapshot.current_price_usd = price_usd;
        snapshot.last_update_ms = now;
        snapshot.source = PriceSource::BondingCurveAccount;
        let snapshot = snapshot.clone();
        book.last_update.insert(mint.to_string(), now);

        let last_log = book.last_curve_log.get(mint).copied().unwrap_or(i64::MIN / 2);
        if now - last_log > log_interval {
            tracing::info!(mint = %mint, price_usd, price_sol, "Bonding curve price update");
            book.last_curve_log.insert(mint.to_string(), now);
        }

        Some(snapshot)
    }
}

impl SubscriptionSource for PositionCore {
    fn subscription_request(&self) -> Option<SubscribeRequest> {
        let targets = self.book.read().targets();
        if validate_pubkeys(&targets.pools, "pool").is_empty() {
            return None;
        }
        Some(position_request(
            &targets.pools,
            &targets.bonding_curves,
            self.ctx.config.stream.commitment,
        ))
    }
}

impl UpdateHandler for PositionCore {
    fn handle_update(&self, update: StreamUpdate) {
        match &update.payload {
            UpdatePayload::Transaction(tx) if update.matches_filter(filters::SWAP_MONITOR) => {
                self.on_transaction(tx)
            }
            UpdatePayload::Account(account) => self.on_account(account),
            _ => {}
        }
    }
}

impl FallbackTarget for PositionCore {
    fn stale_mints(&self, now_ms: i64, stale_after_ms: i64) -> Vec<String> {
        self.book
            .read()
            .last_update
            .iter()
            .filter(|(_, updated)| now_ms - **updated > stale_after_ms)
            .map(|(mint, _)| mint.clone())
            .collect()
    }

    fn is_monitored(&self, mint: &str) -> bool {
        self.book.read().positions.contains_key(mint)
    }

    fn apply_fallback_price(&self, mint: &str, price_usd: f64, stale_before_ms: i64) -> bool {
        let now = self.ctx.now_ms();
        let sol_price = self.ctx.sol_price.get();

        let snapshot = {
            let mut book = self.book.write();
            if book.last_update.get(mint).is_some_and(|t| *t >= stale_before_ms) {
                return false;
            }
            let Some(snapshot) = book.snapshots.get_mut(mint) else {
                return false;
            };
            snapshot.current_price_usd = price_usd;
            snapshot.current_price_sol = price_usd / sol_price;
            snapshot.last_update_ms = now;
            snapshot.source = PriceSource::ApiFallback;
            let snapshot = snapshot.clone();
            book.last_update.insert(mint.to_string(), now);
            snapshot
        };

        self.notify(&snapshot);
        true
    }
}

/// Position price monitor
pub struct PositionMonitor {
    core: Arc<PositionCore>,
    session: Arc<StreamSession>,
    poller: Arc<FallbackPoller>,
    tasks: Mutex<Option<CancellationToken>>,
}

impl PositionMonitor {
    pub fn new(ctx: Arc<SentinelContext>, transport: Arc<dyn Transport>, lookup: Arc<dyn PriceLookup>) -> Self {
        let fallback = &ctx.config.fallback;
        let poller = Arc::new(FallbackPoller::new(
            lookup,
            ctx.clock.clone(),
            fallback.stale_after_ms,
            Duration::from_millis(fallback.request_spacing_ms),
        ));
        let policy = ctx.config.position.reconnect.clone();

        let core = Arc::new(PositionCore {
            ctx,
            book: RwLock::new(PositionBook::default()),
            callback: RwLock::new(None),
        });
        let session = StreamSession::new("position-monitor", transport, core.clone(), core.clone(), policy);

        Self {
            core,
            session,
            poller,
            tasks: Mutex::new(None),
        }
    }

    /// Register the price callback, replacing any previous one
    pub fn on_price_update<F>(&self, callback: F)
    where
        F: Fn(&str, f64) + Send + Sync + 'static,
    {
        *self.core.callback.write() = Some(Arc::new(callback));
    }

    /// Start tracking a position
    ///
    /// Returns false for a malformed mint. A malformed pool address is
    /// replaced by the derived one. Adding the same mint again replaces the
    /// entry without duplicating subscription targets.
    pub async fn add_position(&self, mut position: MonitoredPosition) -> bool {
        if !is_valid_address(&position.mint) {
            tracing::error!(mint = %position.mint, "Refusing to monitor invalid mint");
            return false;
        }

        if !is_valid_address(&position.pool_address) {
            let info = derive_pool_address(&position.mint, position.dex, None);
            tracing::warn!(
                mint = %position.mint,
                given = %position.pool_address,
                derived = %info.pool_address,
                method = ?info.derivation_method,
                reliable = is_reliable(&info),
                "Invalid pool address, using derived pool"
            );
            position.pool_address = info.pool_address;
        }

        let now = self.core.ctx.now_ms();
        {
            let mut book = self.core.book.write();

            if let Some(old_curve) = book.curves.remove(&position.mint) {
                book.curve_owners.remove(&old_curve);
            }

            if position.dex == DexKind::PumpFun {
                match derive_bonding_curve(&position.mint) {
                    Ok(curve) => {
                        let curve = curve.to_string();
                        tracing::debug!(mint = %position.mint, curve = %curve, "Bonding curve derived");
                        book.curves.insert(position.mint.clone(), curve.clone());
                        book.curve_owners.insert(curve, position.mint.clone());
                    }
                    Err(e) => {
                        tracing::warn!(
                            mint = %position.mint,
                            error = %e,
                            "Could not derive bonding curve, using transaction prices only"
                        );
                    }
                }
            }

            book.snapshots.insert(
                position.mint.clone(),
                PriceSnapshot {
                    mint: position.mint.clone(),
                    pool_address: position.pool_address.clone(),
                    current_price_sol: position.entry_price_sol,
                    current_price_usd: position.entry_price_usd,
                    last_update_ms: now,
                    source: PriceSource::Initial,
                    volume_usd: None,
                    dex: position.dex,
                },
            );
            book.last_update.insert(position.mint.clone(), now);
            book.positions.insert(position.mint.clone(), position.clone());
        }

        tracing::info!(mint = %position.mint, dex = %position.dex, "Added position to real-time tracking");
        self.core.ctx.observer.on_position_added(&position);

        if self.session.is_running() {
            if let Err(e) = self.session.update_subscription().await {
                tracing::warn!(mint = %position.mint, error = %e, "Subscription update failed");
            }
        }
        true
    }

    /// Stop tracking `mint`
    pub async fn remove_position(&self, mint: &str) {
        let (removed, remaining) = {
            let mut book = self.core.book.write();
            let removed = book.remove(mint);
            (removed, book.positions.len())
        };
        if !removed {
            return;
        }

        tracing::info!(mint = %mint, remaining, "Removed position from tracking");
        self.core.ctx.observer.on_position_removed(mint);

        if self.session.is_running() && remaining > 0 {
            if let Err(e) = self.session.update_subscription().await {
                tracing::warn!(mint = %mint, error = %e, "Subscription update failed");
            }
        }
    }

    pub fn get_current_price(&self, mint: &str) -> Option<PriceSnapshot> {
        self.core.book.read().snapshots.get(mint).cloned()
    }

    pub fn get_all_prices(&self) -> Vec<PriceSnapshot> {
        self.core.book.read().snapshots.values().cloned().collect()
    }

    pub fn get_position(&self, mint: &str) -> Option<MonitoredPosition> {
        self.core.book.read().positions.get(mint).cloned()
    }

    pub fn subscription_targets(&self) -> SubscriptionTargets {
        self.core.book.read().targets()
    }

    pub fn get_stats(&self) -> PositionStats {
        let book = self.core.book.read();
        let updates = book.snapshots.values().map(|s| s.last_update_ms);
        PositionStats {
            total_positions: book.positions.len(),
            prices_updated: book
                .snapshots
                .values()
                .filter(|s| s.source != PriceSource::Initial)
                .count(),
            oldest_update_ms: updates.clone().min(),
            newest_update_ms: updates.max(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Open the stream and start the fallback and cleanup tasks
    pub async fn start(&self) -> Result<(), StreamError> {
        self.session.start().await?;

        let mut tasks = self.tasks.lock();
        if tasks.is_none() {
            let cancel = CancellationToken::new();
            self.spawn_fallback(cancel.clone());
            self.spawn_cleanup(cancel.clone());
            *tasks = Some(cancel);
        }

        tracing::info!(
            positions = self.core.book.read().positions.len(),
            "Position monitoring started"
        );
        Ok(())
    }

    /// End the stream and cancel the periodic tasks; idempotent
    pub async fn stop(&self) {
        let cancel = self.tasks.lock().take();
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        self.session.stop().await;
    }

    fn spawn_fallback(&self, cancel: CancellationToken) {
        let fallback = &self.core.ctx.config.fallback;
        if !fallback.enabled {
            tracing::info!("Fallback polling disabled");
            return;
        }
        let interval = Duration::from_secs(fallback.poll_interval_secs);
        let poller = self.poller.clone();
        let target: Arc<dyn FallbackTarget> = self.core.clone();
        tokio::spawn(poller.run(target, interval, cancel));
    }

    fn spawn_cleanup(&self, cancel: CancellationToken) {
        let ctx = self.core.ctx.clone();
        let health_every = Duration::from_secs(ctx.config.health.cleanup_interval_secs);
        let metadata_every = Duration::from_secs(ctx.config.metadata.cleanup_interval_secs);

        tokio::spawn(async move {
            let mut health_tick = tokio::time::interval(health_every);
            health_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut metadata_tick = tokio::time::interval(metadata_every);
            metadata_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            health_tick.tick().await;
            metadata_tick.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = health_tick.tick() => {
                        let purged = ctx.health.cleanup();
                        if purged > 0 {
                            tracing::debug!(purged, "Health monitor cleanup");
                        }
                    }
                    _ = metadata_tick.tick() => {
                        let removed = ctx.metadata.cleanup();
                        if removed > 0 {
                            tracing::debug!(removed, "Metadata cache cleanup");
                        }
                    }
                }
            }
        });
    }
}
