//! Explicit shared context
//!
//! Built once at startup and handed to each component by `Arc`. Holds the
//! pieces both monitors read: configuration, clock, SOL/USD rate, health
//! tracker, metadata cache and the configured price observer.

use crate::clock::{system_clock, SharedClock};
use crate::config::AppConfig;
use crate::detection::MetadataCache;
use crate::hooks::{observer_for, PriceObserver};
use crate::monitoring::TokenHealthMonitor;
use crate::pricing::SolPriceCache;
use std::sync::Arc;

/// Shared state for the sentinel components
pub struct SentinelContext {
    pub config: Arc<AppConfig>,
    pub clock: SharedClock,
    pub sol_price: Arc<SolPriceCache>,
    pub health: Arc<TokenHealthMonitor>,
    pub metadata: Arc<MetadataCache>,
    pub observer: Arc<dyn PriceObserver>,
}

impl SentinelContext {
    /// Context on the system clock with the configured observer
    pub fn new(config: AppConfig) -> Arc<Self> {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: AppConfig, clock: SharedClock) -> Arc<Self> {
        let observer = observer_for(config.hooks.observer);
        Self::with_parts(config, clock, observer)
    }

    pub fn with_parts(config: AppConfig, clock: SharedClock, observer: Arc<dyn PriceObserver>) -> Arc<Self> {
        let sol_price = Arc::new(SolPriceCache::new(config.position.sol_price_usd));
        let health = Arc::new(TokenHealthMonitor::with_purge_after(
            clock.clone(),
            config.health.inactivity_purge_secs as i64 * 1_000,
        ));
        let metadata = Arc::new(MetadataCache::with_limits(
            clock.clone(),
            config.metadata.capacity,
            config.metadata.max_age_secs as i64 * 1_000,
        ));

        tracing::debug!(observer = observer.name(), "Sentinel context created");

        Arc::new(Self {
            config: Arc::new(config),
            clock,
            sol_price,
            health,
            metadata,
            observer,
        })
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }
}
