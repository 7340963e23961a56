//! REST fallback for stale prices
//!
//! Every poll cycle finds monitored mints whose last stream price is older
//! than the stale threshold and asks the price service once per mint.
//! Requests are serialized with a fixed gap. A failed lookup leaves the last
//! known price in place.

use crate::clock::SharedClock;
use crate::config::FallbackConfig;
use crate::error::PriceApiError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Lowest accepted fallback price in USD
pub const MIN_FALLBACK_PRICE_USD: f64 = 0.000_000_1;
/// Highest accepted fallback price in USD
pub const MAX_FALLBACK_PRICE_USD: f64 = 1_000.0;

/// Looks up a token's USD price out of band
#[async_trait]
pub trait PriceLookup: Send + Sync {
    async fn fetch_price_usd(&self, mint: &str) -> Result<f64, PriceApiError>;
}

/// Registry view the poller works against
pub trait FallbackTarget: Send + Sync {
    /// Mints whose last update is older than `stale_after_ms`
    fn stale_mints(&self, now_ms: i64, stale_after_ms: i64) -> Vec<String>;

    fn is_monitored(&self, mint: &str) -> bool;

    /// Store a fallback price if the mint is still stale, i.e. its last
    /// update is older than `stale_before_ms`. Returns false if the mint has
    /// no snapshot or a fresher price arrived during the lookup.
    fn apply_fallback_price(&self, mint: &str, price_usd: f64, stale_before_ms: i64) -> bool;
}

#[derive(Debug, Deserialize)]
struct CoinResponse {
    usd_market_cap: Option<f64>,
    total_supply: Option<f64>,
}

/// `usd_market_cap / total_supply`, rejected outside the accepted band
pub fn price_from_market_cap(usd_market_cap: f64, total_supply: f64) -> Result<f64, PriceApiError> {
    let price = usd_market_cap / total_supply;
    if !price.is_finite() || !(MIN_FALLBACK_PRICE_USD..=MAX_FALLBACK_PRICE_USD).contains(&price) {
        return Err(PriceApiError::OutOfRange(price));
    }
    Ok(price)
}

/// Pump.fun frontend API client
pub struct PumpFunPriceClient {
    client: Client,
    base_url: String,
}

impl PumpFunPriceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PriceApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0")
            .build()
            .map_err(|e| PriceApiError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &FallbackConfig) -> Result<Self, PriceApiError> {
        Self::new(
            config.base_url.clone(),
            Duration::from_millis(config.request_timeout_ms),
        )
    }
}

#[async_trait]
impl PriceLookup for PumpFunPriceClient {
    async fn fetch_price_usd(&self, mint: &str) -> Result<f64, PriceApiError> {
        let url = format!("{}/coins/{}", self.base_url, mint);
        tracing::debug!(mint = %mint, url = %url, "Fetching fallback price");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                PriceApiError::Timeout
            } else {
                PriceApiError::Http(e.to_string())
            }
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(PriceApiError::NotFound),
            StatusCode::TOO_MANY_REQUESTS => return Err(PriceApiError::RateLimited),
            status if !status.is_success() => return Err(PriceApiError::Status(status.as_u16())),
            _ => {}
        }

        let coin: CoinResponse = response
            .json()
            .await
            .map_err(|e| PriceApiError::Parse(e.to_string()))?;

        match (coin.usd_market_cap, coin.total_supply) {
            (Some(cap), Some(supply)) => price_from_market_cap(cap, supply),
            _ => Err(PriceApiError::Parse("missing usd_market_cap or total_supply".to_string())),
        }
    }
}

/// Outcome of one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollCycle {
    pub stale: usize,
    pub fetched: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Stale price poller
pub struct FallbackPoller {
    lookup: Arc<dyn PriceLookup>,
    clock: SharedClock,
    stale_after_ms: i64,
    request_spacing: Duration,
}

impl FallbackPoller {
    pub fn new(
        lookup: Arc<dyn PriceLookup>,
        clock: SharedClock,
        stale_after_ms: i64,
        request_spacing: Duration,
    ) -> Self {
        Self {
            lookup,
            clock,
            stale_after_ms,
            request_spacing,
        }
    }

    /// Run one cycle: at most one lookup per stale mint
    pub async fn poll_once(&self, target: &dyn FallbackTarget) -> PollCycle {
        let now = self.clock.now_ms();
        let stale_before = now - self.stale_after_ms;
        let mut seen = HashSet::new();
        let stale: Vec<String> = target
            .stale_mints(now, self.stale_after_ms)
            .into_iter()
            .filter(|mint| seen.insert(mint.clone()))
            .collect();

        let mut cycle = PollCycle {
            stale: stale.len(),
            ..Default::default()
        };
        if stale.is_empty() {
            return cycle;
        }

        tracing::info!(count = stale.len(), "Stale positions found, fetching fallback prices");

        for mint in stale {
            // removed while the cycle was running
            if !target.is_monitored(&mint) {
                continue;
            }

            cycle.fetched += 1;
            match self.lookup.fetch_price_usd(&mint).await {
                Ok(price_usd) => {
                    if target.apply_fallback_price(&mint, price_usd, stale_before) {
                        cycle.updated += 1;
                        tracing::info!(mint = %mint, price_usd, "Updated stale position from API");
                    } else {
                        tracing::debug!(mint = %mint, "Fallback price not applied, position refreshed or removed");
                    }
                }
                Err(e) => {
                    cycle.failed += 1;
                    tracing::warn!(
                        mint = %mint,
                        error = %e,
                        "Could not fetch fallback price, keeping last known price"
                    );
                }
            }

            tokio::time::sleep(self.request_spacing).await;
        }

        cycle
    }

    /// Poll every `interval` until cancelled
    pub async fn run(
        self: Arc<Self>,
        target: Arc<dyn FallbackTarget>,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        tracing::info!(interval_secs = interval.as_secs(), "Fallback polling started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // first tick fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Fallback polling stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let cycle = tokio::select! {
                        _ = cancel.cancelled() => return,
                        cycle = self.poll_once(target.as_ref()) => cycle,
                    };
                    if cycle.fetched > 0 {
                        tracing::debug!(
                            stale = cycle.stale,
                            updated = cycle.updated,
                            failed = cycle.failed,
                            "Fallback cycle finished"
                        );
                    }
                }
            }
        }
    }
}
