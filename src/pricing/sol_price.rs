//! Cached SOL/USD price
//!
//! Monitors convert SOL-denominated prices to USD with whatever value is
//! cached here. The cache is fed externally (config seed, price feed); it
//! never fetches on its own.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fmt;

/// Where the cached value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolPriceSource {
    /// Seeded from configuration at startup
    Config,
    /// Pushed by an external price feed
    Feed,
}

impl fmt::Display for SolPriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config => write!(f, "config"),
            Self::Feed => write!(f, "feed"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    price_usd: f64,
    updated_at: DateTime<Utc>,
    source: SolPriceSource,
}

/// Single-value SOL price cache
#[derive(Debug)]
pub struct SolPriceCache {
    entry: RwLock<Entry>,
}

impl SolPriceCache {
    pub fn new(seed_usd: f64) -> Self {
        Self {
            entry: RwLock::new(Entry {
                price_usd: seed_usd,
                updated_at: Utc::now(),
                source: SolPriceSource::Config,
            }),
        }
    }

    /// Current SOL price in USD
    pub fn get(&self) -> f64 {
        self.entry.read().price_usd
    }

    /// Replace the cached price; non-positive or non-finite values are ignored
    pub fn set(&self, price_usd: f64, source: SolPriceSource) -> bool {
        if !price_usd.is_finite() || price_usd <= 0.0 {
            tracing::warn!(price_usd, "Ignoring invalid SOL price");
            return false;
        }
        *self.entry.write() = Entry {
            price_usd,
            updated_at: Utc::now(),
            source,
        };
        tracing::debug!(price_usd, source = %source, "SOL price updated");
        true
    }

    pub fn source(&self) -> SolPriceSource {
        self.entry.read().source
    }

    /// Seconds since the last update
    pub fn age_secs(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.entry.read().updated_at)
            .num_seconds()
    }
}
