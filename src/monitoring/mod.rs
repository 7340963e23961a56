//! Position price monitoring
//!
//! - `position`: position stream, snapshot table and price callbacks
//! - `fallback`: REST lookups for mints the stream stopped pricing
//! - `health`: swap activity scoring used to tune exit targets

pub mod fallback;
pub mod health;
pub mod position;

pub use fallback::{FallbackPoller, FallbackTarget, PollCycle, PriceLookup, PumpFunPriceClient};
pub use health::{
    ActivityReport, ExitRecommendation, ExitStrategy, HealthClass, HealthMetrics, TokenActivity,
    TokenHealthMonitor,
};
pub use position::{
    MonitoredPosition, PositionMonitor, PositionStats, PriceCallback, PriceSnapshot, PriceSource,
    SubscriptionTargets,
};
