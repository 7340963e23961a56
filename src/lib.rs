//! Geyser Sentinel Library
//!
//! Real-time Solana token price monitoring and new token detection over
//! Yellowstone gRPC streams. This library exposes core modules for the
//! binary and for testing.

pub mod clock;
pub mod config;
pub mod constants;
pub mod context;
pub mod derivation;
pub mod detection;
pub mod error;
pub mod hooks;
pub mod monitoring;
pub mod pricing;
pub mod stream;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{AppConfig, DetectionMode, StreamTarget};
pub use context::SentinelContext;
pub use derivation::{derive_pool_address, DerivationMethod, DexKind, PoolInfo};
pub use detection::{DetectedToken, MetadataCache, TokenDetector};
pub use error::{AppError, AppResult, DerivationError, PriceApiError, StreamError};
pub use hooks::{NoopObserver, PriceObserver, TracingObserver};
pub use monitoring::{MonitoredPosition, PositionMonitor, PriceSnapshot, PriceSource, TokenHealthMonitor};
pub use stream::{GeyserEndpoint, GeyserTransport, SessionState, StreamSession, Transport};
