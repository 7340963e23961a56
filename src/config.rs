//! Configuration management for Geyser Sentinel
//!
//! Loads configuration from optional config files and environment variables.
//! Environment variables override file values.

use crate::constants::mints;
use crate::stream::{Commitment, ReconnectPolicy};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Geyser endpoint
    pub stream: StreamConfig,
    /// New token detection stream
    #[serde(default)]
    pub detection: DetectionConfig,
    /// Position price stream
    #[serde(default)]
    pub position: PositionConfig,
    /// REST fallback for stale prices
    #[serde(default)]
    pub fallback: FallbackConfig,
    /// Token health tracking
    #[serde(default)]
    pub health: HealthConfig,
    /// Token metadata cache
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Optional collaborators
    #[serde(default)]
    pub hooks: HooksConfig,
}

/// Yellowstone gRPC endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// gRPC endpoint URL (https:// enables TLS)
    pub endpoint: String,
    /// Auth token sent as `x-token`
    #[serde(default)]
    pub x_token: Option<String>,
    /// Commitment tier for both streams
    #[serde(default)]
    pub commitment: Commitment,
    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl StreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_connect_timeout() -> u64 {
    10
}

/// Which allow-list the detector subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// Program allow-list, creation logs only
    #[default]
    Program,
    /// Wallet allow-list, buy/sell/swap logs
    Wallet,
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionMode::Program => write!(f, "program"),
            DetectionMode::Wallet => write!(f, "wallet"),
        }
    }
}

/// Allow-list entry with an enable flag
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamTarget {
    /// Base58 program or wallet address
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl StreamTarget {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: None,
            enabled: true,
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// Keys of enabled entries
pub fn enabled_keys(targets: &[StreamTarget]) -> Vec<String> {
    targets
        .iter()
        .filter(|t| t.enabled)
        .map(|t| t.key.clone())
        .collect()
}

/// Token detection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    #[serde(default)]
    pub mode: DetectionMode,
    /// Program allow-list (mode = program)
    #[serde(default = "default_programs")]
    pub programs: Vec<StreamTarget>,
    /// Wallet allow-list (mode = wallet)
    #[serde(default)]
    pub wallets: Vec<StreamTarget>,
    /// Log substrings that mark a token creation (mode = program)
    #[serde(default = "default_log_discriminators")]
    pub log_discriminators: Vec<String>,
    /// Wrapped SOL mint, skipped when extracting the detected mint
    #[serde(default = "default_wsol_mint")]
    pub wsol_mint: String,
    #[serde(default = "ReconnectPolicy::detection")]
    pub reconnect: ReconnectPolicy,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            mode: DetectionMode::default(),
            programs: default_programs(),
            wallets: Vec::new(),
            log_discriminators: default_log_discriminators(),
            wsol_mint: default_wsol_mint(),
            reconnect: ReconnectPolicy::detection(),
        }
    }
}

impl DetectionConfig {
    /// Enabled keys for the active mode
    pub fn active_keys(&self) -> Vec<String> {
        match self.mode {
            DetectionMode::Program => enabled_keys(&self.programs),
            DetectionMode::Wallet => enabled_keys(&self.wallets),
        }
    }
}

fn default_programs() -> Vec<StreamTarget> {
    vec![StreamTarget {
        key: crate::constants::programs::PUMP_FUN.to_string(),
        name: Some("pumpfun".to_string()),
        enabled: true,
    }]
}

fn default_log_discriminators() -> Vec<String> {
    vec!["Program log: Instruction: InitializeMint2".to_string()]
}

fn default_wsol_mint() -> String {
    mints::WSOL.to_string()
}

/// Position monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PositionConfig {
    #[serde(default = "ReconnectPolicy::position")]
    pub reconnect: ReconnectPolicy,
    /// Account updates are skipped this long after a transaction price
    #[serde(default = "default_precedence_window")]
    pub precedence_window_ms: i64,
    /// Seed SOL/USD rate until a feed updates it
    #[serde(default = "default_sol_price")]
    pub sol_price_usd: f64,
    /// Minimum spacing of bonding-curve price logs per mint
    #[serde(default = "default_price_log_interval")]
    pub price_log_interval_ms: i64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::position(),
            precedence_window_ms: default_precedence_window(),
            sol_price_usd: default_sol_price(),
            price_log_interval_ms: default_price_log_interval(),
        }
    }
}

fn default_precedence_window() -> i64 {
    1_000
}

fn default_sol_price() -> f64 {
    218.0
}

fn default_price_log_interval() -> i64 {
    5_000
}

/// REST fallback configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Price service base URL, queried at `/coins/{mint}`
    #[serde(default = "default_fallback_base_url")]
    pub base_url: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// A mint is stale after this long without a stream price
    #[serde(default = "default_stale_after")]
    pub stale_after_ms: i64,
    /// Gap between consecutive REST requests
    #[serde(default = "default_request_spacing")]
    pub request_spacing_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_fallback_base_url(),
            poll_interval_secs: default_poll_interval(),
            stale_after_ms: default_stale_after(),
            request_spacing_ms: default_request_spacing(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

fn default_fallback_base_url() -> String {
    "https://frontend-api.pump.fun".to_string()
}

fn default_poll_interval() -> u64 {
    10
}

fn default_stale_after() -> i64 {
    10_000
}

fn default_request_spacing() -> u64 {
    200
}

fn default_request_timeout() -> u64 {
    3_000
}

/// Token health configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    /// Mints without a swap for this long are purged
    #[serde(default = "default_inactivity_purge")]
    pub inactivity_purge_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval(),
            inactivity_purge_secs: default_inactivity_purge(),
        }
    }
}

fn default_cleanup_interval() -> u64 {
    300
}

fn default_inactivity_purge() -> u64 {
    600
}

/// Metadata cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_metadata_max_age")]
    pub max_age_secs: u64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_metadata_capacity")]
    pub capacity: usize,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_metadata_max_age(),
            cleanup_interval_secs: default_cleanup_interval(),
            capacity: default_metadata_capacity(),
        }
    }
}

fn default_metadata_max_age() -> u64 {
    3_600
}

fn default_metadata_capacity() -> usize {
    10_000
}

/// Price observer selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObserverKind {
    #[default]
    Noop,
    Tracing,
}

/// Optional collaborator configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HooksConfig {
    #[serde(default)]
    pub observer: ObserverKind,
}

impl AppConfig {
    /// Load configuration from files and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (SENTINEL_*)
    /// 2. config/config.{toml,yaml,json} (if exists)
    /// 3. config.{toml,yaml,json} (if exists)
    /// 4. Default values
    pub fn load() -> Result<Self, ConfigError> {
        Self::build(None)
    }

    /// Same as [`AppConfig::load`] with an explicit file layered over the defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Self::build(Some(path))
    }

    fn build(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("stream.endpoint", "")?
            .set_default("stream.commitment", "processed")?
            .set_default("stream.connect_timeout_secs", default_connect_timeout())?
            .add_source(File::with_name("config").required(false))
            .add_source(File::with_name("config/config").required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // SENTINEL_STREAM__ENDPOINT=https://... -> stream.endpoint
        // SENTINEL_DETECTION__MODE=wallet -> detection.mode
        let config = builder
            .add_source(
                Environment::with_prefix("SENTINEL")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(","),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.endpoint.trim().is_empty() {
            return Err(ConfigError::Message(
                "Stream endpoint must be set via SENTINEL_STREAM__ENDPOINT".to_string(),
            ));
        }

        if self.detection.active_keys().is_empty() {
            return Err(ConfigError::Message(format!(
                "Detection mode '{}' needs at least one enabled entry",
                self.detection.mode
            )));
        }

        if self.detection.mode == DetectionMode::Program && self.detection.log_discriminators.is_empty() {
            return Err(ConfigError::Message(
                "Program detection needs at least one log discriminator".to_string(),
            ));
        }

        if self.fallback.poll_interval_secs == 0
            || self.health.cleanup_interval_secs == 0
            || self.metadata.cleanup_interval_secs == 0
        {
            return Err(ConfigError::Message("Intervals must be greater than zero".to_string()));
        }

        let sol_price = self.position.sol_price_usd;
        if sol_price.is_nan() || sol_price <= 0.0 {
            return Err(ConfigError::Message("SOL price must be positive".to_string()));
        }

        Ok(())
    }
}
