//! Connection state machine for streaming sessions
//!
//! Pure bookkeeping: the session driver feeds failures and reconnect
//! outcomes in and gets back what to do next. No timers live here, so the
//! whole backoff and circuit-breaker schedule is testable synchronously.
//!
//! States: `Idle -> Connecting -> Subscribed -> Reconnecting -> CircuitOpen`.
//! `CircuitOpen` is terminal until the owner restarts the session.

use crate::error::is_rate_limit_message;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Subscribed,
    Reconnecting,
    CircuitOpen,
}

impl SessionState {
    /// Connecting, subscribed or recovering
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Connecting | Self::Subscribed | Self::Reconnecting)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Subscribed => write!(f, "SUBSCRIBED"),
            Self::Reconnecting => write!(f, "RECONNECTING"),
            Self::CircuitOpen => write!(f, "CIRCUIT_OPEN"),
        }
    }
}

/// Reconnect timing and circuit-breaker limits
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReconnectPolicy {
    /// First backoff delay
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff ceiling
    #[serde(default = "default_cap_delay_ms")]
    pub cap_delay_ms: u64,
    /// Fixed delay after a rate-limit error
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,
    /// Reconnect attempts before the circuit opens
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Consecutive identical errors before the circuit opens
    #[serde(default = "default_same_error_threshold")]
    pub same_error_threshold: u32,
}

fn default_base_delay_ms() -> u64 {
    5_000
}

fn default_cap_delay_ms() -> u64 {
    300_000
}

fn default_rate_limit_delay_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    10
}

fn default_same_error_threshold() -> u32 {
    5
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::detection()
    }
}

impl ReconnectPolicy {
    /// Detection stream: 5 s base, 5 min cap
    pub fn detection() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            cap_delay_ms: default_cap_delay_ms(),
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            max_attempts: default_max_attempts(),
            same_error_threshold: default_same_error_threshold(),
        }
    }

    /// Position stream: 5 s base, 60 s cap
    pub fn position() -> Self {
        Self {
            cap_delay_ms: 60_000,
            ..Self::detection()
        }
    }

    /// `min(base * 2^attempts, cap)`
    pub fn backoff(&self, attempts: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempts);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.cap_delay_ms);
        Duration::from_millis(delay)
    }
}

/// Why a session gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TripReason {
    /// The same error text repeated too many times in a row
    RepeatedError { message: String, count: u32 },
    /// Reconnect attempt budget exhausted
    MaxAttempts { attempts: u32 },
}

impl fmt::Display for TripReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RepeatedError { message, count } => {
                write!(f, "same error repeated {} times: {}", count, message)
            }
            Self::MaxAttempts { attempts } => {
                write!(f, "max reconnect attempts ({}) reached", attempts)
            }
        }
    }
}

/// What the driver should do after a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Sleep for `delay`, then restart the stream
    Retry {
        delay: Duration,
        attempt: u32,
        rate_limited: bool,
    },
    /// A reconnect is already pending; drop this trigger
    Ignored,
    /// Circuit is open; stop for good
    Trip(TripReason),
}

/// Per-session connection bookkeeping
#[derive(Debug, Clone)]
pub struct ConnectionState {
    state: SessionState,
    reconnect_attempts: u32,
    last_error_signature: Option<String>,
    same_error_repeat_count: u32,
    is_reconnecting: bool,
    trip_reason: Option<TripReason>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            reconnect_attempts: 0,
            last_error_signature: None,
            same_error_repeat_count: 0,
            is_reconnecting: false,
            trip_reason: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn same_error_repeat_count(&self) -> u32 {
        self.same_error_repeat_count
    }

    pub fn is_reconnecting(&self) -> bool {
        self.is_reconnecting
    }

    pub fn circuit_open(&self) -> bool {
        self.state == SessionState::CircuitOpen
    }

    pub fn trip_reason(&self) -> Option<&TripReason> {
        self.trip_reason.as_ref()
    }

    /// Idle/CircuitOpen -> Connecting; clears all counters
    pub fn begin_connect(&mut self) -> bool {
        if self.state.is_running() {
            return false;
        }
        *self = Self::new();
        self.state = SessionState::Connecting;
        true
    }

    /// Initial connect succeeded
    pub fn on_subscribed(&mut self) {
        self.state = SessionState::Subscribed;
    }

    /// Initial connect failed; back to Idle
    pub fn on_connect_failed(&mut self) {
        self.state = SessionState::Idle;
    }

    /// Record a stream error/end/close and decide the next step
    pub fn on_failure(&mut self, message: &str, policy: &ReconnectPolicy) -> ReconnectDecision {
        if let Some(reason) = &self.trip_reason {
            return ReconnectDecision::Trip(reason.clone());
        }
        if self.is_reconnecting {
            return ReconnectDecision::Ignored;
        }

        if self.last_error_signature.as_deref() == Some(message) {
            self.same_error_repeat_count += 1;
        } else {
            self.last_error_signature = Some(message.to_string());
            self.same_error_repeat_count = 1;
        }

        if self.same_error_repeat_count >= policy.same_error_threshold {
            return self.trip(TripReason::RepeatedError {
                message: message.to_string(),
                count: self.same_error_repeat_count,
            });
        }

        if self.reconnect_attempts >= policy.max_attempts {
            return self.trip(TripReason::MaxAttempts {
                attempts: self.reconnect_attempts,
            });
        }

        let rate_limited = is_rate_limit_message(message);
        let delay = if rate_limited {
            Duration::from_millis(policy.rate_limit_delay_ms)
        } else {
            policy.backoff(self.reconnect_attempts)
        };

        self.reconnect_attempts += 1;
        self.is_reconnecting = true;
        self.state = SessionState::Reconnecting;

        ReconnectDecision::Retry {
            delay,
            attempt: self.reconnect_attempts,
            rate_limited,
        }
    }

    /// Stream recreated; counters back to zero
    pub fn on_reconnected(&mut self) {
        self.reconnect_attempts = 0;
        self.same_error_repeat_count = 0;
        self.last_error_signature = None;
        self.is_reconnecting = false;
        self.state = SessionState::Subscribed;
    }

    /// Reconnect attempt failed; the failure itself is fed back through `on_failure`
    pub fn on_reconnect_failed(&mut self) {
        self.is_reconnecting = false;
    }

    /// Owner stopped the session
    pub fn on_stopped(&mut self) {
        self.is_reconnecting = false;
        if self.state != SessionState::CircuitOpen {
            self.state = SessionState::Idle;
        }
    }

    fn trip(&mut self, reason: TripReason) -> ReconnectDecision {
        self.state = SessionState::CircuitOpen;
        self.is_reconnecting = false;
        self.trip_reason = Some(reason.clone());
        ReconnectDecision::Trip(reason)
    }
}
