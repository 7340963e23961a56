//! Token health scoring
//!
//! Tracks swap frequency and USD volume per mint and turns it into a 0-100
//! health score with an exit-aggressiveness recommendation:
//! - Healthy (>= 70): normal targets, 3.0x
//! - Declining (>= 50): aggressive targets, 2.0x
//! - Dying (>= 30): emergency targets, 1.5x
//! - Dead: emergency, 1.2x
//!
//! Windowed aggregates are refreshed on every recorded swap and again when
//! metrics are read, so a token that stops trading decays toward dead.

use crate::clock::SharedClock;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;

const ONE_MINUTE_MS: i64 = 60_000;
const FIVE_MINUTES_MS: i64 = 5 * ONE_MINUTE_MS;

/// Default inactivity before a mint is purged
pub const DEFAULT_INACTIVITY_PURGE_MS: i64 = 10 * ONE_MINUTE_MS;

/// Swaps per minute thresholds
const HEALTHY_SWAPS_PER_MIN: f64 = 5.0;
const DECLINING_SWAPS_PER_MIN: f64 = 2.0;
const DYING_SWAPS_PER_MIN: f64 = 0.5;

/// USD volume per minute thresholds
const HEALTHY_VOLUME_1M: f64 = 100.0;
const DECLINING_VOLUME_1M: f64 = 50.0;
const DYING_VOLUME_1M: f64 = 10.0;

/// Rolling activity for one mint
#[derive(Debug, Clone, Serialize)]
pub struct TokenActivity {
    pub mint: String,
    pub first_seen_ms: i64,
    pub last_swap_ms: i64,
    pub swap_count_1m: u32,
    pub swap_count_5m: u32,
    pub volume_1m: f64,
    pub volume_5m: f64,
    #[serde(skip)]
    swaps: VecDeque<(i64, f64)>,
}

impl TokenActivity {
    fn new(mint: &str, now_ms: i64) -> Self {
        Self {
            mint: mint.to_string(),
            first_seen_ms: now_ms,
            last_swap_ms: now_ms,
            swap_count_1m: 0,
            swap_count_5m: 0,
            volume_1m: 0.0,
            volume_5m: 0.0,
            swaps: VecDeque::new(),
        }
    }

    /// Drop swaps older than five minutes and recompute the window aggregates
    fn refresh(&mut self, now_ms: i64) {
        while let Some(&(ts, _)) = self.swaps.front() {
            if now_ms - ts > FIVE_MINUTES_MS {
                self.swaps.pop_front();
            } else {
                break;
            }
        }

        let (mut count_1m, mut volume_1m) = (0u32, 0.0);
        for &(ts, volume) in &self.swaps {
            if now_ms - ts <= ONE_MINUTE_MS {
                count_1m += 1;
                volume_1m += volume;
            }
        }

        self.swap_count_1m = count_1m;
        self.swap_count_5m = self.swaps.len() as u32;
        self.volume_1m = volume_1m;
        self.volume_5m = self.swaps.iter().map(|&(_, v)| v).sum();
    }
}

/// Health bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthClass {
    Healthy,
    Declining,
    Dying,
    Dead,
}

impl HealthClass {
    pub fn from_score(overall: f64) -> Self {
        if overall >= 70.0 {
            Self::Healthy
        } else if overall >= 50.0 {
            Self::Declining
        } else if overall >= 30.0 {
            Self::Dying
        } else {
            Self::Dead
        }
    }

    fn recommendation(&self) -> &'static str {
        match self {
            Self::Healthy => "Token shows strong activity. Use normal exit targets (3x-10x).",
            Self::Declining => "Token activity declining. Use aggressive targets (2x-3x).",
            Self::Dying => "Token activity very low. Use emergency targets (1.5x-2x).",
            Self::Dead => "Token appears dead. Exit at any profit.",
        }
    }
}

impl fmt::Display for HealthClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Declining => write!(f, "declining"),
            Self::Dying => write!(f, "dying"),
            Self::Dead => write!(f, "dead"),
        }
    }
}

/// Scores for one mint, each rounded to 0-100
#[derive(Debug, Clone, Serialize)]
pub struct HealthMetrics {
    pub mint: String,
    pub activity_score: u32,
    pub liquidity_score: u32,
    pub momentum_score: u32,
    pub overall_health: u32,
    pub classification: HealthClass,
    pub recommendation: &'static str,
}

/// Exit aggressiveness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitStrategy {
    Normal,
    Aggressive,
    Emergency,
}

/// Recommendation consumed by the exit engine
#[derive(Debug, Clone, Serialize)]
pub struct ExitRecommendation {
    pub strategy: ExitStrategy,
    pub target_multiple: f64,
    pub reason: &'static str,
}

impl ExitRecommendation {
    fn for_class(class: Option<HealthClass>) -> Self {
        let (strategy, target_multiple, reason) = match class {
            None => (ExitStrategy::Normal, 3.0, "No activity data yet, using default strategy"),
            Some(HealthClass::Healthy) => (ExitStrategy::Normal, 3.0, "Token is healthy, aim for normal targets"),
            Some(HealthClass::Declining) => (ExitStrategy::Aggressive, 2.0, "Token activity declining, take profits early"),
            Some(HealthClass::Dying) => (ExitStrategy::Emergency, 1.5, "Token dying, exit at lower targets"),
            Some(HealthClass::Dead) => (ExitStrategy::Emergency, 1.2, "Token appears dead, exit at breakeven or small profit"),
        };
        Self {
            strategy,
            target_multiple,
            reason,
        }
    }
}

/// Counts per health bucket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivityReport {
    pub total_tokens: usize,
    pub healthy: usize,
    pub declining: usize,
    pub dying: usize,
    pub dead: usize,
}

/// Piecewise-linear score on swaps per minute
pub fn activity_score(swaps_per_min: f64) -> f64 {
    tiered_score(
        swaps_per_min,
        HEALTHY_SWAPS_PER_MIN,
        DECLINING_SWAPS_PER_MIN,
        DYING_SWAPS_PER_MIN,
        (swaps_per_min * 60.0).min(30.0),
    )
}

/// Piecewise-linear score on USD volume per minute
pub fn liquidity_score(volume_per_min: f64) -> f64 {
    tiered_score(
        volume_per_min,
        HEALTHY_VOLUME_1M,
        DECLINING_VOLUME_1M,
        DYING_VOLUME_1M,
        (volume_per_min / DYING_VOLUME_1M * 30.0).min(30.0),
    )
}

fn tiered_score(value: f64, healthy: f64, declining: f64, dying: f64, floor_score: f64) -> f64 {
    if value >= healthy {
        100.0
    } else if value >= declining {
        60.0 + (value - declining) / (healthy - declining) * 40.0
    } else if value >= dying {
        30.0 + (value - dying) / (declining - dying) * 30.0
    } else {
        floor_score.max(0.0)
    }
}

/// Last minute's swap rate against the preceding four minutes' average
pub fn momentum_score(swaps_1m: u32, swaps_5m: u32) -> f64 {
    let prior = swaps_5m.saturating_sub(swaps_1m);
    if prior == 0 {
        return 50.0;
    }

    let recent = swaps_1m as f64;
    let baseline = prior as f64 / 4.0;

    if recent >= baseline * 1.5 {
        100.0
    } else if recent >= baseline {
        75.0
    } else if recent < baseline * 0.5 {
        0.0
    } else {
        25.0
    }
}

/// Swap activity tracker
pub struct TokenHealthMonitor {
    activities: RwLock<HashMap<String, TokenActivity>>,
    clock: SharedClock,
    inactivity_purge_ms: i64,
}

impl TokenHealthMonitor {
    pub fn new(clock: SharedClock) -> Self {
        Self::with_purge_after(clock, DEFAULT_INACTIVITY_PURGE_MS)
    }

    pub fn with_purge_after(clock: SharedClock, inactivity_purge_ms: i64) -> Self {
        Self {
            activities: RwLock::new(HashMap::new()),
            clock,
            inactivity_purge_ms,
        }
    }

    /// Record one swap of `volume_usd` for `mint`
    pub fn record_swap(&self, mint: &str, volume_usd: f64) {
        let now = self.clock.now_ms();
        let volume = if volume_usd.is_finite() { volume_usd.max(0.0) } else { 0.0 };

        let mut activities = self.activities.write();
        let activity = activities
            .entry(mint.to_string())
            .or_insert_with(|| TokenActivity::new(mint, now));
        activity.swaps.push_back((now, volume));
        activity.last_swap_ms = now;
        activity.refresh(now);

        tracing::trace!(
            mint = %mint,
            volume_usd = volume,
            swaps_1m = activity.swap_count_1m,
            swaps_5m = activity.swap_count_5m,
            "Recorded swap"
        );
    }

    /// Current activity snapshot for `mint`
    pub fn activity(&self, mint: &str) -> Option<TokenActivity> {
        let now = self.clock.now_ms();
        let mut activities = self.activities.write();
        let activity = activities.get_mut(mint)?;
        activity.refresh(now);
        Some(activity.clone())
    }

    /// Health metrics, `None` when the mint has never traded
    pub fn get_health(&self, mint: &str) -> Option<HealthMetrics> {
        self.activity(mint).map(|activity| score(&activity))
    }

    /// Exit recommendation; untracked mints get the normal default
    pub fn get_exit_recommendation(&self, mint: &str) -> ExitRecommendation {
        ExitRecommendation::for_class(self.get_health(mint).map(|m| m.classification))
    }

    /// Bucket counts across all tracked mints
    pub fn get_activity_report(&self) -> ActivityReport {
        let now = self.clock.now_ms();
        let mut activities = self.activities.write();
        let mut report = ActivityReport {
            total_tokens: activities.len(),
            ..Default::default()
        };

        for activity in activities.values_mut() {
            activity.refresh(now);
            match score(activity).classification {
                HealthClass::Healthy => report.healthy += 1,
                HealthClass::Declining => report.declining += 1,
                HealthClass::Dying => report.dying += 1,
                HealthClass::Dead => report.dead += 1,
            }
        }
        report
    }

    /// Purge mints with no swap inside the inactivity window; returns the count removed
    pub fn cleanup(&self) -> usize {
        let cutoff = self.clock.now_ms() - self.inactivity_purge_ms;
        let mut activities = self.activities.write();
        let before = activities.len();
        activities.retain(|mint, activity| {
            let keep = activity.last_swap_ms >= cutoff;
            if !keep {
                tracing::debug!(mint = %mint, "Purged inactive token health data");
            }
            keep
        });
        before - activities.len()
    }

    pub fn tracked_count(&self) -> usize {
        self.activities.read().len()
    }
}

fn score(activity: &TokenActivity) -> HealthMetrics {
    let activity_score = activity_score(activity.swap_count_1m as f64);
    let liquidity_score = liquidity_score(activity.volume_1m);
    let momentum_score = momentum_score(activity.swap_count_1m, activity.swap_count_5m);
    let overall = activity_score * 0.4 + liquidity_score * 0.4 + momentum_score * 0.2;
    let classification = HealthClass::from_score(overall);

    HealthMetrics {
        mint: activity.mint.clone(),
        activity_score: activity_score.round() as u32,
        liquidity_score: liquidity_score.round() as u32,
        momentum_score: momentum_score.round() as u32,
        overall_health: overall.round() as u32,
        classification,
        recommendation: classification.recommendation(),
    }
}
