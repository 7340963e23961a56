//! Optional lifecycle collaborators
//!
//! The position monitor reports accepted prices and registry changes to a
//! [`PriceObserver`]. Which observer runs is picked by configuration:
//! - `noop`: [`NoopObserver`], does nothing
//! - `tracing`: [`TracingObserver`], emits a structured log line per event

use crate::config::ObserverKind;
use crate::monitoring::position::{MonitoredPosition, PriceSnapshot};
use std::sync::Arc;

/// Receives position monitor events
///
/// All methods default to doing nothing, so implementors only override the
/// events they care about. Calls happen on the stream task and must not block.
pub trait PriceObserver: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// A price update was accepted into the snapshot table
    fn on_price_update(&self, _snapshot: &PriceSnapshot) {}

    /// A position entered the registry
    fn on_position_added(&self, _position: &MonitoredPosition) {}

    /// A position left the registry
    fn on_position_removed(&self, _mint: &str) {}
}

/// Observer that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PriceObserver for NoopObserver {
    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Observer that logs every event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PriceObserver for TracingObserver {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn on_price_update(&self, snapshot: &PriceSnapshot) {
        tracing::info!(
            mint = %snapshot.mint,
            price_usd = snapshot.current_price_usd,
            price_sol = snapshot.current_price_sol,
            source = %snapshot.source,
            "Price updated"
        );
    }

    fn on_position_added(&self, position: &MonitoredPosition) {
        tracing::info!(
            mint = %position.mint,
            pool = %position.pool_address,
            dex = %position.dex,
            entry_price_usd = position.entry_price_usd,
            "Position added"
        );
    }

    fn on_position_removed(&self, mint: &str) {
        tracing::info!(mint = %mint, "Position removed");
    }
}

/// Build the observer selected in configuration
pub fn observer_for(kind: ObserverKind) -> Arc<dyn PriceObserver> {
    match kind {
        ObserverKind::Noop => Arc::new(NoopObserver),
        ObserverKind::Tracing => Arc::new(TracingObserver),
    }
}
