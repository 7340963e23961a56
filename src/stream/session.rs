//! Reusable streaming session
//!
//! One [`StreamSession`] owns one duplex subscription stream. It is
//! parameterized by a [`SubscriptionSource`] (builds the current request
//! payload) and an [`UpdateHandler`] (consumes updates), so the position and
//! detection streams share all connect/resubscribe/reconnect logic.
//!
//! - `update_subscription` re-sends the payload over the live stream
//! - `restart_subscription` ends the stream and opens a new one; only the
//!   recovery path uses it
//! - failures go through [`ConnectionState`] which yields the backoff delay
//!   or opens the circuit

use crate::error::StreamError;
use crate::stream::state::{ConnectionState, ReconnectDecision, ReconnectPolicy, SessionState};
use crate::stream::transport::{RequestSink, StreamHandle, Transport, UpdateStream};
use crate::stream::update::StreamUpdate;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use yellowstone_grpc_proto::prelude::SubscribeRequest;

/// Builds the subscription payload from current state
pub trait SubscriptionSource: Send + Sync {
    /// `None` when there is nothing to subscribe to yet
    fn subscription_request(&self) -> Option<SubscribeRequest>;
}

/// Consumes updates from the stream
pub trait UpdateHandler: Send + Sync {
    fn handle_update(&self, update: StreamUpdate);
}

/// One long-lived subscription stream with reconnect handling
pub struct StreamSession {
    name: String,
    transport: Arc<dyn Transport>,
    source: Arc<dyn SubscriptionSource>,
    handler: Arc<dyn UpdateHandler>,
    policy: ReconnectPolicy,
    state: Mutex<ConnectionState>,
    sink: tokio::sync::Mutex<Option<Box<dyn RequestSink>>>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl StreamSession {
    pub fn new(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        source: Arc<dyn SubscriptionSource>,
        handler: Arc<dyn UpdateHandler>,
        policy: ReconnectPolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            transport,
            source,
            handler,
            policy,
            state: Mutex::new(ConnectionState::new()),
            sink: tokio::sync::Mutex::new(None),
            cancel: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().state()
    }

    /// Copy of the connection bookkeeping
    pub fn connection_state(&self) -> ConnectionState {
        self.state.lock().clone()
    }

    /// False when idle, stopped, or after the circuit opened
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Open the stream, send the initial payload and start reading
    ///
    /// No-op while already running. Also restarts a session whose circuit
    /// opened.
    pub async fn start(self: &Arc<Self>) -> Result<(), StreamError> {
        if !self.state.lock().begin_connect() {
            tracing::debug!(stream = %self.name, "Session already running");
            return Ok(());
        }

        let cancel = CancellationToken::new();
        *self.cancel.lock() = Some(cancel.clone());

        let updates = match self.open().await {
            Ok(updates) => updates,
            Err(e) => {
                self.state.lock().on_connect_failed();
                self.cancel.lock().take();
                tracing::error!(stream = %self.name, error = %e, "Failed to open stream");
                return Err(e);
            }
        };

        if cancel.is_cancelled() {
            self.sink.lock().await.take();
            return Ok(());
        }

        self.state.lock().on_subscribed();
        tracing::info!(stream = %self.name, "Stream connected and subscribed");

        let session = Arc::clone(self);
        tokio::spawn(async move { session.run(updates, cancel).await });
        Ok(())
    }

    /// End the stream and cancel any pending reconnect; idempotent
    pub async fn stop(&self) {
        if let Some(cancel) = self.cancel.lock().take() {
            cancel.cancel();
        }
        self.sink.lock().await.take();
        let mut state = self.state.lock();
        let was = state.state();
        state.on_stopped();
        if was.is_running() {
            tracing::info!(stream = %self.name, "Stream stopped");
        }
    }

    /// Re-send the current payload over the existing stream
    ///
    /// Returns `Ok(false)` when there is no live stream or nothing to send.
    /// The payload is built while the sink is held, so concurrent callers
    /// always leave the newest state on the wire.
    pub async fn update_subscription(&self) -> Result<bool, StreamError> {
        let mut guard = self.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            return Ok(false);
        };
        let Some(request) = self.source.subscription_request() else {
            tracing::debug!(stream = %self.name, "Nothing to subscribe, keeping stream open");
            return Ok(false);
        };
        sink.send(request).await?;
        tracing::debug!(stream = %self.name, "Subscription updated");
        Ok(true)
    }

    /// Tear down the current stream and open a fresh one
    async fn restart_subscription(&self) -> Result<UpdateStream, StreamError> {
        tracing::info!(stream = %self.name, "Restarting stream");
        self.sink.lock().await.take();
        self.open().await
    }

    async fn open(&self) -> Result<UpdateStream, StreamError> {
        let StreamHandle { mut sink, updates } = self.transport.connect().await?;
        let mut guard = self.sink.lock().await;
        if let Some(request) = self.source.subscription_request() {
            sink.send(request).await?;
        }
        *guard = Some(sink);
        Ok(updates)
    }

    async fn run(self: Arc<Self>, mut updates: UpdateStream, cancel: CancellationToken) {
        loop {
            let failure = tokio::select! {
                _ = cancel.cancelled() => return,
                item = updates.next() => match item {
                    Some(Ok(update)) => {
                        self.handler.handle_update(update);
                        continue;
                    }
                    Some(Err(e)) => e,
                    None => StreamError::Ended,
                },
            };

            tracing::warn!(stream = %self.name, error = %failure, "Stream failure");

            match self.recover(failure, &cancel).await {
                Some(next) => updates = next,
                None => return,
            }
        }
    }

    /// Drive the reconnect schedule until a new stream is up, the circuit
    /// opens, or the session is cancelled
    async fn recover(&self, failure: StreamError, cancel: &CancellationToken) -> Option<UpdateStream> {
        let mut message = failure.to_string();

        loop {
            let decision = self.state.lock().on_failure(&message, &self.policy);

            match decision {
                ReconnectDecision::Retry {
                    delay,
                    attempt,
                    rate_limited,
                } => {
                    tracing::warn!(
                        stream = %self.name,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        rate_limited,
                        "Scheduling reconnect"
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => return None,
                        _ = tokio::time::sleep(delay) => {}
                    }

                    let result = tokio::select! {
                        _ = cancel.cancelled() => return None,
                        result = self.restart_subscription() => result,
                    };

                    match result {
                        Ok(updates) => {
                            self.state.lock().on_reconnected();
                            tracing::info!(stream = %self.name, "Reconnected");
                            return Some(updates);
                        }
                        Err(e) => {
                            self.state.lock().on_reconnect_failed();
                            tracing::warn!(stream = %self.name, error = %e, "Reconnect failed");
                            message = e.to_string();
                        }
                    }
                }
                ReconnectDecision::Ignored => {
                    tracing::debug!(stream = %self.name, "Reconnect already pending");
                    return None;
                }
                ReconnectDecision::Trip(reason) => {
                    tracing::error!(
                        stream = %self.name,
                        reason = %reason,
                        "Circuit breaker open, stream halted until restarted"
                    );
                    self.sink.lock().await.take();
                    self.cancel.lock().take();
                    return None;
                }
            }
        }
    }
}
