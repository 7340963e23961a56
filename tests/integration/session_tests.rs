//! Stream session lifecycle tests
//!
//! Drives a `StreamSession` over the in-memory transport with paused tokio
//! time, so backoff delays are observed exactly.

use crate::common::{settle, MockTransport, MINT};
use geyser_sentinel::error::StreamError;
use geyser_sentinel::stream::{
    detection_request, Commitment, ReconnectPolicy, SessionState, StreamSession, StreamUpdate,
    SubscriptionSource, TripReason, UpdateHandler, UpdatePayload,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use yellowstone_grpc_proto::prelude::SubscribeRequest;

#[derive(Default)]
struct Fixture {
    keys: Mutex<Vec<String>>,
    seen: Mutex<Vec<StreamUpdate>>,
}

impl SubscriptionSource for Fixture {
    fn subscription_request(&self) -> Option<SubscribeRequest> {
        let keys = self.keys.lock().clone();
        if keys.is_empty() {
            return None;
        }
        Some(detection_request(&keys, Commitment::Processed))
    }
}

impl UpdateHandler for Fixture {
    fn handle_update(&self, update: StreamUpdate) {
        self.seen.lock().push(update);
    }
}

fn session(policy: ReconnectPolicy) -> (Arc<StreamSession>, Arc<MockTransport>, Arc<Fixture>) {
    let transport = MockTransport::new();
    let fixture = Arc::new(Fixture::default());
    fixture.keys.lock().push(MINT.to_string());
    let session = StreamSession::new("test", transport.clone(), fixture.clone(), fixture.clone(), policy);
    (session, transport, fixture)
}

#[tokio::test(start_paused = true)]
async fn test_start_sends_initial_subscription() {
    let (session, transport, fixture) = session(ReconnectPolicy::detection());

    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Subscribed);
    assert_eq!(transport.requests().len(), 1);

    transport.push(StreamUpdate {
        filters: vec!["sniper".to_string()],
        payload: UpdatePayload::Other,
    });
    settle().await;
    assert_eq!(fixture.seen.lock().len(), 1);

    // second start is a no-op
    session.start().await.unwrap();
    assert_eq!(transport.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_update_subscription_reuses_stream() {
    let (session, transport, fixture) = session(ReconnectPolicy::detection());

    assert!(!session.update_subscription().await.unwrap());

    session.start().await.unwrap();
    fixture.keys.lock().push("58oQChx4yWmvKdwLLZzBi4ChoCc2fqCUWBkwMihLYQo2".to_string());
    assert!(session.update_subscription().await.unwrap());

    assert_eq!(transport.connect_count(), 1);
    let last = transport.last_request().unwrap();
    assert_eq!(last.transactions["sniper"].account_include.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_initial_connect_returns_error() {
    let (session, transport, _) = session(ReconnectPolicy::detection());
    transport.fail_next_connects([StreamError::Connect("refused".into())]);

    assert!(session.start().await.is_err());
    assert_eq!(session.state(), SessionState::Idle);
    assert!(!session.is_running());

    session.start().await.unwrap();
    assert!(session.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_after_backoff() {
    let (session, transport, _) = session(ReconnectPolicy::detection());
    session.start().await.unwrap();

    transport.fail_stream(StreamError::Status("unavailable".into()));
    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert_eq!(transport.connect_count(), 1);
    assert_eq!(session.state(), SessionState::Reconnecting);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.connect_count(), 2);
    assert_eq!(session.state(), SessionState::Subscribed);
    assert_eq!(session.connection_state().reconnect_attempts(), 0);

    // subscription re-sent on the new stream
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_waits_thirty_seconds() {
    let (session, transport, _) = session(ReconnectPolicy::detection());
    session.start().await.unwrap();

    transport.fail_stream(StreamError::Status("status: 429 Too Many Requests".into()));
    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(transport.connect_count(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(transport.connect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_identical_error_opens_circuit() {
    let (session, transport, _) = session(ReconnectPolicy::detection());
    session.start().await.unwrap();

    transport.fail_next_connects((0..10).map(|_| StreamError::Connect("refused".into())));
    transport.fail_stream(StreamError::Status("unavailable".into()));

    // 5 + 10 + 20 + 40 + 80 seconds of backoff
    tokio::time::sleep(Duration::from_secs(200)).await;

    assert_eq!(session.state(), SessionState::CircuitOpen);
    assert!(!session.is_running());
    assert_eq!(transport.connect_count(), 6);
    assert!(matches!(
        session.connection_state().trip_reason(),
        Some(TripReason::RepeatedError { count: 5, .. })
    ));

    // nothing further is scheduled
    tokio::time::sleep(Duration::from_secs(3_600)).await;
    assert_eq!(transport.connect_count(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_attempt_budget_opens_circuit() {
    let (session, transport, _) = session(ReconnectPolicy::detection());
    session.start().await.unwrap();

    transport.fail_next_connects((0..20).map(|i| StreamError::Connect(format!("refused #{}", i))));
    transport.fail_stream(StreamError::Status("unavailable".into()));

    // 5, 10, 20, 40, 80, 160 then 300 capped four times
    tokio::time::sleep(Duration::from_secs(1_600)).await;

    assert_eq!(session.state(), SessionState::CircuitOpen);
    assert_eq!(transport.connect_count(), 11);
    assert!(matches!(
        session.connection_state().trip_reason(),
        Some(TripReason::MaxAttempts { attempts: 10 })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_pending_reconnect() {
    let (session, transport, _) = session(ReconnectPolicy::detection());
    session.start().await.unwrap();

    transport.fail_stream(StreamError::Ended);
    settle().await;
    session.stop().await;
    session.stop().await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.connect_count(), 1);
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_circuit_open() {
    let policy = ReconnectPolicy {
        max_attempts: 1,
        ..ReconnectPolicy::position()
    };
    let (session, transport, _) = session(policy);
    session.start().await.unwrap();

    transport.fail_next_connects([StreamError::Connect("refused".into())]);
    transport.fail_stream(StreamError::Ended);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(session.state(), SessionState::CircuitOpen);

    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Subscribed);
}
