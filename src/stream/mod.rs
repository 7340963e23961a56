//! Streaming subscription layer
//!
//! - `update`: transport-neutral update types
//! - `request`: subscription payload builders
//! - `state`: connection state machine and reconnect policy
//! - `transport`: stream transport seam and Yellowstone gRPC implementation
//! - `session`: session driver shared by the position and detection streams

pub mod request;
pub mod session;
pub mod state;
pub mod transport;
pub mod update;

pub use request::{detection_request, position_request, Commitment};
pub use session::{StreamSession, SubscriptionSource, UpdateHandler};
pub use state::{ConnectionState, ReconnectDecision, ReconnectPolicy, SessionState, TripReason};
pub use transport::{GeyserEndpoint, GeyserTransport, RequestSink, StreamHandle, Transport, UpdateStream};
pub use update::{AccountUpdate, StreamUpdate, TokenBalance, TransactionUpdate, UpdatePayload};
