//! Stream transport seam
//!
//! A [`Transport`] opens one duplex subscription stream: a request sink for
//! (re)sending the subscription payload and a stream of updates. The
//! production implementation speaks Yellowstone gRPC; tests plug in
//! channel-backed transports.

use crate::error::StreamError;
use crate::stream::update::StreamUpdate;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::{Sink, SinkExt, StreamExt};
use std::fmt::Display;
use std::time::Duration;
use yellowstone_grpc_client::{ClientTlsConfig, GeyserGrpcClient};
use yellowstone_grpc_proto::prelude::SubscribeRequest;

/// Inbound half of a subscription stream
pub type UpdateStream = BoxStream<'static, Result<StreamUpdate, StreamError>>;

/// Outbound half of a subscription stream
#[async_trait]
pub trait RequestSink: Send {
    async fn send(&mut self, request: SubscribeRequest) -> Result<(), StreamError>;
}

/// An open duplex stream
pub struct StreamHandle {
    pub sink: Box<dyn RequestSink>,
    pub updates: UpdateStream,
}

/// Opens subscription streams
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<StreamHandle, StreamError>;
}

/// Endpoint settings for a Yellowstone gRPC server
#[derive(Debug, Clone)]
pub struct GeyserEndpoint {
    pub url: String,
    pub x_token: Option<String>,
    pub connect_timeout: Duration,
}

/// Yellowstone gRPC transport
pub struct GeyserTransport {
    endpoint: GeyserEndpoint,
}

impl GeyserTransport {
    pub fn new(endpoint: GeyserEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl Transport for GeyserTransport {
    async fn connect(&self) -> Result<StreamHandle, StreamError> {
        let connect_err = |e: &dyn Display| StreamError::Connect(e.to_string());

        let mut builder = GeyserGrpcClient::build_from_shared(self.endpoint.url.clone())
            .map_err(|e| connect_err(&e))?
            .x_token(self.endpoint.x_token.clone())
            .map_err(|e| connect_err(&e))?
            .connect_timeout(self.endpoint.connect_timeout);

        if self.endpoint.url.starts_with("https://") {
            builder = builder
                .tls_config(ClientTlsConfig::new().with_native_roots())
                .map_err(|e| connect_err(&e))?;
        }

        let mut client = builder.connect().await.map_err(|e| connect_err(&e))?;
        let (sink, stream) = client.subscribe().await.map_err(|e| connect_err(&e))?;

        tracing::debug!(url = %self.endpoint.url, "Opened Geyser subscription stream");

        let updates = stream
            .map(|item| {
                item.map(StreamUpdate::from)
                    .map_err(|status| StreamError::Status(status.to_string()))
            })
            .boxed();

        Ok(StreamHandle {
            sink: Box::new(GeyserSink { inner: sink }),
            updates,
        })
    }
}

struct GeyserSink<S> {
    inner: S,
}

#[async_trait]
impl<S> RequestSink for GeyserSink<S>
where
    S: Sink<SubscribeRequest> + Unpin + Send,
    S::Error: Display,
{
    async fn send(&mut self, request: SubscribeRequest) -> Result<(), StreamError> {
        self.inner
            .send(request)
            .await
            .map_err(|e| StreamError::Send(e.to_string()))
    }
}
