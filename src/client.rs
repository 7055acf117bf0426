//! RPC client seam between the pipeline and the wire.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::Status;
use tracing::debug;

use bes_grpc_client::proto::{
    PublishBuildToolEventStreamRequest, PublishBuildToolEventStreamResponse,
    PublishLifecycleEventRequest,
};
use bes_grpc_client::PublishBuildEventClient;

use crate::uploader::STREAM_FINISH_TIMEOUT;

/// Server responses on the bidirectional stream; each acknowledges one
/// sequence number, in order.
pub type AckStream =
    Pin<Box<dyn Stream<Item = Result<PublishBuildToolEventStreamResponse, Status>> + Send>>;

/// Outgoing half of one stream attempt. Dropping it half-closes the request
/// stream; dropping it together with the ACK stream aborts the RPC.
pub type StreamSender = mpsc::Sender<PublishBuildToolEventStreamRequest>;

/// Capability the upload pipeline needs from the RPC layer.
#[async_trait]
pub trait BesClient: Send + Sync {
    /// Publish one lifecycle envelope.
    async fn publish_lifecycle_event(
        &self,
        request: PublishLifecycleEventRequest,
    ) -> Result<(), Status>;

    /// Open one bidirectional stream attempt.
    async fn open_build_tool_event_stream(&self) -> Result<(StreamSender, AckStream), Status>;

    /// Tear down the underlying connection. Called once, after the last RPC.
    async fn shutdown(&self);
}

/// Requests buffered between the stream driver and the wire.
const STREAM_BUFFER: usize = 16;

/// [`BesClient`] backed by a tonic channel.
#[derive(Clone)]
pub struct GrpcBesClient {
    client: PublishBuildEventClient<Channel>,
}

impl GrpcBesClient {
    /// Connect to a Build Event Service endpoint.
    ///
    /// The event stream sits idle whenever the driver is waiting on the
    /// collector's ACK backlog, so keepalive pings run while idle and fire
    /// several times within [`STREAM_FINISH_TIMEOUT`]: a dead connection
    /// must surface as a stream error before the post-terminator ACK
    /// deadline writes the failure off as a timeout.
    pub async fn connect(endpoint: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        debug!("Connecting to Build Event Service at {}", endpoint);

        // tonic only dials http(s) URIs.
        let uri = match endpoint.strip_prefix("grpc://") {
            Some(addr) => format!("http://{}", addr),
            None => endpoint.to_string(),
        };

        let channel = Channel::from_shared(uri)?
            .http2_keep_alive_interval(STREAM_FINISH_TIMEOUT / 3)
            .keep_alive_timeout(STREAM_FINISH_TIMEOUT / 6)
            .keep_alive_while_idle(true)
            .connect()
            .await?;

        Ok(Self::from_channel(channel))
    }

    /// Wrap an already-configured channel.
    pub fn from_channel(channel: Channel) -> Self {
        Self {
            client: PublishBuildEventClient::new(channel),
        }
    }
}

#[async_trait]
impl BesClient for GrpcBesClient {
    async fn publish_lifecycle_event(
        &self,
        request: PublishLifecycleEventRequest,
    ) -> Result<(), Status> {
        let mut client = self.client.clone();
        client.publish_lifecycle_event(request).await?;
        Ok(())
    }

    async fn open_build_tool_event_stream(&self) -> Result<(StreamSender, AckStream), Status> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let mut client = self.client.clone();
        let response = client
            .publish_build_tool_event_stream(ReceiverStream::new(rx))
            .await?;
        Ok((tx, Box::pin(response.into_inner())))
    }

    async fn shutdown(&self) {
        // Dropping the channel closes the connection; there is no explicit
        // teardown RPC.
    }
}
