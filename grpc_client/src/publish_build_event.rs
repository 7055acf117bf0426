//! Client stub for the `google.devtools.build.v1.PublishBuildEvent` service.
//!
//! Written out by hand in the shape `tonic-prost-build` emits, for the same
//! reason as [`crate::proto`]: no protoc toolchain at build time.

use http::uri::PathAndQuery;
use prost::bytes::Bytes;
use tonic::body::Body;
use tonic::client::{Grpc, GrpcService};
use tonic::transport::{Channel, Endpoint};
use tonic::{GrpcMethod, Status, Streaming};

use crate::proto;

const SERVICE_NAME: &str = "google.devtools.build.v1.PublishBuildEvent";

const LIFECYCLE_PATH: &str = "/google.devtools.build.v1.PublishBuildEvent/PublishLifecycleEvent";
const STREAM_PATH: &str =
    "/google.devtools.build.v1.PublishBuildEvent/PublishBuildToolEventStream";

/// gRPC client for the Build Event Service publish API.
#[derive(Debug, Clone)]
pub struct PublishBuildEventClient<T> {
    inner: Grpc<T>,
}

impl PublishBuildEventClient<Channel> {
    /// Attempt to create a new client by connecting to `dst`.
    pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
    where
        D: TryInto<Endpoint>,
        D::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let conn = Endpoint::new(dst)?.connect().await?;
        Ok(Self::new(conn))
    }
}

impl<T> PublishBuildEventClient<T>
where
    T: GrpcService<Body>,
    T::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    T::ResponseBody: tonic::transport::Body<Data = Bytes> + Send + 'static,
    <T::ResponseBody as tonic::transport::Body>::Error:
        Into<Box<dyn std::error::Error + Send + Sync>> + Send,
{
    pub fn new(inner: T) -> Self {
        let inner = Grpc::new(inner);
        Self { inner }
    }

    /// Publish one lifecycle event. The service expects these before and
    /// after the corresponding build tool event stream.
    pub async fn publish_lifecycle_event(
        &mut self,
        request: impl tonic::IntoRequest<proto::PublishLifecycleEventRequest>,
    ) -> Result<tonic::Response<proto::Empty>, Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| Status::unknown(format!("Service was not ready: {}", e.into())))?;

        let codec = tonic_prost::ProstCodec::default();
        let path = PathAndQuery::from_static(LIFECYCLE_PATH);
        let mut req = request.into_request();
        _ = req
            .extensions_mut()
            .insert(GrpcMethod::new(SERVICE_NAME, "PublishLifecycleEvent"));

        self.inner.unary(req, path, codec).await
    }

    /// Open the bidirectional build tool event stream. Each request is
    /// acknowledged with the sequence number it carried, in order.
    pub async fn publish_build_tool_event_stream(
        &mut self,
        request: impl tonic::IntoStreamingRequest<
            Message = proto::PublishBuildToolEventStreamRequest,
        >,
    ) -> Result<tonic::Response<Streaming<proto::PublishBuildToolEventStreamResponse>>, Status>
    {
        self.inner
            .ready()
            .await
            .map_err(|e| Status::unknown(format!("Service was not ready: {}", e.into())))?;

        let codec = tonic_prost::ProstCodec::default();
        let path = PathAndQuery::from_static(STREAM_PATH);
        let mut req = request.into_streaming_request();
        _ = req
            .extensions_mut()
            .insert(GrpcMethod::new(SERVICE_NAME, "PublishBuildToolEventStream"));

        self.inner.streaming(req, path, codec).await
    }
}
