//! Client-side transport for the Build Event Service.
//!
//! The transport streams a build tool's event log to a remote collector over
//! a bidirectional gRPC stream, with lifecycle framing around the stream,
//! strictly ordered delivery tracked by per-event acknowledgements, artifact
//! co-upload, transparent retry of transient transport failures, and bounded
//! shutdown.
//!
//! The build tool hands events to [`BuildEventServiceTransport::send_event`]
//! as they occur and calls [`BuildEventServiceTransport::close`] at the end
//! of the build; everything else happens on one background task.

pub mod artifact;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod report;

mod queue;
mod requests;
mod retry;
mod transport;
mod uploader;

/// Wire message types, re-exported for [`client::BesClient`] implementors.
pub use bes_grpc_client::proto;

pub use artifact::{ArtifactUploader, ConverterHandle, NoopArtifactUploader};
pub use client::{AckStream, BesClient, GrpcBesClient, StreamSender};
pub use config::TransportOptions;
pub use error::{format_status, ArtifactError, PublishError};
pub use event::{BuildCompletion, BuildEvent, InvocationResult, PathConverter};
pub use report::{
    EventReporter, ExitKind, UPLOAD_SUCCEEDED_MESSAGE, UPLOAD_TIMED_OUT_MESSAGE,
    UPLOAD_WAITING_MESSAGE,
};
pub use transport::{BuildEventServiceTransport, ShutdownHandle};
