//! Error taxonomy for the upload pipeline.

use thiserror::Error;
use tonic::{Code, Status};

/// Failure of a local artifact upload batch.
///
/// Cloneable so a shared payload future can hand the same failure to every
/// record waiting on the batch.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct ArtifactError {
    message: String,
}

impl ArtifactError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors surfaced by the upload pipeline.
#[derive(Clone, Debug, Error)]
pub enum PublishError {
    /// The RPC layer rejected a request or tore down the stream.
    #[error("{}", format_status(.0))]
    Transport(Status),
    /// A local file referenced by an event failed to upload. Never retried.
    #[error("Local file upload failed: {0}")]
    LocalFileUpload(ArtifactError),
    /// The transport was shut down before the upload completed.
    #[error("Build Event Protocol upload was cancelled")]
    Cancelled,
}

impl PublishError {
    /// Whether the retry controller may run another attempt after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            PublishError::Transport(status) => !matches!(
                status.code(),
                Code::InvalidArgument | Code::FailedPrecondition
            ),
            PublishError::LocalFileUpload(_) | PublishError::Cancelled => false,
        }
    }

    /// The collector acknowledged a sequence number other than the head of
    /// the pending-ack queue.
    pub(crate) fn ack_mismatch(expected: i64, got: i64) -> Self {
        PublishError::Transport(Status::internal(format!(
            "Expected ACK {expected} but was {got}"
        )))
    }
}

/// Append `note` to a status message, preserving the code.
pub(crate) fn augment_status(status: Status, note: &str) -> Status {
    if status.message().is_empty() {
        Status::new(status.code(), note.to_string())
    } else {
        Status::new(status.code(), format!("{}: {}", status.message(), note))
    }
}

/// Render a status the way users should see it.
pub fn format_status(status: &Status) -> String {
    if status.message().is_empty() {
        format!("{:?}", status.code())
    } else {
        format!("{:?}: {}", status.code(), status.message())
    }
}
