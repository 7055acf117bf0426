//! Artifact co-upload: local files referenced by an event are uploaded
//! before the event itself is serialised.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::runtime::Handle;

use crate::error::ArtifactError;
use crate::event::PathConverter;

/// Converter handle a resolved upload batch yields. `None` means events are
/// serialised without path rewriting.
pub type ConverterHandle = Option<Arc<dyn PathConverter>>;

/// Resolves once every local file in one event's batch has been uploaded.
///
/// Shared so a record can be serialised again after a stream retry without
/// re-awaiting (or re-running) the upload.
pub type PayloadFuture = Shared<BoxFuture<'static, Result<ConverterHandle, ArtifactError>>>;

/// Uploads local files referenced by build events to a remote namespace.
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    /// Upload one deduplicated file batch and resolve to its converter.
    async fn upload(&self, files: Vec<PathBuf>) -> Result<ConverterHandle, ArtifactError>;

    /// Release resources. Called once, after the RPC client has shut down.
    async fn shutdown(&self);
}

/// Uploader for hosts that ship events without artifact co-upload.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopArtifactUploader;

#[async_trait]
impl ArtifactUploader for NoopArtifactUploader {
    async fn upload(&self, _files: Vec<PathBuf>) -> Result<ConverterHandle, ArtifactError> {
        Ok(None)
    }

    async fn shutdown(&self) {}
}

/// A payload future that is already resolved with no converter.
pub(crate) fn resolved_payload() -> PayloadFuture {
    futures::future::ready(Ok(None)).boxed().shared()
}

/// Start `files` uploading immediately on `runtime` and hand back the shared
/// handle the stream driver awaits before serialising the event.
pub(crate) fn start_upload(
    runtime: &Handle,
    uploader: Arc<dyn ArtifactUploader>,
    files: Vec<PathBuf>,
) -> PayloadFuture {
    if files.is_empty() {
        return resolved_payload();
    }
    let task = runtime.spawn(async move { uploader.upload(files).await });
    async move {
        task.await
            .map_err(|e| ArtifactError::new(format!("upload task failed: {e}")))?
    }
    .boxed()
    .shared()
}

/// Deduplicate an event's file batch by path, keeping first-seen order.
pub(crate) fn dedup_files(files: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    files.into_iter().filter(|f| seen.insert(f.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_seen_order() {
        let files = vec![
            PathBuf::from("bazel-out/a.log"),
            PathBuf::from("bazel-out/b.log"),
            PathBuf::from("bazel-out/a.log"),
            PathBuf::from("bazel-out/c.log"),
            PathBuf::from("bazel-out/b.log"),
        ];
        let deduped = dedup_files(files);
        assert_eq!(
            deduped,
            vec![
                PathBuf::from("bazel-out/a.log"),
                PathBuf::from("bazel-out/b.log"),
                PathBuf::from("bazel-out/c.log"),
            ]
        );
    }

    #[tokio::test]
    async fn test_shared_payload_resolves_twice() {
        let payload = start_upload(
            &Handle::current(),
            Arc::new(NoopArtifactUploader),
            vec![PathBuf::from("out.txt")],
        );
        assert!(payload.clone().await.unwrap().is_none());
        // A retry serialises the same record again.
        assert!(payload.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_batch_resolves_immediately() {
        let payload = start_upload(&Handle::current(), Arc::new(NoopArtifactUploader), vec![]);
        assert!(payload.await.unwrap().is_none());
    }
}
