//! User-facing reporting seam and the transport's message templates.

/// Announced when `close` starts waiting for the upload.
pub const UPLOAD_WAITING_MESSAGE: &str = "Waiting for Build Event Protocol upload to finish.";

/// Reported when the upload completes cleanly.
pub const UPLOAD_SUCCEEDED_MESSAGE: &str = "Build Event Protocol upload finished successfully.";

/// Reported when the upload exceeds the configured timeout.
pub const UPLOAD_TIMED_OUT_MESSAGE: &str = "Build Event Protocol upload timed out.";

pub fn upload_failed_message(reason: &str) -> String {
    format!("Build Event Protocol upload failed: {}", reason)
}

pub fn results_url_message(url: &str) -> String {
    format!("Build Event Protocol results available at {}", url)
}

pub fn partial_results_url_message(url: &str) -> String {
    format!("Partial Build Event Protocol results may be available at {}", url)
}

/// Appended to the timeout message when a transient error forced a retry
/// earlier in the upload.
pub fn retry_reason_suffix(reason: &str) -> String {
    format!(
        " Transport errors caused the upload to be retried. Last known reason for retry: {}",
        reason
    )
}

/// Why the transport asks the build tool to exit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitKind {
    /// Upload failure while `errors_should_fail_the_build` is set.
    PublishError,
}

/// Destination for user-visible transport output.
///
/// The build tool hands the transport one of these at construction. All
/// methods may be called from any thread and must not block.
pub trait EventReporter: Send + Sync {
    fn info(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);

    /// Ask the build tool to terminate because of `kind`. Implementations
    /// decide whether the exit is immediate or deferred to the end of the
    /// current command.
    fn request_fatal_exit(&self, kind: ExitKind, message: &str);
}
