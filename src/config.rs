//! Transport configuration.

use std::time::Duration;

use uuid::Uuid;

/// Options consumed by [`crate::BuildEventServiceTransport`].
#[derive(Clone, Debug)]
pub struct TransportOptions {
    /// Maximum wall time `close` waits for the upload to drain. Zero waits
    /// forever.
    pub upload_timeout: Duration,
    /// When false, skip all lifecycle envelopes and run only the event
    /// stream.
    pub publish_lifecycle_events: bool,
    /// When true an upload failure is reported as an error and a fatal exit
    /// is requested; when false it is reported as a warning.
    pub errors_should_fail_the_build: bool,
    /// Printed on success, and as "partial results" on failure, when set.
    pub bes_results_url: Option<String>,
    /// Project the uploaded invocation is billed against, if any.
    pub project_id: Option<String>,
    pub build_request_id: String,
    pub invocation_id: String,
    /// Build tool command, e.g. `build` or `test`.
    pub command_name: String,
    /// Extra notification keywords attached to the first stream request.
    pub additional_keywords: Vec<String>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            upload_timeout: Duration::ZERO,
            publish_lifecycle_events: true,
            errors_should_fail_the_build: false,
            bes_results_url: None,
            project_id: None,
            build_request_id: Uuid::new_v4().to_string(),
            invocation_id: Uuid::new_v4().to_string(),
            command_name: "build".to_string(),
            additional_keywords: Vec::new(),
        }
    }
}
