//! Public transport façade handed to the build tool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::artifact::{dedup_files, start_upload, ArtifactUploader};
use crate::client::BesClient;
use crate::config::TransportOptions;
use crate::error::{format_status, PublishError};
use crate::event::{BuildEvent, InvocationResultCell};
use crate::queue::{EventQueue, EventRecord};
use crate::report::{self, EventReporter, ExitKind};
use crate::requests::RequestBuilder;
use crate::retry::{Progress, RetryController};
use crate::uploader::Uploader;

/// Completion handle returned by [`BuildEventServiceTransport::close`].
///
/// Resolves once the upload has finished, timed out, or been torn down.
/// Every call to `close` observes the same completion.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    done: watch::Receiver<bool>,
}

impl ShutdownHandle {
    /// Wait for the transport to finish shutting down.
    pub async fn wait(mut self) {
        let _ = self.done.wait_for(|done| *done).await;
    }

    pub fn is_complete(&self) -> bool {
        *self.done.borrow()
    }
}

/// Streams a build tool's event log to a Build Event Service collector.
///
/// Cheap to clone; all clones share one upload pipeline. Must be created
/// inside a tokio runtime: the transport captures the current handle to run
/// its orchestrator task and artifact uploads on.
#[derive(Clone)]
pub struct BuildEventServiceTransport {
    inner: Arc<Inner>,
}

struct Inner {
    options: TransportOptions,
    reporter: Arc<dyn EventReporter>,
    artifact_uploader: Arc<dyn ArtifactUploader>,
    client: Arc<dyn BesClient>,
    requests: Arc<RequestBuilder>,
    invocation_result: Arc<InvocationResultCell>,
    retry: Arc<RetryController>,
    progress: Arc<Progress>,
    runtime: Handle,
    state: Mutex<UploadState>,
    /// At-most-once latch for user-visible error reporting.
    errors_reported: AtomicBool,
    outcome: Mutex<Option<Result<(), PublishError>>>,
    upload_done: watch::Sender<bool>,
    cancel: watch::Sender<bool>,
    shutdown_done: watch::Sender<bool>,
}

struct UploadState {
    /// Producer half of the ingress queue; dropped once the terminator is in.
    sender: Option<mpsc::UnboundedSender<EventRecord>>,
    /// Consumer half, handed to the orchestrator on first use.
    queue: Option<EventQueue>,
    upload_task: Option<JoinHandle<()>>,
    guardian: Option<JoinHandle<()>>,
    closed: bool,
}

impl BuildEventServiceTransport {
    pub fn new(
        client: Arc<dyn BesClient>,
        artifact_uploader: Arc<dyn ArtifactUploader>,
        reporter: Arc<dyn EventReporter>,
        options: TransportOptions,
    ) -> Self {
        let (ingress, queue) = EventQueue::channel();
        let (upload_done, _) = watch::channel(false);
        let (cancel, _) = watch::channel(false);
        let (shutdown_done, _) = watch::channel(false);
        let requests = Arc::new(RequestBuilder::new(&options));
        let progress = Arc::new(Progress::default());
        let retry = Arc::new(RetryController::new(Arc::clone(&progress)));

        Self {
            inner: Arc::new(Inner {
                options,
                reporter,
                artifact_uploader,
                client,
                requests,
                invocation_result: Arc::new(InvocationResultCell::default()),
                retry,
                progress,
                runtime: Handle::current(),
                state: Mutex::new(UploadState {
                    sender: Some(ingress),
                    queue: Some(queue),
                    upload_task: None,
                    guardian: None,
                    closed: false,
                }),
                errors_reported: AtomicBool::new(false),
                outcome: Mutex::new(None),
                upload_done,
                cancel,
                shutdown_done,
            }),
        }
    }

    /// Hand one build tool event to the transport.
    ///
    /// May be called from any thread. Events submitted after [`close`] are
    /// dropped. If the upload has already failed, the failure is reported
    /// (once) and the event is dropped.
    ///
    /// [`close`]: BuildEventServiceTransport::close
    pub fn send_event(&self, event: impl BuildEvent) {
        let inner = &self.inner;
        let event: Arc<dyn BuildEvent> = Arc::new(event);

        let mut state = inner.state.lock();
        let Some(sender) = state.sender.clone() else {
            return;
        };

        if let Some(completion) = event.completion() {
            inner.invocation_result.record(completion);
        }

        if let Some(Err(err)) = inner.outcome.lock().clone() {
            drop(state);
            inner.report_upload_failure(&report::upload_failed_message(&err.to_string()));
            return;
        }

        let event_time = SystemTime::now();
        let files = dedup_files(event.local_files());
        let payload_future = start_upload(
            &inner.runtime,
            Arc::clone(&inner.artifact_uploader),
            files,
        );
        let sequence_number = inner.requests.next_sequence_number();
        let record = EventRecord::new(sequence_number, event_time, payload_future, event);
        let _ = sender.send(record);

        Inner::ensure_started(inner, &mut state);
    }

    /// Finish the upload: enqueue the terminator, stop accepting events and
    /// launch the guardian that waits (up to the configured upload timeout)
    /// for the pipeline to drain.
    ///
    /// Idempotent; every call returns a handle to the same completion.
    pub fn close(&self) -> ShutdownHandle {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        if state.closed {
            return self.handle();
        }
        state.closed = true;

        let sequence_number = inner.requests.next_sequence_number();
        let terminator = EventRecord::terminator(sequence_number, SystemTime::now());
        if let Some(sender) = state.sender.take() {
            let _ = sender.send(terminator);
        }
        Inner::ensure_started(inner, &mut state);

        let guard_inner = Arc::clone(inner);
        state.guardian = Some(inner.runtime.spawn(async move {
            guard_inner.guard_upload().await;
        }));

        self.handle()
    }

    /// Forced shutdown: cancel the upload and complete the shutdown handle
    /// immediately. Idempotent, and shares the reentrancy guard with
    /// [`close`].
    ///
    /// No error is reported here; anything already latched stands.
    ///
    /// [`close`]: BuildEventServiceTransport::close
    pub fn close_now(&self) {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        if *inner.shutdown_done.borrow() {
            return;
        }
        state.closed = true;
        state.sender = None;
        if let Some(guardian) = state.guardian.take() {
            guardian.abort();
        }
        drop(state);

        debug!("forced shutdown of build event transport");
        let _ = inner.cancel.send(true);
        let _ = inner.shutdown_done.send(true);
    }

    fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            done: self.inner.shutdown_done.subscribe(),
        }
    }
}

impl Inner {
    /// Lazily submit the orchestrator on first use.
    fn ensure_started(this: &Arc<Self>, state: &mut UploadState) {
        if state.upload_task.is_some() {
            return;
        }
        let Some(queue) = state.queue.take() else {
            return;
        };
        let uploader = Uploader::new(
            Arc::clone(&this.client),
            Arc::clone(&this.artifact_uploader),
            Arc::clone(&this.requests),
            this.options.publish_lifecycle_events,
            Arc::clone(&this.invocation_result),
            Arc::clone(&this.retry),
            Arc::clone(&this.progress),
        );
        let cancel = this.cancel.subscribe();
        let inner = Arc::clone(this);
        state.upload_task = Some(this.runtime.spawn(async move {
            let result = uploader.run(queue, cancel).await;
            if let Err(err) = &result {
                debug!(error = %err, "build event upload finished with error");
            }
            *inner.outcome.lock() = Some(result);
            let _ = inner.upload_done.send(true);
        }));
    }

    /// The `close` guardian: wait for the orchestrator, bounded by the
    /// configured upload timeout, then report and complete the handle.
    async fn guard_upload(self: Arc<Self>) {
        self.reporter.info(report::UPLOAD_WAITING_MESSAGE);

        let mut upload_done = self.upload_done.subscribe();
        let finished = if self.options.upload_timeout.is_zero() {
            let _ = upload_done.wait_for(|done| *done).await;
            true
        } else {
            tokio::time::timeout(
                self.options.upload_timeout,
                upload_done.wait_for(|done| *done),
            )
            .await
            .is_ok()
        };

        if finished {
            let outcome = self.outcome.lock().clone();
            match outcome {
                Some(Ok(())) => {
                    self.reporter.info(report::UPLOAD_SUCCEEDED_MESSAGE);
                    if let Some(url) = &self.options.bes_results_url {
                        self.reporter.info(&report::results_url_message(url));
                    }
                }
                Some(Err(err)) => {
                    self.report_upload_failure(&report::upload_failed_message(&err.to_string()));
                }
                None => {}
            }
        } else {
            // Timed out: cancel the upload and tell the user, enriched with
            // the last transient error when a retry happened earlier.
            let _ = self.cancel.send(true);
            let mut message = report::UPLOAD_TIMED_OUT_MESSAGE.to_string();
            if let Some(status) = self.retry.last_retry_error() {
                message.push_str(&report::retry_reason_suffix(&format_status(&status)));
            }
            self.report_upload_failure(&message);
        }

        let _ = self.shutdown_done.send(true);
    }

    /// Surface an upload failure to the user, at most once per transport.
    fn report_upload_failure(&self, message: &str) {
        if self.errors_reported.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.options.errors_should_fail_the_build {
            self.reporter.error(message);
            self.reporter
                .request_fatal_exit(ExitKind::PublishError, message);
        } else {
            self.reporter.warning(message);
        }
        if let Some(url) = &self.options.bes_results_url {
            self.reporter
                .info(&report::partial_results_url_message(url));
        }
    }
}
