//! The upload pipeline: lifecycle framing around a retried bidirectional
//! event stream.
//!
//! One cooperative task runs the whole pipeline. The stream driver is fully
//! event-driven: a single `select!` loop moves records from the ingress
//! queue to the wire and pops the pending-ack queue as acknowledgements
//! arrive, so ACK handling never blocks sending and vice versa.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::StreamExt;
use tokio::sync::watch;
use tokio::time::Instant;
use tonic::Status;
use tracing::{debug, warn};

use bes_grpc_client::proto::PublishBuildToolEventStreamRequest;

use crate::artifact::ArtifactUploader;
use crate::client::{AckStream, BesClient, StreamSender};
use crate::error::{augment_status, PublishError};
use crate::event::InvocationResultCell;
use crate::queue::{EventQueue, EventRecord};
use crate::requests::RequestBuilder;
use crate::retry::{Progress, RetryController};

/// How long the driver waits for outstanding ACKs and the close status once
/// the terminator has been sent.
pub(crate) const STREAM_FINISH_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) struct Uploader {
    client: Arc<dyn BesClient>,
    artifact_uploader: Arc<dyn ArtifactUploader>,
    requests: Arc<RequestBuilder>,
    publish_lifecycle_events: bool,
    invocation_result: Arc<InvocationResultCell>,
    retry: Arc<RetryController>,
    progress: Arc<Progress>,
}

impl Uploader {
    pub fn new(
        client: Arc<dyn BesClient>,
        artifact_uploader: Arc<dyn ArtifactUploader>,
        requests: Arc<RequestBuilder>,
        publish_lifecycle_events: bool,
        invocation_result: Arc<InvocationResultCell>,
        retry: Arc<RetryController>,
        progress: Arc<Progress>,
    ) -> Self {
        Self {
            client,
            artifact_uploader,
            requests,
            publish_lifecycle_events,
            invocation_result,
            retry,
            progress,
        }
    }

    /// Drive the whole upload to completion.
    ///
    /// Shutdown of the RPC client and then the artifact uploader runs
    /// unconditionally, whatever happened before it.
    pub async fn run(
        self,
        mut queue: EventQueue,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<(), PublishError> {
        let result = self.run_pipeline(&mut queue, &mut cancel).await;
        self.client.shutdown().await;
        self.artifact_uploader.shutdown().await;
        result
    }

    async fn run_pipeline(
        &self,
        queue: &mut EventQueue,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(), PublishError> {
        if self.publish_lifecycle_events {
            // A failure here means there is no framing to close: skip the
            // stream entirely and go straight to shutdown.
            tokio::select! {
                result = self.open_lifecycle() => result?,
                _ = cancelled(cancel) => return Err(PublishError::Cancelled),
            }
        }

        let stream_result = tokio::select! {
            result = self.publish_event_stream(queue) => result,
            _ = cancelled(cancel) => Err(PublishError::Cancelled),
        };

        // The finish pair runs even when the stream failed or was cancelled;
        // it is deliberately not under the cancel signal.
        let finish_result = self.close_lifecycle().await;

        match stream_result {
            Err(err) => Err(err),
            Ok(()) => finish_result,
        }
    }

    async fn open_lifecycle(&self) -> Result<(), PublishError> {
        self.publish_lifecycle(self.requests.build_enqueued(SystemTime::now()))
            .await?;
        self.publish_lifecycle(self.requests.invocation_started(SystemTime::now()))
            .await
    }

    async fn close_lifecycle(&self) -> Result<(), PublishError> {
        if !self.publish_lifecycle_events {
            return Ok(());
        }
        let result = self.invocation_result.get();
        let finish = async {
            self.publish_lifecycle(
                self.requests
                    .invocation_finished(SystemTime::now(), result),
            )
            .await?;
            self.publish_lifecycle(self.requests.build_finished(SystemTime::now(), result))
                .await
        }
        .await;
        if let Err(err) = &finish {
            warn!(error = %err, "failed to publish lifecycle finish events");
        }
        finish
    }

    async fn publish_lifecycle(
        &self,
        request: bes_grpc_client::proto::PublishLifecycleEventRequest,
    ) -> Result<(), PublishError> {
        self.retry
            .retry(|| {
                let request = request.clone();
                async move {
                    self.client
                        .publish_lifecycle_event(request)
                        .await
                        .map_err(PublishError::Transport)
                }
            })
            .await
    }

    /// Run the stream driver under the retry policy. Kept as its own loop
    /// rather than going through [`RetryController::retry`] because every
    /// attempt needs mutable access to the same queue for resumption.
    async fn publish_event_stream(&self, queue: &mut EventQueue) -> Result<(), PublishError> {
        let mut failures: u32 = 0;
        loop {
            match self.stream_attempt(queue).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    let delay = self.retry.next_attempt(&mut failures, err)?;
                    warn!(
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        "build event stream failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One bidirectional stream attempt. On failure the unacknowledged
    /// records go back to the head of `queue`, in order, so the next attempt
    /// replays them before anything new.
    async fn stream_attempt(&self, queue: &mut EventQueue) -> Result<(), PublishError> {
        let (sender, acks) = self
            .client
            .open_build_tool_event_stream()
            .await
            .map_err(PublishError::Transport)?;

        let mut pending_ack = VecDeque::new();
        let result = self.drive_stream(queue, sender, acks, &mut pending_ack).await;
        if result.is_err() && !pending_ack.is_empty() {
            debug!(
                unacked = pending_ack.len(),
                "returning unacknowledged events to the send queue"
            );
            queue.requeue(pending_ack);
        }
        result
    }

    async fn drive_stream(
        &self,
        queue: &mut EventQueue,
        sender: StreamSender,
        mut acks: AckStream,
        pending_ack: &mut VecDeque<EventRecord>,
    ) -> Result<(), PublishError> {
        let mut sender = Some(sender);
        let mut terminator_acked = false;
        let mut finish_deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                record = queue.next(), if sender.is_some() && finish_deadline.is_none() => {
                    let Some(record) = record else {
                        // The transport dropped the producer half without
                        // enqueueing a terminator; it is tearing down.
                        return Err(PublishError::Cancelled);
                    };
                    let is_terminator = record.is_terminator();
                    pending_ack.push_back(record.clone());
                    let request = self.serialize(record).await?;
                    let Some(tx) = sender.clone() else {
                        continue;
                    };
                    if tx.send(request).await.is_err() {
                        // The stream is gone; the ACK arm observes why.
                        sender = None;
                        continue;
                    }
                    if is_terminator {
                        finish_deadline = Some(Instant::now() + STREAM_FINISH_TIMEOUT);
                    }
                }

                ack = acks.next() => {
                    match ack {
                        Some(Ok(response)) => {
                            match pending_ack.front() {
                                Some(head) if head.sequence_number == response.sequence_number => {
                                    let acked_terminator = head.is_terminator();
                                    pending_ack.pop_front();
                                    self.progress.record_ack();
                                    if acked_terminator {
                                        // Half-close; the server finishes the
                                        // stream in response.
                                        terminator_acked = true;
                                        sender = None;
                                    }
                                }
                                head => {
                                    let expected =
                                        head.map(|r| r.sequence_number).unwrap_or(-1);
                                    return Err(PublishError::ack_mismatch(
                                        expected,
                                        response.sequence_number,
                                    ));
                                }
                            }
                        }
                        Some(Err(status)) => {
                            let status = if terminator_acked {
                                status
                            } else {
                                augment_status(status, "Stream closed prematurely")
                            };
                            return Err(PublishError::Transport(status));
                        }
                        None => {
                            if terminator_acked {
                                return Ok(());
                            }
                            return Err(PublishError::Transport(Status::internal(
                                "Stream closed prematurely",
                            )));
                        }
                    }
                }

                _ = sleep_until_or_park(finish_deadline), if finish_deadline.is_some() => {
                    return Err(PublishError::Transport(Status::deadline_exceeded(
                        "Timed out waiting for ACK messages",
                    )));
                }
            }
        }
    }

    /// Wait for the record's artifact batch, then build its wire request.
    async fn serialize(
        &self,
        record: EventRecord,
    ) -> Result<PublishBuildToolEventStreamRequest, PublishError> {
        let converter = record
            .payload_future
            .clone()
            .await
            .map_err(PublishError::LocalFileUpload)?;
        let request = match &record.event {
            Some(event) => {
                let packed = event.payload(converter.as_deref());
                self.requests
                    .bazel_event(record.sequence_number, record.event_time, packed)
            }
            None => self
                .requests
                .stream_finished(record.sequence_number, record.event_time),
        };
        Ok(request)
    }
}

/// Resolves once the cancel signal fires; parks forever if the sender side
/// went away without signalling.
pub(crate) async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|flagged| *flagged).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn sleep_until_or_park(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
