//! Retry controller shared by lifecycle publishes and the event stream.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tonic::Status;
use tracing::warn;

use crate::error::PublishError;

/// Retries granted beyond the initial attempt.
pub(crate) const MAX_RETRIES: u32 = 5;

const BASE_DELAY_MS: f64 = 1000.0;
const BACKOFF_FACTOR: f64 = 1.6;

/// ACK progress shared between the stream driver and the retry controller.
///
/// A stream that keeps acknowledging records between failures never exhausts
/// the retry budget.
#[derive(Debug, Default)]
pub(crate) struct Progress {
    acks: AtomicU64,
}

impl Progress {
    pub fn record_ack(&self) {
        self.acks.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of ACKs since the last call; resets the counter.
    fn take(&self) -> u64 {
        self.acks.swap(0, Ordering::Relaxed)
    }
}

/// Delay applied before attempt `attempt` (1-based). The first attempt
/// starts immediately; attempt n >= 2 waits 1000ms * 1.6^n.
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    if attempt <= 1 {
        return Duration::ZERO;
    }
    Duration::from_millis((BASE_DELAY_MS * BACKOFF_FACTOR.powi(attempt as i32)) as u64)
}

pub(crate) struct RetryController {
    progress: Arc<Progress>,
    last_retry_error: Mutex<Option<Status>>,
}

impl RetryController {
    pub fn new(progress: Arc<Progress>) -> Self {
        Self {
            progress,
            last_retry_error: Mutex::new(None),
        }
    }

    /// Most recent transient status that caused a retry, for inclusion in a
    /// later timeout message.
    pub fn last_retry_error(&self) -> Option<Status> {
        self.last_retry_error.lock().clone()
    }

    /// Decide what happens after a failed attempt: either the delay to sleep
    /// before the next one, or the error to give up with.
    ///
    /// `failures` counts failed attempts since the last ACK progress; it is
    /// reset here whenever the wrapped call acknowledged at least one record.
    pub fn next_attempt(
        &self,
        failures: &mut u32,
        err: PublishError,
    ) -> Result<Duration, PublishError> {
        if !err.is_retryable() {
            return Err(err);
        }
        if self.progress.take() > 0 {
            *failures = 0;
        }
        *failures += 1;
        if *failures > MAX_RETRIES {
            return Err(err);
        }
        if let PublishError::Transport(status) = &err {
            *self.last_retry_error.lock() = Some(status.clone());
        }
        Ok(backoff_delay(*failures + 1))
    }

    /// Run `call` until it succeeds, fails permanently, or the retry budget
    /// (initial attempt plus [`MAX_RETRIES`]) is exhausted.
    pub async fn retry<T, F, Fut>(&self, mut call: F) -> Result<T, PublishError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PublishError>>,
    {
        let mut failures: u32 = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let delay = self.next_attempt(&mut failures, err)?;
                    warn!(
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        "retrying Build Event Service call"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
