//! In-memory event records and the ingress queue feeding the stream driver.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::mpsc;

use crate::artifact::{resolved_payload, PayloadFuture};
use crate::event::BuildEvent;

/// One enqueued event together with everything the driver needs to ship it.
///
/// Records are immutable after construction and cheap to clone: the driver
/// keeps a clone on the pending-ack queue while the original rides the wire.
#[derive(Clone)]
pub(crate) struct EventRecord {
    pub sequence_number: i64,
    pub event_time: SystemTime,
    /// Resolves to the path converter once the event's file batch uploaded.
    pub payload_future: PayloadFuture,
    /// `None` marks the terminator.
    pub event: Option<Arc<dyn BuildEvent>>,
}

impl EventRecord {
    pub fn new(
        sequence_number: i64,
        event_time: SystemTime,
        payload_future: PayloadFuture,
        event: Arc<dyn BuildEvent>,
    ) -> Self {
        Self {
            sequence_number,
            event_time,
            payload_future,
            event: Some(event),
        }
    }

    /// The sentinel record marking "no more events".
    pub fn terminator(sequence_number: i64, event_time: SystemTime) -> Self {
        Self {
            sequence_number,
            event_time,
            payload_future: resolved_payload(),
            event: None,
        }
    }

    pub fn is_terminator(&self) -> bool {
        self.event.is_none()
    }
}

/// FIFO of records awaiting send.
///
/// A retried stream attempt puts its unacknowledged records back at the head
/// via [`EventQueue::requeue`], so the concatenation of pending-ack and
/// pending-send always preserves the original insertion order.
pub(crate) struct EventQueue {
    resend: VecDeque<EventRecord>,
    rx: mpsc::UnboundedReceiver<EventRecord>,
}

impl EventQueue {
    pub fn channel() -> (mpsc::UnboundedSender<EventRecord>, EventQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            EventQueue {
                resend: VecDeque::new(),
                rx,
            },
        )
    }

    /// Next record in wire order. `None` once the producer half is gone and
    /// everything buffered has been drained.
    pub async fn next(&mut self) -> Option<EventRecord> {
        if let Some(record) = self.resend.pop_front() {
            return Some(record);
        }
        self.rx.recv().await
    }

    /// Put one attempt's surviving pending-ack records back at the head, in
    /// their original order.
    pub fn requeue(&mut self, mut pending: VecDeque<EventRecord>) {
        pending.extend(self.resend.drain(..));
        self.resend = pending;
    }
}
