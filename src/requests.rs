//! Construction of the wire envelopes, with the sequence-number discipline
//! the service enforces.
//!
//! Lifecycle envelopes use fixed per-sub-phase sequence numbers: each
//! controller-scoped sub-stream (build, invocation attempt) carries exactly
//! a start event numbered 1 and a finish event numbered 2. The build tool
//! event stream has its own counter, monotonic from 1.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::SystemTime;

use prost_types::{Any, Timestamp};

use bes_grpc_client::proto::{
    build_event, build_status, BuildComponent, BuildEvent, BuildStatus, OrderedBuildEvent,
    PublishBuildToolEventStreamRequest, PublishLifecycleEventRequest, ServiceLevel, StreamId,
};

use crate::config::TransportOptions;
use crate::event::InvocationResult;

const LIFECYCLE_START: i64 = 1;
const LIFECYCLE_FINISH: i64 = 2;

pub(crate) struct RequestBuilder {
    build_request_id: String,
    invocation_id: String,
    project_id: String,
    command_name: String,
    additional_keywords: Vec<String>,
    lifecycle_events_present: bool,
    stream_sequence: AtomicI64,
}

impl RequestBuilder {
    pub fn new(options: &TransportOptions) -> Self {
        Self {
            build_request_id: options.build_request_id.clone(),
            invocation_id: options.invocation_id.clone(),
            project_id: options.project_id.clone().unwrap_or_default(),
            command_name: options.command_name.clone(),
            additional_keywords: options.additional_keywords.clone(),
            lifecycle_events_present: options.publish_lifecycle_events,
            stream_sequence: AtomicI64::new(1),
        }
    }

    /// Next main-stream sequence number; starts at 1.
    pub fn next_sequence_number(&self) -> i64 {
        self.stream_sequence.fetch_add(1, Ordering::Relaxed)
    }

    pub fn build_enqueued(&self, time: SystemTime) -> PublishLifecycleEventRequest {
        self.lifecycle(
            LIFECYCLE_START,
            self.controller_stream_id(false),
            time,
            build_event::Event::BuildEnqueued(build_event::BuildEnqueued::default()),
        )
    }

    pub fn build_finished(
        &self,
        time: SystemTime,
        result: InvocationResult,
    ) -> PublishLifecycleEventRequest {
        self.lifecycle(
            LIFECYCLE_FINISH,
            self.controller_stream_id(false),
            time,
            build_event::Event::BuildFinished(build_event::BuildFinished {
                status: Some(build_status_of(result)),
            }),
        )
    }

    pub fn invocation_started(&self, time: SystemTime) -> PublishLifecycleEventRequest {
        self.lifecycle(
            LIFECYCLE_START,
            self.controller_stream_id(true),
            time,
            build_event::Event::InvocationAttemptStarted(build_event::InvocationAttemptStarted {
                attempt_number: 1,
            }),
        )
    }

    pub fn invocation_finished(
        &self,
        time: SystemTime,
        result: InvocationResult,
    ) -> PublishLifecycleEventRequest {
        self.lifecycle(
            LIFECYCLE_FINISH,
            self.controller_stream_id(true),
            time,
            build_event::Event::InvocationAttemptFinished(
                build_event::InvocationAttemptFinished {
                    invocation_status: Some(build_status_of(result)),
                },
            ),
        )
    }

    pub fn bazel_event(
        &self,
        sequence_number: i64,
        time: SystemTime,
        packed: Any,
    ) -> PublishBuildToolEventStreamRequest {
        self.stream_request(sequence_number, time, build_event::Event::BazelEvent(packed))
    }

    pub fn stream_finished(
        &self,
        sequence_number: i64,
        time: SystemTime,
    ) -> PublishBuildToolEventStreamRequest {
        self.stream_request(
            sequence_number,
            time,
            build_event::Event::ComponentStreamFinished(
                build_event::BuildComponentStreamFinished {
                    r#type: build_event::build_component_stream_finished::FinishType::Finished
                        as i32,
                },
            ),
        )
    }

    /// Controller-scoped stream id; the invocation id is present only on
    /// invocation-attempt envelopes.
    fn controller_stream_id(&self, with_invocation: bool) -> StreamId {
        StreamId {
            build_id: self.build_request_id.clone(),
            invocation_id: if with_invocation {
                self.invocation_id.clone()
            } else {
                String::new()
            },
            component: BuildComponent::Controller as i32,
        }
    }

    fn tool_stream_id(&self) -> StreamId {
        StreamId {
            build_id: self.build_request_id.clone(),
            invocation_id: self.invocation_id.clone(),
            component: BuildComponent::Tool as i32,
        }
    }

    fn lifecycle(
        &self,
        sequence_number: i64,
        stream_id: StreamId,
        time: SystemTime,
        event: build_event::Event,
    ) -> PublishLifecycleEventRequest {
        PublishLifecycleEventRequest {
            service_level: ServiceLevel::Interactive as i32,
            build_event: Some(ordered(stream_id, sequence_number, time, event)),
            stream_timeout: None,
            notification_keywords: Vec::new(),
            project_id: self.project_id.clone(),
            check_preceding_lifecycle_events_present: false,
        }
    }

    fn stream_request(
        &self,
        sequence_number: i64,
        time: SystemTime,
        event: build_event::Event,
    ) -> PublishBuildToolEventStreamRequest {
        let first = sequence_number == 1;
        PublishBuildToolEventStreamRequest {
            ordered_build_event: Some(ordered(self.tool_stream_id(), sequence_number, time, event)),
            notification_keywords: if first { self.keywords() } else { Vec::new() },
            project_id: self.project_id.clone(),
            check_preceding_lifecycle_events_present: first && self.lifecycle_events_present,
        }
    }

    fn keywords(&self) -> Vec<String> {
        let mut keywords = vec![
            format!("command_name={}", self.command_name),
            "protocol_name=BEP".to_string(),
        ];
        keywords.extend(self.additional_keywords.iter().cloned());
        keywords
    }
}

fn ordered(
    stream_id: StreamId,
    sequence_number: i64,
    time: SystemTime,
    event: build_event::Event,
) -> OrderedBuildEvent {
    OrderedBuildEvent {
        stream_id: Some(stream_id),
        sequence_number,
        event: Some(BuildEvent {
            event_time: Some(Timestamp::from(time)),
            event: Some(event),
        }),
    }
}

fn build_status_of(result: InvocationResult) -> BuildStatus {
    let result = match result {
        InvocationResult::Unknown => build_status::Result::UnknownStatus,
        InvocationResult::Succeeded => build_status::Result::CommandSucceeded,
        InvocationResult::Failed => build_status::Result::CommandFailed,
    };
    BuildStatus {
        result: result as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> RequestBuilder {
        RequestBuilder::new(&TransportOptions {
            build_request_id: "build-1".to_string(),
            invocation_id: "inv-1".to_string(),
            command_name: "test".to_string(),
            additional_keywords: vec!["user_keyword=ci".to_string()],
            ..TransportOptions::default()
        })
    }

    fn stream_id_of(request: &PublishLifecycleEventRequest) -> &StreamId {
        request
            .build_event
            .as_ref()
            .unwrap()
            .stream_id
            .as_ref()
            .unwrap()
    }

    #[test]
    fn test_sequence_numbers_start_at_one_and_increase() {
        let builder = builder();
        assert_eq!(builder.next_sequence_number(), 1);
        assert_eq!(builder.next_sequence_number(), 2);
        assert_eq!(builder.next_sequence_number(), 3);
    }

    #[test]
    fn test_build_scoped_envelopes_omit_invocation_id() {
        let builder = builder();
        let enqueued = builder.build_enqueued(SystemTime::now());
        let id = stream_id_of(&enqueued);
        assert_eq!(id.build_id, "build-1");
        assert_eq!(id.invocation_id, "");
        assert_eq!(id.component, BuildComponent::Controller as i32);
        assert_eq!(enqueued.build_event.as_ref().unwrap().sequence_number, 1);

        let finished = builder.build_finished(SystemTime::now(), InvocationResult::Succeeded);
        assert_eq!(finished.build_event.as_ref().unwrap().sequence_number, 2);
    }

    #[test]
    fn test_invocation_scoped_envelopes_carry_invocation_id() {
        let builder = builder();
        let started = builder.invocation_started(SystemTime::now());
        let id = stream_id_of(&started);
        assert_eq!(id.invocation_id, "inv-1");
        assert_eq!(id.component, BuildComponent::Controller as i32);

        let finished = builder.invocation_finished(SystemTime::now(), InvocationResult::Failed);
        let event = finished
            .build_event
            .unwrap()
            .event
            .unwrap()
            .event
            .unwrap();
        match event {
            build_event::Event::InvocationAttemptFinished(inner) => {
                assert_eq!(
                    inner.invocation_status.unwrap().result,
                    build_status::Result::CommandFailed as i32
                );
            }
            other => panic!("unexpected event kind: {other:?}"),
        }
    }

    #[test]
    fn test_stream_requests_use_tool_component() {
        let builder = builder();
        let request = builder.bazel_event(4, SystemTime::now(), Any::default());
        let id = request
            .ordered_build_event
            .as_ref()
            .unwrap()
            .stream_id
            .as_ref()
            .unwrap();
        assert_eq!(id.component, BuildComponent::Tool as i32);
        assert_eq!(id.invocation_id, "inv-1");
    }

    #[test]
    fn test_keywords_only_on_first_stream_request() {
        let builder = builder();
        let first = builder.bazel_event(1, SystemTime::now(), Any::default());
        assert_eq!(
            first.notification_keywords,
            vec![
                "command_name=test".to_string(),
                "protocol_name=BEP".to_string(),
                "user_keyword=ci".to_string(),
            ]
        );
        assert!(first.check_preceding_lifecycle_events_present);

        let second = builder.bazel_event(2, SystemTime::now(), Any::default());
        assert!(second.notification_keywords.is_empty());
        assert!(!second.check_preceding_lifecycle_events_present);
    }

    #[test]
    fn test_terminator_marks_stream_finished() {
        let builder = builder();
        let request = builder.stream_finished(3, SystemTime::now());
        let event = request
            .ordered_build_event
            .unwrap()
            .event
            .unwrap()
            .event
            .unwrap();
        match event {
            build_event::Event::ComponentStreamFinished(inner) => {
                assert_eq!(
                    inner.r#type,
                    build_event::build_component_stream_finished::FinishType::Finished as i32
                );
            }
            other => panic!("unexpected event kind: {other:?}"),
        }
    }
}
