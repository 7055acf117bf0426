//! Hand-maintained message definitions for the `google.devtools.build.v1`
//! publish API.
//!
//! Field numbers and enum values are fixed by the remote service; the structs
//! below are wire-compatible with the service protos for the subset of fields
//! the transport uses. Kept by hand (rather than generated in `build.rs`) so
//! building the crate does not require a protoc toolchain.

/// Expected frequency and durability of event delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ServiceLevel {
    Noninteractive = 0,
    Interactive = 1,
}

/// Which component of the build system produced a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum BuildComponent {
    UnknownComponent = 0,
    Controller = 1,
    Worker = 2,
    Tool = 3,
}

/// Mirror of `google.protobuf.Empty`, the lifecycle RPC's response type.
#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Empty {}

/// Identifies one event stream within a build.
#[derive(Clone, PartialEq, prost::Message)]
pub struct StreamId {
    #[prost(string, tag = "1")]
    pub build_id: String,
    #[prost(string, tag = "6")]
    pub invocation_id: String,
    #[prost(enumeration = "BuildComponent", tag = "3")]
    pub component: i32,
}

pub mod build_status {
    /// Final outcome reported for a build or an invocation attempt.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Result {
        UnknownStatus = 0,
        CommandSucceeded = 1,
        CommandFailed = 2,
        UserError = 3,
        SystemError = 4,
        ResourceExhausted = 5,
        InvocationDeadlineExceeded = 6,
        Cancelled = 7,
        RequestDeadlineExceeded = 8,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BuildStatus {
    #[prost(enumeration = "build_status::Result", tag = "1")]
    pub result: i32,
}

pub mod build_event {
    /// An invocation attempt has started.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct InvocationAttemptStarted {
        #[prost(int64, tag = "1")]
        pub attempt_number: i64,
    }

    /// An invocation attempt has finished.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct InvocationAttemptFinished {
        #[prost(message, optional, tag = "3")]
        pub invocation_status: Option<super::BuildStatus>,
    }

    /// The build has been enqueued.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct BuildEnqueued {}

    /// The build has finished.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct BuildFinished {
        #[prost(message, optional, tag = "1")]
        pub status: Option<super::BuildStatus>,
    }

    pub mod build_component_stream_finished {
        /// How the event stream ended.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
        #[repr(i32)]
        pub enum FinishType {
            Unspecified = 0,
            Finished = 1,
            Expired = 2,
        }
    }

    /// The last message of a build component's event stream.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct BuildComponentStreamFinished {
        #[prost(
            enumeration = "build_component_stream_finished::FinishType",
            tag = "1"
        )]
        pub r#type: i32,
    }

    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Event {
        #[prost(message, tag = "51")]
        InvocationAttemptStarted(InvocationAttemptStarted),
        #[prost(message, tag = "52")]
        InvocationAttemptFinished(InvocationAttemptFinished),
        #[prost(message, tag = "53")]
        BuildEnqueued(BuildEnqueued),
        #[prost(message, tag = "55")]
        BuildFinished(BuildFinished),
        #[prost(message, tag = "59")]
        ComponentStreamFinished(BuildComponentStreamFinished),
        #[prost(message, tag = "60")]
        BazelEvent(::prost_types::Any),
    }
}

/// A timestamped event of one of the service-known kinds.
#[derive(Clone, PartialEq, prost::Message)]
pub struct BuildEvent {
    #[prost(message, optional, tag = "1")]
    pub event_time: Option<prost_types::Timestamp>,
    #[prost(oneof = "build_event::Event", tags = "51, 52, 53, 55, 59, 60")]
    pub event: Option<build_event::Event>,
}

/// An event paired with its position in a stream.
#[derive(Clone, PartialEq, prost::Message)]
pub struct OrderedBuildEvent {
    #[prost(message, optional, tag = "1")]
    pub stream_id: Option<StreamId>,
    #[prost(int64, tag = "2")]
    pub sequence_number: i64,
    #[prost(message, optional, tag = "3")]
    pub event: Option<BuildEvent>,
}

/// Unary request framing the build outside the main event stream.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PublishLifecycleEventRequest {
    #[prost(enumeration = "ServiceLevel", tag = "1")]
    pub service_level: i32,
    #[prost(message, optional, tag = "2")]
    pub build_event: Option<OrderedBuildEvent>,
    #[prost(message, optional, tag = "3")]
    pub stream_timeout: Option<prost_types::Duration>,
    #[prost(string, repeated, tag = "4")]
    pub notification_keywords: Vec<String>,
    #[prost(string, tag = "6")]
    pub project_id: String,
    #[prost(bool, tag = "7")]
    pub check_preceding_lifecycle_events_present: bool,
}

/// One message on the bidirectional build tool event stream.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PublishBuildToolEventStreamRequest {
    #[prost(message, optional, tag = "1")]
    pub ordered_build_event: Option<OrderedBuildEvent>,
    #[prost(string, repeated, tag = "2")]
    pub notification_keywords: Vec<String>,
    #[prost(string, tag = "5")]
    pub project_id: String,
    #[prost(bool, tag = "6")]
    pub check_preceding_lifecycle_events_present: bool,
}

/// Acknowledgement of one stream request, in sequence order.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PublishBuildToolEventStreamResponse {
    #[prost(message, optional, tag = "1")]
    pub stream_id: Option<StreamId>,
    #[prost(int64, tag = "2")]
    pub sequence_number: i64,
}
