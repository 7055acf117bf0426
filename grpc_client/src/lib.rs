//! Wire contract for the Build Event Service publish API.
//!
//! This crate holds the message types and the raw gRPC client stub for
//! `google.devtools.build.v1.PublishBuildEvent`. The upload pipeline that
//! drives it lives in the `bes-transport` crate.

pub mod proto;
pub mod publish_build_event;

pub use publish_build_event::PublishBuildEventClient;
