//! Seams between the build tool's events and the pipeline.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};

use prost_types::Any;

/// Maps a local file path to the identifier it is reachable under remotely.
///
/// Produced by the artifact uploader once an event's file batch has been
/// uploaded.
pub trait PathConverter: Send + Sync {
    fn convert(&self, path: &Path) -> Option<String>;
}

/// Exit information carried by a build-completing event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuildCompletion {
    /// `Some(0)` means the command succeeded; any other code means it failed.
    /// `None` leaves the recorded invocation result unchanged.
    pub exit_code: Option<i32>,
}

/// A build tool event the transport can ship.
///
/// The transport never inspects event contents beyond these three hooks: the
/// files to co-upload, the packed wire form, and whether the event reports
/// that the build is completing.
pub trait BuildEvent: Send + Sync + 'static {
    /// Local files referenced by the event. They are uploaded before the
    /// event is serialised; duplicates are removed by the transport.
    fn local_files(&self) -> Vec<PathBuf>;

    /// Pack the event for the wire, rewriting local file references through
    /// `converter` when one is available.
    fn payload(&self, converter: Option<&dyn PathConverter>) -> Any;

    /// Present iff this event reports that the build is completing.
    fn completion(&self) -> Option<BuildCompletion> {
        None
    }
}

/// Tri-state invocation outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvocationResult {
    Unknown,
    Succeeded,
    Failed,
}

/// Holder for the invocation result: written at most once, by whichever
/// producer submits the build-completing event, and read at lifecycle
/// finalisation.
#[derive(Debug, Default)]
pub struct InvocationResultCell {
    state: AtomicU8,
}

const RESULT_UNKNOWN: u8 = 0;
const RESULT_SUCCEEDED: u8 = 1;
const RESULT_FAILED: u8 = 2;

impl InvocationResultCell {
    /// Record the outcome carried by a build-completing event. Events without
    /// an exit code leave the result unchanged.
    pub fn record(&self, completion: BuildCompletion) {
        if let Some(code) = completion.exit_code {
            let value = if code == 0 {
                RESULT_SUCCEEDED
            } else {
                RESULT_FAILED
            };
            self.state.store(value, Ordering::Release);
        }
    }

    pub fn get(&self) -> InvocationResult {
        match self.state.load(Ordering::Acquire) {
            RESULT_SUCCEEDED => InvocationResult::Succeeded,
            RESULT_FAILED => InvocationResult::Failed,
            _ => InvocationResult::Unknown,
        }
    }
}
