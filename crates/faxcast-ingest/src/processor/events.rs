//! Job lifecycle events and the reporter hook.
//!
//! Every change the registry makes to a job is published as a [`JobEvent`]
//! carrying a full snapshot of the job after the change. Per job, events are
//! delivered in the order the changes happened.
//!
//! # Example
//!
//! ```rust,ignore
//! use faxcast_ingest::{ClosureJobReporter, JobRegistry};
//! use std::sync::Arc;
//!
//! let registry = JobRegistry::new();
//! registry.add_reporter(Arc::new(ClosureJobReporter::new(|event| {
//!     println!("[{:>3}%] {} {:?}", event.job.progress, event.job.file_name, event.kind);
//! })));
//! ```

use crate::types::ProcessingJob;
use serde::{Deserialize, Serialize};

/// What happened to the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    /// Registered, nothing done yet.
    Queued,
    /// Status moved to `processing`.
    Started,
    /// Record counts or percentage changed.
    Progress,
    Completed,
    Failed,
    /// Dismissed; the snapshot is the last state before removal.
    Removed,
}

/// A job change together with the job's state after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub kind: JobEventKind,
    pub job: ProcessingJob,
}

impl JobEvent {
    pub fn new(kind: JobEventKind, job: ProcessingJob) -> Self {
        Self { kind, job }
    }

    pub fn job_id(&self) -> &str {
        &self.job.id
    }

    /// Completed or failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, JobEventKind::Completed | JobEventKind::Failed)
    }
}

/// Synchronous observer of job events.
///
/// Reporters run on the task that changed the job, so they should return
/// quickly. They must not call back into the registry that invoked them.
pub trait JobReporter: Send + Sync {
    fn report(&self, event: &JobEvent);
}

/// [`JobReporter`] backed by a closure.
pub struct ClosureJobReporter<F>
where
    F: Fn(&JobEvent) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureJobReporter<F>
where
    F: Fn(&JobEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> JobReporter for ClosureJobReporter<F>
where
    F: Fn(&JobEvent) + Send + Sync,
{
    fn report(&self, event: &JobEvent) {
        (self.callback)(event);
    }
}

static_assertions::assert_impl_all!(JobEvent: Send, Sync);
