//! The job registry: sole owner of [`ProcessingJob`] state.

use super::events::{JobEvent, JobEventKind, JobReporter};
use crate::error::{IngestError, Result};
use crate::types::{JobStatus, ProcessingJob};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

#[derive(Default)]
struct RegistryState {
    /// Creation order.
    jobs: Vec<ProcessingJob>,
    subscribers: HashMap<u64, UnboundedSender<JobEvent>>,
    reporters: Vec<Arc<dyn JobReporter>>,
}

#[derive(Default)]
struct RegistryInner {
    state: Mutex<RegistryState>,
    next_subscriber: AtomicU64,
}

impl RegistryInner {
    fn unsubscribe(&self, subscriber: u64) {
        self.state.lock().subscribers.remove(&subscriber);
    }
}

/// Shared, cloneable handle to the set of processing jobs.
///
/// Only the registry mutates jobs. Each mutation is broadcast to every live
/// [`Subscription`] and registered [`JobReporter`].
#[derive(Clone, Default)]
pub struct JobRegistry {
    inner: Arc<RegistryInner>,
}

static_assertions::assert_impl_all!(JobRegistry: Send, Sync);

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start receiving events for every job. Dropping the subscription
    /// unsubscribes.
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.state.lock().subscribers.insert(id, tx);
        debug!("Job subscriber {} registered", id);

        Subscription {
            id,
            receiver: rx,
            registry: Arc::downgrade(&self.inner),
        }
    }

    pub fn add_reporter(&self, reporter: Arc<dyn JobReporter>) {
        self.inner.state.lock().reporters.push(reporter);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers.len()
    }

    pub fn get_job(&self, id: &str) -> Option<ProcessingJob> {
        self.inner
            .state
            .lock()
            .jobs
            .iter()
            .find(|job| job.id == id)
            .cloned()
    }

    /// Snapshot of all jobs, oldest first.
    pub fn jobs(&self) -> Vec<ProcessingJob> {
        self.inner.state.lock().jobs.clone()
    }

    /// Dismiss a job. Returns `false` when no such job exists.
    pub fn remove_job(&self, id: &str) -> bool {
        let (event, reporters) = {
            let mut state = self.inner.state.lock();
            let Some(idx) = state.jobs.iter().position(|job| job.id == id) else {
                return false;
            };
            let job = state.jobs.remove(idx);
            let event = JobEvent::new(JobEventKind::Removed, job);
            broadcast(&mut state, &event);
            (event, state.reporters.clone())
        };
        notify(&reporters, &event);
        debug!("Job {} removed", id);
        true
    }

    pub(crate) fn insert(&self, job: ProcessingJob) {
        let (event, reporters) = {
            let mut state = self.inner.state.lock();
            state.jobs.push(job.clone());
            let event = JobEvent::new(JobEventKind::Queued, job);
            broadcast(&mut state, &event);
            (event, state.reporters.clone())
        };
        notify(&reporters, &event);
    }

    /// Apply `change` to job `id` and publish the result as `kind`.
    ///
    /// Returns the new snapshot, or `None` when the job was removed meanwhile.
    pub(crate) fn update<F>(&self, id: &str, kind: JobEventKind, change: F) -> Option<ProcessingJob>
    where
        F: FnOnce(&mut ProcessingJob),
    {
        let (event, reporters) = {
            let mut state = self.inner.state.lock();
            let job = state.jobs.iter_mut().find(|job| job.id == id)?;
            change(job);
            let event = JobEvent::new(kind, job.clone());
            broadcast(&mut state, &event);
            (event, state.reporters.clone())
        };
        notify(&reporters, &event);
        Some(event.job)
    }
}

/// Send under the state lock so every subscriber sees the same order.
fn broadcast(state: &mut RegistryState, event: &JobEvent) {
    state
        .subscribers
        .retain(|_, tx| tx.send(event.clone()).is_ok());
}

fn notify(reporters: &[Arc<dyn JobReporter>], event: &JobEvent) {
    for reporter in reporters {
        reporter.report(event);
    }
}

/// A live event feed from a [`JobRegistry`].
pub struct Subscription {
    id: u64,
    receiver: UnboundedReceiver<JobEvent>,
    registry: Weak<RegistryInner>,
}

impl Subscription {
    /// Next event, or `None` once the registry is gone.
    pub async fn recv(&mut self) -> Option<JobEvent> {
        self.receiver.recv().await
    }

    /// Next already-published event, without waiting.
    pub fn try_recv(&mut self) -> Option<JobEvent> {
        self.receiver.try_recv().ok()
    }

    /// Wait for the terminal event of job `id`, collecting every event for
    /// that job on the way (the terminal one included).
    ///
    /// Events published before this subscription existed are not replayed.
    /// A job that had already finished by then yields a single event built
    /// from its current snapshot. Fails with [`IngestError::JobNotFound`]
    /// when the registry has no such job and nothing about it is queued.
    pub async fn collect_job(&mut self, id: &str) -> Result<Vec<JobEvent>> {
        let mut events = Vec::new();

        if let Some(inner) = self.registry.upgrade() {
            let state = inner.state.lock();
            // Broadcasts happen under this lock, so the queue holds exactly
            // the events published before `current` was taken.
            let current = state.jobs.iter().find(|job| job.id == id).cloned();
            while let Some(event) = self.try_recv() {
                if push_job_event(&mut events, id, event) {
                    return Ok(events);
                }
            }
            drop(state);

            match current {
                None if events.is_empty() => {
                    return Err(IngestError::JobNotFound(id.to_string()));
                }
                None => return Ok(events),
                Some(job) if job.status.is_terminal() => {
                    let kind = match job.status {
                        JobStatus::Failed => JobEventKind::Failed,
                        _ => JobEventKind::Completed,
                    };
                    events.push(JobEvent::new(kind, job));
                    return Ok(events);
                }
                Some(_) => {}
            }
        }

        while let Some(event) = self.recv().await {
            if push_job_event(&mut events, id, event) {
                break;
            }
        }
        Ok(events)
    }
}

/// Keep `event` if it belongs to job `id`. Returns `true` once the job is done.
fn push_job_event(events: &mut Vec<JobEvent>, id: &str, event: JobEvent) -> bool {
    if event.job_id() != id {
        return false;
    }
    let done = event.is_terminal() || event.kind == JobEventKind::Removed;
    events.push(event);
    done
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            inner.unsubscribe(self.id);
            debug!("Job subscriber {} dropped", self.id);
        }
    }
}
