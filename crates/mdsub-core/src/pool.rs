//! Worker pool for asynchronous submissions
//!
//! Whole pipeline invocations run on a fixed number of workers. Callers get
//! a [`JobHandle`] back immediately and poll or wait for the outcome:
//! - at most `worker_pool_size` submissions run at once
//! - at most `worker_queue_capacity` wait for a worker; beyond that
//!   `submit` fails with [`PoolError::QueueFull`]
//! - a job can be cancelled only while it is still queued

use crate::engine::{SubmissionEngine, SubmissionRequest};
use crate::error::{PoolError, SubmissionError};
use crate::transaction::TransactionReport;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tracing::Instrument;
use ulid::Ulid;

/// Job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(Ulid);

impl JobId {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a pooled submission
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Queued,
    Running,
    Completed(Box<TransactionReport>),
    Failed(SubmissionError),
    Cancelled,
}

impl JobState {
    /// True once the state can no longer change
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_) | Self::Cancelled)
    }

    /// Outcome as a result; non-terminal states are `None`
    #[must_use]
    pub fn into_result(self) -> Option<Result<TransactionReport, SubmissionError>> {
        match self {
            Self::Completed(report) => Some(Ok(*report)),
            Self::Failed(e) => Some(Err(e)),
            Self::Cancelled => Some(Err(SubmissionError::Cancelled)),
            Self::Queued | Self::Running => None,
        }
    }
}

/// Handle returned by [`SubmissionPool::submit`]
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    state: watch::Receiver<JobState>,
}

impl JobHandle {
    #[inline]
    #[must_use]
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> JobState {
        self.state.borrow().clone()
    }

    /// Wait for a terminal state
    pub async fn wait(mut self) -> Result<JobState, PoolError> {
        let id = self.id;
        self.state
            .wait_for(JobState::is_terminal)
            .await
            .map(|state| state.clone())
            .map_err(|_| PoolError::Panicked(format!("job {id} lost its worker")))
    }
}

/// Pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Bounded pool of pipeline workers
#[derive(Debug)]
pub struct SubmissionPool {
    engine: Arc<SubmissionEngine>,
    workers: Arc<Semaphore>,
    capacity: usize,
    /// Jobs admitted but not yet started or cancelled
    queued: Arc<AtomicUsize>,
    jobs: DashMap<JobId, Arc<watch::Sender<JobState>>>,
}

impl SubmissionPool {
    /// Create pool sized by the engine's configuration
    #[must_use]
    pub fn new(engine: Arc<SubmissionEngine>) -> Self {
        let size = engine.config().worker_pool_size.max(1);
        let capacity = engine.config().worker_queue_capacity;
        Self {
            engine,
            workers: Arc::new(Semaphore::new(size)),
            capacity,
            queued: Arc::new(AtomicUsize::new(0)),
            jobs: DashMap::new(),
        }
    }

    /// Queue a submission
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// - `PoolError::QueueFull` if `worker_queue_capacity` jobs are waiting
    pub fn submit(&self, request: SubmissionRequest) -> Result<JobHandle, PoolError> {
        let capacity = self.capacity;
        self.queued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < capacity).then_some(n + 1))
            .map_err(|_| PoolError::QueueFull(capacity))?;

        let id = JobId::new();
        let (sender, receiver) = watch::channel(JobState::Queued);
        let sender = Arc::new(sender);
        self.jobs.insert(id, Arc::clone(&sender));
        tracing::debug!(job = %id, scope = %request.scope, "submission queued");

        let engine = Arc::clone(&self.engine);
        let workers = Arc::clone(&self.workers);
        let queued = Arc::clone(&self.queued);
        let span = tracing::info_span!("job", job = %id);
        tokio::spawn(
            async move {
                let Ok(_permit) = workers.acquire_owned().await else {
                    queued.fetch_sub(1, Ordering::SeqCst);
                    sender.send_replace(JobState::Failed(
                        PoolError::Panicked("worker pool closed".into()).into(),
                    ));
                    return;
                };
                let started = sender.send_if_modified(|state| {
                    if *state == JobState::Queued {
                        *state = JobState::Running;
                        true
                    } else {
                        false
                    }
                });
                if !started {
                    tracing::debug!("job cancelled before start");
                    return;
                }
                queued.fetch_sub(1, Ordering::SeqCst);

                let run = tokio::spawn(async move { engine.submit(request).await });
                let state = match run.await {
                    Ok(Ok(report)) => JobState::Completed(Box::new(report)),
                    Ok(Err(e)) => JobState::Failed(e),
                    Err(join) => {
                        tracing::error!(error = %join, "submission worker died");
                        JobState::Failed(PoolError::Panicked(join.to_string()).into())
                    }
                };
                sender.send_replace(state);
            }
            .instrument(span),
        );

        Ok(JobHandle { id, state: receiver })
    }

    /// Current state of a job
    #[must_use]
    pub fn status(&self, id: JobId) -> Option<JobState> {
        self.jobs.get(&id).map(|sender| sender.borrow().clone())
    }

    /// Wait until a job reaches a terminal state
    pub async fn wait(&self, id: JobId) -> Result<JobState, PoolError> {
        let sender = self
            .jobs
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(PoolError::JobNotFound(id))?;
        let mut receiver = sender.subscribe();
        let state = receiver
            .wait_for(JobState::is_terminal)
            .await
            .map(|state| state.clone())
            .map_err(|_| PoolError::Panicked(format!("job {id} lost its worker")))?;
        Ok(state)
    }

    /// Cancel a queued job
    ///
    /// # Errors
    /// - `PoolError::JobNotFound` for unknown ids
    /// - `PoolError::NotCancellable` once the job has started
    pub fn cancel(&self, id: JobId) -> Result<(), PoolError> {
        let sender = self
            .jobs
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(PoolError::JobNotFound(id))?;
        let cancelled = sender.send_if_modified(|state| {
            if *state == JobState::Queued {
                *state = JobState::Cancelled;
                true
            } else {
                false
            }
        });
        if !cancelled {
            return Err(PoolError::NotCancellable(id));
        }
        self.queued.fetch_sub(1, Ordering::SeqCst);
        tracing::info!(job = %id, "job cancelled");
        Ok(())
    }

    /// Forget finished jobs; returns how many were removed
    pub fn purge_finished(&self) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, sender| !sender.borrow().is_terminal());
        before - self.jobs.len()
    }

    /// Snapshot of job states
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats::default();
        for entry in self.jobs.iter() {
            match *entry.value().borrow() {
                JobState::Queued => stats.queued += 1,
                JobState::Running => stats.running += 1,
                JobState::Completed(_) => stats.completed += 1,
                JobState::Failed(_) => stats.failed += 1,
                JobState::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(JobState::Failed(SubmissionError::Cancelled).is_terminal());
        assert_eq!(JobState::Running.into_result(), None);
        assert_eq!(
            JobState::Cancelled.into_result(),
            Some(Err(SubmissionError::Cancelled))
        );
    }

    #[test]
    fn job_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
        assert_eq!(JobId::new().to_string().len(), 26);
    }
}
