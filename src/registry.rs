//! Job registry and observer fan-out
//!
//! The registry is the single owner of job records. It is constructed once by
//! the host ([`crate::SliceDownloader`]) and shared behind an `Arc` with the
//! orchestrator tasks and the API layer; it lives as long as the host process.
//!
//! Locking is two-level. The table lock is held only for lookups, inserts and
//! removals. Each record has its own mutex, which serializes phase changes,
//! listener changes and broadcasts for that job only. Observers are invoked
//! while the record lock is held, so they must not call back into the
//! registry; the transport observers only push into channels.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::progress::overall_percent;
use crate::types::{JobEvent, JobId, JobInfo, Phase, ProgressSnapshot};

/// Receives every event published for a job it is subscribed to
pub trait JobObserver: Send + Sync {
    fn on_event(&self, event: &JobEvent);
}

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Mutable state of one job
pub struct JobRecord {
    id: JobId,
    phase: Phase,
    progress: ProgressSnapshot,
    output_path: Option<PathBuf>,
    filename: String,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    listeners: Vec<(u64, Arc<dyn JobObserver>)>,
}

impl JobRecord {
    fn new(id: JobId, filename: String, total_seconds: f64) -> Self {
        Self {
            id,
            phase: Phase::Downloading,
            progress: ProgressSnapshot::start_of(Phase::Downloading, total_seconds),
            output_path: None,
            filename,
            created_at: Utc::now(),
            finished_at: None,
            listeners: Vec::new(),
        }
    }

    fn broadcast(&self, event: &JobEvent) {
        for (_, listener) in &self.listeners {
            listener.on_event(event);
        }
    }

    fn info(&self) -> JobInfo {
        let percent = if self.progress.phase == self.phase {
            self.progress.percent
        } else {
            0.0
        };
        JobInfo {
            job_id: self.id.clone(),
            phase: self.phase,
            progress: overall_percent(self.phase, percent).round() as u8,
            created_at: self.created_at,
            finished_at: self.finished_at,
            filename: self.filename.clone(),
            subscribers: self.listeners.len(),
        }
    }

    fn finish(&mut self, phase: Phase, event: JobEvent) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        self.phase = phase;
        self.finished_at = Some(Utc::now());
        self.broadcast(&event);
        true
    }
}

/// Shared reference to one job record
#[derive(Clone)]
pub struct JobHandle {
    id: JobId,
    record: Arc<Mutex<JobRecord>>,
}

impl JobHandle {
    fn lock(&self) -> MutexGuard<'_, JobRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn filename(&self) -> String {
        self.lock().filename.clone()
    }

    /// Output file, set once the job completed
    pub fn output_path(&self) -> Option<PathBuf> {
        self.lock().output_path.clone()
    }

    pub fn info(&self) -> JobInfo {
        self.lock().info()
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Move to a later non-terminal phase; returns false for any other move
    pub fn advance(&self, phase: Phase) -> bool {
        let mut record = self.lock();
        if phase.is_terminal() || record.phase.is_terminal() || phase.rank() <= record.phase.rank()
        {
            return false;
        }
        record.phase = phase;
        true
    }

    /// Publish a progress event to current listeners
    ///
    /// Ignored once the job is terminal, so nothing follows a complete or
    /// error event.
    pub fn emit(&self, event: &JobEvent) -> bool {
        let mut record = self.lock();
        if record.phase.is_terminal() {
            return false;
        }
        if event.is_terminal() {
            tracing::warn!(job_id = %self.id, "terminal events go through complete() or fail()");
            return false;
        }
        if let JobEvent::Progress {
            progress,
            processed_seconds,
            total_seconds,
            phase,
            ..
        } = event
        {
            record.progress = ProgressSnapshot {
                phase: *phase,
                processed_seconds: *processed_seconds,
                total_seconds: *total_seconds,
                percent: f64::from(*progress),
            };
        }
        record.broadcast(event);
        true
    }

    /// Mark the job completed and publish the complete event
    pub fn complete(&self, output_path: PathBuf) -> bool {
        let mut record = self.lock();
        if record.phase.is_terminal() {
            return false;
        }
        record.output_path = Some(output_path);
        let event = JobEvent::Complete {
            job_id: self.id.clone(),
            filename: record.filename.clone(),
        };
        record.finish(Phase::Completed, event)
    }

    /// Mark the job failed and publish the error event
    pub fn fail(&self, message: impl Into<String>) -> bool {
        let event = JobEvent::Error {
            job_id: self.id.clone(),
            message: message.into(),
        };
        self.lock().finish(Phase::Failed, event)
    }

    fn subscribe(&self, observer: Arc<dyn JobObserver>) -> Subscription {
        let listener = NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed);
        self.lock().listeners.push((listener, observer));

        Subscription {
            job_id: self.id.clone(),
            record: Arc::downgrade(&self.record),
            listener,
            active: true,
        }
    }

    fn is_terminal_since(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let record = self.lock();
        match record.finished_at {
            Some(finished) if record.phase.is_terminal() => now
                .signed_duration_since(finished)
                .to_std()
                .map(|age| age >= ttl)
                .unwrap_or(false),
            _ => false,
        }
    }
}

/// Registration of one observer with one job
///
/// Dropping the subscription unregisters the observer.
pub struct Subscription {
    job_id: JobId,
    record: Weak<Mutex<JobRecord>>,
    listener: u64,
    active: bool,
}

impl Subscription {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Remove the observer; calling this more than once has no effect
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(record) = self.record.upgrade() {
            let mut record = record.lock().unwrap_or_else(PoisonError::into_inner);
            record.listeners.retain(|(id, _)| *id != self.listener);
            tracing::debug!(job_id = %self.job_id, remaining = record.listeners.len(), "observer unsubscribed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("job_id", &self.job_id)
            .field("active", &self.active)
            .finish()
    }
}

/// Owner of every job record
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<Mutex<JobRecord>>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the record for `id`, or return the existing one
    pub fn create_or_attach(&self, id: &JobId, filename: &str, total_seconds: f64) -> JobHandle {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let record = jobs
            .entry(id.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(JobRecord::new(
                    id.clone(),
                    filename.to_string(),
                    total_seconds,
                )))
            })
            .clone();

        JobHandle {
            id: id.clone(),
            record,
        }
    }

    pub fn get(&self, id: &JobId) -> Option<JobHandle> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(id).map(|record| JobHandle {
            id: id.clone(),
            record: record.clone(),
        })
    }

    fn require(&self, id: &JobId) -> Result<JobHandle> {
        self.get(id)
            .ok_or_else(|| Error::NotFound(format!("job {}", id)))
    }

    /// Attach an observer to a job
    ///
    /// Only events published after this call are delivered; nothing is
    /// buffered for late subscribers. A subscriber attaching to a finished job
    /// receives nothing, and should check the phase instead.
    pub fn subscribe(&self, id: &JobId, observer: Arc<dyn JobObserver>) -> Result<Subscription> {
        let handle = self.require(id)?;
        let subscription = handle.subscribe(observer);
        tracing::debug!(job_id = %id, listeners = handle.listener_count(), "observer subscribed");
        Ok(subscription)
    }

    /// Publish a progress event to the job's current observers
    pub fn emit(&self, id: &JobId, event: &JobEvent) -> bool {
        self.get(id).is_some_and(|handle| handle.emit(event))
    }

    pub fn set_phase(&self, id: &JobId, phase: Phase) -> Result<bool> {
        Ok(self.require(id)?.advance(phase))
    }

    pub fn complete(&self, id: &JobId, output_path: PathBuf) -> Result<bool> {
        Ok(self.require(id)?.complete(output_path))
    }

    pub fn fail(&self, id: &JobId, message: impl Into<String>) -> Result<bool> {
        Ok(self.require(id)?.fail(message))
    }

    /// Public view of a job
    pub fn snapshot(&self, id: &JobId) -> Option<JobInfo> {
        self.get(id).map(|handle| handle.info())
    }

    pub fn listener_count(&self, id: &JobId) -> usize {
        self.get(id).map_or(0, |handle| handle.listener_count())
    }

    /// Drop the record; the caller is responsible for its files
    pub fn remove(&self, id: &JobId) -> Option<JobHandle> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        jobs.remove(id).map(|record| JobHandle {
            id: id.clone(),
            record,
        })
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<JobId> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.keys().cloned().collect()
    }

    /// Jobs that reached a terminal phase at least `ttl` ago
    pub fn terminal_jobs_older_than(&self, ttl: Duration) -> Vec<JobId> {
        let now = Utc::now();
        let handles: Vec<JobHandle> = {
            let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
            jobs.iter()
                .map(|(id, record)| JobHandle {
                    id: id.clone(),
                    record: record.clone(),
                })
                .collect()
        };

        handles
            .into_iter()
            .filter(|handle| handle.is_terminal_since(ttl, now))
            .map(|handle| handle.id)
            .collect()
    }
}
