//! The job ledger: the only writer of job records.

use super::store::{FileJobStore, JobStore, MemoryJobStore};
use super::types::{Job, JobStatus, JobType, LogEntry};
use crate::error::{Error, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::path::PathBuf;
use subtle::ConstantTimeEq;
use tracing::debug;

/// Length of a job's capability token.
pub const TOKEN_LENGTH: usize = 20;

/// Bounded, persisted collection of jobs.
///
/// Every mutation reloads the collection, applies the change, prunes to
/// capacity (newest first) and saves the whole collection back. Mutations
/// within one process are serialized; across processes the last writer wins.
pub struct JobLedger {
    store: Box<dyn JobStore>,
    capacity: usize,
    lock: Mutex<()>,
}

impl std::fmt::Debug for JobLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobLedger")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl JobLedger {
    /// Create a ledger over any store. A capacity of 0 is treated as 1.
    #[must_use]
    pub fn new(store: impl JobStore + 'static, capacity: usize) -> Self {
        Self {
            store: Box::new(store),
            capacity: capacity.max(1),
            lock: Mutex::new(()),
        }
    }

    /// Ledger persisted to a JSON file.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self::new(FileJobStore::new(path), capacity)
    }

    /// Ledger held in memory.
    #[must_use]
    pub fn in_memory(capacity: usize) -> Self {
        Self::new(MemoryJobStore::new(), capacity)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Create a pending job and return it (including its id and token).
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub fn create(&self, job_type: JobType, data: serde_json::Value) -> Result<Job> {
        let _guard = self.lock.lock();
        let mut jobs = self.store.load()?;

        let now = Utc::now();
        let sequence = jobs.iter().map(|j| j.sequence).max().map_or(0, |s| s + 1);
        let data = if data.is_null() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            data
        };

        let job = Job {
            id: uuid::Uuid::new_v4().to_string(),
            job_type,
            status: JobStatus::Pending,
            progress: 0,
            message: String::new(),
            result: None,
            token: generate_token(),
            data,
            log: Vec::new(),
            created_at: now,
            updated_at: now,
            sequence,
        };

        jobs.push(job.clone());
        self.save_pruned(jobs)?;

        debug!(job_id = %job.id, job_type = %job_type, "Created job");
        Ok(job)
    }

    /// Get a job by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn get(&self, id: &str) -> Result<Option<Job>> {
        Ok(self.store.load()?.into_iter().find(|j| j.id == id))
    }

    /// List up to `limit` jobs, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn list(&self, limit: usize) -> Result<Vec<Job>> {
        let mut jobs = self.store.load()?;
        sort_newest_first(&mut jobs);
        jobs.truncate(limit);
        Ok(jobs)
    }

    /// Append a line to a job's log. Allowed on finished jobs.
    ///
    /// # Errors
    ///
    /// Returns `Error::JobNotFound` for an unknown id.
    pub fn append_log(&self, id: &str, message: &str) -> Result<Job> {
        self.mutate(id, |job| {
            push_log(job, message);
            Ok(())
        })
    }

    /// Set progress (clamped to 0-100), optionally updating the message.
    ///
    /// # Errors
    ///
    /// Returns `Error::JobNotFound` for an unknown id and
    /// `Error::JobFinished` if the job is already terminal.
    pub fn set_progress(&self, id: &str, percent: i64, message: Option<&str>) -> Result<Job> {
        self.mutate(id, |job| {
            ensure_open(job)?;
            job.progress = clamp_percent(percent);
            if let Some(message) = message {
                job.message = message.to_string();
                push_log(job, message);
            }
            Ok(())
        })
    }

    /// Move a job to `running`.
    ///
    /// # Errors
    ///
    /// See [`JobLedger::set_progress`].
    pub fn mark_running(&self, id: &str, message: &str) -> Result<Job> {
        self.mutate(id, |job| {
            ensure_open(job)?;
            job.status = JobStatus::Running;
            job.message = message.to_string();
            push_log(job, message);
            Ok(())
        })
    }

    /// Finish a job successfully with a result payload.
    ///
    /// # Errors
    ///
    /// See [`JobLedger::set_progress`].
    pub fn mark_success(&self, id: &str, result: serde_json::Value, message: &str) -> Result<Job> {
        self.mutate(id, |job| {
            ensure_open(job)?;
            job.status = JobStatus::Success;
            job.progress = 100;
            job.result = Some(result);
            job.message = message.to_string();
            push_log(job, message);
            Ok(())
        })
    }

    /// Finish a job with an error.
    ///
    /// # Errors
    ///
    /// See [`JobLedger::set_progress`].
    pub fn mark_error(&self, id: &str, message: &str) -> Result<Job> {
        self.mutate(id, |job| {
            ensure_open(job)?;
            job.status = JobStatus::Error;
            job.progress = 100;
            job.message = message.to_string();
            push_log(job, message);
            Ok(())
        })
    }

    /// Shallow-merge a JSON object into a job's `data`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if `data` is not an object, and
    /// `Error::JobNotFound` for an unknown id.
    pub fn update_data(&self, id: &str, data: serde_json::Value) -> Result<Job> {
        let serde_json::Value::Object(incoming) = data else {
            return Err(Error::InvalidArgument(
                "job data must be a JSON object".to_string(),
            ));
        };

        self.mutate(id, |job| {
            if !job.data.is_object() {
                job.data = serde_json::Value::Object(serde_json::Map::new());
            }
            if let Some(existing) = job.data.as_object_mut() {
                existing.extend(incoming);
            }
            Ok(())
        })
    }

    /// Check a download token in constant time. Unknown ids never verify.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn verify_token(&self, id: &str, token: &str) -> Result<bool> {
        Ok(self
            .get(id)?
            .is_some_and(|job| bool::from(job.token.as_bytes().ct_eq(token.as_bytes()))))
    }

    fn mutate<F>(&self, id: &str, change: F) -> Result<Job>
    where
        F: FnOnce(&mut Job) -> Result<()>,
    {
        let _guard = self.lock.lock();
        let mut jobs = self.store.load()?;

        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| Error::JobNotFound { id: id.to_string() })?;

        change(job)?;
        job.updated_at = Utc::now();
        let updated = job.clone();

        self.save_pruned(jobs)?;
        Ok(updated)
    }

    fn save_pruned(&self, mut jobs: Vec<Job>) -> Result<()> {
        sort_newest_first(&mut jobs);
        if jobs.len() > self.capacity {
            debug!(evicted = jobs.len() - self.capacity, "Pruning job ledger");
            jobs.truncate(self.capacity);
        }
        self.store.save(&jobs)
    }
}

fn sort_newest_first(jobs: &mut [Job]) {
    jobs.sort_by(|a, b| (b.created_at, b.sequence).cmp(&(a.created_at, a.sequence)));
}

fn ensure_open(job: &Job) -> Result<()> {
    if job.status.is_terminal() {
        return Err(Error::JobFinished {
            id: job.id.clone(),
            status: job.status.to_string(),
        });
    }
    Ok(())
}

fn push_log(job: &mut Job, message: &str) {
    job.log.push(LogEntry {
        time: Utc::now(),
        message: message.to_string(),
    });
}

fn clamp_percent(percent: i64) -> u8 {
    u8::try_from(percent.clamp(0, 100)).unwrap_or(100)
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}
