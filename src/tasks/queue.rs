//! File-backed task queue.

use super::worker::WorkerCommand;
use super::{TaskHandler, TaskName, TaskQueue};
use crate::error::Result;
use crate::file::{LockFile, read_json_or_default, write_json};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Deliveries attempted before a task is dropped.
pub const MAX_ATTEMPTS: u32 = 3;

/// Age after which a drain lock from a live pid is taken over anyway.
const DRAIN_LOCK_STALE: Duration = Duration::from_secs(6 * 60 * 60);

/// Age after which an edit lock on the queue file is taken over.
const EDIT_LOCK_STALE: Duration = Duration::from_secs(30);

/// How long a queue edit waits for another process to finish its edit.
const EDIT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// A task waiting in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub task: TaskName,
    pub job_id: String,
    pub enqueued_at: DateTime<Utc>,
    /// Deliveries started so far.
    #[serde(default)]
    pub attempts: u32,
}

impl QueuedTask {
    fn same_entry(&self, other: &Self) -> bool {
        self.task == other.task
            && self.job_id == other.job_id
            && self.enqueued_at == other.enqueued_at
    }
}

/// Statistics from one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainStats {
    /// Tasks whose handler returned `Ok`.
    pub completed: usize,
    /// Tasks whose handler returned an error.
    pub failed: usize,
    /// Tasks dropped after too many attempts.
    pub dropped: usize,
}

/// Queue stored as a JSON array (FIFO) in the work directory.
///
/// After each submit a detached worker process is started to drain the
/// queue, when a [`WorkerCommand`] is configured. Only one drain runs at a
/// time across processes: it holds `<queue>.drain.lock`, and every edit of
/// the queue file holds `<queue>.lock`.
#[derive(Debug)]
pub struct FileTaskQueue {
    path: PathBuf,
    worker: Option<WorkerCommand>,
    lock: Mutex<()>,
}

impl FileTaskQueue {
    /// Queue without a worker nudge; something else must drain it.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            worker: None,
            lock: Mutex::new(()),
        }
    }

    /// Start `worker` after every submit.
    #[must_use]
    pub fn with_worker(mut self, worker: WorkerCommand) -> Self {
        self.worker = Some(worker);
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Tasks currently waiting, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue file cannot be read.
    pub fn pending(&self) -> Result<Vec<QueuedTask>> {
        read_json_or_default(&self.path)
    }

    /// Run queued tasks in FIFO order until the queue is empty.
    ///
    /// Each task's attempt counter is incremented and persisted before its
    /// handler runs, and the task is removed only after the handler returns.
    /// A task that has already been attempted [`MAX_ATTEMPTS`] times is
    /// dropped without running.
    ///
    /// When another drain (in this or another process) holds the drain lock
    /// this returns empty stats at once and leaves the queue to that drain.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue file cannot be read or written. Handler
    /// errors are logged and counted, not returned.
    pub fn drain(&self, handler: &dyn TaskHandler) -> Result<DrainStats> {
        let mut stats = DrainStats::default();

        loop {
            let acquired = LockFile::try_acquire(&self.drain_lock_path(), DRAIN_LOCK_STALE)?;
            let Some(drain_lock) = acquired else {
                debug!(queue = %self.path.display(), "Another worker is draining the queue");
                break;
            };
            self.drain_locked(handler, &mut stats)?;
            drop(drain_lock);

            // A worker started while we held the lock gave up; pick up
            // whatever it left behind.
            if self.pending()?.is_empty() {
                break;
            }
        }

        if stats != DrainStats::default() {
            info!(
                completed = stats.completed,
                failed = stats.failed,
                dropped = stats.dropped,
                "Task queue drained"
            );
        }
        Ok(stats)
    }

    fn drain_locked(&self, handler: &dyn TaskHandler, stats: &mut DrainStats) -> Result<()> {
        while let Some(task) = self.claim_next(stats)? {
            debug!(task = %task.task, job_id = %task.job_id, attempt = task.attempts, "Running task");

            match handler.handle(task.task, &task.job_id) {
                Ok(()) => stats.completed += 1,
                Err(e) => {
                    warn!(task = %task.task, job_id = %task.job_id, error = %e, "Task failed");
                    stats.failed += 1;
                }
            }

            self.remove(&task)?;
        }
        Ok(())
    }

    fn drain_lock_path(&self) -> PathBuf {
        self.sibling_path(".drain.lock")
    }

    fn edit_lock_path(&self) -> PathBuf {
        self.sibling_path(".lock")
    }

    fn sibling_path(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn lock_for_edit(&self) -> Result<LockFile> {
        LockFile::acquire(&self.edit_lock_path(), EDIT_LOCK_STALE, EDIT_LOCK_TIMEOUT)
    }

    // Pops exhausted tasks and returns the next runnable one with its
    // attempt counter already bumped on disk.
    fn claim_next(&self, stats: &mut DrainStats) -> Result<Option<QueuedTask>> {
        let _guard = self.lock.lock();
        let _edit = self.lock_for_edit()?;
        let mut tasks: Vec<QueuedTask> = read_json_or_default(&self.path)?;

        while let Some(first) = tasks.first() {
            if first.attempts < MAX_ATTEMPTS {
                break;
            }
            error!(
                task = %first.task,
                job_id = %first.job_id,
                attempts = first.attempts,
                "Dropping task after repeated failed deliveries"
            );
            tasks.remove(0);
            stats.dropped += 1;
        }

        let next = tasks.first_mut().map(|task| {
            task.attempts += 1;
            task.clone()
        });
        write_json(&self.path, &tasks)?;
        Ok(next)
    }

    fn remove(&self, done: &QueuedTask) -> Result<()> {
        let _guard = self.lock.lock();
        let _edit = self.lock_for_edit()?;
        let mut tasks: Vec<QueuedTask> = read_json_or_default(&self.path)?;
        if let Some(pos) = tasks.iter().position(|t| t.same_entry(done)) {
            tasks.remove(pos);
        }
        write_json(&self.path, &tasks)
    }
}

impl TaskQueue for FileTaskQueue {
    fn submit(&self, task: TaskName, job_id: &str) -> Result<()> {
        {
            let _guard = self.lock.lock();
            let _edit = self.lock_for_edit()?;
            let mut tasks: Vec<QueuedTask> = read_json_or_default(&self.path)?;
            tasks.push(QueuedTask {
                task,
                job_id: job_id.to_string(),
                enqueued_at: Utc::now(),
                attempts: 0,
            });
            write_json(&self.path, &tasks)?;
        }

        debug!(task = %task, job_id, "Task queued");

        if let Some(worker) = &self.worker {
            worker.spawn_detached();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(TaskName, String)>>,
        fail_for: Option<String>,
        delay: Option<Duration>,
    }

    impl TaskHandler for Recorder {
        fn handle(&self, task: TaskName, job_id: &str) -> Result<()> {
            self.seen.lock().push((task, job_id.to_string()));
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            if self.fail_for.as_deref() == Some(job_id) {
                return Err(Error::Other("handler failed".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_drain_is_fifo_and_empties_queue() {
        let temp_dir = TempDir::new().unwrap();
        let queue = FileTaskQueue::new(temp_dir.path().join("queue.json"));
        queue.submit(TaskName::RunExportJob, "a").unwrap();
        queue.submit(TaskName::RunImportJob, "b").unwrap();

        let handler = Recorder::default();
        let stats = queue.drain(&handler).unwrap();

        assert_eq!(stats.completed, 2);
        assert_eq!(
            *handler.seen.lock(),
            vec![
                (TaskName::RunExportJob, "a".to_string()),
                (TaskName::RunImportJob, "b".to_string())
            ]
        );
        assert!(queue.pending().unwrap().is_empty());
    }

    #[test]
    fn test_failed_handler_still_removes_task() {
        let temp_dir = TempDir::new().unwrap();
        let queue = FileTaskQueue::new(temp_dir.path().join("queue.json"));
        queue.submit(TaskName::RunExportJob, "bad").unwrap();

        let handler = Recorder {
            fail_for: Some("bad".into()),
            ..Recorder::default()
        };
        let stats = queue.drain(&handler).unwrap();

        assert_eq!(stats.failed, 1);
        assert!(queue.pending().unwrap().is_empty());
    }

    #[test]
    fn test_interrupted_task_is_redelivered() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.json");
        // A worker that died mid-run leaves the entry with attempts bumped.
        let interrupted = vec![QueuedTask {
            task: TaskName::RunImportJob,
            job_id: "j1".into(),
            enqueued_at: Utc::now(),
            attempts: 1,
        }];
        write_json(&path, &interrupted).unwrap();

        let queue = FileTaskQueue::new(&path);
        let handler = Recorder::default();
        let stats = queue.drain(&handler).unwrap();

        assert_eq!(stats.completed, 1);
        assert_eq!(handler.seen.lock().len(), 1);
    }

    #[test]
    fn test_exhausted_task_is_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.json");
        let exhausted = vec![QueuedTask {
            task: TaskName::RunExportJob,
            job_id: "j2".into(),
            enqueued_at: Utc::now(),
            attempts: MAX_ATTEMPTS,
        }];
        write_json(&path, &exhausted).unwrap();

        let queue = FileTaskQueue::new(&path);
        let handler = Recorder::default();
        let stats = queue.drain(&handler).unwrap();

        assert_eq!(stats.dropped, 1);
        assert!(handler.seen.lock().is_empty());
        assert!(queue.pending().unwrap().is_empty());
    }

    #[test]
    fn test_second_worker_leaves_running_task_alone() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.json");
        // Two queues on one file stand in for two worker processes.
        let first = Arc::new(FileTaskQueue::new(&path));
        let second = FileTaskQueue::new(&path);
        first.submit(TaskName::RunImportJob, "job-1").unwrap();

        let handler = Arc::new(Recorder {
            delay: Some(Duration::from_millis(500)),
            ..Recorder::default()
        });
        let running = {
            let queue = first.clone();
            let handler = handler.clone();
            thread::spawn(move || queue.drain(handler.as_ref()).unwrap())
        };
        thread::sleep(Duration::from_millis(100));

        let late = second.drain(handler.as_ref()).unwrap();
        let stats = running.join().unwrap();

        assert_eq!(late, DrainStats::default());
        assert_eq!(stats.completed, 1);
        assert_eq!(*handler.seen.lock(), vec![(TaskName::RunImportJob, "job-1".to_string())]);
        assert!(first.pending().unwrap().is_empty());
        assert!(!temp_dir.path().join("queue.json.drain.lock").exists());
    }

    #[test]
    fn test_drain_picks_up_task_submitted_while_running() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.json");
        let first = Arc::new(FileTaskQueue::new(&path));
        let other = FileTaskQueue::new(&path);
        first.submit(TaskName::RunExportJob, "a").unwrap();

        let handler = Arc::new(Recorder {
            delay: Some(Duration::from_millis(300)),
            ..Recorder::default()
        });
        let running = {
            let queue = first.clone();
            let handler = handler.clone();
            thread::spawn(move || queue.drain(handler.as_ref()).unwrap())
        };
        thread::sleep(Duration::from_millis(100));
        other.submit(TaskName::RunImportJob, "b").unwrap();
        other.drain(handler.as_ref()).unwrap();

        let stats = running.join().unwrap();

        assert_eq!(stats.completed, 2);
        assert_eq!(handler.seen.lock().len(), 2);
        assert!(first.pending().unwrap().is_empty());
    }
}
