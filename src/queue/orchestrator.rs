//! Bounded-concurrency job orchestration.
//!
//! The orchestrator owns every job for its lifetime; callers hold ids. A
//! non-blocking pump dispatches queued jobs to worker tasks while the
//! running count is below the configured cap, which is re-read on every
//! pump so configuration changes apply without a restart.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::job::{Job, JobSnapshot, JobSpec};
use crate::config::AppConfig;
use crate::error::QueueError;
use crate::process::{
    self,
    supervisor::{LineListener, ProgressFn, RunOptions},
};
use crate::progress;

/// Observer invoked on every state transition. Observers pull whatever they
/// need (counts, snapshots) back off the orchestrator reference.
pub type QueueListener = Arc<dyn Fn(&Orchestrator) + Send + Sync>;

type JobHandle = Arc<Mutex<Job>>;

/// Current queue population, for pull-model observers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub queued: usize,
    pub running: usize,
    pub failed: usize,
    pub completed: usize,
}

#[derive(Default)]
struct QueueState {
    /// Double-ended on purpose: new work appends at the tail, work resumed
    /// after an engine stop is re-inserted at the head.
    pending: VecDeque<JobHandle>,
    running: Vec<JobHandle>,
    failed: Vec<JobHandle>,
    completed: Vec<JobHandle>,
}

/// FIFO job queue with a configurable concurrency cap, retry-on-demand and
/// cooperative cancellation.
pub struct Orchestrator {
    config: Arc<RwLock<AppConfig>>,
    state: Mutex<QueueState>,
    running_mode: AtomicBool,
    listeners: Mutex<Vec<QueueListener>>,
}

impl Orchestrator {
    /// Creates an orchestrator sharing `config`. The engine starts paused;
    /// call [`Orchestrator::start`] to begin dispatching.
    pub fn new(config: Arc<RwLock<AppConfig>>) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(QueueState::default()),
            running_mode: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Convenience constructor for an owned configuration.
    pub fn with_config(config: AppConfig) -> Arc<Self> {
        Self::new(Arc::new(RwLock::new(config)))
    }

    /// Registers a transition observer.
    pub fn add_listener(&self, listener: QueueListener) {
        self.listeners.lock().unwrap().push(listener);
    }

    /// Appends a job to the tail of the pending queue. Never blocks.
    ///
    /// The only escalated error is a missing executable; everything that can
    /// go wrong later is reported through job state instead.
    pub fn enqueue(self: &Arc<Self>, spec: JobSpec) -> Result<String, QueueError> {
        if spec.program.as_os_str().is_empty() {
            return Err(QueueError::MissingExecutable);
        }

        let job = Job::from_spec(spec);
        let id = job.id.clone();
        {
            let mut state = self.state.lock().unwrap();
            state.pending.push_back(Arc::new(Mutex::new(job)));
        }
        debug!(job_id = %id, "Job enqueued");
        self.notify();
        self.pump();
        Ok(id)
    }

    /// Puts the engine in running mode and dispatches whatever fits.
    pub fn start(self: &Arc<Self>) {
        self.running_mode.store(true, Ordering::SeqCst);
        info!("Engine started");
        self.notify();
        self.pump();
    }

    /// Pauses the engine. In-flight jobs are force-killed and returned to
    /// the head of the queue so a later start resumes them first.
    pub fn stop(&self) {
        self.running_mode.store(false, Ordering::SeqCst);

        let kills: Vec<_> = {
            let state = self.state.lock().unwrap();
            state
                .running
                .iter()
                .map(|h| h.lock().unwrap().kill.clone())
                .collect()
        };
        for kill in kills {
            kill.cancel();
        }

        info!("Engine stopped");
        self.notify();
    }

    /// True while the engine dispatches work.
    pub fn is_running(&self) -> bool {
        self.running_mode.load(Ordering::SeqCst)
    }

    /// Dispatches queued jobs while a slot is free. Never blocks; workers
    /// run as spawned tasks. The concurrency cap is read fresh on every
    /// call.
    pub fn pump(self: &Arc<Self>) {
        loop {
            if !self.running_mode.load(Ordering::SeqCst) {
                return;
            }
            let cap = self.concurrency_cap();

            let handle = {
                let mut state = self.state.lock().unwrap();
                if state.running.len() >= cap || state.pending.is_empty() {
                    return;
                }
                let Some(handle) = state.pending.pop_front() else {
                    return;
                };
                handle.lock().unwrap().mark_starting();
                state.running.push(handle.clone());
                handle
            };

            self.notify();
            let this = Arc::clone(self);
            tokio::spawn(async move { this.run_job(handle).await });
        }
    }

    /// Requests cancellation of a job. Idempotent: cancelling a job twice,
    /// or one that is already gone, is a no-op.
    ///
    /// A queued job is torn down inline; a running one is flagged and torn
    /// down by its worker. Terminal jobs are left alone.
    pub fn cancel(&self, id: &str) {
        let queued = {
            let mut state = self.state.lock().unwrap();
            let index = state
                .pending
                .iter()
                .position(|h| h.lock().unwrap().id == id);
            index.and_then(|i| state.pending.remove(i))
        };
        if let Some(handle) = queued {
            handle.lock().unwrap().cancel.cancel();
            self.cleanup_work_dir(&handle);
            info!(job_id = %id, "Queued job cancelled and dropped");
            self.notify();
            return;
        }

        let running = {
            let state = self.state.lock().unwrap();
            state
                .running
                .iter()
                .find(|h| h.lock().unwrap().id == id)
                .cloned()
        };
        if let Some(handle) = running {
            let job = handle.lock().unwrap();
            job.cancel.cancel();
            job.kill.cancel();
            info!(job_id = %id, "Cancellation requested for running job");
        }
    }

    /// Moves every failed job back to the tail of the queue and resumes
    /// pumping.
    pub fn retry_all_failed(self: &Arc<Self>) {
        let retried = {
            let mut state = self.state.lock().unwrap();
            let failed: Vec<_> = state.failed.drain(..).collect();
            let count = failed.len();
            for handle in failed {
                handle.lock().unwrap().requeue();
                state.pending.push_back(handle);
            }
            count
        };

        if retried > 0 {
            info!(count = retried, "Retrying failed jobs");
        }
        self.running_mode.store(true, Ordering::SeqCst);
        self.notify();
        self.pump();
    }

    /// Re-queues one failed job.
    pub fn retry(self: &Arc<Self>, id: &str) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock().unwrap();
            let index = state
                .failed
                .iter()
                .position(|h| h.lock().unwrap().id == id)
                .ok_or_else(|| QueueError::JobNotFound {
                    job_id: id.to_string(),
                })?;
            let handle = state.failed.remove(index);
            handle.lock().unwrap().requeue();
            state.pending.push_back(handle);
        }

        self.notify();
        self.pump();
        Ok(())
    }

    /// Removes every pending, failed and completed job. Jobs currently
    /// running finish their process but are detached from bookkeeping.
    pub fn clear(&self) {
        let (pending, failed) = {
            let mut state = self.state.lock().unwrap();
            let pending: Vec<_> = state.pending.drain(..).collect();
            let failed: Vec<_> = state.failed.drain(..).collect();
            state.completed.clear();
            state.running.clear();
            (pending, failed)
        };

        for handle in pending.iter().chain(failed.iter()) {
            self.cleanup_work_dir(handle);
        }

        info!("Queue cleared");
        self.notify();
    }

    /// Current queue population.
    pub fn counts(&self) -> QueueCounts {
        let state = self.state.lock().unwrap();
        QueueCounts {
            queued: state.pending.len(),
            running: state.running.len(),
            failed: state.failed.len(),
            completed: state.completed.len(),
        }
    }

    /// Read-only snapshots of every tracked job, queue order first.
    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        let state = self.state.lock().unwrap();
        state
            .pending
            .iter()
            .chain(state.running.iter())
            .chain(state.failed.iter())
            .chain(state.completed.iter())
            .map(|h| JobSnapshot::from(&*h.lock().unwrap()))
            .collect()
    }

    /// True when nothing is pending or running.
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.pending.is_empty() && state.running.is_empty()
    }

    fn concurrency_cap(&self) -> usize {
        self.config.read().unwrap().queue.max_concurrent.max(1)
    }

    /// Worker body: launches the supervised process and files the outcome.
    async fn run_job(self: Arc<Self>, handle: JobHandle) {
        // The engine may have been stopped between dispatch and launch; put
        // the job back at the head untouched rather than running it.
        if !self.running_mode.load(Ordering::SeqCst) {
            {
                let mut state = self.state.lock().unwrap();
                state.running.retain(|h| !Arc::ptr_eq(h, &handle));
                handle.lock().unwrap().requeue();
                state.pending.push_front(handle.clone());
            }
            self.notify();
            return;
        }

        let timeout = {
            let config = self.config.read().unwrap();
            config.queue.job_timeout_seconds.map(Duration::from_secs)
        };

        let (id, program, args, work_dir, context, kill) = {
            let mut job = handle.lock().unwrap();
            job.mark_running();
            (
                job.id.clone(),
                job.program.clone(),
                job.args.clone(),
                job.work_dir.clone(),
                job.context,
                job.kill.clone(),
            )
        };

        info!(job_id = %id, program = %program.display(), "Job starting");
        self.notify();

        if let Err(e) = std::fs::create_dir_all(&work_dir) {
            self.file_failure(&handle, format!("failed to create working directory: {e}"));
            self.pump();
            return;
        }

        let extract: ProgressFn = Arc::new(move |line: &str| progress::extract(line, &context));
        let opts = RunOptions {
            listener: Some(job_listener(&handle)),
            progress: Some(extract),
            timeout,
            discard_output: false,
            poll_output: false,
            cancel: kill,
            cwd: Some(work_dir),
        };

        let code = process::run(&program, &args, opts).await;
        self.finish_job(&handle, code);
        self.pump();
    }

    /// Files a finished process into the right terminal (or re-queued)
    /// bucket.
    fn finish_job(&self, handle: &JobHandle, code: i32) {
        let cancelled = handle.lock().unwrap().cancel.is_cancelled();
        let stopped = !self.running_mode.load(Ordering::SeqCst);

        let tracked = {
            let mut state = self.state.lock().unwrap();
            let tracked = state.running.iter().any(|h| Arc::ptr_eq(h, handle));
            state.running.retain(|h| !Arc::ptr_eq(h, handle));
            tracked
        };

        if cancelled {
            let id = handle.lock().unwrap().id.clone();
            self.cleanup_work_dir(handle);
            info!(job_id = %id, "Job cancelled, torn down and dropped");
        } else if !tracked {
            // Cleared mid-run; nothing left to record.
            self.cleanup_work_dir(handle);
        } else if stopped {
            {
                let mut state = self.state.lock().unwrap();
                let mut job = handle.lock().unwrap();
                job.mark_stopped();
                info!(job_id = %job.id, "Engine stopped, job parked at the queue head");
                drop(job);
                state.pending.push_front(handle.clone());
            }
        } else if code == 0 {
            match self.deliver_artifacts(handle) {
                Ok(moved) => {
                    let mut state = self.state.lock().unwrap();
                    let mut job = handle.lock().unwrap();
                    job.mark_completed();
                    info!(job_id = %job.id, artifacts = moved, "Job completed");
                    drop(job);
                    state.completed.push(handle.clone());
                }
                Err(message) => {
                    self.file_failure_locked(handle, message);
                }
            }
        } else {
            let reason = {
                let job = handle.lock().unwrap();
                if job.last_message.is_empty() {
                    format!("tool exited with code {code}")
                } else {
                    job.last_message.clone()
                }
            };
            error!(code, reason = %reason, "Job failed");
            self.file_failure_locked(handle, reason);
        }

        self.notify();
    }

    /// Marks a dispatched-but-unstarted job failed (e.g. workdir creation).
    fn file_failure(&self, handle: &JobHandle, reason: String) {
        {
            let mut state = self.state.lock().unwrap();
            state.running.retain(|h| !Arc::ptr_eq(h, handle));
        }
        self.file_failure_locked(handle, reason);
        self.notify();
    }

    fn file_failure_locked(&self, handle: &JobHandle, reason: String) {
        let mut state = self.state.lock().unwrap();
        handle.lock().unwrap().mark_failed(reason);
        state.failed.push(handle.clone());
    }

    /// Moves matched artifacts from the job's working directory to its
    /// output directory, then removes the working directory.
    fn deliver_artifacts(&self, handle: &JobHandle) -> Result<usize, String> {
        let (work_dir, output_dir, patterns) = {
            let job = handle.lock().unwrap();
            (
                job.work_dir.clone(),
                job.output_dir.clone(),
                job.artifact_patterns.clone(),
            )
        };

        let patterns: Vec<glob::Pattern> = patterns
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();

        std::fs::create_dir_all(&output_dir)
            .map_err(|e| format!("failed to create output directory: {e}"))?;

        let mut moved = 0;
        for entry in walkdir::WalkDir::new(&work_dir)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if patterns.iter().any(|p| p.matches(&name)) {
                let dest = output_dir.join(entry.file_name());
                move_file(entry.path(), &dest)
                    .map_err(|e| format!("failed to deliver '{name}': {e}"))?;
                moved += 1;
            }
        }

        self.cleanup_work_dir(handle);
        Ok(moved)
    }

    /// Removes the job's working directory exactly once, even when
    /// cancellation races natural completion.
    fn cleanup_work_dir(&self, handle: &JobHandle) {
        let work_dir = {
            let mut job = handle.lock().unwrap();
            if job.cleaned_up {
                return;
            }
            job.cleaned_up = true;
            job.work_dir.clone()
        };

        if work_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&work_dir) {
                warn!(dir = %work_dir.display(), error = %e, "Failed to remove working directory");
            }
        }
    }

    fn notify(&self) {
        let listeners = self.listeners.lock().unwrap().clone();
        for listener in &listeners {
            listener(self);
        }
    }
}

/// Builds the supervisor line listener for one job: records progress and the
/// last message, then pushes the update to the job's own callback.
fn job_listener(handle: &JobHandle) -> LineListener {
    let handle = handle.clone();
    Arc::new(move |line: &str, percent: f32| {
        let progress_fn = {
            let mut job = handle.lock().unwrap();
            if percent >= 0.0 {
                job.progress = percent;
            }
            if !line.trim().is_empty() {
                job.last_message = line.to_string();
            }
            job.progress_fn.clone()
        };
        if let Some(callback) = progress_fn {
            callback(line, true, percent);
        }
    })
}

/// Renames, falling back to copy-and-delete for cross-device moves.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_file_works_within_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.mkv");
        let to = dir.path().join("b.mkv");
        std::fs::write(&from, b"payload").unwrap();

        move_file(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn enqueue_rejects_an_empty_program() {
        let orch = Orchestrator::with_config(AppConfig::default());
        let spec = JobSpec::new("", vec![], "/out");
        assert!(matches!(
            orch.enqueue(spec),
            Err(QueueError::MissingExecutable)
        ));
    }

    #[tokio::test]
    async fn enqueue_without_start_keeps_jobs_queued() {
        let orch = Orchestrator::with_config(AppConfig::default());
        orch.enqueue(JobSpec::new("sh", vec!["-c".into(), "true".into()], "/out"))
            .unwrap();

        let counts = orch.counts();
        assert_eq!(counts.queued, 1);
        assert_eq!(counts.running, 0);
        assert!(!orch.is_running());
    }

    #[tokio::test]
    async fn listeners_fire_on_transitions() {
        let orch = Orchestrator::with_config(AppConfig::default());
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        orch.add_listener(Arc::new(move |_o: &Orchestrator| {
            flag.store(true, Ordering::SeqCst);
        }));

        orch.enqueue(JobSpec::new("sh", vec!["-c".into(), "true".into()], "/out"))
            .unwrap();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancel_of_unknown_id_is_a_no_op() {
        let orch = Orchestrator::with_config(AppConfig::default());
        orch.cancel("no-such-job");
        assert_eq!(orch.counts(), QueueCounts::default());
    }

    #[tokio::test]
    async fn retry_of_unknown_id_errors() {
        let orch = Orchestrator::with_config(AppConfig::default());
        assert!(matches!(
            orch.retry("missing"),
            Err(QueueError::JobNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn cancelling_a_queued_job_removes_it_and_its_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = dir.path().join("w");
        std::fs::create_dir_all(&work_dir).unwrap();

        let orch = Orchestrator::with_config(AppConfig::default());
        let id = orch
            .enqueue(
                JobSpec::new("sh", vec!["-c".into(), "true".into()], "/out")
                    .with_work_dir(&work_dir),
            )
            .unwrap();

        orch.cancel(&id);
        // Second cancel must be a harmless no-op.
        orch.cancel(&id);

        assert_eq!(orch.counts().queued, 0);
        assert!(!work_dir.exists());
    }
}
