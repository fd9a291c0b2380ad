//! Job definitions for the orchestrator.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::process::CancelToken;
use crate::progress::{ProgressContext, UNKNOWN_PROGRESS};

/// Per-job progress callback: `(message, has_started, percent)`.
pub type JobProgressFn = Arc<dyn Fn(&str, bool, f32) + Send + Sync>;

/// What a caller submits: the argument vector a command builder produced,
/// plus where the tool may scribble and where finished artifacts belong.
#[derive(Clone)]
pub struct JobSpec {
    /// Executable to supervise.
    pub program: PathBuf,

    /// Argument vector, opaque to the orchestrator.
    pub args: Vec<String>,

    /// Private working directory. Assigned under the system temp directory
    /// at enqueue time when not set.
    pub work_dir: Option<PathBuf>,

    /// Final destination for artifacts matched out of the working directory.
    pub output_dir: PathBuf,

    /// Glob patterns selecting which working-directory files are artifacts.
    pub artifact_patterns: Vec<String>,

    /// Known totals for progress extraction from the tool's output.
    pub context: ProgressContext,

    /// Pushed progress updates for this job.
    pub progress_fn: Option<JobProgressFn>,
}

impl JobSpec {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            work_dir: None,
            output_dir: output_dir.into(),
            artifact_patterns: Vec::new(),
            context: ProgressContext::unknown(),
            progress_fn: None,
        }
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(work_dir.into());
        self
    }

    pub fn with_artifact_patterns(mut self, patterns: Vec<String>) -> Self {
        self.artifact_patterns = patterns;
        self
    }

    pub fn with_context(mut self, context: ProgressContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_progress_fn(mut self, progress_fn: JobProgressFn) -> Self {
        self.progress_fn = Some(progress_fn);
        self
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Waiting in the pending queue.
    Queued,
    /// Claimed by a worker, process not yet launched.
    Starting,
    /// Child process is running.
    Running,
    /// Finished successfully. Terminal.
    Completed,
    /// Tool reported failure; eligible for retry.
    Failed,
    /// Interrupted by an engine stop; resumed ahead of later work.
    Stopped,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Queued => write!(f, "queued"),
            JobState::Starting => write!(f, "starting"),
            JobState::Running => write!(f, "running"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
            JobState::Stopped => write!(f, "stopped"),
        }
    }
}

/// A unit of orchestrated work, owned by the orchestrator for its lifetime.
/// Callers hold only the id.
pub struct Job {
    /// Unique identifier, assigned at enqueue, never reused.
    pub id: String,

    /// Executable path; immutable once the job leaves `Queued`.
    pub program: PathBuf,

    /// Argument vector; immutable once the job leaves `Queued`.
    pub args: Vec<String>,

    /// Private working directory.
    pub work_dir: PathBuf,

    /// Destination for matched artifacts.
    pub output_dir: PathBuf,

    /// Artifact filename patterns.
    pub artifact_patterns: Vec<String>,

    /// Totals for progress extraction.
    pub context: ProgressContext,

    /// Pushed progress updates.
    pub progress_fn: Option<JobProgressFn>,

    /// Current lifecycle state.
    pub state: JobState,

    /// Last known progress percentage; -1 = indeterminate.
    pub progress: f32,

    /// Last output line seen, kept as the user-visible status/failure reason.
    pub last_message: String,

    /// Caller requested cancellation.
    pub cancel: CancelToken,

    /// Force-kill line to the supervised process (cancellation or engine
    /// stop).
    pub kill: CancelToken,

    /// Working directory was already removed; guards double cleanup.
    pub cleaned_up: bool,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a queued job from a spec, assigning its id and working
    /// directory.
    pub fn from_spec(spec: JobSpec) -> Self {
        let id = Uuid::new_v4().to_string();
        let work_dir = spec
            .work_dir
            .unwrap_or_else(|| std::env::temp_dir().join(format!("mp_job_{id}")));

        Self {
            id,
            program: spec.program,
            args: spec.args,
            work_dir,
            output_dir: spec.output_dir,
            artifact_patterns: spec.artifact_patterns,
            context: spec.context,
            progress_fn: spec.progress_fn,
            state: JobState::Queued,
            progress: UNKNOWN_PROGRESS,
            last_message: String::new(),
            cancel: CancelToken::new(),
            kill: CancelToken::new(),
            cleaned_up: false,
            created_at: Utc::now(),
            started_at: None,
        }
    }

    /// Claimed by a worker. Clears the kill flag a previous engine stop may
    /// have left behind so the relaunch is not killed on its first tick.
    pub fn mark_starting(&mut self) {
        self.state = JobState::Starting;
        self.kill.reset();
    }

    /// Child process launched.
    pub fn mark_running(&mut self) {
        self.state = JobState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = JobState::Completed;
        self.progress = 100.0;
    }

    pub fn mark_failed(&mut self, reason: String) {
        self.state = JobState::Failed;
        self.last_message = reason;
    }

    /// Interrupted by an engine stop; the job keeps its progress so a
    /// resume can show where it left off.
    pub fn mark_stopped(&mut self) {
        self.state = JobState::Stopped;
    }

    /// Returns the job to the queue after a failure or stop: flags cleared,
    /// argument vector and directories untouched.
    pub fn requeue(&mut self) {
        self.state = JobState::Queued;
        self.progress = UNKNOWN_PROGRESS;
        self.cancel.reset();
        self.kill.reset();
        self.cleaned_up = false;
        self.started_at = None;
    }
}

/// Read-only view of a job for observers.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub id: String,
    pub state: JobState,
    pub progress: f32,
    pub last_message: String,
}

impl From<&Job> for JobSnapshot {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            state: job.state,
            progress: job.progress,
            last_message: job.last_message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requeue_preserves_the_argument_vector() {
        let spec = JobSpec::new("yt-dlp", vec!["--no-playlist".into(), "URL".into()], "/out")
            .with_work_dir("/tmp/w");
        let mut job = Job::from_spec(spec);
        let args_before = job.args.clone();
        let work_dir_before = job.work_dir.clone();

        job.mark_starting();
        job.mark_running();
        job.mark_failed("tool exited with code 1".into());
        job.cancel.cancel();
        job.requeue();

        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.args, args_before);
        assert_eq!(job.work_dir, work_dir_before);
        assert!(!job.cancel.is_cancelled());
        assert!(!job.kill.is_cancelled());
        assert_eq!(job.progress, UNKNOWN_PROGRESS);
    }

    #[test]
    fn ids_are_unique() {
        let a = Job::from_spec(JobSpec::new("x", vec![], "/out"));
        let b = Job::from_spec(JobSpec::new("x", vec![], "/out"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn default_work_dir_is_under_temp() {
        let job = Job::from_spec(JobSpec::new("x", vec![], "/out"));
        assert!(job.work_dir.starts_with(std::env::temp_dir()));
    }
}
