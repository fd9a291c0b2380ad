//! Process supervisor: spawns an external tool and tracks it to completion.
//!
//! The supervisor never returns an error to its caller. Launch failures and
//! supervisor-initiated kills are folded into the exit code space via the
//! sentinels in the parent module, so callers treat "tool missing", "tool
//! timed out" and "tool failed" uniformly.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::{CancelToken, EXIT_LAUNCH_FAILED, EXIT_SUPERVISED_KILL};

/// Receives every output line together with a computed percentage
/// (-1.0 when no progress function is attached or the line has none).
pub type LineListener = Arc<dyn Fn(&str, f32) + Send + Sync>;

/// Maps an output line to a progress percentage in [0, 100] or -1.0.
pub type ProgressFn = Arc<dyn Fn(&str) -> f32 + Send + Sync>;

/// Options controlling a single supervised run.
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Callback invoked for every output line.
    pub listener: Option<LineListener>,

    /// Progress extraction applied to each line before forwarding.
    pub progress: Option<ProgressFn>,

    /// Wall-clock budget. On expiry the child is force-killed and
    /// [`EXIT_SUPERVISED_KILL`] is returned.
    pub timeout: Option<Duration>,

    /// Skip piping output entirely; only the exit code matters.
    pub discard_output: bool,

    /// Drain buffered lines on an interval instead of awaiting each line.
    /// Suits tools whose output arrives in idle bursts.
    pub poll_output: bool,

    /// Checked on every loop iteration; triggering it force-kills the child.
    pub cancel: CancelToken,

    /// Working directory for the child process.
    pub cwd: Option<std::path::PathBuf>,
}

/// How often the supervision loop re-checks cancellation and the deadline.
const SUPERVISION_TICK: Duration = Duration::from_millis(50);

/// Drain interval for [`RunOptions::poll_output`] mode.
const POLL_TICK: Duration = Duration::from_millis(200);

/// Runs `program` with `args` under supervision and returns its exit code.
///
/// Returns [`EXIT_LAUNCH_FAILED`] if the executable could not be started and
/// [`EXIT_SUPERVISED_KILL`] if the supervisor killed it (timeout or
/// cancellation) or it died to a signal.
pub async fn run(program: &Path, args: &[String], opts: RunOptions) -> i32 {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdin(Stdio::null());
    cmd.kill_on_drop(true);
    if let Some(cwd) = &opts.cwd {
        cmd.current_dir(cwd);
    }

    if opts.discard_output {
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());
    } else {
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(program = %program.display(), error = %e, "Failed to launch process");
            if let Some(listener) = &opts.listener {
                let message = format!("failed to launch '{}': {}", program.display(), e);
                listener(&message, -1.0);
            }
            return EXIT_LAUNCH_FAILED;
        }
    };

    debug!(program = %program.display(), args = ?args, "Process started");

    let deadline = opts.timeout.map(|t| Instant::now() + t);
    let line_rx = if opts.discard_output {
        None
    } else {
        Some(spawn_line_readers(&mut child))
    };

    if let Some(rx) = line_rx {
        if let Some(code) = stream_output(&mut child, rx, &opts, deadline).await {
            return code;
        }
    }

    // Output is done (or was never piped); wait for exit, still bounded by
    // the deadline and the cancellation token.
    await_exit(&mut child, &opts.cancel, deadline).await
}

/// Pumps output lines until the streams close.
///
/// Returns `Some(code)` if the run ended early (cancelled or timed out),
/// `None` once the streams are exhausted and the exit wait should proceed.
async fn stream_output(
    child: &mut Child,
    mut rx: mpsc::UnboundedReceiver<String>,
    opts: &RunOptions,
    deadline: Option<Instant>,
) -> Option<i32> {
    let mut tick = tokio::time::interval(if opts.poll_output {
        POLL_TICK
    } else {
        SUPERVISION_TICK
    });

    loop {
        if opts.cancel.is_cancelled() {
            debug!("Cancellation requested, killing process");
            return Some(kill_and_reap(child).await);
        }
        if deadline_expired(deadline) {
            warn!("Process exceeded its time budget, killing");
            return Some(kill_and_reap(child).await);
        }

        if opts.poll_output {
            // Drain whatever is buffered, then idle until the next tick.
            loop {
                match rx.try_recv() {
                    Ok(line) => forward_line(&line, opts),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return None,
                }
            }
            tick.tick().await;
        } else {
            tokio::select! {
                maybe_line = rx.recv() => match maybe_line {
                    Some(line) => forward_line(&line, opts),
                    None => return None,
                },
                _ = tick.tick() => {}
            }
        }
    }
}

/// Waits for the child to exit, honouring cancellation and the deadline.
async fn await_exit(child: &mut Child, cancel: &CancelToken, deadline: Option<Instant>) -> i32 {
    let mut tick = tokio::time::interval(SUPERVISION_TICK);

    loop {
        if cancel.is_cancelled() {
            debug!("Cancellation requested, killing process");
            return kill_and_reap(child).await;
        }
        if deadline_expired(deadline) {
            warn!("Process exceeded its time budget, killing");
            return kill_and_reap(child).await;
        }

        tokio::select! {
            status = child.wait() => {
                return match status {
                    Ok(status) => {
                        let code = status.code().unwrap_or(EXIT_SUPERVISED_KILL);
                        debug!(code, "Process exited");
                        code
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to collect process exit status");
                        EXIT_SUPERVISED_KILL
                    }
                };
            }
            _ = tick.tick() => {}
        }
    }
}

/// Force-kills the child and reaps it, returning the kill sentinel.
async fn kill_and_reap(child: &mut Child) -> i32 {
    if let Err(e) = child.start_kill() {
        // Already exited; nothing to signal.
        debug!(error = %e, "Kill signal not delivered");
    }
    let _ = child.wait().await;
    EXIT_SUPERVISED_KILL
}

fn deadline_expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

fn forward_line(line: &str, opts: &RunOptions) {
    trace!(line = %line, "process output");
    let percent = match &opts.progress {
        Some(progress) => progress(line),
        None => -1.0,
    };
    if let Some(listener) = &opts.listener {
        listener(line, percent);
    }
}

/// Takes the child's stdout and stderr and pumps both, line by line, into a
/// single channel. The receiver closes when both streams end.
fn spawn_line_readers(child: &mut Child) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();

    if let Some(stdout) = child.stdout.take() {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    }

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn sh() -> PathBuf {
        PathBuf::from("sh")
    }

    fn script(body: &str) -> Vec<String> {
        vec!["-c".to_string(), body.to_string()]
    }

    fn collecting_listener() -> (LineListener, Arc<Mutex<Vec<String>>>) {
        let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let listener: LineListener = Arc::new(move |line: &str, _percent: f32| {
            sink.lock().unwrap().push(line.to_string());
        });
        (listener, lines)
    }

    #[tokio::test]
    async fn returns_the_real_exit_code() {
        let code = run(&sh(), &script("exit 3"), RunOptions::default()).await;
        assert_eq!(code, 3);
    }

    #[tokio::test]
    async fn forwards_output_lines() {
        let (listener, lines) = collecting_listener();
        let opts = RunOptions {
            listener: Some(listener),
            ..Default::default()
        };

        let code = run(&sh(), &script("echo one; echo two >&2"), opts).await;

        assert_eq!(code, 0);
        let mut seen = lines.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn polling_reader_collects_burst_output() {
        let (listener, lines) = collecting_listener();
        let opts = RunOptions {
            listener: Some(listener),
            poll_output: true,
            ..Default::default()
        };

        let code = run(&sh(), &script("echo a; sleep 0.3; echo b"), opts).await;

        assert_eq!(code, 0);
        assert_eq!(
            lines.lock().unwrap().clone(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[tokio::test]
    async fn launch_failure_reports_sentinel_and_synthetic_line() {
        let (listener, lines) = collecting_listener();
        let opts = RunOptions {
            listener: Some(listener),
            ..Default::default()
        };

        let code = run(
            Path::new("/nonexistent/tool-that-is-not-here"),
            &[],
            opts,
        )
        .await;

        assert_eq!(code, EXIT_LAUNCH_FAILED);
        let seen = lines.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("failed to launch"));
    }

    #[tokio::test]
    async fn timeout_kills_and_reports_sentinel() {
        let opts = RunOptions {
            timeout: Some(Duration::from_millis(200)),
            ..Default::default()
        };

        let started = std::time::Instant::now();
        let code = run(&sh(), &script("sleep 10"), opts).await;

        assert_eq!(code, EXIT_SUPERVISED_KILL);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn cancellation_kills_promptly() {
        let cancel = CancelToken::new();
        let opts = RunOptions {
            cancel: cancel.clone(),
            ..Default::default()
        };

        let handle = tokio::spawn(async move { run(&sh(), &script("sleep 10"), opts).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let code = handle.await.unwrap();
        assert_eq!(code, EXIT_SUPERVISED_KILL);
    }

    #[tokio::test]
    async fn discard_output_still_returns_exit_code() {
        let opts = RunOptions {
            discard_output: true,
            ..Default::default()
        };

        let code = run(&sh(), &script("echo ignored; exit 7"), opts).await;
        assert_eq!(code, 7);
    }

    #[tokio::test]
    async fn progress_function_result_reaches_the_listener() {
        let percents: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = percents.clone();
        let listener: LineListener = Arc::new(move |_line: &str, percent: f32| {
            sink.lock().unwrap().push(percent);
        });
        let progress: ProgressFn = Arc::new(|line: &str| if line == "half" { 50.0 } else { -1.0 });

        let opts = RunOptions {
            listener: Some(listener),
            progress: Some(progress),
            ..Default::default()
        };

        let code = run(&sh(), &script("echo half"), opts).await;

        assert_eq!(code, 0);
        assert_eq!(percents.lock().unwrap().clone(), vec![50.0]);
    }
}
