//! Step executor — runs one pipeline command as a shell step.
//!
//! Every step is `bash -c <command>` in the source directory, with `CI=true`
//! and the descriptor's env block exported. Output is captured and kept as
//! a bounded tail so one noisy step cannot blow up the build report.

use std::path::Path;
use std::time::{Duration, Instant};

use tokio::process::Command;

/// Captured result of one step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Process exit code, -1 when the step was killed or never ran.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
}

impl StepOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Run one command to completion, or kill it at the timeout.
pub async fn run_step(
    command: &str,
    work_dir: &Path,
    env: &[(String, String)],
    timeout: Duration,
    tail_bytes: usize,
) -> StepOutcome {
    let start = Instant::now();

    let mut cmd = Command::new("bash");
    cmd.args(["-c", command])
        .current_dir(work_dir)
        .env("CI", "true")
        .kill_on_drop(true);
    for (key, value) in env {
        cmd.env(key, value);
    }

    let cmd_result = tokio::time::timeout(timeout, cmd.output()).await;

    match cmd_result {
        Ok(Ok(output)) => {
            let code = output.status.code().unwrap_or(-1);
            let stdout = tail(&String::from_utf8_lossy(&output.stdout), tail_bytes);
            let stderr = tail(&String::from_utf8_lossy(&output.stderr), tail_bytes);
            StepOutcome {
                exit_code: code,
                stdout,
                stderr,
                duration_ms: start.elapsed().as_millis() as u64,
                timed_out: false,
            }
        }
        Ok(Err(e)) => StepOutcome {
            exit_code: -1,
            stdout: String::new(),
            stderr: format!("Failed to execute command: {e}"),
            duration_ms: start.elapsed().as_millis() as u64,
            timed_out: false,
        },
        Err(_) => StepOutcome {
            exit_code: -1,
            stdout: String::new(),
            stderr: format!("Step timed out after {}s", timeout.as_secs()),
            duration_ms: start.elapsed().as_millis() as u64,
            timed_out: true,
        },
    }
}

/// Keep the last `limit` bytes of `text`, marking the cut. The cut point
/// is moved forward to the next char boundary so multibyte output cannot
/// split a character.
fn tail(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...truncated...\n{}", &text[start..])
}
