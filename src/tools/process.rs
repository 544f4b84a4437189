//! Subprocess execution for command-backed tasks.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use super::TaskError;
use crate::text::truncate;

/// Longest stdout returned to the caller.
const MAX_OUTPUT_CHARS: usize = 10_000;

/// Run `program` with `args` in `cwd` and return its stdout.
///
/// A non-zero exit status becomes [`TaskError::Command`] carrying stderr (or
/// stdout when stderr is empty).
pub(crate) async fn run_program<I, S>(
    program: &str,
    args: I,
    cwd: &Path,
    timeout: Duration,
) -> Result<String, TaskError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::info!(program, cwd = %cwd.display(), "Running command");

    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| {
            TaskError::Command(format!(
                "{} timed out after {} seconds",
                program,
                timeout.as_secs()
            ))
        })?
        .map_err(|e| TaskError::Command(format!("Failed to run {}: {}", program, e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        let detail = if stderr.trim().is_empty() {
            stdout.trim()
        } else {
            stderr.trim()
        };
        return Err(TaskError::Command(format!(
            "{} exited with {}: {}",
            program,
            output.status.code().unwrap_or(-1),
            truncate(detail, MAX_OUTPUT_CHARS)
        )));
    }

    Ok(truncate(stdout.trim_end(), MAX_OUTPUT_CHARS))
}
