//! Execute a code snippet with a local interpreter.
//!
//! The snippet goes to a temporary `.py` file that is removed when the run
//! finishes, whatever the outcome.

use crate::util::run_command_with_timeout;
use anyhow::Context;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// Snippets larger than this are refused before anything is spawned.
pub const MAX_SNIPPET_CHARS: usize = 200_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnippetRun {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

/// Run `code` with `interpreter`. A `timeout` of `None` lets the process
/// run until it exits.
pub fn run_snippet(
    interpreter: &Path,
    code: &str,
    timeout: Option<Duration>,
) -> anyhow::Result<SnippetRun> {
    let mut script = tempfile::Builder::new()
        .prefix("linefix-snippet-")
        .suffix(".py")
        .tempfile()
        .context("Failed to create temp file for snippet")?;
    script.write_all(code.as_bytes())?;
    script.flush()?;

    tracing::debug!(
        interpreter = %interpreter.display(),
        script = %script.path().display(),
        ?timeout,
        "running snippet"
    );

    let result = run_command_with_timeout(
        Command::new(interpreter).arg(script.path()),
        timeout,
    )?;

    Ok(SnippetRun {
        exit_code: result.status.and_then(|s| s.code()),
        stdout: result.stdout,
        stderr: result.stderr,
        timed_out: result.timed_out,
    })
}
