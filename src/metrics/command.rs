//! Bounded invocation of external diagnostic tools.

use crate::error::ToolError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Captured output of a successful tool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Stdout followed by stderr; some tools report on either stream.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Run `program` with `args`, killing it if it outlives `timeout`.
///
/// A missing executable, a timeout, a non-zero exit and an I/O failure are
/// all reported as distinct [`ToolError`] variants.
pub async fn run_tool(program: &str, args: &[&str], timeout: Duration) -> Result<ToolOutput, ToolError> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| spawn_error(program, source))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| ToolError::Io {
            program: program.to_string(),
            source,
        })?,
        Err(_) => {
            return Err(ToolError::Timeout {
                program: program.to_string(),
                timeout,
            })
        }
    };

    if !output.status.success() {
        return Err(ToolError::Failed {
            program: program.to_string(),
            status: output.status.code(),
        });
    }

    Ok(ToolOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

fn spawn_error(program: &str, source: std::io::Error) -> ToolError {
    if source.kind() == std::io::ErrorKind::NotFound {
        ToolError::NotFound(program.to_string())
    } else {
        ToolError::Io {
            program: program.to_string(),
            source,
        }
    }
}
