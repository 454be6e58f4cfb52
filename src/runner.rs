//! Local process execution (docker, podman, kubectl)

use anyhow::{Context, Result};
use std::process::Command;

/// Runs programs on the local machine
///
/// Backends for local containers and Kubernetes go through this trait so
/// tests can record invocations instead of spawning processes.
pub trait CommandRunner: Send + Sync {
    /// Run a command and capture its trimmed stdout; non-zero exit is an error
    fn run_capture(&self, program: &str, args: &[String]) -> Result<String>;
}

/// Runner spawning real processes
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run_capture(&self, program: &str, args: &[String]) -> Result<String> {
        log::debug!("Running: {} {}", program, args.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("Failed to execute: {} {}", program, args.join(" ")))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{} failed: {}", program, stderr.trim())
        }
    }
}

/// Build an owned argument list
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_system_runner_captures_stdout() {
        let out = SystemRunner
            .run_capture("sh", &args(["-c", "echo hello"]))
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_reports_stderr() {
        let err = SystemRunner
            .run_capture("sh", &args(["-c", "echo nope >&2; exit 3"]))
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }
}
