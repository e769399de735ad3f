//! External command execution.

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{GateError, Result};

/// Captured result of a finished command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Standard output, lines joined with `\n`, no trailing newline.
    pub stdout: String,
    /// Standard error, lines joined with `\n`, no trailing newline.
    pub stderr: String,
    /// Exit status; `-1` when the process was terminated by a signal.
    pub exit_code: i32,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a program with arguments and captures its output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str]) -> Result<ProcessOutput>;
}

/// Runs commands on the host with `tokio::process`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<ProcessOutput> {
        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| GateError::Command(format!("{program}: {err}")))?;

        Ok(ProcessOutput {
            stdout: normalize(&output.stdout),
            stderr: normalize(&output.stderr),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

fn normalize(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).lines().collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_joins_lines_without_trailing_newline() {
        assert_eq!(normalize(b"a\nb\r\nc\n"), "a\nb\nc");
        assert_eq!(normalize(b""), "");
    }

    #[test]
    fn test_process_output_success() {
        let output = ProcessOutput {
            exit_code: 0,
            ..ProcessOutput::default()
        };
        assert!(output.success());
        assert!(!ProcessOutput { exit_code: 2, ..output }.success());
    }

    #[tokio::test]
    async fn test_missing_program_is_command_error() {
        let err = SystemCommandRunner
            .run("egressgate-no-such-program", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Command(_)));
    }
}
