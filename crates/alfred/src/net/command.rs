use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::device::DeviceError;

/// Captured result of one external command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the process exited with status zero
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stdout followed by stderr, for diagnostics.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}{}", self.stdout, self.stderr),
        }
    }
}

/// Trait for running the external device control executable
///
/// This trait allows for mocking command execution for testing purposes.
/// An `Err` means the process could not be run to completion at all; a
/// process that ran and failed is an `Ok` with `success == false`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, DeviceError>;
}

/// Runs commands as child processes with a wall-clock limit.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, DeviceError> {
        debug!("Running {} {}", program, args.join(" "));

        let child = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| {
                DeviceError::TransientNetworkFailure(format!(
                    "{} did not finish within {:?}",
                    program, self.timeout
                ))
            })?
            .map_err(|e| {
                DeviceError::TransientNetworkFailure(format!("failed to run {}: {}", program, e))
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Mock command runner for testing
///
/// Replays scripted outputs in order (the last one repeats) and records every
/// invocation with the tokio clock reading at the time it was made.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockRunner {
    script: std::sync::Mutex<std::collections::VecDeque<Result<CommandOutput, DeviceError>>>,
    last: std::sync::Mutex<Option<Result<CommandOutput, DeviceError>>>,
    pub calls: std::sync::Mutex<Vec<(Vec<String>, tokio::time::Instant)>>,
}

#[cfg(test)]
impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, result: Result<CommandOutput, DeviceError>) -> Self {
        self.script.lock().unwrap().push_back(result);
        self
    }

    pub fn then_ok(self, stdout: &str) -> Self {
        self.then(Ok(CommandOutput {
            success: true,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }))
    }

    pub fn then_fail(self, stderr: &str) -> Self {
        self.then(Ok(CommandOutput {
            success: false,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }))
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn args(&self, call: usize) -> Vec<String> {
        self.calls.lock().unwrap()[call].0.clone()
    }
}

#[cfg(test)]
#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, _program: &str, args: &[String]) -> Result<CommandOutput, DeviceError> {
        self.calls
            .lock()
            .unwrap()
            .push((args.to_vec(), tokio::time::Instant::now()));

        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(result) = next {
            *last = Some(result);
        }
        last.clone().unwrap_or_else(|| Ok(CommandOutput::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output() {
        let out = CommandOutput {
            success: false,
            stdout: "Discovering\n".to_string(),
            stderr: "Error: timed out\n".to_string(),
        };
        assert_eq!(out.combined(), "Discovering\nError: timed out\n");

        let out = CommandOutput {
            success: false,
            stdout: String::new(),
            stderr: "boom".to_string(),
        };
        assert_eq!(out.combined(), "boom");
    }

    #[tokio::test]
    async fn test_process_runner_missing_program() {
        let runner = ProcessRunner::new(Duration::from_secs(5));
        let err = runner
            .run("alfred-test-no-such-program", &["state".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::TransientNetworkFailure(_)));
    }

    #[tokio::test]
    async fn test_mock_runner_repeats_last() {
        let runner = MockRunner::new().then_fail("first").then_ok("second");
        let args = vec!["on".to_string()];
        assert!(!runner.run("kasa", &args).await.unwrap().success);
        assert!(runner.run("kasa", &args).await.unwrap().success);
        assert!(runner.run("kasa", &args).await.unwrap().success);
        assert_eq!(runner.call_count(), 3);
    }
}
