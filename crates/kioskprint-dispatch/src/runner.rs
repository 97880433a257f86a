// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// External process invocation for the dispatch adapters and device directory.
//
// Programs are always started with an explicit argument vector. Nothing is
// passed through a shell, so device names and file paths are never
// interpreted.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use kioskprint_core::error::{KioskError, Result};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, or `None` when the process was killed by a signal.
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }
}

/// Seam between adapters and the operating system.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `program` with `args` and wait at most `timeout` for it to exit.
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<ProcessOutput>;
}

/// Runs real processes through `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    #[instrument(skip(self, args), fields(%program, argc = args.len()))]
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<ProcessOutput> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // The child is killed if the timeout drops the future.
            .kill_on_drop(true);

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| KioskError::Timeout {
                operation: program.to_string(),
                seconds: timeout.as_secs(),
            })?
            .map_err(|e| KioskError::Internal(format!("failed to start {program}: {e}")))?;

        let result = ProcessOutput {
            status_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(status = ?result.status_code, "process finished");
        Ok(result)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner shared by adapter, directory and dispatcher tests.

    use std::sync::Mutex;

    use super::*;

    type Script = Box<dyn Fn(&str, &[String]) -> Result<ProcessOutput> + Send + Sync>;

    /// Answers every invocation through a closure and records the argv.
    pub struct ScriptedRunner {
        script: Script,
        pub calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        pub fn new(script: impl Fn(&str, &[String]) -> Result<ProcessOutput> + Send + Sync + 'static) -> Self {
            Self {
                script: Box::new(script),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Always exit 0 with the given stdout.
        pub fn succeeding(stdout: &str) -> Self {
            let stdout = stdout.to_string();
            Self::new(move |_, _| Ok(ok(&stdout)))
        }

        pub fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProcessRunner for ScriptedRunner {
        async fn run(&self, program: &str, args: &[String], _timeout: Duration) -> Result<ProcessOutput> {
            let mut argv = vec![program.to_string()];
            argv.extend(args.iter().cloned());
            self.calls.lock().unwrap().push(argv);
            (self.script)(program, args)
        }
    }

    pub fn ok(stdout: &str) -> ProcessOutput {
        ProcessOutput {
            status_code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            status_code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}
