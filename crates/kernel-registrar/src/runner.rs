//! External process execution.
//!
//! The registrar never spawns processes directly. It describes each call as a
//! [`CommandSpec`] and hands it to a [`ProcessRunner`], so tests can script
//! the outcome of every external tool.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;

use log::debug;

/// A program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit code formatted for error messages.
    pub fn code_display(&self) -> String {
        self.code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string())
    }
}

/// Runs external commands to completion.
pub trait ProcessRunner {
    /// Run `command`, capturing its output.
    ///
    /// Returns `Err` only when the process could not be started; a nonzero
    /// exit is reported through [`ProcessOutput::code`].
    fn run(&self, command: &CommandSpec) -> impl Future<Output = std::io::Result<ProcessOutput>>;
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioRunner;

impl ProcessRunner for TokioRunner {
    async fn run(&self, command: &CommandSpec) -> std::io::Result<ProcessOutput> {
        debug!("[runner] Running {}", command);
        let output = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .output()
            .await?;

        let result = ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!("[runner] {} exited with {}", command, result.code_display());
        Ok(result)
    }
}
