//! Process execution trait.
//!
//! External commands are "world-touching" and must go through the HAL so the
//! mount orchestration can be tested without spawning real processes.

use crate::{HalError, HalResult};
use std::fmt;
use std::time::Duration;

/// One external command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Capture stdout/stderr instead of inheriting the caller's stdio.
    pub capture: bool,
    /// Turn a non-zero exit into `HalError::CommandFailed`.
    pub check: bool,
    /// `None` waits forever (interactive or user supplied commands).
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            capture: false,
            check: true,
            timeout: None,
        }
    }

    pub fn captured(mut self) -> Self {
        self.capture = true;
        self
    }

    pub fn unchecked(mut self) -> Self {
        self.check = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Program and arguments joined by spaces, as logged before execution.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Result of a finished command. `code` is `None` when killed by a signal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            ..Self::default()
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn succeeded(&self) -> bool {
        self.code == Some(0)
    }

    /// Apply the invocation's failure-checking policy.
    pub fn check(self, invocation: &Invocation) -> HalResult<Self> {
        if !invocation.check || self.succeeded() {
            return Ok(self);
        }
        let output = if self.stderr.trim().is_empty() {
            self.stdout.trim().to_string()
        } else {
            self.stderr.trim().to_string()
        };
        Err(HalError::CommandFailed {
            program: invocation.program.clone(),
            code: self.code,
            output,
        })
    }
}

/// Process execution trait (external command runner).
pub trait ProcessOps: Send + Sync {
    fn execute(&self, invocation: &Invocation) -> HalResult<CommandOutput>;
}
