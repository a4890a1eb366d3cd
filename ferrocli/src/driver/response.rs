//! Response type for command execution results.

use std::time::Duration;

use crate::error::{DriverError, Result};

/// Response from a command execution.
#[derive(Debug, Clone)]
pub struct Response {
    /// The command that was executed. Hidden interactive input is masked.
    pub command: String,

    /// The processed output: echo and trailing prompt removed, vendor
    /// post-processing applied.
    pub result: String,

    /// Everything read for the command, echo included.
    pub raw_result: String,

    /// The prompt that was matched at the end, empty if none was.
    pub prompt: String,

    /// Time taken to execute the command.
    pub elapsed: Duration,

    /// First `failed_when_contains` entry found in the output.
    pub failure_message: Option<String>,
}

impl Response {
    /// Create a new successful response.
    pub fn new(
        command: impl Into<String>,
        result: impl Into<String>,
        raw_result: impl Into<String>,
        prompt: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            result: result.into(),
            raw_result: raw_result.into(),
            prompt: prompt.into(),
            elapsed,
            failure_message: None,
        }
    }

    /// Attach the failure detected in the output, if any.
    pub fn with_failure(mut self, failure_message: Option<String>) -> Self {
        self.failure_message = failure_message;
        self
    }

    /// Check if the response indicates success.
    pub fn is_success(&self) -> bool {
        self.failure_message.is_none()
    }

    /// Turn a failed response into [`DriverError::CommandFailed`].
    pub fn into_result(self) -> Result<Self> {
        match self.failure_message {
            Some(message) => Err(DriverError::CommandFailed {
                command: self.command,
                message,
            }
            .into()),
            None => Ok(self),
        }
    }

    /// Get the result lines as an iterator.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.result.lines()
    }

    /// Check if the result contains a substring.
    pub fn contains(&self, pattern: &str) -> bool {
        self.result.contains(pattern)
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.result)
    }
}
