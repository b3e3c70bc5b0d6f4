use serde::{Deserialize, Serialize};
use std::fmt;

/// Single structured error shape used across all layers of the bot.
///
/// The `code` is a stable machine-readable identifier (`DB_*`, `TRANSITION_*`,
/// `ZBX_*`, ...); `message` is what handlers show to the operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    /// Wrap an underlying error, keeping its text as `details`.
    pub fn wrap(
        code: impl Into<String>,
        message: impl Into<String>,
        source: impl fmt::Display,
    ) -> Self {
        Self::new(code, message).with_details(source.to_string())
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}
