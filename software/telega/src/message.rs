//! Severity-tagged messages passed from the actors to the collector.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How the collector routes a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Log only
    Debug,
    /// Log and display
    Info,
    /// Log and display
    Warning,
    /// Log, display, and raise the error callback with the device tag
    Error,
    /// Log and raise a generic error callback pointing at the log
    Critical,
    /// Command echo from the device, keyed by the message text
    Command,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
            Severity::Command => "COMMAND",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub severity: Severity,
    pub text: String,
}

impl Message {
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
        }
    }

    pub fn debug(text: impl Into<String>) -> Self {
        Self::new(Severity::Debug, text)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(Severity::Info, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(Severity::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(Severity::Error, text)
    }

    pub fn critical(text: impl Into<String>) -> Self {
        Self::new(Severity::Critical, text)
    }

    pub fn command(text: impl Into<String>) -> Self {
        Self::new(Severity::Command, text)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.text)
    }
}
