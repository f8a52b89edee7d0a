//! Error types for the discover crate.

use thiserror::Error;

use crate::parser::ParseError;
use crate::process::ToolExit;

/// Result type for discovery operations.
pub type DiscoverResult<T> = Result<T, DiscoverError>;

/// Errors that can occur while driving the avahi tools.
#[derive(Debug, Error)]
pub enum DiscoverError {
    /// The tool could not be started.
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool was started without a readable stdout.
    #[error("No stdout available from {0}")]
    MissingStdout(String),

    /// The tool exited with a failure status.
    #[error("{program} exited with {exit}")]
    ToolFailed { program: String, exit: ToolExit },

    /// A line of tool output could not be understood.
    #[error("Malformed output while browsing {service_type}: {source}")]
    Parse {
        service_type: String,
        #[source]
        source: ParseError,
    },

    /// The tool could not be killed.
    #[error("Failed to kill {program}: {source}")]
    Kill {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the tool failed.
    #[error("Failed to wait on {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A background task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(String),

    /// Configuration could not be loaded.
    #[error("Invalid configuration in {path}: {message}")]
    Config { path: String, message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiscoverError {
    /// Create a spawn error for `program`.
    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Create a parse error with the service type being browsed.
    pub fn parse(service_type: impl Into<String>, source: ParseError) -> Self {
        Self::Parse {
            service_type: service_type.into(),
            source,
        }
    }

    /// Create a configuration error.
    pub fn config(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether the error came from tool output rather than the tool itself.
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}
