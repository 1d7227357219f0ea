//! Application error types with rich context

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Timed out waiting for {operation}")]
    Timeout { operation: String },

    // ─────────────────────────────────────────────────────────────
    // Dev Server Lifecycle Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Dev server is already running (stop it first)")]
    AlreadyRunning,

    #[error("Dev server instance not found")]
    NotRunning,

    #[error("Manifest middleware for type '{kind}' not found")]
    UnknownManifestType { kind: String },

    #[error("Failed to stop dev server cleanly: {}", .failures.join("; "))]
    TeardownPartialFailure { failures: Vec<String> },

    // ─────────────────────────────────────────────────────────────
    // Addressing Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Tunnel URL not found, the tunnel might not be ready yet")]
    TunnelNotStarted,

    #[error("Invalid URL scheme: {scheme}")]
    InvalidScheme { scheme: String },

    // ─────────────────────────────────────────────────────────────
    // External Collaborator Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to open {target}: {message}")]
    LaunchFailed { target: String, message: String },

    #[error("Tunnel error: {message}")]
    Tunnel { message: String },

    #[error("Session reporting error: {message}")]
    Http { message: String },

    #[error("Process error: {message}")]
    Process { message: String },

    #[error("Failed to spawn process: {reason}")]
    ProcessSpawn { reason: String },

    #[error("Required tool not found: {tool}")]
    ToolNotFound { tool: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    pub fn unknown_manifest_type(kind: impl Into<String>) -> Self {
        Self::UnknownManifestType { kind: kind.into() }
    }

    pub fn invalid_scheme(scheme: impl Into<String>) -> Self {
        Self::InvalidScheme {
            scheme: scheme.into(),
        }
    }

    pub fn launch_failed(target: impl ToString, message: impl Into<String>) -> Self {
        Self::LaunchFailed {
            target: target.to_string(),
            message: message.into(),
        }
    }

    pub fn tunnel(message: impl Into<String>) -> Self {
        Self::Tunnel {
            message: message.into(),
        }
    }

    pub fn http(message: impl Into<String>) -> Self {
        Self::Http {
            message: message.into(),
        }
    }

    pub fn process(message: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
        }
    }

    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Collapse a list of teardown failures into a single error.
    ///
    /// Returns `None` when nothing failed.
    pub fn from_teardown_failures(failures: Vec<Error>) -> Option<Self> {
        if failures.is_empty() {
            return None;
        }
        Some(Self::TeardownPartialFailure {
            failures: failures.iter().map(|e| e.to_string()).collect(),
        })
    }

    /// Check if this is a recoverable error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::TunnelNotStarted
                | Error::Timeout { .. }
                | Error::Http { .. }
                | Error::LaunchFailed { .. }
        )
    }

    /// Check if this error should trigger application exit
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ProcessSpawn { .. } | Error::Config { .. })
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}
