/// Unified error handling for dbmux
///
/// This module provides the error taxonomy shared by the connect-string
/// parser, the session registry, the dispatcher and the backend clients.

use std::fmt;
use std::io;
use thiserror::Error;

pub use crate::config::ConfigError;

/// Main error type for dbmux operations
#[derive(Debug, Error)]
pub enum DbmuxError {
    /// Malformed connect string or non-numeric port
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// Transport or authentication failure while opening a session
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// The command needs a server session and none could be resolved
    #[error("No server session: supply a connect string such as user:password@server")]
    NoServerSession,

    /// The command needs a database session and none could be resolved
    #[error("No database session: supply a connect string such as user:password@server/database")]
    NoDatabaseSession,

    /// The backend rejected a query, command or traversal
    #[error("Execution error: {message}")]
    Execution { message: String },

    /// Close requested for a key that is not pooled
    #[error("Not connected: {key}")]
    NotConnected { key: String },

    /// Invocation options failed validation
    #[error("Invalid options: {message}")]
    InvalidOptions { message: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Output errors while rendering
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for dbmux operations
pub type DbmuxResult<T> = Result<T, DbmuxError>;

/// Convenience methods for creating specific error types
impl DbmuxError {
    /// Create a parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        DbmuxError::Parse {
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        DbmuxError::Connection {
            message: message.into(),
        }
    }

    /// Create an execution error carrying the backend's message
    pub fn execution<S: Into<String>>(message: S) -> Self {
        DbmuxError::Execution {
            message: message.into(),
        }
    }

    pub fn not_connected<S: Into<String>>(key: S) -> Self {
        DbmuxError::NotConnected { key: key.into() }
    }

    pub fn invalid_options<S: Into<String>>(message: S) -> Self {
        DbmuxError::InvalidOptions {
            message: message.into(),
        }
    }

    /// Check if the front-end stays usable after this error.
    ///
    /// Pooled sessions survive every recoverable error; the caller can
    /// correct the input and issue the next invocation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DbmuxError::Connection { .. }
                | DbmuxError::Execution { .. }
                | DbmuxError::NoServerSession
                | DbmuxError::NoDatabaseSession
                | DbmuxError::NotConnected { .. }
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            DbmuxError::Config(_) => ErrorSeverity::Critical,
            DbmuxError::Io(_) => ErrorSeverity::Critical,
            DbmuxError::Connection { .. } => ErrorSeverity::Warning,
            DbmuxError::NoServerSession | DbmuxError::NoDatabaseSession => ErrorSeverity::Info,
            DbmuxError::NotConnected { .. } => ErrorSeverity::Info,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// The front-end cannot continue
    Critical,
    /// The invocation failed
    Error,
    /// The invocation failed on something outside the caller's input
    Warning,
    /// User-correctable
    Info,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Warning => write!(f, "WARNING"),
            ErrorSeverity::Info => write!(f, "INFO"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = DbmuxError::execution("Class 'Foo' not found");
        assert!(matches!(error, DbmuxError::Execution { .. }));
        assert_eq!(error.to_string(), "Execution error: Class 'Foo' not found");

        let error = DbmuxError::not_connected("admin@localhost/demo");
        assert_eq!(error.to_string(), "Not connected: admin@localhost/demo");
    }

    #[test]
    fn test_error_severity() {
        let config_error = DbmuxError::Config(ConfigError::ValidationError("test".to_string()));
        assert_eq!(config_error.severity(), ErrorSeverity::Critical);

        assert_eq!(DbmuxError::connection("refused").severity(), ErrorSeverity::Warning);
        assert_eq!(DbmuxError::NoDatabaseSession.severity(), ErrorSeverity::Info);
        assert_eq!(DbmuxError::parse("bad port").severity(), ErrorSeverity::Error);
        assert_eq!(ErrorSeverity::Critical.to_string(), "CRITICAL");
    }

    #[test]
    fn test_error_recoverability() {
        assert!(DbmuxError::execution("syntax").is_recoverable());
        assert!(DbmuxError::connection("auth").is_recoverable());
        assert!(DbmuxError::NoServerSession.is_recoverable());

        assert!(!DbmuxError::parse("bad port").is_recoverable());
        let config_error = DbmuxError::Config(ConfigError::ValidationError("test".to_string()));
        assert!(!config_error.is_recoverable());
    }
}
