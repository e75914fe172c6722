//! Error types for the Shell MCP Server.

use thiserror::Error;

use crate::SessionId;

/// Main error type for Shell MCP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No command text was provided
    #[error("Provide a command to start.")]
    EmptyCommand,

    /// Requested stdin mode is not supported
    #[error("Only stdinMode \"pipe\" is supported right now.")]
    UnsupportedStdinMode(String),

    /// Action requires a session id and none was given
    #[error("sessionId is required for this action.")]
    MissingSessionId,

    /// Unknown process action string
    #[error("Unknown action {0}")]
    UnknownAction(String),

    /// Session not found in either pool
    #[error("No session found for {0}")]
    SessionNotFound(SessionId),

    /// Session exists but has not been backgrounded
    #[error("Session {0} is not backgrounded.")]
    NotBackgrounded(SessionId),

    /// Session is still running but the action requires a finished one
    #[error("No finished session found for {0}")]
    NotFinished(SessionId),

    /// Session is finished or gone but the action requires a live one
    #[error("No active session found for {0}")]
    NotRunning(SessionId),

    /// Session stdin has been closed or was never opened
    #[error("Session {0} stdin is not writable.")]
    StdinClosed(SessionId),

    /// Session id already present in the registry
    #[error("Session {0} already exists")]
    DuplicateSession(SessionId),

    /// Command ran and failed; message carries aggregated output plus reason
    #[error("{0}")]
    ExecutionFailed(String),

    /// Failed to spawn the shell process
    #[error("Failed to spawn command: {0}")]
    SpawnFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input or parameters (generic)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether this is a caller mistake rather than an execution failure.
    ///
    /// Usage errors are reported synchronously and have no process side
    /// effects.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Error::EmptyCommand
                | Error::UnsupportedStdinMode(_)
                | Error::MissingSessionId
                | Error::UnknownAction(_)
                | Error::InvalidInput(_)
        )
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_command_error() {
        let err = Error::EmptyCommand;
        assert_eq!(err.to_string(), "Provide a command to start.");
        assert!(err.is_usage());
    }

    #[test]
    fn test_unsupported_stdin_mode_error() {
        let err = Error::UnsupportedStdinMode("pty".to_string());
        assert!(err.to_string().contains("pipe"));
        assert!(err.is_usage());
    }

    #[test]
    fn test_session_not_found_error() {
        let id = SessionId::new();
        let err = Error::SessionNotFound(id);
        assert_eq!(err.to_string(), format!("No session found for {id}"));
        assert!(!err.is_usage());
    }

    #[test]
    fn test_not_backgrounded_error() {
        let id = SessionId::new();
        let err = Error::NotBackgrounded(id);
        assert_eq!(err.to_string(), format!("Session {id} is not backgrounded."));
    }

    #[test]
    fn test_not_finished_error() {
        let id = SessionId::new();
        let err = Error::NotFinished(id);
        assert_eq!(err.to_string(), format!("No finished session found for {id}"));
    }

    #[test]
    fn test_stdin_closed_error() {
        let id = SessionId::new();
        let err = Error::StdinClosed(id);
        assert_eq!(err.to_string(), format!("Session {id} stdin is not writable."));
    }

    #[test]
    fn test_unknown_action_error() {
        let err = Error::UnknownAction("restart".to_string());
        assert_eq!(err.to_string(), "Unknown action restart");
        assert!(err.is_usage());
    }

    #[test]
    fn test_execution_failed_carries_message() {
        let err = Error::ExecutionFailed("build output\n\nCommand exited with code 2".to_string());
        assert!(err.to_string().contains("build output"));
        assert!(err.to_string().contains("code 2"));
        assert!(!err.is_usage());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<i32>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_result_type() {
        let success: Result<i32> = Ok(42);
        assert!(success.is_ok());

        let failure: Result<i32> = Err(Error::MissingSessionId);
        assert!(failure.is_err());
    }
}
