//! Error types shared by every protocol and session handler.

use std::io;

use thiserror::Error;

/// Errors that can occur while validating a protocol's configuration.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A required configuration field is missing.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A configuration value is invalid.
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// I/O error during protocol initialization (e.g. creating a delivery directory).
    #[error("I/O error during validation: {0}")]
    Io(#[from] io::Error),
}

/// Errors that can occur during session handling.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Protocol error occurred during session.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connection error occurred.
    #[error("Connection error: {0}")]
    Connection(#[from] io::Error),

    /// Session went idle for longer than the watchdog allows.
    #[error("Session timed out after {0} seconds")]
    Timeout(u64),

    /// Session exceeded its maximum lifetime.
    #[error("Session exceeded its maximum lifetime of {0} seconds")]
    Lifetime(u64),
}

impl SessionError {
    /// Returns `true` if the error is a client-side issue.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Timeout(_) | Self::Lifetime(_))
    }
}

/// Errors that can occur in the controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Protocol validation failed.
    #[error("Protocol validation failed: {0}")]
    Protocol(#[from] ProtocolError),

    /// A listener error occurred.
    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),

    /// The controller was asked to run without any listeners.
    #[error("No listeners configured for {0}")]
    NoListeners(&'static str),
}

/// Errors that can occur in the listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to socket address.
    #[error("Failed to bind to {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("Failed to accept connection: {0}")]
    AcceptFailed(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use std::error::Error as StdError;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::MissingField("sink");
        assert_eq!(err.to_string(), "Missing required field: sink");

        let err = ProtocolError::InvalidConfiguration {
            field: "relay.networks".to_string(),
            reason: "invalid prefix length".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration for relay.networks: invalid prefix length"
        );
    }

    #[test]
    fn test_session_error_classification() {
        let err = SessionError::Protocol("Invalid command".to_string());
        assert!(err.is_client_error());

        let err = SessionError::Lifetime(1800);
        assert!(err.is_client_error());

        let err = SessionError::Timeout(30);
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "Session timed out after 30 seconds");

        let err = SessionError::from(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_error_source_chain() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = ControllerError::from(ListenerError::BindFailed {
            address: "0.0.0.0:25".to_string(),
            source: io_err,
        });

        assert!(err.source().is_some());
        assert_eq!(
            err.to_string(),
            "Listener error: Failed to bind to 0.0.0.0:25: access denied"
        );
    }
}
