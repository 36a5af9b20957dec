//! Error types for the postern-smtp session engine.
//!
//! These cover the socket (connection and line framing), delivery hand-off,
//! and configuration of client networks.

use std::io;

use thiserror::Error;

/// Errors that can occur while writing to the client.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// I/O error during connection operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Formatting error while preparing response.
    #[error("Response formatting error: {0}")]
    Format(#[from] std::fmt::Error),
}

impl From<ConnectionError> for postern_common::error::SessionError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Io(err) => Self::Connection(err),
            ConnectionError::Format(err) => Self::Protocol(format!("Failed to send response: {err}")),
        }
    }
}

/// Errors produced while reading a line from the client.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A CR or LF arrived without its partner.
    #[error("Bare CR or LF at character position {position}")]
    BareLineEnding { position: usize },

    /// The line (including its CRLF) was longer than allowed.
    #[error("Line exceeds {limit} octets")]
    LineTooLong { limit: usize },
}

/// Errors reported by a [`MailSink`](crate::delivery::MailSink).
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The message is larger than the configured maximum.
    #[error("Message size {size} exceeds maximum of {max} bytes")]
    SizeExceeded { size: usize, max: usize },

    /// The sink refused the message.
    #[error("{0}")]
    Rejected(String),

    /// Writing the message failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DeliveryError {
    pub const fn is_size_exceeded(&self) -> bool {
        matches!(self, Self::SizeExceeded { .. })
    }
}

/// Errors parsing a network in CIDR notation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("Invalid address in network '{0}'")]
    InvalidAddress(String),

    #[error("Invalid prefix length in network '{0}'")]
    InvalidPrefix(String),
}

/// Specialized `Result` type for connection operations.
pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;
