//! Mailbox access error types.

use thiserror::Error;

/// Errors that can occur while talking to a mailbox.
#[derive(Error, Debug)]
pub enum EmailError {
    /// Failed to connect to the IMAP server.
    #[error("IMAP connection failed: {0}")]
    ConnectionFailed(String),

    /// TLS/SSL error during connection.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// The server rejected the login.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// IMAP protocol error (search, select, logout).
    #[error("IMAP protocol error: {0}")]
    ProtocolError(String),

    /// A single message could not be retrieved. Callers skip the id.
    #[error("Failed to fetch message {id}: {reason}")]
    FetchFailed { id: String, reason: String },

    /// Folder not found.
    #[error("IMAP folder '{0}' not found")]
    FolderNotFound(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl From<async_native_tls::Error> for EmailError {
    fn from(err: async_native_tls::Error) -> Self {
        EmailError::TlsError(err.to_string())
    }
}

/// Result type for mailbox operations.
pub type Result<T> = std::result::Result<T, EmailError>;
