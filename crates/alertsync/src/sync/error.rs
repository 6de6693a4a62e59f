//! Sync invocation errors.

use thiserror::Error;

use crate::db::DatabaseError;
use crate::email::EmailError;
use crate::secrets::SecretError;

/// Fatal outcome of one sync invocation.
///
/// Per-message fetch and extraction problems never show up here; they are
/// counted in the summary instead.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("User '{0}' not found")]
    UserNotFound(String),

    /// The user has no mailbox credentials configured.
    #[error("Mailbox not configured for user '{0}'")]
    NotConfigured(String),

    /// The mailbox rejected the login or could not be reached.
    #[error("Mailbox authentication failed: {0}")]
    Authentication(EmailError),

    /// Selecting the folder or searching it failed.
    #[error("Mailbox error: {0}")]
    Mailbox(EmailError),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] DatabaseError),

    #[error("Mailbox secret unusable: {0}")]
    Secret(#[from] SecretError),
}

impl SyncError {
    /// Cause string suitable for returning to the caller.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::UserNotFound(_) => "User not found".to_string(),
            SyncError::NotConfigured(_) => "Mailbox not configured".to_string(),
            SyncError::Authentication(e) => format!("Failed to connect: {}", e),
            SyncError::Mailbox(e) => format!("Sync failed: {}", e),
            SyncError::StoreUnavailable(_) => "Sync failed: storage unavailable".to_string(),
            SyncError::Secret(_) => {
                "Stored mailbox secret cannot be read; reconnect the mailbox".to_string()
            }
        }
    }

    /// Whether the caller can fix this by changing the mailbox settings.
    pub fn is_configuration_problem(&self) -> bool {
        matches!(
            self,
            SyncError::NotConfigured(_) | SyncError::Authentication(_) | SyncError::Secret(_)
        )
    }
}

impl From<EmailError> for SyncError {
    fn from(err: EmailError) -> Self {
        match err {
            EmailError::AuthenticationFailed(_)
            | EmailError::ConnectionFailed(_)
            | EmailError::TlsError(_)
            | EmailError::ConfigError(_) => SyncError::Authentication(err),
            other => SyncError::Mailbox(other),
        }
    }
}
