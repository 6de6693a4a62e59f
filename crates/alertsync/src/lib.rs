//! Tracker alert ingestion.
//!
//! Pulls alert emails from each user's mailbox, extracts the tracker fields,
//! classifies the alert type and stores one row per source message. The
//! [`SyncService`] is the entry point for manual, full, progressive and
//! background runs; [`db::Database`] is the store handle passed to it.

pub mod categorizer;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod extract;
pub mod secrets;
pub mod sync;

pub use categorizer::{categorize, CategoryRule, Categorizer};
pub use config::{load_config, load_config_from_str, AppConfig};
pub use db::{Database, DatabaseError};
pub use email::{EmailError, ImapConnector, MailboxConnector, MailboxSession};
pub use error::{AlertSyncError, ConfigError, Result};
pub use extract::{parse_tracker_email, TrackerFields};
pub use secrets::{resolve_secret, SecretCipher, SecretError};
pub use sync::{
    BackgroundSync, CycleReport, ProgressiveSummary, SyncError, SyncMode, SyncService,
    SyncSummary, UserLocks,
};
