//! The email-ingestion sync pipeline and its drivers.

pub mod candidates;
pub mod error;
pub mod lock;
pub mod orchestrator;
pub mod scheduler;

pub use error::SyncError;
pub use lock::UserLocks;
pub use orchestrator::{CycleReport, ProgressiveSummary, SyncMode, SyncService, SyncSummary};
pub use scheduler::BackgroundSync;
