//! Shared test utilities for alertsync integration tests.
//!
//! This module provides:
//! - `FakeMailbox`, a scripted in-memory mailbox implementing `MailboxConnector`
//! - `TestHarness` wiring an in-memory database, the fake mailbox and a `SyncService`

pub mod harness;
pub mod mailbox;

pub use harness::TestHarness;
pub use mailbox::{alert_email, FakeMailbox, ALERT_SENDER};
