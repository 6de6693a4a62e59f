//! Test harness wiring a fake mailbox to a real sync service.

#![allow(dead_code)]

use std::sync::Arc;

use alertsync::config::SyncConfig;
use alertsync::db::alert_repo::{self, AlertFilter, AlertRow};
use alertsync::db::checkpoint_repo;
use alertsync::db::user_repo::{self, UserRow};
use alertsync::{Categorizer, Database, SecretCipher, SyncService};

use super::mailbox::FakeMailbox;

pub struct TestHarness {
    pub db: Database,
    pub mailbox: FakeMailbox,
    pub service: SyncService,
    /// A user with mailbox credentials already stored.
    pub user_id: String,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let mailbox = FakeMailbox::new();
        let service = SyncService::new(
            db.clone(),
            Arc::new(mailbox.clone()),
            config,
            Categorizer::default(),
            SecretCipher::plaintext(),
        );
        let mut harness = Self {
            db,
            mailbox,
            service,
            user_id: String::new(),
        };
        harness.user_id = harness.add_connected_user("operator");
        harness
    }

    /// Inserts a user with stored `plain:` credentials and returns its id.
    pub fn add_connected_user(&self, name: &str) -> String {
        let user = self.add_user(name);
        user_repo::set_mailbox(
            &self.db,
            &user,
            &format!("{}@gmail.com", name),
            "plain:app-password",
        )
        .expect("Failed to store mailbox credentials");
        user
    }

    /// Inserts a user without mailbox credentials.
    pub fn add_user(&self, name: &str) -> String {
        let user = UserRow::new(name, &format!("{}@example.com", name));
        user_repo::insert(&self.db, &user).expect("Failed to insert user");
        user.id
    }

    pub fn checkpoint(&self) -> Option<String> {
        self.checkpoint_of(&self.user_id)
    }

    pub fn checkpoint_of(&self, user_id: &str) -> Option<String> {
        checkpoint_repo::find(&self.db, user_id)
            .expect("Failed to read checkpoint")
            .and_then(|c| c.last_message_id)
    }

    pub fn set_checkpoint(&self, id: &str) {
        checkpoint_repo::upsert(&self.db, &self.user_id, id, "2026-01-01T00:00:00.000000Z")
            .expect("Failed to write checkpoint");
    }

    /// Makes SQLite abort any insert of `email_id` until [`Self::heal_store`].
    pub fn break_store_for(&self, email_id: &str) {
        let sql = format!(
            "CREATE TRIGGER reject_insert BEFORE INSERT ON tracker_alerts
             WHEN NEW.email_id = '{}'
             BEGIN SELECT RAISE(ABORT, 'disk gone'); END;",
            email_id
        );
        self.db
            .with_conn(|conn| Ok(conn.execute_batch(&sql)?))
            .expect("Failed to install trigger");
    }

    pub fn heal_store(&self) {
        self.db
            .with_conn(|conn| Ok(conn.execute_batch("DROP TRIGGER IF EXISTS reject_insert;")?))
            .expect("Failed to drop trigger");
    }

    /// Every stored alert for the harness user, newest first.
    pub fn alerts(&self) -> Vec<AlertRow> {
        self.alerts_of(&self.user_id)
    }

    pub fn alerts_of(&self, user_id: &str) -> Vec<AlertRow> {
        let filter = AlertFilter {
            include_acknowledged: true,
            ..AlertFilter::default()
        };
        alert_repo::list(&self.db, user_id, &filter, 1, 200)
            .expect("Failed to list alerts")
            .alerts
    }

    /// Stored source ids for the harness user, ascending numerically.
    pub fn stored_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = alert_repo::existing_ids(&self.db, &self.user_id)
            .expect("Failed to read ids")
            .into_iter()
            .map(|id| id.parse().expect("numeric id"))
            .collect();
        ids.sort_unstable();
        ids
    }
}
