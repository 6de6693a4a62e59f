//! Sync checkpoint repository, one row per user in `sync_checkpoints`.

use rusqlite::params;

use super::{Database, DatabaseError};

/// The persisted resume point of a user's mailbox sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointRow {
    pub user_id: String,
    /// Mailbox-native id of the most recently covered message.
    pub last_message_id: Option<String>,
    pub last_sync_at: String,
}

/// Returns the checkpoint for a user, if one was ever written.
pub fn find(db: &Database, user_id: &str) -> Result<Option<CheckpointRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT user_id, last_message_id, last_sync_at FROM sync_checkpoints
             WHERE user_id = ?1",
        )?;
        let mut rows = stmt.query_map(params![user_id], |row| {
            Ok(CheckpointRow {
                user_id: row.get(0)?,
                last_message_id: row.get(1)?,
                last_sync_at: row.get(2)?,
            })
        })?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Creates or moves the user's checkpoint.
///
/// Callers are responsible for only ever moving it forward.
pub fn upsert(
    db: &Database,
    user_id: &str,
    last_message_id: &str,
    last_sync_at: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO sync_checkpoints (user_id, last_message_id, last_sync_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
               last_message_id = excluded.last_message_id,
               last_sync_at = excluded.last_sync_at",
            params![user_id, last_message_id, last_sync_at],
        )?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    #[test]
    fn test_absent_until_first_write() {
        let db = test_db();
        assert!(find(&db, "u1").unwrap().is_none());
    }

    #[test]
    fn test_upsert_creates_then_updates() {
        let db = test_db();
        upsert(&db, "u1", "10", "2026-01-01T00:00:00.000000Z").unwrap();
        upsert(&db, "u1", "12", "2026-01-02T00:00:00.000000Z").unwrap();

        let row = find(&db, "u1").unwrap().unwrap();
        assert_eq!(row.last_message_id.as_deref(), Some("12"));
        assert_eq!(row.last_sync_at, "2026-01-02T00:00:00.000000Z");

        let count: u32 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM sync_checkpoints", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_checkpoints_are_per_user() {
        let db = test_db();
        upsert(&db, "u1", "10", "2026-01-01T00:00:00.000000Z").unwrap();
        upsert(&db, "u2", "3", "2026-01-01T00:00:00.000000Z").unwrap();

        assert_eq!(find(&db, "u1").unwrap().unwrap().last_message_id.as_deref(), Some("10"));
        assert_eq!(find(&db, "u2").unwrap().unwrap().last_message_id.as_deref(), Some("3"));
    }
}
