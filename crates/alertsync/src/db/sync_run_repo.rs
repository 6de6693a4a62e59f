//! Audit trail of sync runs.

use rusqlite::params;
use serde::Serialize;

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncRunRow {
    pub id: i64,
    pub user_id: String,
    pub mode: String,
    pub started_at: String,
    pub completed_at: String,
    /// `completed` or `failed`.
    pub status: String,
    pub emails_read: u32,
    pub emails_new: u32,
    pub error_summary: Option<String>,
}

/// A run to be recorded; the id is assigned on insert.
#[derive(Debug, Clone)]
pub struct NewSyncRun<'a> {
    pub user_id: &'a str,
    pub mode: &'a str,
    pub started_at: &'a str,
    pub completed_at: &'a str,
    pub status: &'a str,
    pub emails_read: u32,
    pub emails_new: u32,
    pub error_summary: Option<&'a str>,
}

pub fn insert(db: &Database, run: &NewSyncRun<'_>) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO sync_runs (user_id, mode, started_at, completed_at, status,
             emails_read, emails_new, error_summary)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run.user_id,
                run.mode,
                run.started_at,
                run.completed_at,
                run.status,
                run.emails_read,
                run.emails_new,
                run.error_summary,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Most recent runs for a user, newest first.
pub fn list_recent(db: &Database, user_id: &str, limit: u32) -> Result<Vec<SyncRunRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, user_id, mode, started_at, completed_at, status, emails_read,
                    emails_new, error_summary
             FROM sync_runs WHERE user_id = ?1
             ORDER BY started_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![user_id, limit], |row| {
                Ok(SyncRunRow {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    mode: row.get(2)?,
                    started_at: row.get(3)?,
                    completed_at: row.get(4)?,
                    status: row.get(5)?,
                    emails_read: row.get(6)?,
                    emails_new: row.get(7)?,
                    error_summary: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
