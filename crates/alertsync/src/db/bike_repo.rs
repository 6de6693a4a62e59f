//! Bike registry derived from stored alerts.

use rusqlite::params;
use serde::Serialize;

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BikeRow {
    pub tracker_name: String,
    pub device_serial: Option<String>,
    pub latest_alert_at: Option<String>,
    pub created_at: String,
    pub alert_count: u64,
}

/// Upserts one bike per distinct tracker name in the user's alerts.
///
/// Alerts without a tracker name are ignored. Returns the number of bikes
/// that were newly created.
pub fn refresh_from_alerts(db: &Database, user_id: &str) -> Result<usize, DatabaseError> {
    let now = super::now();
    db.with_transaction(|tx| {
        let before: usize = tx.query_row(
            "SELECT COUNT(*) FROM bikes WHERE user_id = ?1",
            params![user_id],
            |r| r.get(0),
        )?;

        tx.execute(
            "INSERT INTO bikes (user_id, tracker_name, device_serial, latest_alert_at, created_at)
             SELECT user_id, tracker_name,
                    (SELECT s.device_serial FROM tracker_alerts s
                     WHERE s.user_id = t.user_id AND s.tracker_name = t.tracker_name
                       AND s.device_serial != ''
                     ORDER BY s.created_at DESC, s.id DESC LIMIT 1),
                    MAX(created_at), ?2
             FROM tracker_alerts t
             WHERE user_id = ?1 AND tracker_name != ''
             GROUP BY user_id, tracker_name
             ON CONFLICT(user_id, tracker_name) DO UPDATE SET
               device_serial = COALESCE(excluded.device_serial, bikes.device_serial),
               latest_alert_at = excluded.latest_alert_at",
            params![user_id, now],
        )?;

        let after: usize = tx.query_row(
            "SELECT COUNT(*) FROM bikes WHERE user_id = ?1",
            params![user_id],
            |r| r.get(0),
        )?;
        Ok(after - before)
    })
}

/// Lists a user's bikes with their alert counts, most recently alerting first.
pub fn list(db: &Database, user_id: &str) -> Result<Vec<BikeRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT tracker_name, device_serial, latest_alert_at, created_at,
                    (SELECT COUNT(*) FROM tracker_alerts a
                     WHERE a.user_id = bikes.user_id AND a.tracker_name = bikes.tracker_name)
             FROM bikes
             WHERE user_id = ?1
             ORDER BY latest_alert_at DESC, tracker_name",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(BikeRow {
                    tracker_name: row.get(0)?,
                    device_serial: row.get(1)?,
                    latest_alert_at: row.get(2)?,
                    created_at: row.get(3)?,
                    alert_count: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn find_by_tracker_name(
    db: &Database,
    user_id: &str,
    tracker_name: &str,
) -> Result<Option<BikeRow>, DatabaseError> {
    Ok(list(db, user_id)?
        .into_iter()
        .find(|bike| bike.tracker_name == tracker_name))
}
