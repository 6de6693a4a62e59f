//! Alert repository over the `tracker_alerts` table.
//!
//! Rows are created only by the sync pipeline through [`insert_if_absent`],
//! whose `(user_id, email_id)` uniqueness makes re-processing a message a
//! no-op. Everything else here is the read path and the lifecycle mutations
//! used by the dashboard.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::types::ToSql;
use rusqlite::{params, Row};
use serde::Serialize;

use super::{Database, DatabaseError};

const OVER_TURN: &str = "Over-turn";
const NO_COMMUNICATION: &str = "No Communication";
const HEAVY_IMPACT: &str = "Heavy Impact";
const LIGHT_SENSOR: &str = "Light Sensor";

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Lifecycle state of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertStatus {
    New,
    InProgress,
    Resolved,
    Dismissed,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::New => "New",
            AlertStatus::InProgress => "In Progress",
            AlertStatus::Resolved => "Resolved",
            AlertStatus::Dismissed => "Dismissed",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New" => Ok(AlertStatus::New),
            "In Progress" => Ok(AlertStatus::InProgress),
            "Resolved" => Ok(AlertStatus::Resolved),
            "Dismissed" => Ok(AlertStatus::Dismissed),
            other => Err(DatabaseError::InvalidValue {
                column: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// An alert as produced by the sync pipeline, before it has a row id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlert {
    pub user_id: String,
    pub email_id: String,
    pub category: String,
    pub alert_type: String,
    pub alert_time: String,
    pub location: String,
    pub latitude: String,
    pub longitude: String,
    pub device_serial: String,
    pub tracker_name: String,
    pub account_name: String,
    pub raw_body: String,
    pub created_at: String,
}

/// A stored alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRow {
    pub id: i64,
    pub email_id: String,
    pub category: String,
    pub alert_type: String,
    pub alert_time: String,
    pub location: String,
    pub latitude: String,
    pub longitude: String,
    pub device_serial: String,
    pub tracker_name: String,
    pub account_name: String,
    #[serde(skip_serializing)]
    pub raw_body: String,
    pub status: AlertStatus,
    pub acknowledged: bool,
    pub acknowledged_at: Option<String>,
    pub acknowledged_by: Option<String>,
    pub notes: Option<String>,
    pub assigned_to: Option<String>,
    pub favorite: bool,
    pub created_at: String,
}

impl AlertRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let status: String = row.get("status")?;
        let status = status.parse::<AlertStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;

        Ok(Self {
            id: row.get("id")?,
            email_id: row.get("email_id")?,
            category: row.get("category")?,
            alert_type: row.get("alert_type")?,
            alert_time: row.get("alert_time")?,
            location: row.get("location")?,
            latitude: row.get("latitude")?,
            longitude: row.get("longitude")?,
            device_serial: row.get("device_serial")?,
            tracker_name: row.get("tracker_name")?,
            account_name: row.get("account_name")?,
            raw_body: row.get("raw_body")?,
            status,
            acknowledged: row.get("acknowledged")?,
            acknowledged_at: row.get("acknowledged_at")?,
            acknowledged_by: row.get("acknowledged_by")?,
            notes: row.get("notes")?,
            assigned_to: row.get("assigned_to")?,
            favorite: row.get("favorite")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Filters for [`list`].
#[derive(Debug, Default, Clone)]
pub struct AlertFilter {
    /// Category label; `None` or `"All"` means every category.
    pub category: Option<String>,
    /// Inclusive lower bound on the creation day.
    pub start_date: Option<NaiveDate>,
    /// Inclusive upper bound on the creation day.
    pub end_date: Option<NaiveDate>,
    /// Acknowledged alerts are hidden unless this is set.
    pub include_acknowledged: bool,
}

/// Aggregate counts over the filtered alert set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertStats {
    pub total: u64,
    pub unread: u64,
    pub acknowledged: u64,
    pub over_turn: u64,
    pub no_communication: u64,
    pub heavy_impact_alerts: u64,
    /// Trackers that reported both a light-sensor and an over-turn alert.
    pub heavy_impact_bikes: u64,
    /// Remaining trackers with an over-turn, heavy-impact or no-communication alert.
    pub high_priority: u64,
    pub categories: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = total.div_ceil(limit as u64);
        Self {
            page,
            limit,
            total,
            total_pages,
            has_next: (page as u64) < total_pages,
            has_prev: page > 1,
        }
    }
}

/// One page of alerts plus stats over the whole filtered set.
#[derive(Debug, Clone, Serialize)]
pub struct AlertPage {
    pub alerts: Vec<AlertRow>,
    pub stats: AlertStats,
    pub pagination: Pagination,
}

/// Inserts an alert unless `(user_id, email_id)` already exists.
///
/// Returns `true` only if a row was actually written.
pub fn insert_if_absent(db: &Database, alert: &NewAlert) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "INSERT INTO tracker_alerts (user_id, email_id, category, alert_type, alert_time,
             location, latitude, longitude, device_serial, tracker_name, account_name,
             raw_body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(user_id, email_id) DO NOTHING",
            params![
                alert.user_id,
                alert.email_id,
                alert.category,
                alert.alert_type,
                alert.alert_time,
                alert.location,
                alert.latitude,
                alert.longitude,
                alert.device_serial,
                alert.tracker_name,
                alert.account_name,
                alert.raw_body,
                alert.created_at,
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Returns every source message id already stored for the user.
pub fn existing_ids(db: &Database, user_id: &str) -> Result<HashSet<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT email_id FROM tracker_alerts WHERE user_id = ?1")?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    })
}

/// Counts all alerts stored for the user.
pub fn count_for_user(db: &Database, user_id: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM tracker_alerts WHERE user_id = ?1",
            params![user_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

fn build_where(user_id: &str, filter: &AlertFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let mut conditions = vec!["user_id = ?1".to_string()];
    let mut param_values: Vec<Box<dyn ToSql>> = vec![Box::new(user_id.to_string())];

    if !filter.include_acknowledged {
        conditions.push("acknowledged = 0".to_string());
    }
    if let Some(category) = filter.category.as_ref().filter(|c| c.as_str() != "All") {
        conditions.push(format!("category = ?{}", param_values.len() + 1));
        param_values.push(Box::new(category.clone()));
    }
    if let Some(start) = filter.start_date {
        conditions.push(format!("created_at >= ?{}", param_values.len() + 1));
        param_values.push(Box::new(start.format("%Y-%m-%d").to_string()));
    }
    if let Some(end) = filter.end_date.and_then(|d| d.succ_opt()) {
        conditions.push(format!("created_at < ?{}", param_values.len() + 1));
        param_values.push(Box::new(end.format("%Y-%m-%d").to_string()));
    }

    (format!("WHERE {}", conditions.join(" AND ")), param_values)
}

/// Lists a page of the user's alerts, newest first, with stats over the filtered set.
pub fn list(
    db: &Database,
    user_id: &str,
    filter: &AlertFilter,
    page: u32,
    limit: u32,
) -> Result<AlertPage, DatabaseError> {
    let page = page.max(1);
    let limit = limit.clamp(1, MAX_PAGE_SIZE);

    db.with_conn(|conn| {
        let (where_clause, mut param_values) = build_where(user_id, filter);
        let params_ref: Vec<&dyn ToSql> = param_values.iter().map(|p| p.as_ref()).collect();

        let mut stats = conn.query_row(
            &format!(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN acknowledged = 0 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN acknowledged = 1 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN category = '{}' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN category = '{}' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN category = '{}' THEN 1 ELSE 0 END), 0)
                 FROM tracker_alerts {}",
                OVER_TURN, NO_COMMUNICATION, HEAVY_IMPACT, where_clause
            ),
            params_ref.as_slice(),
            |r| {
                Ok(AlertStats {
                    total: r.get(0)?,
                    unread: r.get(1)?,
                    acknowledged: r.get(2)?,
                    over_turn: r.get(3)?,
                    no_communication: r.get(4)?,
                    heavy_impact_alerts: r.get(5)?,
                    ..AlertStats::default()
                })
            },
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT category, COUNT(*) FROM tracker_alerts {} GROUP BY category",
            where_clause
        ))?;
        stats.categories = stmt
            .query_map(params_ref.as_slice(), |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, u64>(1)?))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT tracker_name, category FROM tracker_alerts {}",
            where_clause
        ))?;
        let pairs = stmt
            .query_map(params_ref.as_slice(), |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let mut by_tracker: HashMap<String, HashSet<String>> = HashMap::new();
        for (tracker, category) in pairs {
            by_tracker.entry(tracker).or_default().insert(category);
        }
        for categories in by_tracker.values() {
            let has = |label: &str| categories.contains(label);
            if has(LIGHT_SENSOR) && has(OVER_TURN) {
                stats.heavy_impact_bikes += 1;
            } else if has(OVER_TURN) || has(HEAVY_IMPACT) || has(NO_COMMUNICATION) {
                stats.high_priority += 1;
            }
        }
        drop(params_ref);

        let offset = (page as i64 - 1) * limit as i64;
        param_values.push(Box::new(limit as i64));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT * FROM tracker_alerts {} ORDER BY created_at DESC, id DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );
        let params_ref: Vec<&dyn ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let alerts = stmt
            .query_map(params_ref.as_slice(), AlertRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let pagination = Pagination::new(page, limit, stats.total);
        Ok(AlertPage {
            alerts,
            stats,
            pagination,
        })
    })
}

/// Finds one of the user's alerts by row id.
pub fn find_by_id(db: &Database, user_id: &str, id: i64) -> Result<Option<AlertRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM tracker_alerts WHERE id = ?1 AND user_id = ?2")?;
        let mut rows = stmt.query_map(params![id, user_id], AlertRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

fn update_one(db: &Database, sql: &str, params: &[&dyn ToSql]) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| Ok(conn.execute(sql, params)? == 1))
}

/// Marks an alert acknowledged by `by`. Returns `false` if no such alert.
pub fn acknowledge(db: &Database, user_id: &str, id: i64, by: &str) -> Result<bool, DatabaseError> {
    update_one(
        db,
        "UPDATE tracker_alerts SET acknowledged = 1, acknowledged_by = ?3, acknowledged_at = ?4
         WHERE id = ?1 AND user_id = ?2",
        params![id, user_id, by, super::now()],
    )
}

pub fn update_status(
    db: &Database,
    user_id: &str,
    id: i64,
    status: AlertStatus,
) -> Result<bool, DatabaseError> {
    update_one(
        db,
        "UPDATE tracker_alerts SET status = ?3 WHERE id = ?1 AND user_id = ?2",
        params![id, user_id, status.as_str()],
    )
}

pub fn set_notes(db: &Database, user_id: &str, id: i64, notes: &str) -> Result<bool, DatabaseError> {
    update_one(
        db,
        "UPDATE tracker_alerts SET notes = ?3 WHERE id = ?1 AND user_id = ?2",
        params![id, user_id, notes],
    )
}

pub fn assign(db: &Database, user_id: &str, id: i64, assignee: &str) -> Result<bool, DatabaseError> {
    update_one(
        db,
        "UPDATE tracker_alerts SET assigned_to = ?3 WHERE id = ?1 AND user_id = ?2",
        params![id, user_id, assignee],
    )
}

/// Flips the favorite flag, returning the new value (`None` if no such alert).
pub fn toggle_favorite(db: &Database, user_id: &str, id: i64) -> Result<Option<bool>, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE tracker_alerts SET favorite = 1 - favorite WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let favorite: bool = conn.query_row(
            "SELECT favorite FROM tracker_alerts WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )?;
        Ok(Some(favorite))
    })
}

pub fn delete(db: &Database, user_id: &str, id: i64) -> Result<bool, DatabaseError> {
    update_one(
        db,
        "DELETE FROM tracker_alerts WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )
}

/// Deletes all of a user's alerts. Returns the number of rows removed.
pub fn clear_for_user(db: &Database, user_id: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count = conn.execute(
            "DELETE FROM tracker_alerts WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(count as u64)
    })
}
