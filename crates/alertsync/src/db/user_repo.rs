//! User repository: identities, mailbox credentials and sync preferences.
//!
//! Mailbox secrets are stored in their sealed form (see [`crate::secrets::SecretCipher`]);
//! this module never sees plaintext.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw user row from the database.
#[derive(Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub mailbox_address: Option<String>,
    /// Sealed mailbox secret.
    pub mailbox_secret: Option<String>,
    pub sync_interval_minutes: u32,
    pub email_limit_per_sync: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl std::fmt::Debug for UserRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRow")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("mailbox_address", &self.mailbox_address)
            .field("mailbox_secret", &self.mailbox_secret.as_ref().map(|_| "<sealed>"))
            .finish_non_exhaustive()
    }
}

impl UserRow {
    /// Builds a fresh, not-yet-connected user with default sync preferences.
    pub fn new(username: &str, email: &str) -> Self {
        let now = super::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            full_name: None,
            mailbox_address: None,
            mailbox_secret: None,
            sync_interval_minutes: 10,
            email_limit_per_sync: 100,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Whether both halves of the mailbox credentials are present.
    pub fn is_connected(&self) -> bool {
        self.mailbox_address.is_some() && self.mailbox_secret.is_some()
    }

    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            email: row.get("email")?,
            full_name: row.get("full_name")?,
            mailbox_address: row.get("mailbox_address")?,
            mailbox_secret: row.get("mailbox_secret")?,
            sync_interval_minutes: row.get("sync_interval_minutes")?,
            email_limit_per_sync: row.get("email_limit_per_sync")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts a new user row.
pub fn insert(db: &Database, user: &UserRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO users (id, username, email, full_name, mailbox_address, mailbox_secret,
             sync_interval_minutes, email_limit_per_sync, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                user.id,
                user.username,
                user.email,
                user.full_name,
                user.mailbox_address,
                user.mailbox_secret,
                user.sync_interval_minutes,
                user.email_limit_per_sync,
                user.created_at,
                user.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a user by ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<UserRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM users WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], UserRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Stores mailbox credentials. Returns `false` if the user does not exist.
pub fn set_mailbox(
    db: &Database,
    id: &str,
    address: &str,
    sealed_secret: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE users SET mailbox_address = ?2, mailbox_secret = ?3, updated_at = ?4
             WHERE id = ?1",
            params![id, address, sealed_secret, super::now()],
        )?;
        Ok(changed == 1)
    })
}

/// Removes mailbox credentials, making the user "not connected".
pub fn clear_mailbox(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE users SET mailbox_address = NULL, mailbox_secret = NULL, updated_at = ?2
             WHERE id = ?1",
            params![id, super::now()],
        )?;
        Ok(changed == 1)
    })
}

/// Lists every user with mailbox credentials configured.
pub fn list_connected(db: &Database) -> Result<Vec<UserRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM users
             WHERE mailbox_address IS NOT NULL AND mailbox_secret IS NOT NULL
             ORDER BY created_at, id",
        )?;
        let rows = stmt
            .query_map([], UserRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Updates the per-user sync preferences.
pub fn update_sync_preferences(
    db: &Database,
    id: &str,
    interval_minutes: u32,
    limit_per_sync: u32,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE users SET sync_interval_minutes = ?2, email_limit_per_sync = ?3, updated_at = ?4
             WHERE id = ?1",
            params![id, interval_minutes, limit_per_sync, super::now()],
        )?;
        Ok(changed == 1)
    })
}
