//! Mailbox-to-store synchronization.
//!
//! One invocation: load credentials, search the mailbox, pick the candidate
//! window, skip ids already stored, fetch and decode the rest, then parse,
//! classify and persist them batch by batch before moving the checkpoint.
//! Manual, full, progressive and background runs all go through
//! [`SyncService::execute`] and differ only in their [`RunPlan`].

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;
use secrecy::SecretString;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::categorizer::Categorizer;
use crate::config::{AppConfig, SyncConfig};
use crate::db::alert_repo::{self, AlertFilter, AlertPage, NewAlert};
use crate::db::bike_repo::{self, BikeRow};
use crate::db::sync_run_repo::{self, NewSyncRun};
use crate::db::{self, checkpoint_repo, user_repo, Database};
use crate::email::{extract_body_from_raw, MailboxConnector, MailboxSession};
use crate::error::ConfigError;
use crate::extract::parse_tracker_email;
use crate::secrets::SecretCipher;

use super::candidates::{self, WindowKind};
use super::error::SyncError;
use super::lock::UserLocks;

/// Which driver started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Manual,
    Full,
    Progressive,
    Background,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Manual => "manual",
            SyncMode::Full => "full",
            SyncMode::Progressive => "progressive",
            SyncMode::Background => "background",
        }
    }
}

/// Window and cap for one run.
#[derive(Debug, Clone, Copy)]
struct RunPlan {
    mode: SyncMode,
    /// Start after the checkpoint (falling back to the newest `limit` ids)
    /// instead of scanning the whole search result.
    from_checkpoint: bool,
    limit: usize,
    /// Maximum number of messages fetched in this run.
    cap: Option<usize>,
}

/// Outcome of one orchestrator invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    /// Messages from the alert sender in the mailbox.
    pub total_found: usize,
    /// Of those, how many were already stored before this run.
    pub already_stored: usize,
    /// Ids selected for fetching.
    pub candidates: usize,
    pub fetched: usize,
    pub fetch_failed: usize,
    /// Rows actually inserted; conflicting inserts do not count.
    pub new_count: usize,
    /// Checkpoint after the run.
    pub checkpoint: Option<String>,
}

/// State returned to a caller driving progressive sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressiveSummary {
    pub total: usize,
    pub processed: usize,
    pub remaining: usize,
    pub batch_size: usize,
    pub new_alerts: usize,
    pub completed: bool,
}

/// Totals of one background pass over all connected users.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub users: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub new_alerts: usize,
    /// The pass stopped early because of cancellation.
    pub cancelled: bool,
}

/// Entry point for every sync driver.
#[derive(Clone)]
pub struct SyncService {
    db: Database,
    connector: Arc<dyn MailboxConnector>,
    config: SyncConfig,
    categorizer: Arc<Categorizer>,
    cipher: Arc<SecretCipher>,
    locks: UserLocks,
}

impl SyncService {
    pub fn new(
        db: Database,
        connector: Arc<dyn MailboxConnector>,
        config: SyncConfig,
        categorizer: Categorizer,
        cipher: SecretCipher,
    ) -> Self {
        Self {
            db,
            connector,
            config,
            categorizer: Arc::new(categorizer),
            cipher: Arc::new(cipher),
            locks: UserLocks::new(),
        }
    }

    /// Builds the service from application config, resolving the secret key.
    pub fn from_config(
        db: Database,
        connector: Arc<dyn MailboxConnector>,
        config: &AppConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            db,
            connector,
            config.sync.clone(),
            Categorizer::new(config.categories.clone()),
            config.secret_cipher()?,
        ))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Processes up to `limit` new messages after the checkpoint
    /// (`manual_limit` when `None`).
    pub async fn run_manual_sync(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<SyncSummary, SyncError> {
        let limit = limit.unwrap_or(self.config.manual_limit).max(1);
        self.execute(
            user_id,
            RunPlan {
                mode: SyncMode::Manual,
                from_checkpoint: true,
                limit,
                cap: Some(limit),
            },
        )
        .await
    }

    /// Processes every stored-but-missing message in the whole search result.
    pub async fn run_full_sync(&self, user_id: &str) -> Result<SyncSummary, SyncError> {
        self.execute(
            user_id,
            RunPlan {
                mode: SyncMode::Full,
                from_checkpoint: false,
                limit: usize::MAX,
                cap: None,
            },
        )
        .await
    }

    /// Processes the next `progressive_chunk` unstored messages, oldest first.
    ///
    /// Callers re-invoke until `completed` is true.
    pub async fn run_progressive_sync(
        &self,
        user_id: &str,
    ) -> Result<ProgressiveSummary, SyncError> {
        let chunk = self.config.progressive_chunk.max(1);
        let summary = self
            .execute(
                user_id,
                RunPlan {
                    mode: SyncMode::Progressive,
                    from_checkpoint: false,
                    limit: usize::MAX,
                    cap: Some(chunk),
                },
            )
            .await?;

        let processed = summary.already_stored + summary.new_count;
        let remaining = summary.total_found.saturating_sub(processed);
        Ok(ProgressiveSummary {
            total: summary.total_found,
            processed,
            remaining,
            batch_size: chunk,
            new_alerts: summary.new_count,
            completed: remaining == 0,
        })
    }

    /// Syncs every connected user once with a fixed cap.
    ///
    /// A failing user is logged and skipped. Cancellation is observed between
    /// users; a run already started for a user is finished first.
    pub async fn run_background_cycle(
        &self,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<CycleReport, SyncError> {
        let users = user_repo::list_connected(&self.db)?;
        let mut report = CycleReport {
            users: users.len(),
            ..CycleReport::default()
        };
        let limit = limit.max(1);

        for user in users {
            if cancel.is_cancelled() {
                info!("Background sync cancelled before user {}", user.id);
                report.cancelled = true;
                break;
            }

            let plan = RunPlan {
                mode: SyncMode::Background,
                from_checkpoint: true,
                limit,
                cap: Some(limit),
            };
            match self.execute(&user.id, plan).await {
                Ok(summary) => {
                    report.succeeded += 1;
                    report.new_alerts += summary.new_count;
                }
                Err(e) => {
                    report.failed += 1;
                    error!("Background sync failed for user {}: {}", user.id, e);
                }
            }
        }

        info!(
            "Background cycle: {} users, {} ok, {} failed, {} new alerts",
            report.users, report.succeeded, report.failed, report.new_alerts
        );
        Ok(report)
    }

    /// Verifies the credentials with one login, then stores them sealed.
    pub async fn connect_mailbox(
        &self,
        user_id: &str,
        address: &str,
        secret: SecretString,
    ) -> Result<(), SyncError> {
        if user_repo::find_by_id(&self.db, user_id)?.is_none() {
            return Err(SyncError::UserNotFound(user_id.to_string()));
        }

        let mut session = self.connector.connect(address, &secret).await?;
        if let Err(e) = session.logout().await {
            warn!("Logout after credential check failed: {}", e);
        }

        let sealed = self.cipher.seal(&secret)?;
        user_repo::set_mailbox(&self.db, user_id, address, &sealed)?;
        info!("Mailbox {} connected for user {}", address, user_id);
        Ok(())
    }

    /// Forgets the user's mailbox credentials. Alerts and checkpoint are kept.
    pub async fn disconnect_mailbox(&self, user_id: &str) -> Result<(), SyncError> {
        let _guard = self.locks.lock(user_id).await;
        if !user_repo::clear_mailbox(&self.db, user_id)? {
            return Err(SyncError::UserNotFound(user_id.to_string()));
        }
        info!("Mailbox disconnected for user {}", user_id);
        Ok(())
    }

    /// Read path over the alert table.
    pub fn list_alerts(
        &self,
        user_id: &str,
        filter: &AlertFilter,
        page: u32,
        limit: u32,
    ) -> Result<AlertPage, SyncError> {
        Ok(alert_repo::list(&self.db, user_id, filter, page, limit)?)
    }

    /// Re-derives the user's bikes from their alerts and lists them.
    pub fn list_bikes(&self, user_id: &str) -> Result<Vec<BikeRow>, SyncError> {
        bike_repo::refresh_from_alerts(&self.db, user_id)?;
        Ok(bike_repo::list(&self.db, user_id)?)
    }

    async fn execute(&self, user_id: &str, plan: RunPlan) -> Result<SyncSummary, SyncError> {
        let span = info_span!("mailbox_sync", user = %user_id, mode = plan.mode.as_str());
        async {
            let _guard = self.locks.lock(user_id).await;
            let started_at = db::now();
            let result = self.execute_locked(user_id, plan).await;
            self.record_run(user_id, plan.mode, &started_at, &result);
            result
        }
        .instrument(span)
        .await
    }

    async fn execute_locked(
        &self,
        user_id: &str,
        plan: RunPlan,
    ) -> Result<SyncSummary, SyncError> {
        let user = user_repo::find_by_id(&self.db, user_id)?
            .ok_or_else(|| SyncError::UserNotFound(user_id.to_string()))?;
        let (Some(address), Some(sealed)) = (&user.mailbox_address, &user.mailbox_secret) else {
            return Err(SyncError::NotConfigured(user_id.to_string()));
        };
        let secret = self.cipher.open(sealed)?;

        let checkpoint = checkpoint_repo::find(&self.db, user_id)?.and_then(|c| c.last_message_id);

        let mut session = self.connector.connect(address, &secret).await?;
        let result = self
            .sync_session(session.as_mut(), user_id, plan, checkpoint)
            .await;
        if let Err(e) = session.logout().await {
            warn!("Mailbox logout failed: {}", e);
        }
        result
    }

    async fn sync_session(
        &self,
        session: &mut dyn MailboxSession,
        user_id: &str,
        plan: RunPlan,
        checkpoint: Option<String>,
    ) -> Result<SyncSummary, SyncError> {
        session.select_inbox().await?;
        let search = session.search_from(&self.config.sender_filter).await?;

        let (window, kind) = if plan.from_checkpoint {
            candidates::window_after_checkpoint(&search, checkpoint.as_deref(), plan.limit)
        } else {
            (&search[..], WindowKind::Whole)
        };
        if kind == WindowKind::CheckpointMissing {
            warn!(
                "Checkpoint {:?} no longer in mailbox, rescanning newest {} messages",
                checkpoint, plan.limit
            );
        }

        let existing = alert_repo::existing_ids(&self.db, user_id)?;
        let pending = candidates::select_pending(window, &existing, plan.cap);
        let mut summary = SyncSummary {
            total_found: search.len(),
            already_stored: search.iter().filter(|id| existing.contains(*id)).count(),
            candidates: pending.len(),
            checkpoint: checkpoint.clone(),
            ..SyncSummary::default()
        };
        debug!(
            "{} messages found, {} in window, {} to fetch",
            search.len(),
            window.len(),
            pending.len()
        );

        let mut attempted = HashSet::with_capacity(pending.len());
        let mut bodies = Vec::with_capacity(pending.len());
        for id in &pending {
            attempted.insert(id.clone());
            match session.fetch_raw(id).await {
                Ok(raw) => bodies.push((id.clone(), extract_body_from_raw(&raw))),
                Err(e) => {
                    summary.fetch_failed += 1;
                    warn!("Skipping message {}: {}", id, e);
                }
            }
        }
        summary.fetched = bodies.len();

        let batch_size = self.config.batch_size.max(1);
        let mut bodies = bodies.into_iter().peekable();
        while bodies.peek().is_some() {
            // Each message is parsed, classified and inserted on the blocking
            // pool; inserts still serialize on the connection.
            let handles = bodies.by_ref().take(batch_size).map(|(id, body)| {
                let database = self.db.clone();
                let categorizer = Arc::clone(&self.categorizer);
                let user_id = user_id.to_string();
                let snippet_chars = self.config.snippet_chars;
                tokio::task::spawn_blocking(move || {
                    persist(&database, &categorizer, &user_id, &id, &body, snippet_chars)
                })
            });
            let outcomes = join_all(handles.collect::<Vec<_>>()).await;

            let mut store_error = None;
            for outcome in outcomes {
                match outcome {
                    Ok(Ok(true)) => summary.new_count += 1,
                    Ok(Ok(false)) => {}
                    Ok(Err(e)) => store_error = Some(e),
                    Err(e) => store_error = Some(db::DatabaseError::TaskFailed(e.to_string())),
                }
            }
            if let Some(e) = store_error {
                error!("Aborting sync after store failure: {}", e);
                return Err(SyncError::StoreUnavailable(e));
            }
        }

        if summary.fetched > 0 {
            if let Some(target) = candidates::covered_prefix_end(window, &existing, &attempted) {
                if candidates::advances(&search, checkpoint.as_deref(), target) {
                    checkpoint_repo::upsert(&self.db, user_id, target, &db::now())?;
                    summary.checkpoint = Some(target.to_string());
                }
            }
        }

        if summary.new_count > 0 {
            if let Err(e) = bike_repo::refresh_from_alerts(&self.db, user_id) {
                warn!("Failed to refresh bikes: {}", e);
            }
        }

        info!(
            "Sync done: {} new, {} fetched, {} fetch failures, checkpoint {:?}",
            summary.new_count, summary.fetched, summary.fetch_failed, summary.checkpoint
        );
        Ok(summary)
    }

    fn record_run(
        &self,
        user_id: &str,
        mode: SyncMode,
        started_at: &str,
        result: &Result<SyncSummary, SyncError>,
    ) {
        let error_summary = result.as_ref().err().map(|e| e.to_string());
        let (emails_read, emails_new) = result
            .as_ref()
            .map(|s| (s.fetched as u32, s.new_count as u32))
            .unwrap_or((0, 0));
        let completed_at = db::now();
        let run = NewSyncRun {
            user_id,
            mode: mode.as_str(),
            started_at,
            completed_at: &completed_at,
            status: if result.is_ok() { "completed" } else { "failed" },
            emails_read,
            emails_new,
            error_summary: error_summary.as_deref(),
        };
        if let Err(e) = sync_run_repo::insert(&self.db, &run) {
            warn!("Failed to record sync run: {}", e);
        }
    }
}

/// Parse, classify and insert one message. `Ok(false)` means it already existed.
fn persist(
    database: &Database,
    categorizer: &Categorizer,
    user_id: &str,
    id: &str,
    body: &str,
    snippet_chars: usize,
) -> Result<bool, db::DatabaseError> {
    let fields = parse_tracker_email(body);
    let category = categorizer.categorize(&fields.alert_type);
    let alert = NewAlert {
        user_id: user_id.to_string(),
        email_id: id.to_string(),
        category,
        alert_type: fields.alert_type,
        alert_time: fields.time,
        location: fields.location,
        latitude: fields.latitude,
        longitude: fields.longitude,
        device_serial: fields.device_serial,
        tracker_name: fields.tracker_name,
        account_name: fields.account_name,
        raw_body: body.chars().take(snippet_chars).collect(),
        created_at: db::now(),
    };
    alert_repo::insert_if_absent(database, &alert)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_names() {
        assert_eq!(SyncMode::Manual.as_str(), "manual");
        assert_eq!(SyncMode::Progressive.as_str(), "progressive");
        assert_eq!(
            serde_json::to_string(&SyncMode::Background).unwrap(),
            "\"background\""
        );
    }
}
