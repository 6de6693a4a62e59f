use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default)]
    pub imap: ImapConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryRule>,
    /// Hex-encoded AES-256 key used to encrypt stored mailbox secrets.
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub secret_key_file: Option<String>,
    #[serde(default = "default_secret_key_env_var")]
    pub secret_key_env_var: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            imap: ImapConfig::default(),
            sync: SyncConfig::default(),
            categories: default_categories(),
            secret_key: None,
            secret_key_file: None,
            secret_key_env_var: default_secret_key_env_var(),
        }
    }
}

fn default_database_path() -> PathBuf {
    crate::db::default_database_path().unwrap_or_else(|| PathBuf::from("alertsync.db"))
}

fn default_secret_key_env_var() -> Option<String> {
    Some("ALERTSYNC_SECRET_KEY".to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImapConfig {
    #[serde(default = "default_imap_host")]
    pub host: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    #[serde(default = "default_folder")]
    pub folder: String,
}

fn default_imap_host() -> String {
    "imap.gmail.com".to_string()
}

fn default_imap_port() -> u16 {
    993
}

fn default_folder() -> String {
    "INBOX".to_string()
}

impl Default for ImapConfig {
    fn default() -> Self {
        Self {
            host: default_imap_host(),
            port: default_imap_port(),
            folder: default_folder(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Only messages from this sender are considered alerts.
    #[serde(default = "default_sender_filter")]
    pub sender_filter: String,
    #[serde(default = "default_manual_limit")]
    pub manual_limit: usize,
    #[serde(default = "default_background_limit")]
    pub background_limit: usize,
    #[serde(default = "default_progressive_chunk")]
    pub progressive_chunk: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Number of body characters kept on each alert row.
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
    #[serde(default = "default_background_interval_secs")]
    pub background_interval_secs: u64,
}

fn default_sender_filter() -> String {
    "alerts-no-reply@tracking-update.com".to_string()
}

fn default_manual_limit() -> usize {
    100
}

fn default_background_limit() -> usize {
    30
}

fn default_progressive_chunk() -> usize {
    10
}

fn default_batch_size() -> usize {
    10
}

fn default_snippet_chars() -> usize {
    500
}

fn default_background_interval_secs() -> u64 {
    3600
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sender_filter: default_sender_filter(),
            manual_limit: default_manual_limit(),
            background_limit: default_background_limit(),
            progressive_chunk: default_progressive_chunk(),
            batch_size: default_batch_size(),
            snippet_chars: default_snippet_chars(),
            background_interval_secs: default_background_interval_secs(),
        }
    }
}

/// One entry of the ordered classifier vocabulary.
///
/// An alert type belongs to `label` when its lower-cased text contains any
/// of the `contains` needles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub label: String,
    pub contains: Vec<String>,
}

impl CategoryRule {
    pub fn new(label: &str, contains: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            contains: contains.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// The built-in vocabulary, in match order.
pub fn default_categories() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new("Heavy Impact", &["heavy impact"]),
        CategoryRule::new("Light Sensor", &["light sensor"]),
        CategoryRule::new("Out Of Country", &["out of country"]),
        CategoryRule::new("No Communication", &["no communication"]),
        CategoryRule::new("Over-turn", &["over-turn", "overturn"]),
        CategoryRule::new("Tamper Alert", &["tamper"]),
        CategoryRule::new("Low Battery", &["low battery"]),
        CategoryRule::new("Motion", &["motion"]),
        CategoryRule::new("New Positions", &["new position"]),
        CategoryRule::new("High Risk Area", &["high risk"]),
        CategoryRule::new("Custom GeoFence", &["geofence"]),
        CategoryRule::new("Rotation Stop", &["rotation"]),
        CategoryRule::new("Temperature", &["temperature"]),
        CategoryRule::new("Pressure", &["pressure"]),
        CategoryRule::new("Humidity", &["humidity"]),
    ]
}
