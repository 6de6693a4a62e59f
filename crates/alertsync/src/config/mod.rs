pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str, FALLBACK_CATEGORY};
pub use schema::{default_categories, AppConfig, CategoryRule, ImapConfig, SyncConfig};
