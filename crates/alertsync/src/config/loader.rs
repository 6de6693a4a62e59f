use std::collections::HashSet;
use std::path::Path;

use secrecy::SecretString;

use crate::config::schema::AppConfig;
use crate::error::ConfigError;
use crate::secrets::{resolve_secret_optional, SecretCipher};

/// Label reserved for alert types no rule matches.
pub const FALLBACK_CATEGORY: &str = "Other";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<AppConfig, ConfigError> {
    // An empty document deserializes to `null`, which serde_yaml rejects for a struct.
    let config: AppConfig = if content.trim().is_empty() {
        AppConfig::default()
    } else {
        serde_yaml::from_str(content)?
    };

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    let sync = &config.sync;
    for (name, value) in [
        ("manualLimit", sync.manual_limit),
        ("backgroundLimit", sync.background_limit),
        ("progressiveChunk", sync.progressive_chunk),
        ("batchSize", sync.batch_size),
    ] {
        if value == 0 {
            return Err(ConfigError::Validation {
                message: format!("sync.{} must be greater than 0", name),
            });
        }
    }

    if sync.background_interval_secs == 0 {
        return Err(ConfigError::Validation {
            message: "sync.backgroundIntervalSecs must be greater than 0".to_string(),
        });
    }

    if sync.sender_filter.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "sync.senderFilter must not be empty".to_string(),
        });
    }

    if config.categories.is_empty() {
        return Err(ConfigError::Validation {
            message: "at least one category rule is required".to_string(),
        });
    }

    let mut labels = HashSet::new();
    for rule in &config.categories {
        if rule.label.trim().is_empty() {
            return Err(ConfigError::InvalidCategory {
                label: rule.label.clone(),
                reason: "label must not be empty".to_string(),
            });
        }
        if rule.label == FALLBACK_CATEGORY {
            return Err(ConfigError::InvalidCategory {
                label: rule.label.clone(),
                reason: format!("'{}' is reserved for unmatched alerts", FALLBACK_CATEGORY),
            });
        }
        if !labels.insert(rule.label.as_str()) {
            return Err(ConfigError::InvalidCategory {
                label: rule.label.clone(),
                reason: "duplicate label".to_string(),
            });
        }
        if rule.contains.is_empty() || rule.contains.iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::InvalidCategory {
                label: rule.label.clone(),
                reason: "needs at least one non-empty 'contains' entry".to_string(),
            });
        }
    }

    Ok(())
}

impl AppConfig {
    /// Resolves the secret-encryption key, if any source is configured.
    pub fn resolve_secret_key(&self) -> Result<Option<SecretString>, ConfigError> {
        resolve_secret_optional(
            self.secret_key.as_deref(),
            self.secret_key_file.as_deref(),
            self.secret_key_env_var.as_deref(),
        )
        .or_else(|e| match e {
            // An unset default env var just means "no key configured".
            crate::secrets::SecretError::EnvVarNotSet { .. } => Ok(None),
            other => Err(ConfigError::Validation {
                message: other.to_string(),
            }),
        })
    }

    /// Builds the cipher for stored mailbox secrets from the resolved key.
    pub fn secret_cipher(&self) -> Result<SecretCipher, ConfigError> {
        use secrecy::ExposeSecret;

        match self.resolve_secret_key()? {
            Some(key) => SecretCipher::from_hex_key(key.expose_secret()).map_err(|e| {
                ConfigError::Validation {
                    message: e.to_string(),
                }
            }),
            None => {
                log::warn!(
                    "No secret key configured; mailbox secrets will be stored unencrypted"
                );
                Ok(SecretCipher::plaintext())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.imap.host, "imap.gmail.com");
        assert_eq!(config.imap.port, 993);
        assert_eq!(config.sync.manual_limit, 100);
        assert_eq!(config.sync.background_limit, 30);
        assert_eq!(config.sync.progressive_chunk, 10);
        assert_eq!(config.sync.snippet_chars, 500);
        assert_eq!(config.categories.len(), 15);
    }

    #[test]
    fn test_partial_override() {
        let yaml = "
imap:
  host: imap.example.com
sync:
  backgroundLimit: 5
";
        let config = load_config_from_str(yaml).unwrap();
        assert_eq!(config.imap.host, "imap.example.com");
        assert_eq!(config.imap.port, 993);
        assert_eq!(config.sync.background_limit, 5);
        assert_eq!(config.sync.manual_limit, 100);
    }

    #[test]
    fn test_custom_categories() {
        let yaml = "
categories:
  - label: Crash
    contains: [crash, impact]
";
        let config = load_config_from_str(yaml).unwrap();
        assert_eq!(config.categories.len(), 1);
        assert_eq!(config.categories[0].contains, vec!["crash", "impact"]);
    }

    #[test]
    fn test_zero_limit_rejected() {
        let result = load_config_from_str("sync:\n  batchSize: 0\n");
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_reserved_label_rejected() {
        let yaml = "
categories:
  - label: Other
    contains: [misc]
";
        let result = load_config_from_str(yaml);
        assert!(matches!(result, Err(ConfigError::InvalidCategory { .. })));
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let yaml = "
categories:
  - label: Motion
    contains: [motion]
  - label: Motion
    contains: [moving]
";
        let result = load_config_from_str(yaml);
        assert!(matches!(result, Err(ConfigError::InvalidCategory { .. })));
    }

    #[test]
    fn test_empty_needle_rejected() {
        let yaml = "
categories:
  - label: Motion
    contains: ['']
";
        let result = load_config_from_str(yaml);
        assert!(matches!(result, Err(ConfigError::InvalidCategory { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sync:\n  senderFilter: alerts@example.com").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.sync.sender_filter, "alerts@example.com");
    }

    #[test]
    fn test_missing_file() {
        let result = load_config("/nonexistent/alertsync.yaml");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}
