//! Engine configuration loaded from `config/journal.toml` and the environment

use bigdecimal::BigDecimal;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::types::{JournalResult, UserId};

/// Tunables of the journal engine and the debt-ledger reconstructor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Largest accepted |Σdebit − Σcredit| for one entry
    #[serde(default = "default_balance_tolerance")]
    pub balance_tolerance: BigDecimal,
    /// User recorded as `created_by` when the caller is anonymous
    #[serde(default = "default_user_id")]
    pub default_user_id: UserId,
    /// Attempts at creating an entry when its code collides
    #[serde(default = "default_code_retry_attempts")]
    pub code_retry_attempts: u32,
    /// Account code prefixes of VAT-type accounts
    #[serde(default = "default_tax_account_prefixes")]
    pub tax_account_prefixes: Vec<String>,
    /// Decimal places kept when a statement is rounded for display
    #[serde(default)]
    pub display_scale: i64,
}

fn default_balance_tolerance() -> BigDecimal {
    BigDecimal::new(1.into(), 2)
}

fn default_user_id() -> UserId {
    UserId(1)
}

fn default_code_retry_attempts() -> u32 {
    3
}

fn default_tax_account_prefixes() -> Vec<String> {
    vec!["133".to_string(), "3331".to_string()]
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            balance_tolerance: default_balance_tolerance(),
            default_user_id: default_user_id(),
            code_retry_attempts: default_code_retry_attempts(),
            tax_account_prefixes: default_tax_account_prefixes(),
            display_scale: 0,
        }
    }
}

impl JournalConfig {
    /// Load from `config/journal.toml` (optional) overridden by `JOURNAL__*`
    /// environment variables
    pub fn load() -> JournalResult<Self> {
        Self::load_from("config/journal")
    }

    /// Load from the given file stem (any format the `config` crate knows)
    pub fn load_from(path: &str) -> JournalResult<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("JOURNAL")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("tax_account_prefixes")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Whether the account belongs to the VAT family
    pub fn is_tax_account(&self, account_code: &str) -> bool {
        !account_code.is_empty()
            && self
                .tax_account_prefixes
                .iter()
                .any(|prefix| account_code.starts_with(prefix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = JournalConfig::default();
        assert_eq!(config.balance_tolerance.to_string(), "0.01");
        assert_eq!(config.default_user_id, UserId(1));
        assert!(config.is_tax_account("3331"));
        assert!(config.is_tax_account("1331"));
        assert!(!config.is_tax_account("511"));
        assert!(!config.is_tax_account(""));
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = std::env::temp_dir().join(format!("journal-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("journal.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "code_retry_attempts = 5").unwrap();
        writeln!(file, "tax_account_prefixes = [\"3331\"]").unwrap();
        writeln!(file, "display_scale = 2").unwrap();

        let stem = dir.join("journal");
        let config = JournalConfig::load_from(stem.to_str().unwrap()).unwrap();
        assert_eq!(config.code_retry_attempts, 5);
        assert_eq!(config.tax_account_prefixes, vec!["3331".to_string()]);
        assert_eq!(config.display_scale, 2);
        assert_eq!(config.default_user_id, UserId(1));
        assert!(!config.is_tax_account("133"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
