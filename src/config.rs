use std::env;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Settings for the fiscal receipt files handed to the printer bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptSettings {
    pub separator: char,
    pub name_limit: usize,
    pub vat_code: String,
    pub department: String,
}

impl Default for ReceiptSettings {
    fn default() -> Self {
        Self {
            separator: ';',
            name_limit: 30,
            vat_code: "1".to_string(),
            department: "1".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub port: u16,
    pub receipt_dir: PathBuf,
    pub receipt: ReceiptSettings,
    pub run_migrations: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let port = match get("PORT") {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid { key: "PORT", value })?,
            None => 3000,
        };

        let receipt_dir = get("RECEIPT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("receipts"));

        let mut receipt = ReceiptSettings::default();
        if let Some(value) = get("RECEIPT_SEPARATOR") {
            let mut chars = value.chars();
            receipt.separator = match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => return Err(ConfigError::Invalid { key: "RECEIPT_SEPARATOR", value }),
            };
        }
        if let Some(value) = get("RECEIPT_NAME_LIMIT") {
            receipt.name_limit = match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::Invalid { key: "RECEIPT_NAME_LIMIT", value }),
            };
        }
        if let Some(value) = get("RECEIPT_VAT_CODE") {
            receipt.vat_code = value.trim().to_string();
        }
        if let Some(value) = get("RECEIPT_DEPARTMENT") {
            receipt.department = value.trim().to_string();
        }

        let run_migrations = match get("RUN_MIGRATIONS").as_deref().map(str::trim) {
            None | Some("1") | Some("true") | Some("yes") => true,
            Some("0") | Some("false") | Some("no") => false,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "RUN_MIGRATIONS",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            database_url,
            jwt_secret,
            port,
            receipt_dir,
            receipt,
            run_migrations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_required_keys_are_set() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/larder"),
            ("JWT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.receipt_dir, PathBuf::from("receipts"));
        assert_eq!(config.receipt, ReceiptSettings::default());
        assert!(config.run_migrations);
    }

    #[test]
    fn missing_database_url_is_reported() {
        let err = Config::from_lookup(lookup(&[("JWT_SECRET", "secret")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn receipt_overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/larder"),
            ("JWT_SECRET", "secret"),
            ("RECEIPT_SEPARATOR", "^"),
            ("RECEIPT_NAME_LIMIT", "24"),
            ("RUN_MIGRATIONS", "false"),
        ]))
        .unwrap();

        assert_eq!(config.receipt.separator, '^');
        assert_eq!(config.receipt.name_limit, 24);
        assert!(!config.run_migrations);
    }

    #[test]
    fn multi_character_separator_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/larder"),
            ("JWT_SECRET", "secret"),
            ("RECEIPT_SEPARATOR", ";;"),
        ]))
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { key: "RECEIPT_SEPARATOR", .. }));
    }

    #[test]
    fn zero_name_limit_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/larder"),
            ("JWT_SECRET", "secret"),
            ("RECEIPT_NAME_LIMIT", "0"),
        ]))
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { key: "RECEIPT_NAME_LIMIT", .. }));
    }
}
