//! Per-package settings and the checks built on them.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{ConfigSchema, PackageRecord, PackageType};

/// Flat configuration key -> value mapping, saved wholesale per package.
pub type Settings = BTreeMap<String, String>;

/// Setting passed positionally to database-connector packages.
pub const CONNECTION_URL_KEY: &str = "mongoConnectionUrl";

/// Key substrings (lower-case) marking a setting as a secret.
const CREDENTIAL_MARKERS: &[&str] = &[
    "api_key",
    "apikey",
    "token",
    "credential",
    "password",
    "secret",
];

/// A package cannot be installed or started until these fields are set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingConfiguration {
    pub schema: ConfigSchema,
    pub missing: Vec<String>,
}

impl std::fmt::Display for MissingConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "required configuration missing: {}", self.missing.join(", "))
    }
}

/// Fails with the required schema fields absent (or blank) in `settings`.
pub fn check_required(record: &PackageRecord, settings: &Settings) -> Result<(), MissingConfiguration> {
    let Some(schema) = record.required_config() else {
        return Ok(());
    };

    let missing: Vec<String> = schema
        .required
        .iter()
        .filter(|field| settings.get(*field).map_or(true, |v| v.trim().is_empty()))
        .cloned()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(MissingConfiguration {
            schema: schema.clone(),
            missing,
        })
    }
}

/// Case-insensitive substring match against the credential markers.
pub fn is_credential_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    CREDENTIAL_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Credential-like settings with upper-cased keys, as exported to external tools.
pub fn credential_env(settings: &Settings) -> BTreeMap<String, String> {
    settings
        .iter()
        .filter(|(k, _)| is_credential_key(k))
        .map(|(k, v)| (k.to_uppercase(), v.clone()))
        .collect()
}

/// Extra positional arguments appended after the entry file at launch.
pub fn launch_args(record: &PackageRecord, settings: &Settings) -> Vec<String> {
    match record.package_type {
        PackageType::NodeJs => {
            let mut args = Vec::new();
            if record.has_config {
                if let Some(url) = settings.get(CONNECTION_URL_KEY).filter(|u| !u.is_empty()) {
                    args.push(url.clone());
                }
            }
            args
        }
        PackageType::Simple => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_schema(required: &[&str]) -> PackageRecord {
        let mut record = PackageRecord::default_package();
        record.id = "demo".to_string();
        record.has_config = true;
        record.config_schema = Some(ConfigSchema {
            required: required.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        });
        record
    }

    #[test]
    fn missing_required_field_reported() {
        let record = record_with_schema(&["apiKey", "region"]);
        let mut settings = Settings::new();
        settings.insert("region".to_string(), "eu".to_string());

        let err = check_required(&record, &settings).unwrap_err();
        assert_eq!(err.missing, vec!["apiKey".to_string()]);
    }

    #[test]
    fn blank_value_counts_as_missing() {
        let record = record_with_schema(&["apiKey"]);
        let mut settings = Settings::new();
        settings.insert("apiKey".to_string(), "  ".to_string());
        assert!(check_required(&record, &settings).is_err());
    }

    #[test]
    fn no_schema_means_complete() {
        let record = PackageRecord::default_package();
        assert!(check_required(&record, &Settings::new()).is_ok());
    }

    #[test]
    fn credential_env_filters_and_uppercases() {
        let mut settings = Settings::new();
        settings.insert("api_key".to_string(), "x".to_string());
        settings.insert("region".to_string(), "y".to_string());

        let env = credential_env(&settings);
        assert_eq!(env.len(), 1);
        assert_eq!(env.get("API_KEY").map(String::as_str), Some("x"));
    }

    #[test]
    fn credential_markers_are_case_insensitive() {
        assert!(is_credential_key("GithubToken"));
        assert!(is_credential_key("DB_PASSWORD"));
        assert!(is_credential_key("apiKey"));
        assert!(is_credential_key("clientSecret"));
        assert!(!is_credential_key("region"));
    }

    #[test]
    fn connection_url_passed_for_configured_nodejs() {
        let mut record = record_with_schema(&[]);
        record.package_type = PackageType::NodeJs;
        let mut settings = Settings::new();
        settings.insert(CONNECTION_URL_KEY.to_string(), "mongodb://h/db".to_string());

        assert_eq!(launch_args(&record, &settings), vec!["mongodb://h/db".to_string()]);

        record.package_type = PackageType::Simple;
        assert!(launch_args(&record, &settings).is_empty());
    }
}
