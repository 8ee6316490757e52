// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Cloud Run injects secrets as environment variables via secret bindings,
//! so everything is read from the environment once at startup.

use std::env;
use std::time::Duration;

/// Cloud Tasks queue that carries sync invocations.
pub const SYNC_QUEUE_NAME: &str = "github-sync";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Open Humans OAuth client ID
    pub open_humans_client_id: String,
    /// GitHub OAuth client ID
    pub github_client_id: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// GCP region (Cloud Tasks queue and KMS key ring location)
    pub gcp_region: String,
    /// Server port
    pub port: u16,

    // --- Secrets ---
    /// Open Humans OAuth client secret
    pub open_humans_client_secret: String,
    /// GitHub OAuth client secret
    pub github_client_secret: String,
    /// Bearer token required on `/tasks/*` requests
    pub tasks_auth_token: String,

    /// Sync engine settings
    pub sync: SyncSettings,
}

/// Tunables for the sync engine and the upstream endpoints it talks to.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub github_api_base: String,
    pub open_humans_base: String,
    /// Rate-limit realm used for every GitHub call
    pub github_realm: String,
    /// Requests allowed per `github_realm_timespan`
    pub github_realm_max_requests: u32,
    pub github_realm_timespan: Duration,
    /// Delay before a rate-limited sync is re-invoked
    pub retry_delay: Duration,
    /// Basename deleted before each upload
    pub delete_basename: String,
    /// Basename the archive is uploaded under
    pub upload_basename: String,
    /// Tag identifying our archive in the member's file listing
    pub marker_tag: String,
    pub description: String,
    pub tags: Vec<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            github_api_base: "https://api.github.com".to_string(),
            open_humans_base: "https://www.openhumans.org".to_string(),
            github_realm: "github".to_string(),
            github_realm_max_requests: 5000,
            github_realm_timespan: Duration::from_secs(3600),
            retry_delay: Duration::from_secs(61),
            delete_basename: "dummy-data.json".to_string(),
            upload_basename: "github-data.json".to_string(),
            marker_tag: "Github".to_string(),
            description: "Github activity feed, repository contents and stars data.".to_string(),
            tags: vec![
                "Github".to_string(),
                "activity".to_string(),
                "repositories".to_string(),
                "stars".to_string(),
            ],
        }
    }
}

impl SyncSettings {
    /// Apply environment overrides on top of the defaults.
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let retry_delay = match env::var("SYNC_RETRY_DELAY_SECS") {
            Ok(v) => Duration::from_secs(
                v.trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid("SYNC_RETRY_DELAY_SECS"))?,
            ),
            Err(_) => defaults.retry_delay,
        };

        let github_realm_max_requests = match env::var("GITHUB_REALM_MAX_REQUESTS") {
            Ok(v) => v
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("GITHUB_REALM_MAX_REQUESTS"))?,
            Err(_) => defaults.github_realm_max_requests,
        };

        Ok(Self {
            github_api_base: env::var("GITHUB_API_BASE").unwrap_or(defaults.github_api_base),
            open_humans_base: env::var("OPEN_HUMANS_BASE").unwrap_or(defaults.open_humans_base),
            github_realm_max_requests,
            retry_delay,
            delete_basename: env::var("DELETE_BASENAME").unwrap_or(defaults.delete_basename),
            upload_basename: env::var("UPLOAD_BASENAME").unwrap_or(defaults.upload_basename),
            ..defaults
        })
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            open_humans_client_id: env::var("OPEN_HUMANS_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("OPEN_HUMANS_CLIENT_ID"))?,
            github_client_id: env::var("GITHUB_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("GITHUB_CLIENT_ID"))?,
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            gcp_region: env::var("GCP_REGION").unwrap_or_else(|_| "us-west1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),

            open_humans_client_secret: env::var("OPEN_HUMANS_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("OPEN_HUMANS_CLIENT_SECRET"))?,
            github_client_secret: env::var("GITHUB_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("GITHUB_CLIENT_SECRET"))?,
            tasks_auth_token: env::var("TASKS_AUTH_TOKEN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("TASKS_AUTH_TOKEN"))?,

            sync: SyncSettings::from_env()?,
        })
    }

    /// Config for tests only.
    pub fn test_default() -> Self {
        Self {
            open_humans_client_id: "test_oh_client_id".to_string(),
            github_client_id: "test_github_client_id".to_string(),
            gcp_project_id: "test-project".to_string(),
            gcp_region: "us-west1".to_string(),
            port: 8080,
            open_humans_client_secret: "test_oh_secret".to_string(),
            github_client_secret: "test_github_secret".to_string(),
            tasks_auth_token: "test_tasks_token".to_string(),
            sync: SyncSettings::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("OPEN_HUMANS_CLIENT_ID", "oh_id");
        env::set_var("OPEN_HUMANS_CLIENT_SECRET", " oh_secret\n");
        env::set_var("GITHUB_CLIENT_ID", "gh_id");
        env::set_var("GITHUB_CLIENT_SECRET", "gh_secret");
        env::set_var("TASKS_AUTH_TOKEN", "tasks");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.open_humans_client_id, "oh_id");
        assert_eq!(config.open_humans_client_secret, "oh_secret");
        assert_eq!(config.github_client_id, "gh_id");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_sync_defaults_keep_distinct_basenames() {
        let settings = SyncSettings::default();

        assert_eq!(settings.delete_basename, "dummy-data.json");
        assert_eq!(settings.upload_basename, "github-data.json");
        assert_eq!(settings.retry_delay, Duration::from_secs(61));
        assert!(settings.tags.contains(&settings.marker_tag));
    }
}
