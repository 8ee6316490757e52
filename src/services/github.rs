// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GitHub API client for fetching weekly activity.
//!
//! Handles:
//! - Weekly feed fetching through a shared realm budget
//! - Account creation lookup (sync bootstrap)
//! - Token refresh for expiring GitHub App user tokens
//! - Rate limit detection (for rescheduling)

use crate::error::{AppError, Result};
use crate::services::rate_limit::RealmRateLimiter;
use crate::services::sync::ActivityFetcher;
use crate::time_utils::{parse_record_date, IsoWeek};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

const USER_AGENT: &str = concat!("oh-github-uploader/", env!("CARGO_PKG_VERSION"));

/// GitHub API client.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
}

impl GitHubClient {
    /// Create a new GitHub client with OAuth credentials.
    ///
    /// GitHub rejects requests without a User-Agent, so a client that
    /// cannot carry one is an error.
    pub fn new(client_id: String, client_secret: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed building GitHub HTTP client")?;

        Ok(Self {
            http,
            client_id,
            client_secret,
        })
    }

    /// GET a JSON document with the member's access token.
    pub async fn get_json(&self, url: &str, access_token: &str, realm: &str) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| AppError::GitHubApi(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let remaining = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, remaining.as_deref(), &body, realm));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::GitHubApi(format!("JSON parse error: {}", e)))
    }

    /// Refresh an expiring user access token.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenRefreshResponse> {
        let response = self
            .http
            .post("https://github.com/login/oauth/access_token")
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::GitHubApi(format!("Token refresh request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GitHubApi(format!(
                "Token refresh failed: HTTP {}: {}",
                status, body
            )));
        }

        // GitHub reports refresh failures as 200 with an `error` field.
        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to parse token response: {}", e)))?;

        if let Some(error) = body.get("error").and_then(Value::as_str) {
            return Err(AppError::GitHubApi(format!("Token refresh failed: {}", error)));
        }

        serde_json::from_value(body)
            .map_err(|e| AppError::GitHubApi(format!("Failed to parse token response: {}", e)))
    }
}

/// Map a non-success GitHub response to an error.
fn classify_failure(
    status: StatusCode,
    rate_limit_remaining: Option<&str>,
    body: &str,
    realm: &str,
) -> AppError {
    let exhausted = rate_limit_remaining == Some("0");

    if status == StatusCode::TOO_MANY_REQUESTS || (status == StatusCode::FORBIDDEN && exhausted) {
        tracing::warn!(status = %status, "GitHub rate limit hit");
        return AppError::rate_limited(realm);
    }

    if status == StatusCode::UNAUTHORIZED {
        return AppError::GitHubApi("Invalid or expired access token".to_string());
    }

    AppError::GitHubApi(format!("HTTP {}: {}", status, body))
}

/// Token refresh response from GitHub.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Rate-limited fetcher bound to one member's GitHub token.
///
/// All fetchers share the process-wide realm budget through the
/// `RealmRateLimiter` they are built with.
#[derive(Clone)]
pub struct GitHubFetcher {
    client: GitHubClient,
    limiter: RealmRateLimiter,
    access_token: String,
}

impl GitHubFetcher {
    pub fn new(client: GitHubClient, limiter: RealmRateLimiter, access_token: String) -> Self {
        Self {
            client,
            limiter,
            access_token,
        }
    }
}

#[async_trait]
impl ActivityFetcher for GitHubFetcher {
    async fn get(&self, url: &str, realm: &str, wait: bool) -> Result<Value> {
        self.limiter.acquire(realm, wait).await?;
        self.client.get_json(url, &self.access_token, realm).await
    }
}

/// URL of the activity feed for one ISO week.
pub fn feed_week_url(api_base: &str, week: IsoWeek) -> String {
    format!(
        "{}/feeds/{}-W{}?trackPoints=true",
        api_base.trim_end_matches('/'),
        week.year,
        week.week
    )
}

/// URL of the authenticated user's profile.
pub fn account_url(api_base: &str) -> String {
    format!("{}/user", api_base.trim_end_matches('/'))
}

/// Extract the account creation date from a profile response.
///
/// Accepts GitHub's RFC 3339 `created_at`, or a `profile.firstDate` in
/// `YYYYMMDD` form.
pub fn account_creation_date(profile: &Value) -> Result<NaiveDate> {
    if let Some(created_at) = profile.get("created_at").and_then(Value::as_str) {
        return DateTime::parse_from_rfc3339(created_at)
            .map(|dt| dt.date_naive())
            .map_err(|e| {
                AppError::InvalidData(format!("invalid created_at '{}': {}", created_at, e))
            });
    }

    if let Some(first_date) = profile
        .pointer("/profile/firstDate")
        .and_then(Value::as_str)
    {
        return parse_record_date(first_date).ok_or_else(|| {
            AppError::InvalidData(format!("invalid firstDate '{}'", first_date))
        });
    }

    Err(AppError::InvalidData(
        "profile has no account creation date".to_string(),
    ))
}
