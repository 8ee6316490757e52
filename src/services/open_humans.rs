// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Open Humans API client for the member's stored files.
//!
//! Handles:
//! - Member exchange (profile and file listing)
//! - File download, delete by basename, and direct upload
//! - Token refresh when expired

use crate::error::{AppError, Result};
use crate::models::{FileMetadata, MemberProfile};
use crate::services::sync::ArchiveStore;
use async_trait::async_trait;
use serde::Deserialize;

/// Open Humans API client.
#[derive(Clone)]
pub struct OpenHumansClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl OpenHumansClient {
    /// Create a new Open Humans client with OAuth credentials.
    pub fn new(base_url: String, client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/direct-sharing/project/{}", self.base_url, path)
    }

    /// Refresh an expired access token.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenRefreshResponse> {
        let response = self
            .http
            .post(format!("{}/oauth2/token/", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| {
                AppError::OpenHumansApi(format!("Token refresh request failed: {}", e))
            })?;

        check_response_json(response).await
    }

    /// Start a direct upload; returns the pre-signed target URL and file id.
    async fn start_upload(
        &self,
        basename: &str,
        metadata: &FileMetadata,
        access_token: &str,
        member_id: &str,
    ) -> Result<DirectUploadTarget> {
        let metadata = serde_json::to_string(metadata)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JSON error: {}", e)))?;

        let response = self
            .http
            .post(self.api_url("files/upload/direct/"))
            .query(&[("access_token", access_token)])
            .form(&[
                ("project_member_id", member_id),
                ("metadata", metadata.as_str()),
                ("filename", basename),
            ])
            .send()
            .await
            .map_err(|e| AppError::OpenHumansApi(e.to_string()))?;

        check_response_json(response).await
    }

    /// Mark a direct upload as complete.
    async fn complete_upload(
        &self,
        file_id: u64,
        access_token: &str,
        member_id: &str,
    ) -> Result<()> {
        let file_id = file_id.to_string();
        let response = self
            .http
            .post(self.api_url("files/upload/complete/"))
            .query(&[("access_token", access_token)])
            .form(&[
                ("project_member_id", member_id),
                ("file_id", file_id.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::OpenHumansApi(e.to_string()))?;

        check_response(response).await
    }
}

#[async_trait]
impl ArchiveStore for OpenHumansClient {
    async fn exchange_token(&self, access_token: &str) -> Result<MemberProfile> {
        let response = self
            .http
            .get(self.api_url("exchange-member/"))
            .query(&[("access_token", access_token)])
            .send()
            .await
            .map_err(|e| AppError::OpenHumansApi(e.to_string()))?;

        check_response_json(response).await
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::OpenHumansApi(format!("Download failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::OpenHumansApi(format!(
                "Download failed: HTTP {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::OpenHumansApi(format!("Download failed: {}", e)))?;
        Ok(bytes.to_vec())
    }

    async fn delete_file(
        &self,
        access_token: &str,
        member_id: &str,
        file_basename: &str,
    ) -> Result<()> {
        let response = self
            .http
            .post(self.api_url("files/delete/"))
            .query(&[("access_token", access_token)])
            .json(&serde_json::json!({
                "project_member_id": member_id,
                "file_basename": file_basename,
            }))
            .send()
            .await
            .map_err(|e| AppError::OpenHumansApi(e.to_string()))?;

        // Nothing to delete is fine.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(member_id, file_basename, "No existing file to delete");
            return Ok(());
        }

        check_response(response).await
    }

    async fn upload(
        &self,
        basename: &str,
        contents: Vec<u8>,
        metadata: &FileMetadata,
        access_token: &str,
        member_id: &str,
    ) -> Result<()> {
        let target = self
            .start_upload(basename, metadata, access_token, member_id)
            .await?;

        let response = self
            .http
            .put(&target.url)
            .body(contents)
            .send()
            .await
            .map_err(|e| AppError::OpenHumansApi(format!("File PUT failed: {}", e)))?;
        check_response(response).await?;

        self.complete_upload(target.id, access_token, member_id)
            .await
    }
}

/// Check response status and return error if not successful.
async fn check_response(response: reqwest::Response) -> Result<()> {
    if response.status().is_success() {
        return Ok(());
    }
    Err(failure(response).await)
}

/// Check response and parse JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T> {
    if !response.status().is_success() {
        return Err(failure(response).await);
    }

    response
        .json()
        .await
        .map_err(|e| AppError::OpenHumansApi(format!("JSON parse error: {}", e)))
}

/// Build the error for a non-success response.
async fn failure(response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return AppError::OpenHumansApi("Invalid or expired access token".to_string());
    }

    AppError::OpenHumansApi(format!("HTTP {}: {}", status, body))
}

/// Pre-signed upload target from Open Humans.
#[derive(Debug, Deserialize)]
struct DirectUploadTarget {
    url: String,
    id: u64,
}

/// Token refresh response from Open Humans.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires
    pub expires_in: i64,
}
