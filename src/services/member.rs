// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Member token lifecycle.
//!
//! Tokens are read fresh from Firestore at the start of every sync
//! invocation, refreshed with the provider when close to expiry, and never
//! cached in memory.

use crate::db::FirestoreDb;
use crate::error::{AppError, Result};
use crate::models::{EncryptedTokens, MemberTokens};
use crate::services::github::GitHubClient;
use crate::services::kms::KmsService;
use crate::services::open_humans::OpenHumansClient;
use chrono::{DateTime, Duration, Utc};

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Plaintext result of a provider token refresh.
struct Refreshed {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// Loads and refreshes member tokens for both providers.
#[derive(Clone)]
pub struct MemberService {
    db: FirestoreDb,
    kms: KmsService,
    open_humans: OpenHumansClient,
    github: GitHubClient,
}

impl MemberService {
    pub fn new(
        db: FirestoreDb,
        kms: KmsService,
        open_humans: OpenHumansClient,
        github: GitHubClient,
    ) -> Self {
        Self {
            db,
            kms,
            open_humans,
            github,
        }
    }

    /// Valid access tokens for both providers, refreshing as needed.
    pub async fn fresh_tokens(&self, oh_id: &str) -> Result<MemberTokens> {
        let mut member = self
            .db
            .get_member(oh_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Member {}", oh_id)))?;

        let now = Utc::now();

        let (open_humans, oh_refreshed) =
            if needs_refresh(&member.open_humans, now)? {
                tracing::info!(oh_id, "Open Humans token expired, refreshing");
                let refresh_token = self.kms.open_refresh(&member.open_humans).await?;
                let r = self.open_humans.refresh_token(&refresh_token).await?;
                let refreshed = Refreshed {
                    access_token: r.access_token,
                    refresh_token: Some(r.refresh_token),
                    expires_in: Some(r.expires_in),
                };
                (
                    self.store_refreshed(&mut member.open_humans, refreshed, now)
                        .await?,
                    true,
                )
            } else {
                (
                    self.kms.open_access(&member.open_humans).await?,
                    false,
                )
            };

        let (github, gh_refreshed) = if needs_refresh(&member.github, now)? {
            tracing::info!(oh_id, "GitHub token expired, refreshing");
            let refresh_token = self.kms.open_refresh(&member.github).await?;
            let r = self.github.refresh_token(&refresh_token).await?;
            let refreshed = Refreshed {
                access_token: r.access_token,
                refresh_token: r.refresh_token,
                expires_in: r.expires_in,
            };
            (
                self.store_refreshed(&mut member.github, refreshed, now)
                    .await?,
                true,
            )
        } else {
            (
                self.kms.open_access(&member.github).await?,
                false,
            )
        };

        if oh_refreshed || gh_refreshed {
            self.db.upsert_member(&member).await?;
            tracing::info!(oh_id, "Refreshed tokens stored");
        }

        Ok(MemberTokens {
            open_humans,
            github,
        })
    }

    /// Encrypt refreshed tokens into `tokens`; returns the new access token.
    async fn store_refreshed(
        &self,
        tokens: &mut EncryptedTokens,
        refreshed: Refreshed,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let expires_at = refreshed
            .expires_in
            .map(|secs| (now + Duration::seconds(secs)).to_rfc3339());
        let mut sealed = self
            .kms
            .seal(
                &refreshed.access_token,
                refreshed.refresh_token.as_deref(),
                expires_at,
            )
            .await?;

        // Providers may omit the refresh token; keep the stored one.
        if sealed.refresh_token_encrypted.is_none() {
            sealed.refresh_token_encrypted = tokens.refresh_token_encrypted.take();
        }
        *tokens = sealed;

        Ok(refreshed.access_token)
    }
}

/// Whether an access token expires within the refresh margin.
///
/// Tokens without an expiry never need refreshing.
fn needs_refresh(tokens: &EncryptedTokens, now: DateTime<Utc>) -> Result<bool> {
    let Some(expires_at) = tokens.expires_at.as_deref() else {
        return Ok(false);
    };

    let expires_at = DateTime::parse_from_rfc3339(expires_at)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to parse expiry: {}", e)))?
        .with_timezone(&Utc);

    Ok(now + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) >= expires_at)
}
