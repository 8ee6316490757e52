// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloud KMS sealing of member OAuth token sets.
//!
//! Each provider's tokens (Open Humans, GitHub) are stored in Firestore as
//! an [`EncryptedTokens`] value: access and refresh tokens individually
//! KMS-encrypted and base64 encoded, expiry in the clear.

use crate::error::{AppError, Result};
use crate::models::EncryptedTokens;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use google_cloud_googleapis::cloud::kms::v1::{DecryptRequest, EncryptRequest};
use google_cloud_kms::client::{Client, ClientConfig};
use std::sync::Arc;

const KEY_RING: &str = "oh-github-uploader";

#[derive(Clone)]
enum Backend {
    Cloud {
        client: Arc<Client>,
        /// projects/{project}/locations/{location}/keyRings/{ring}/cryptoKeys/{key}
        key_path: String,
    },
    /// Base64 only; debug builds.
    #[cfg(debug_assertions)]
    Offline,
}

/// Token encryption service.
#[derive(Clone)]
pub struct KmsService {
    backend: Backend,
}

impl KmsService {
    /// Connect to Cloud KMS with key `key_name` in the service key ring.
    pub async fn new(project_id: &str, location: &str, key_name: &str) -> Result<Self> {
        let config = ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("KMS auth config: {}", e)))?;
        let client = Client::new(config)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("KMS client: {}", e)))?;

        Ok(Self {
            backend: Backend::Cloud {
                client: Arc::new(client),
                key_path: format!(
                    "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
                    project_id, location, KEY_RING, key_name
                ),
            },
        })
    }

    /// Offline service for tests; "ciphertext" is plain base64.
    #[cfg(debug_assertions)]
    pub fn new_mock() -> Self {
        Self {
            backend: Backend::Offline,
        }
    }

    /// Encrypt a token set for storage.
    ///
    /// A `None` refresh token is stored as absent (non-expiring tokens).
    pub async fn seal(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<String>,
    ) -> Result<EncryptedTokens> {
        let refresh_token_encrypted = match refresh_token {
            Some(token) => Some(self.encrypt(token).await?),
            None => None,
        };

        Ok(EncryptedTokens {
            access_token_encrypted: self.encrypt(access_token).await?,
            refresh_token_encrypted,
            expires_at,
        })
    }

    /// Plaintext access token of a stored set.
    pub async fn open_access(&self, tokens: &EncryptedTokens) -> Result<String> {
        self.decrypt(&tokens.access_token_encrypted).await
    }

    /// Plaintext refresh token of a stored set.
    pub async fn open_refresh(&self, tokens: &EncryptedTokens) -> Result<String> {
        let encrypted = tokens.refresh_token_encrypted.as_deref().ok_or_else(|| {
            AppError::BadRequest("Token expired and no refresh token stored".to_string())
        })?;
        self.decrypt(encrypted).await
    }

    /// Encrypt one token; returns base64 ciphertext.
    async fn encrypt(&self, plaintext: &str) -> Result<String> {
        match &self.backend {
            Backend::Cloud { client, key_path } => {
                let req = EncryptRequest {
                    name: key_path.clone(),
                    plaintext: plaintext.as_bytes().to_vec(),
                    ..Default::default()
                };
                let response = client
                    .encrypt(req, None)
                    .await
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("KMS encrypt failed: {}", e)))?;
                Ok(BASE64.encode(response.ciphertext))
            }
            #[cfg(debug_assertions)]
            Backend::Offline => Ok(BASE64.encode(plaintext)),
        }
    }

    /// Decrypt one base64 ciphertext.
    async fn decrypt(&self, ciphertext_b64: &str) -> Result<String> {
        let ciphertext = BASE64
            .decode(ciphertext_b64)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Base64 decode failed: {}", e)))?;

        let plaintext = match &self.backend {
            Backend::Cloud { client, key_path } => {
                let req = DecryptRequest {
                    name: key_path.clone(),
                    ciphertext,
                    ..Default::default()
                };
                client
                    .decrypt(req, None)
                    .await
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("KMS decrypt failed: {}", e)))?
                    .plaintext
            }
            #[cfg(debug_assertions)]
            Backend::Offline => ciphertext,
        };

        String::from_utf8(plaintext)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("UTF-8 decode failed: {}", e)))
    }
}
