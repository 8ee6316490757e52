//! Member model for storage.

use serde::{Deserialize, Serialize};

/// An Open Humans project member with a linked GitHub account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// Open Humans project member ID (also used as document ID)
    pub oh_id: String,
    /// Open Humans OAuth tokens (encrypted)
    pub open_humans: EncryptedTokens,
    /// GitHub OAuth tokens (encrypted)
    pub github: EncryptedTokens,
    /// Last successful sync (RFC 3339), if any
    #[serde(default)]
    pub last_updated: Option<String>,
    /// When the member first connected
    pub created_at: String,
}

/// One provider's OAuth tokens, KMS-encrypted in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedTokens {
    /// Encrypted access token (base64)
    pub access_token_encrypted: String,
    /// Encrypted refresh token (base64), absent for non-expiring tokens
    #[serde(default)]
    pub refresh_token_encrypted: Option<String>,
    /// When the access token expires (RFC 3339), absent for non-expiring tokens
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// Plaintext access tokens for one sync invocation.
#[derive(Debug, Clone)]
pub struct MemberTokens {
    pub open_humans: String,
    pub github: String,
}
