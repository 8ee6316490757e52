// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Open Humans member profile and file metadata.

use serde::{Deserialize, Serialize};

/// Member profile returned by the Open Humans token exchange.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberProfile {
    pub project_member_id: String,
    /// Files this project has stored for the member
    #[serde(default, rename = "data")]
    pub files: Vec<RemoteFile>,
}

/// One stored file in the member's listing.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFile {
    #[serde(default)]
    pub basename: String,
    pub download_url: String,
    #[serde(default)]
    pub metadata: FileMetadata,
}

impl RemoteFile {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.metadata.tags.iter().any(|t| t == tag)
    }
}

/// Metadata attached to an uploaded file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}
