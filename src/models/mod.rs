// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod archive;
pub mod member;
pub mod store;

pub use archive::{ActivityArchive, ActivityRecord};
pub use member::{EncryptedTokens, Member, MemberTokens};
pub use store::{FileMetadata, MemberProfile, RemoteFile};
