// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod github;
pub mod kms;
pub mod member;
pub mod open_humans;
pub mod rate_limit;
pub mod sync;
pub mod tasks;

pub use github::{GitHubClient, GitHubFetcher};
pub use kms::KmsService;
pub use member::MemberService;
pub use open_humans::OpenHumansClient;
pub use rate_limit::RealmRateLimiter;
pub use sync::{SyncEngine, SyncOutcome};
pub use tasks::{QueuedResync, TasksService};
