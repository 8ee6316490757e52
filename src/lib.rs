// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! oh-github-uploader: archive GitHub activity into Open Humans
//!
//! This crate provides the backend service that incrementally syncs each
//! member's weekly GitHub activity into a JSON archive stored in their
//! Open Humans project files.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::FirestoreDb;
use services::{GitHubClient, MemberService, OpenHumansClient, RealmRateLimiter, TasksService};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub member_service: MemberService,
    pub open_humans: OpenHumansClient,
    pub github: GitHubClient,
    /// Process-wide GitHub budget, shared by every sync invocation.
    pub rate_limiter: RealmRateLimiter,
    pub tasks_service: TasksService,
}
