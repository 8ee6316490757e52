// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use oh_github_uploader::config::Config;
use oh_github_uploader::db::FirestoreDb;
use oh_github_uploader::routes::create_router;
use oh_github_uploader::services::{
    GitHubClient, KmsService, MemberService, OpenHumansClient, RealmRateLimiter, TasksService,
};
use oh_github_uploader::AppState;
use std::sync::Arc;

/// Create a mock database connection (offline).
#[allow(dead_code)]
pub fn test_db_offline() -> FirestoreDb {
    FirestoreDb::new_mock()
}

/// Create a test app with offline mock dependencies.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let db = test_db_offline();
    let tasks_service = TasksService::new(
        &config.gcp_project_id,
        &config.gcp_region,
        &config.tasks_auth_token,
    );

    let open_humans = OpenHumansClient::new(
        config.sync.open_humans_base.clone(),
        config.open_humans_client_id.clone(),
        config.open_humans_client_secret.clone(),
    );
    let github = GitHubClient::new(
        config.github_client_id.clone(),
        config.github_client_secret.clone(),
    )
    .expect("GitHub client");
    let member_service = MemberService::new(
        db.clone(),
        KmsService::new_mock(),
        open_humans.clone(),
        github.clone(),
    );

    let rate_limiter = RealmRateLimiter::new();
    rate_limiter.register_realm(
        &config.sync.github_realm,
        config.sync.github_realm_max_requests,
        config.sync.github_realm_timespan,
    );

    let state = Arc::new(AppState {
        config,
        db,
        member_service,
        open_humans,
        github,
        rate_limiter,
        tasks_service,
    });

    (create_router(state.clone()), state)
}

/// `Authorization` header value accepted by the task routes.
#[allow(dead_code)]
pub fn tasks_bearer(config: &Config) -> String {
    format!("Bearer {}", config.tasks_auth_token)
}
