// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! oh-github-uploader API Server
//!
//! Runs the Cloud Tasks handlers that sync members' GitHub activity into
//! their Open Humans archives.

use oh_github_uploader::{
    config::Config,
    db::FirestoreDb,
    services::{GitHubClient, KmsService, MemberService, OpenHumansClient, RealmRateLimiter, TasksService},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting oh-github-uploader");

    // Initialize Firestore database
    let db = FirestoreDb::new(&config.gcp_project_id).await?;

    // Initialize Cloud Tasks service
    let tasks_service = TasksService::new(
        &config.gcp_project_id,
        &config.gcp_region,
        &config.tasks_auth_token,
    );
    tracing::info!(
        project = %config.gcp_project_id,
        "Cloud Tasks service initialized"
    );

    // Initialize KMS service
    let kms = KmsService::new(
        &config.gcp_project_id,
        &config.gcp_region,
        "token-encryption",
    )
    .await?;
    tracing::info!("KMS service initialized");

    let open_humans = OpenHumansClient::new(
        config.sync.open_humans_base.clone(),
        config.open_humans_client_id.clone(),
        config.open_humans_client_secret.clone(),
    );
    let github = GitHubClient::new(
        config.github_client_id.clone(),
        config.github_client_secret.clone(),
    )?;
    let member_service =
        MemberService::new(db.clone(), kms, open_humans.clone(), github.clone());

    // One GitHub budget shared by every sync on this instance
    let rate_limiter = RealmRateLimiter::new();
    rate_limiter.register_realm(
        &config.sync.github_realm,
        config.sync.github_realm_max_requests,
        config.sync.github_realm_timespan,
    );
    tracing::info!(
        realm = %config.sync.github_realm,
        max_requests = config.sync.github_realm_max_requests,
        timespan_secs = config.sync.github_realm_timespan.as_secs(),
        "Rate limit realm registered"
    );

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        member_service,
        open_humans,
        github,
        rate_limiter,
        tasks_service,
    });

    // Build router
    let app = oh_github_uploader::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("oh_github_uploader=debug,info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();
}
