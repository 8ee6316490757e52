// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Task handler routes for Cloud Tasks callbacks.
//!
//! These endpoints are called by Cloud Tasks and Cloud Scheduler, not
//! directly by users. They are protected by `require_tasks_auth`.

use crate::error::{AppError, Result};
use crate::services::sync::SyncEngine;
use crate::services::tasks::{ProcessGithubPayload, QueuedResync};
use crate::services::{GitHubFetcher, SyncOutcome};
use crate::AppState;
use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Task handler routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks/process-github", post(process_github))
        .route("/tasks/sync-all", post(sync_all))
}

/// Summary returned by the fan-out trigger.
#[derive(Debug, Serialize)]
pub struct SyncAllResponse {
    pub queued: u32,
    pub failed: u32,
}

/// Base URL of this service, used as the target of re-enqueued tasks.
fn service_url(headers: &HeaderMap) -> String {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost:8080");

    let scheme = if host.contains("localhost") || host.contains("127.0.0.1") {
        "http"
    } else {
        "https"
    };
    format!("{}://{}", scheme, host)
}

/// How a sync task ended.
#[derive(Debug)]
enum TaskOutcome {
    Synced(SyncOutcome),
    /// Member deauthorized since the task was queued.
    MemberGone,
}

/// Map a task result to the status Cloud Tasks sees.
///
/// Completed, rescheduled and unknown-member runs are all 200 so nothing
/// retries them; any other failure is a 500.
fn task_status(oh_id: &str, result: &Result<TaskOutcome>) -> StatusCode {
    match result {
        Ok(TaskOutcome::Synced(SyncOutcome::Completed {
            weeks_fetched,
            records,
        })) => {
            tracing::info!(oh_id, weeks_fetched, records, "GitHub sync completed");
            StatusCode::OK
        }
        Ok(TaskOutcome::Synced(SyncOutcome::Rescheduled {
            weeks_fetched,
            records,
            delay,
        })) => {
            tracing::info!(
                oh_id,
                weeks_fetched,
                records,
                delay_secs = delay.as_secs(),
                "GitHub sync rescheduled"
            );
            StatusCode::OK
        }
        Ok(TaskOutcome::MemberGone) => {
            tracing::warn!(oh_id, "Member not found, skipping sync");
            StatusCode::OK
        }
        Err(e) => {
            tracing::error!(oh_id, error = %e, "GitHub sync failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Load fresh tokens and run the sync engine for one member.
async fn run_sync(state: &AppState, headers: &HeaderMap, oh_id: &str) -> Result<TaskOutcome> {
    let tokens = match state.member_service.fresh_tokens(oh_id).await {
        Ok(t) => t,
        Err(AppError::NotFound(_)) => return Ok(TaskOutcome::MemberGone),
        Err(e) => return Err(e),
    };

    let fetcher = GitHubFetcher::new(
        state.github.clone(),
        state.rate_limiter.clone(),
        tokens.github,
    );
    let scheduler = QueuedResync::new(state.tasks_service.clone(), service_url(headers));
    let engine = SyncEngine::new(
        fetcher,
        state.open_humans.clone(),
        scheduler,
        state.db.clone(),
        state.config.sync.clone(),
    );

    engine
        .sync(oh_id, &tokens.open_humans)
        .await
        .map(TaskOutcome::Synced)
}

/// Run one sync invocation for a member (called by Cloud Tasks).
async fn process_github(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ProcessGithubPayload>,
) -> StatusCode {
    let oh_id = payload.oh_id.as_str();
    tracing::info!(oh_id, "Processing GitHub sync from Cloud Task");

    let result = run_sync(&state, &headers, oh_id).await;
    task_status(oh_id, &result)
}

/// Queue a sync for every known member (periodic trigger).
async fn sync_all(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SyncAllResponse>> {
    let oh_ids = state.db.list_member_ids().await?;
    tracing::info!(count = oh_ids.len(), "Queueing sync for all members");

    let result = state
        .tasks_service
        .queue_all(&service_url(&headers), oh_ids)
        .await;

    if result.is_complete_failure() {
        return Err(AppError::Internal(anyhow::anyhow!(
            "Failed to queue any member sync ({} failures)",
            result.failed
        )));
    }

    Ok(Json(SyncAllResponse {
        queued: result.queued,
        failed: result.failed,
    }))
}
