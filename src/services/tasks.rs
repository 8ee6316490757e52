// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloud Tasks service for scheduling sync invocations.
//!
//! This service creates Cloud Tasks for:
//! - Syncing one member (immediately, or after a rate-limit delay)
//! - Fanning out a sync for every member on the periodic trigger
//!
//! Uses the official google-cloud-tasks-v2 SDK.

use crate::error::AppError;
use crate::error::Result;
use crate::services::sync::SyncScheduler;
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const MAX_CONCURRENT_TASKS: usize = 100;

/// Task endpoint that runs one sync invocation.
pub const PROCESS_GITHUB_ENDPOINT: &str = "/tasks/process-github";

/// Payload sent to the sync task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessGithubPayload {
    pub oh_id: String,
}

/// Result of a fan-out queue operation.
#[derive(Debug, Clone, Default)]
pub struct FanOutResult {
    /// Number of members successfully queued.
    pub queued: u32,
    /// Number of members that failed to queue.
    pub failed: u32,
    /// Member IDs that failed to queue.
    pub failed_ids: Vec<String>,
}

impl FanOutResult {
    /// Returns true if every member was queued.
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0
    }

    /// Returns true if no member could be queued.
    pub fn is_complete_failure(&self) -> bool {
        self.queued == 0 && self.failed > 0
    }
}

/// Cloud Tasks client wrapper.
#[derive(Clone)]
pub struct TasksService {
    project_id: String,
    location: String,
    queue_name: String,
    /// Shared token presented back to `require_tasks_auth`
    auth_token: String,
    /// Mock: member IDs that should fail when queued (test builds only).
    #[cfg(test)]
    mock_fail_ids: Arc<std::sync::Mutex<std::collections::HashSet<String>>>,
}

impl TasksService {
    pub fn new(project_id: &str, region: &str, auth_token: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            location: region.to_string(),
            queue_name: crate::config::SYNC_QUEUE_NAME.to_string(),
            auth_token: auth_token.to_string(),
            #[cfg(test)]
            mock_fail_ids: Arc::new(std::sync::Mutex::new(std::collections::HashSet::new())),
        }
    }

    /// Set member IDs that should fail when queued (test builds only).
    #[cfg(test)]
    pub fn set_mock_fail_ids<'a>(&self, ids: impl IntoIterator<Item = &'a str>) {
        let mut guard = self.mock_fail_ids.lock().unwrap();
        guard.clear();
        guard.extend(ids.into_iter().map(str::to_string));
    }

    /// Headers attached to every task request.
    ///
    /// Cloud Tasks adds `X-CloudTasks-QueueName` itself; the bearer is the
    /// shared tasks token checked by `require_tasks_auth`.
    pub fn task_headers(&self) -> HashMap<String, String> {
        HashMap::from([
            ("Content-Type".to_string(), "application/json".to_string()),
            (
                "Authorization".to_string(),
                format!("Bearer {}", self.auth_token),
            ),
        ])
    }

    /// Queue a sync invocation for one member, dispatched after `delay`.
    pub async fn queue_sync(
        &self,
        service_url: &str,
        payload: ProcessGithubPayload,
        delay: Duration,
    ) -> Result<()> {
        #[cfg(test)]
        {
            if self.mock_fail_ids.lock().unwrap().contains(&payload.oh_id) {
                tracing::warn!(oh_id = %payload.oh_id, "Mock failure for member");
                return Err(AppError::Internal(anyhow::anyhow!("mock queue failure")));
            }
        }

        self.queue_task(service_url, PROCESS_GITHUB_ENDPOINT, &payload, delay)
            .await
    }

    /// Generic task queuing helper.
    async fn queue_task<T: Serialize>(
        &self,
        service_url: &str,
        endpoint: &str,
        payload: &T,
        delay: Duration,
    ) -> Result<()> {
        use google_cloud_tasks_v2::client::CloudTasks;
        use google_cloud_tasks_v2::model::{HttpRequest, Task};

        let client = CloudTasks::builder()
            .build()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Cloud Tasks client error: {}", e)))?;

        let queue_path = format!(
            "projects/{}/locations/{}/queues/{}",
            self.project_id, self.location, self.queue_name
        );

        let body = serde_json::to_vec(payload)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JSON error: {}", e)))?;

        let http_request = HttpRequest::default()
            .set_url(format!("{}{}", service_url, endpoint))
            .set_http_method("POST")
            .set_body(axum::body::Bytes::from(body))
            .set_headers(self.task_headers());

        let dispatch_at = chrono::Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        let task = Task::default()
            .set_http_request(http_request)
            .set_schedule_time(google_cloud_wkt::Timestamp::clamp(
                dispatch_at.timestamp(),
                0,
            ));

        let _response = client
            .create_task()
            .set_parent(queue_path)
            .set_task(task)
            .send()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Cloud Tasks create error: {}", e)))?;

        Ok(())
    }

    /// Queue an immediate sync for each member.
    pub async fn queue_all(&self, service_url: &str, oh_ids: Vec<String>) -> FanOutResult {
        let count = oh_ids.len();
        let queued = Arc::new(AtomicU64::new(0));
        let failed_ids = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        stream::iter(oh_ids)
            .for_each_concurrent(MAX_CONCURRENT_TASKS, |oh_id| {
                let queued = Arc::clone(&queued);
                let failed_ids = Arc::clone(&failed_ids);
                async move {
                    let payload = ProcessGithubPayload {
                        oh_id: oh_id.clone(),
                    };

                    match self.queue_sync(service_url, payload, Duration::ZERO).await {
                        Ok(()) => {
                            queued.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            tracing::warn!(oh_id = %oh_id, error = ?e, "Failed to queue member sync");
                            failed_ids.lock().await.push(oh_id);
                        }
                    }
                }
            })
            .await;

        let queued = queued.load(Ordering::Relaxed) as u32;
        let failed_ids = std::mem::take(&mut *failed_ids.lock().await);
        let failed = failed_ids.len() as u32;

        tracing::info!(
            requested = count,
            succeeded = queued,
            failed = failed,
            "Queued member syncs"
        );

        FanOutResult {
            queued,
            failed,
            failed_ids,
        }
    }
}

/// Re-invokes a member's sync through the Cloud Tasks queue.
#[derive(Clone)]
pub struct QueuedResync {
    tasks: TasksService,
    service_url: String,
}

impl QueuedResync {
    pub fn new(tasks: TasksService, service_url: String) -> Self {
        Self { tasks, service_url }
    }
}

#[async_trait]
impl SyncScheduler for QueuedResync {
    async fn enqueue_sync(&self, oh_id: &str, delay: Duration) -> Result<()> {
        let payload = ProcessGithubPayload {
            oh_id: oh_id.to_string(),
        };
        self.tasks
            .queue_sync(&self.service_url, payload, delay)
            .await
    }
}
