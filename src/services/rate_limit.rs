// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared request budgets, tracked per named realm.
//!
//! Every sync invocation in this process draws from the same realm budget,
//! so concurrent members cannot together exceed the upstream API limit.

use crate::error::{AppError, Result};
use dashmap::DashMap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Registry of realm budgets, cheap to clone and share.
#[derive(Clone, Default)]
pub struct RealmRateLimiter {
    realms: Arc<DashMap<String, Arc<GovernorRateLimiter>>>,
}

impl RealmRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a realm allowing `max_requests` per `timespan`.
    ///
    /// The full budget is available as a burst; it refills evenly over the
    /// timespan.
    pub fn register_realm(&self, realm: &str, max_requests: u32, timespan: Duration) {
        let max = NonZeroU32::new(max_requests).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(timespan / max.get())
            .unwrap_or_else(|| Quota::per_second(max))
            .allow_burst(max);

        self.realms
            .insert(realm.to_string(), Arc::new(RateLimiter::direct(quota)));

        tracing::info!(realm, max_requests, ?timespan, "Registered rate limit realm");
    }

    /// Take one request from the realm's budget.
    ///
    /// With `wait` the call sleeps until budget is available; otherwise an
    /// exhausted realm fails with [`AppError::RateLimited`].
    pub async fn acquire(&self, realm: &str, wait: bool) -> Result<()> {
        let limiter = self
            .realms
            .get(realm)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!("Unknown rate limit realm: {}", realm))
            })?;

        if wait {
            limiter.until_ready().await;
            return Ok(());
        }

        limiter.check().map_err(|_| {
            tracing::debug!(realm, "Rate limit realm exhausted");
            AppError::rate_limited(realm)
        })
    }
}
