// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! In-memory request limiting for the proxy endpoint.
//!
//! State lives only in this process and is lost on restart.

use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::env;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RateLimitConfigError {
    #[error("{name} must be a non-negative integer, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Which limits apply to incoming requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitPolicy {
    /// Fixed window per client only.
    PerClient,
    /// Fixed window per client plus a global cap per UTC day.
    PerClientAndDaily { daily_limit: u32 },
}

impl std::fmt::Display for RateLimitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitPolicy::PerClient => write!(f, "per_client"),
            RateLimitPolicy::PerClientAndDaily { daily_limit } => {
                write!(f, "per_client_and_daily({daily_limit})")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
    pub policy: RateLimitPolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 10,
            policy: RateLimitPolicy::PerClient,
        }
    }
}

impl RateLimitConfig {
    /// Load from `RATE_LIMIT_REQUESTS`, `RATE_LIMIT_WINDOW_MS` and `DAILY_REQUEST_LIMIT`.
    pub fn from_env() -> Result<Self, RateLimitConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, RateLimitConfigError> {
        let defaults = Self::default();

        let max_requests = read_u64(&lookup, "RATE_LIMIT_REQUESTS")?
            .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
            .unwrap_or(defaults.max_requests);
        if max_requests == 0 {
            return Err(RateLimitConfigError::Zero("RATE_LIMIT_REQUESTS"));
        }

        let window = read_u64(&lookup, "RATE_LIMIT_WINDOW_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.window);
        if window.is_zero() {
            return Err(RateLimitConfigError::Zero("RATE_LIMIT_WINDOW_MS"));
        }

        // 0 or unset disables the global cap
        let policy = match read_u64(&lookup, "DAILY_REQUEST_LIMIT")? {
            Some(0) | None => RateLimitPolicy::PerClient,
            Some(limit) => RateLimitPolicy::PerClientAndDaily {
                daily_limit: u32::try_from(limit).unwrap_or(u32::MAX),
            },
        };

        Ok(Self {
            window,
            max_requests,
            policy,
        })
    }
}

fn read_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<u64>, RateLimitConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| RateLimitConfigError::InvalidNumber { name, value: raw }),
    }
}

/// Request counter for one client within the current window.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitWindow {
    pub count: u32,
    pub window_start: Instant,
}

/// Global request counter for one UTC day.
#[derive(Debug, Clone, Copy)]
struct DailyCounter {
    day: NaiveDate,
    count: u32,
}

/// Result of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// The client used up its window
    ClientLimited,
    /// The global daily cap is exhausted
    DailyLimited,
}

/// Fixed-window limiter keyed by client identifier, with an optional daily cap.
///
/// Each check is a read-modify-write under a mutex, so bursts from the same
/// client are never undercounted.
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: Mutex<HashMap<String, RateLimitWindow>>,
    daily: Mutex<DailyCounter>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
            daily: Mutex::new(DailyCounter {
                day: Utc::now().date_naive(),
                count: 0,
            }),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count a request from `client` and decide whether it may proceed.
    pub fn check(&self, client: &str) -> RateDecision {
        self.check_at(client, Instant::now(), Utc::now().date_naive())
    }

    /// [`check`](Self::check) with an explicit clock.
    ///
    /// A request only counts against the limits it passes: client-limited
    /// requests leave the daily counter alone and daily-limited requests leave
    /// the client window alone.
    pub fn check_at(&self, client: &str, now: Instant, today: NaiveDate) -> RateDecision {
        // Lock order is always clients, then daily
        let mut clients = lock(&self.clients);

        if !self.client_has_room(&clients, client, now) {
            return RateDecision::ClientLimited;
        }

        if let RateLimitPolicy::PerClientAndDaily { daily_limit } = self.config.policy {
            if !self.admit_daily(daily_limit, today) {
                return RateDecision::DailyLimited;
            }
        }

        self.count_client(&mut clients, client, now);
        RateDecision::Allowed
    }

    fn window_is_live(&self, window: &RateLimitWindow, now: Instant) -> bool {
        now.duration_since(window.window_start) < self.config.window
    }

    fn client_has_room(
        &self,
        clients: &HashMap<String, RateLimitWindow>,
        client: &str,
        now: Instant,
    ) -> bool {
        clients
            .get(client)
            .filter(|window| self.window_is_live(window, now))
            .is_none_or(|window| window.count < self.config.max_requests)
    }

    fn count_client(
        &self,
        clients: &mut HashMap<String, RateLimitWindow>,
        client: &str,
        now: Instant,
    ) {
        if let Some(window) = clients.get_mut(client) {
            if self.window_is_live(window, now) {
                window.count += 1;
                return;
            }
        }

        clients.insert(
            client.to_string(),
            RateLimitWindow {
                count: 1,
                window_start: now,
            },
        );
    }

    fn admit_daily(&self, daily_limit: u32, today: NaiveDate) -> bool {
        let mut counter = lock(&self.daily);

        if counter.day != today {
            *counter = DailyCounter {
                day: today,
                count: 0,
            };
        }
        if counter.count >= daily_limit {
            return false;
        }
        counter.count += 1;
        true
    }

    /// Drop windows that have fully elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let mut clients = lock(&self.clients);
        let before = clients.len();
        clients.retain(|_, window| self.window_is_live(window, now));
        before - clients.len()
    }

    /// Number of clients with a live window.
    pub fn tracked_clients(&self) -> usize {
        lock(&self.clients).len()
    }
}

// A poisoned lock only means another request panicked mid-update; the counters
// are still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
