// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Client-side result cache with a short TTL, persisted as a JSON file.
//!
//! The cache also remembers the last submitted lookup so the CLI can offer it
//! as a default.

use crate::models::query::Query;
use crate::models::record::FirearmRecord;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// How long a cached result stays valid.
pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub query: Query,
    pub records: Vec<FirearmRecord>,
    /// When the records were fetched from upstream
    pub fetched_at: String,
    pub stored_at: DateTime<Utc>,
}

/// Summary of one live cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntryStat {
    pub key: String,
    pub age_secs: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub count: usize,
    pub entries: Vec<CacheEntryStat>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryCache {
    #[serde(default)]
    entries: HashMap<String, CacheEntry>,
    #[serde(default)]
    last_query: Option<Query>,
    #[serde(skip, default = "default_ttl")]
    ttl: Duration,
}

fn default_ttl() -> Duration {
    CACHE_TTL
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        Self::with_ttl(CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            last_query: None,
            ttl,
        }
    }

    /// Load a cache file. A missing file yields an empty cache; so does a
    /// corrupt one, after logging a warning.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cache file {}", path.display()))?;

        match serde_json::from_str::<QueryCache>(&raw) {
            Ok(cache) => Ok(cache),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Discarding unreadable cache file");
                Ok(Self::new())
            }
        }
    }

    /// Write the cache to `path`, dropping expired entries first.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.purge_expired_at(Utc::now());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write cache file {}", path.display()))
    }

    /// Live entry for `query`; an expired entry is removed and treated as a miss.
    pub fn get(&mut self, query: &Query) -> Option<&CacheEntry> {
        self.get_at(query, Utc::now())
    }

    pub fn get_at(&mut self, query: &Query, now: DateTime<Utc>) -> Option<&CacheEntry> {
        let key = query.cache_key();
        let expired = self
            .entries
            .get(&key)
            .is_some_and(|entry| self.is_expired(entry, now));

        if expired {
            tracing::debug!(key = %key, "Cache entry expired");
            self.entries.remove(&key);
            return None;
        }

        self.entries.get(&key)
    }

    pub fn put(&mut self, query: &Query, records: Vec<FirearmRecord>, fetched_at: String) {
        self.put_at(query, records, fetched_at, Utc::now());
    }

    pub fn put_at(
        &mut self,
        query: &Query,
        records: Vec<FirearmRecord>,
        fetched_at: String,
        now: DateTime<Utc>,
    ) {
        self.entries.insert(
            query.cache_key(),
            CacheEntry {
                query: query.clone(),
                records,
                fetched_at,
                stored_at: now,
            },
        );
    }

    pub fn remove(&mut self, query: &Query) -> bool {
        self.entries.remove(&query.cache_key()).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> CacheStats {
        let mut entries: Vec<CacheEntryStat> = self
            .entries
            .iter()
            .filter(|(_, entry)| !self.is_expired(entry, now))
            .map(|(key, entry)| CacheEntryStat {
                key: key.clone(),
                age_secs: (now - entry.stored_at).num_seconds(),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        CacheStats {
            count: entries.len(),
            entries,
        }
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired_at(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| !entry_expired(entry, ttl, now));
        before - self.entries.len()
    }

    pub fn last_query(&self) -> Option<&Query> {
        self.last_query.as_ref()
    }

    pub fn set_last_query(&mut self, query: &Query) {
        self.last_query = Some(query.clone());
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        entry_expired(entry, self.ttl, now)
    }
}

/// An entry stamped in the future (clock skew, edited file) counts as expired.
fn entry_expired(entry: &CacheEntry, ttl: Duration, now: DateTime<Utc>) -> bool {
    (now - entry.stored_at)
        .to_std()
        .map_or(true, |age| age > ttl)
}
