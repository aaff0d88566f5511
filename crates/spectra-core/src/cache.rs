// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Read-side experience cache.
//!
//! Viewer-facing experience lists are cached in Redis under one key per
//! campaign short code and one per category site code. Writers never patch
//! an entry in place: any change to a campaign expires the affected keys and
//! the next read repopulates them.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::Experience;

const KEY_PREFIX: &str = "spectra-campaign";
/// Entries live a week; each read pushes the window forward.
const CACHE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Cache key families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKey<'a> {
    /// Experience list of one campaign, keyed by short code.
    Campaign(&'a str),
    /// Merged experience list of a category page, keyed by site code.
    Category(&'a str),
}

impl CacheKey<'_> {
    fn render(self) -> String {
        match self {
            CacheKey::Campaign(short_code) => {
                format!("{KEY_PREFIX}:campaign:{short_code}:experiences")
            }
            CacheKey::Category(site_code) => {
                format!("{KEY_PREFIX}:category:{site_code}:experiences")
            }
        }
    }
}

/// Redis-backed experience cache.
#[derive(Clone)]
pub struct ExperienceCache {
    conn: ConnectionManager,
}

impl ExperienceCache {
    /// Connects to Redis at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Stores an experience list under `key` with a fresh TTL.
    pub async fn store(&self, key: CacheKey<'_>, experiences: &[Experience]) -> Result<()> {
        let payload = serde_json::to_string(experiences)?;
        let key = key.render();
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(&key, payload, CACHE_TTL_SECS)
            .await?;
        debug!(key, count = experiences.len(), "cached experience list");
        Ok(())
    }

    /// Fetches the experience list under `key`, refreshing the TTL on a hit.
    pub async fn fetch(&self, key: CacheKey<'_>) -> Result<Option<Vec<Experience>>> {
        let key = key.render();
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(&key).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        // A failed TTL refresh does not fail the read.
        if let Err(e) = conn.expire::<_, ()>(&key, CACHE_TTL_SECS as i64).await {
            warn!(key, error = %e, "could not refresh cache ttl");
        }
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Drops the entry under `key` by expiring it immediately.
    pub async fn expire(&self, key: CacheKey<'_>) -> Result<()> {
        let key = key.render();
        debug!(key, "expiring cache entry");
        let mut conn = self.conn.clone();
        conn.expire::<_, ()>(&key, 0).await?;
        Ok(())
    }
}
