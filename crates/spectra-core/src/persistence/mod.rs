// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends.
//!
//! This module defines the persistence abstraction the handlers run against
//! and the Postgres backend implementation.

pub mod postgres;

#[cfg(test)]
pub(crate) mod mock;

pub use self::postgres::PostgresPersistence;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Campaign, Category, Experience, RemotionRender};
use crate::patch::{CampaignPatch, ExperiencePatch};

/// Persistence interface used by the update and completion handlers.
#[async_trait]
pub trait Persistence: Send + Sync {
    // ========================================================================
    // Experiences
    // ========================================================================

    /// Load one experience.
    async fn experience_by_id(&self, experience_id: &str) -> Result<Experience>;

    /// All experiences under a campaign.
    async fn experiences_by_campaign(&self, campaign_id: &str) -> Result<Vec<Experience>>;

    /// Apply a patch to an experience under a row lock and return the patched
    /// record.
    async fn update_experience(
        &self,
        experience_id: &str,
        patch: &ExperiencePatch,
    ) -> Result<Experience>;

    /// Replace an experience document wholesale.
    async fn replace_experience(&self, experience: &Experience) -> Result<()>;

    // ========================================================================
    // Campaigns
    // ========================================================================

    /// Load one campaign.
    async fn campaign_by_id(&self, campaign_id: &str) -> Result<Campaign>;

    /// Load one campaign by its viewer short code.
    async fn campaign_by_short_code(&self, short_code: &str) -> Result<Campaign>;

    /// Apply a patch to a campaign under a row lock and return the patched
    /// record.
    async fn update_campaign(&self, campaign_id: &str, patch: &CampaignPatch)
    -> Result<Campaign>;

    /// Apply a patch only while the campaign version still matches.
    ///
    /// Returns `None` when the version moved, meaning a concurrent writer won
    /// the publish race.
    async fn update_campaign_if_version(
        &self,
        campaign_id: &str,
        expected_version: i64,
        patch: &CampaignPatch,
    ) -> Result<Option<Campaign>>;

    /// Active categories whose pages list the campaign.
    async fn categories_by_campaign_short_code(&self, short_code: &str) -> Result<Vec<Category>>;

    // ========================================================================
    // Remotion renders
    // ========================================================================

    /// Load one remotion render.
    async fn remotion_render_by_id(&self, render_id: &str) -> Result<RemotionRender>;

    /// Record the outcome of a remotion render.
    async fn update_remotion_render(
        &self,
        render_id: &str,
        status: &str,
        video_url: Option<&str>,
        mask_url: Option<&str>,
    ) -> Result<RemotionRender>;

    // ========================================================================
    // Health
    // ========================================================================

    /// Cheap connectivity probe for startup and liveness checks.
    async fn health_check_db(&self) -> Result<bool>;
}
