// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Postgres persistence for campaigns, experiences and renders.
//!
//! Document-shaped fields (asset lists, variant, scene, overlay, mask) live
//! in JSONB columns; fields that queries filter or guard on are typed
//! columns. Patches are applied under a row lock with a single static
//! `UPDATE` whose `SET` clauses coalesce untouched columns, so concurrent
//! writers never clobber fields they did not change.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::error::CoreError;
use crate::model::{Campaign, Category, Experience, RemotionRender, Scan};
use crate::patch::{CampaignPatch, ExperiencePatch, Patch};

use super::Persistence;

/// PostgreSQL-backed persistence implementation.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new Postgres-backed persistence implementation.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(sqlx::FromRow)]
struct ExperienceRow {
    id: String,
    name: String,
    campaign_id: String,
    canvas: Value,
    is_active: bool,
    variant: Value,
    status: String,
    images: Value,
    videos: Value,
    audios: Value,
    three_d_assets: Value,
    qr_code: bool,
    aspect_ratio: f64,
    overlay: Option<Value>,
    mask: Option<Value>,
    scene: Option<Value>,
    template_details: Option<Value>,
    workflow_error: Option<Value>,
    credit_deduct: bool,
    total_task: i32,
    workflow_id: String,
    stitch_workflow_id: String,
    credit_allowance_id: String,
    catalogue_details: Option<Value>,
    video_generation: Option<Value>,
    created_by: Option<Value>,
    edited_by: Option<Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ExperienceRow {
    fn into_experience(self) -> Result<Experience, CoreError> {
        Ok(Experience {
            id: self.id,
            name: self.name,
            campaign_id: self.campaign_id,
            canvas: serde_json::from_value(self.canvas)?,
            is_active: self.is_active,
            variant: serde_json::from_value(self.variant)?,
            status: self.status.parse()?,
            images: serde_json::from_value(self.images)?,
            videos: serde_json::from_value(self.videos)?,
            audios: serde_json::from_value(self.audios)?,
            three_d_assets: serde_json::from_value(self.three_d_assets)?,
            qr_code: self.qr_code,
            aspect_ratio: self.aspect_ratio,
            overlay: self.overlay.map(serde_json::from_value).transpose()?,
            mask: self.mask.map(serde_json::from_value).transpose()?,
            scene: self.scene.map(serde_json::from_value).transpose()?,
            template_details: self
                .template_details
                .map(serde_json::from_value)
                .transpose()?,
            workflow_error: self.workflow_error.map(serde_json::from_value).transpose()?,
            credit_deduct: self.credit_deduct,
            total_task: self.total_task,
            workflow_id: self.workflow_id,
            stitch_workflow_id: self.stitch_workflow_id,
            credit_allowance_id: self.credit_allowance_id,
            catalogue_details: self
                .catalogue_details
                .map(serde_json::from_value)
                .transpose()?,
            video_generation: self
                .video_generation
                .map(serde_json::from_value)
                .transpose()?,
            created_by: self.created_by.map(serde_json::from_value).transpose()?,
            edited_by: self.edited_by.map(serde_json::from_value).transpose()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const EXPERIENCE_COLUMNS: &str = r#"
    id, name, campaign_id, canvas, is_active, variant, status, images, videos,
    audios, three_d_assets, qr_code, aspect_ratio, overlay, mask, scene,
    template_details, workflow_error, credit_deduct, total_task, workflow_id,
    stitch_workflow_id, credit_allowance_id, catalogue_details,
    video_generation, created_by, edited_by, created_at, updated_at
"#;

#[derive(sqlx::FromRow)]
struct CampaignRow {
    id: String,
    client_id: String,
    name: String,
    short_code: String,
    track_type: String,
    scan_text: String,
    scan_image_url: String,
    scan_compressed_image_url: String,
    status: String,
    is_active: bool,
    publish: bool,
    icon_url: String,
    milvus_ref_id: String,
    created_by: Option<Value>,
    edited_by: Option<Value>,
    golive_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CampaignRow {
    fn into_campaign(self) -> Result<Campaign, CoreError> {
        Ok(Campaign {
            id: self.id,
            client_id: self.client_id,
            name: self.name,
            short_code: self.short_code,
            track_type: self.track_type,
            scan: Scan {
                scan_text: self.scan_text,
                image_url: self.scan_image_url,
                compressed_image_url: self.scan_compressed_image_url,
            },
            status: self.status.parse()?,
            is_active: self.is_active,
            publish: self.publish,
            icon_url: self.icon_url,
            milvus_ref_id: self.milvus_ref_id,
            created_by: self.created_by.map(serde_json::from_value).transpose()?,
            edited_by: self.edited_by.map(serde_json::from_value).transpose()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
            expires_at: self.expires_at,
            golive_at: self.golive_at,
            version: self.version,
        })
    }
}

const CAMPAIGN_COLUMNS: &str = r#"
    id, client_id, name, short_code, track_type, scan_text, scan_image_url,
    scan_compressed_image_url, status, is_active, publish, icon_url,
    milvus_ref_id, created_by, edited_by, golive_at, expires_at, version,
    created_at, updated_at
"#;

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: String,
    name: String,
    site_code: String,
}

#[derive(sqlx::FromRow)]
struct RenderRow {
    id: String,
    workflow_id: String,
    user_id: String,
    project_id: String,
    status: String,
    video_url: String,
    mask_url: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RenderRow> for RemotionRender {
    fn from(row: RenderRow) -> Self {
        RemotionRender {
            id: row.id,
            workflow_id: row.workflow_id,
            user_id: row.user_id,
            project_id: row.project_id,
            status: row.status,
            video_url: row.video_url,
            mask_url: row.mask_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// ============================================================================
// Patch bind helpers
// ============================================================================

/// COALESCE bind for a non-nullable column: Keep binds NULL, Clear binds the
/// type's default.
fn set_value<T: Clone + Default>(patch: &Patch<T>) -> Option<T> {
    match patch {
        Patch::Keep => None,
        Patch::Set(value) => Some(value.clone()),
        Patch::Clear => Some(T::default()),
    }
}

fn set_json<T: Clone + Default + serde::Serialize>(
    patch: &Patch<T>,
) -> Result<Option<Value>, CoreError> {
    set_value(patch)
        .map(|v| serde_json::to_value(v))
        .transpose()
        .map_err(CoreError::from)
}

/// Binds for a nullable column: `(clear_flag, value)`.
fn unset_or_json<T: serde::Serialize>(patch: &Patch<T>) -> Result<(bool, Option<Value>), CoreError> {
    match patch {
        Patch::Keep => Ok((false, None)),
        Patch::Set(value) => Ok((false, Some(serde_json::to_value(value)?))),
        Patch::Clear => Ok((true, None)),
    }
}

fn unset_or_time(patch: &Patch<DateTime<Utc>>) -> (bool, Option<DateTime<Utc>>) {
    match patch {
        Patch::Keep => (false, None),
        Patch::Set(value) => (false, Some(*value)),
        Patch::Clear => (true, None),
    }
}

// ============================================================================
// Experience Operations
// ============================================================================

/// Get an experience by ID.
pub async fn get_experience(pool: &PgPool, experience_id: &str) -> Result<Experience, CoreError> {
    let query = format!("SELECT {EXPERIENCE_COLUMNS} FROM experiences WHERE id = $1");
    let row = sqlx::query_as::<_, ExperienceRow>(&query)
        .bind(experience_id)
        .fetch_optional(pool)
        .await?;

    row.ok_or_else(|| CoreError::ExperienceNotFound {
        experience_id: experience_id.to_string(),
    })?
    .into_experience()
}

/// List all experiences under a campaign, oldest first.
pub async fn list_campaign_experiences(
    pool: &PgPool,
    campaign_id: &str,
) -> Result<Vec<Experience>, CoreError> {
    let query = format!(
        "SELECT {EXPERIENCE_COLUMNS} FROM experiences WHERE campaign_id = $1 ORDER BY created_at, id"
    );
    let rows = sqlx::query_as::<_, ExperienceRow>(&query)
        .bind(campaign_id)
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(ExperienceRow::into_experience).collect()
}

/// Apply a patch to an experience under a row lock.
///
/// Returns the patched record. Asset-list columns are recomputed from the
/// locked row; every other column is written only when the patch touches it.
pub async fn update_experience(
    pool: &PgPool,
    experience_id: &str,
    patch: &ExperiencePatch,
) -> Result<Experience, CoreError> {
    let mut tx = pool.begin().await?;

    let query = format!("SELECT {EXPERIENCE_COLUMNS} FROM experiences WHERE id = $1 FOR UPDATE");
    let row = sqlx::query_as::<_, ExperienceRow>(&query)
        .bind(experience_id)
        .fetch_optional(&mut *tx)
        .await?;
    let mut experience = row
        .ok_or_else(|| CoreError::ExperienceNotFound {
            experience_id: experience_id.to_string(),
        })?
        .into_experience()?;

    patch.apply_to(&mut experience);

    let images = (!patch.images.is_empty())
        .then(|| serde_json::to_value(&experience.images))
        .transpose()?;
    let videos = (!patch.videos.is_empty())
        .then(|| serde_json::to_value(&experience.videos))
        .transpose()?;
    let audios = (!patch.audios.is_empty())
        .then(|| serde_json::to_value(&experience.audios))
        .transpose()?;
    let three_d_assets = (!patch.three_d_assets.is_empty())
        .then(|| serde_json::to_value(&experience.three_d_assets))
        .transpose()?;

    let (overlay_clear, overlay) = unset_or_json(&patch.overlay)?;
    let (mask_clear, mask) = unset_or_json(&patch.mask)?;
    let (scene_clear, scene) = unset_or_json(&patch.scene)?;
    let (workflow_error_clear, workflow_error) = unset_or_json(&patch.workflow_error)?;
    let (catalogue_clear, catalogue_details) = unset_or_json(&patch.catalogue_details)?;
    let (video_generation_clear, video_generation) = unset_or_json(&patch.video_generation)?;
    let (edited_by_clear, edited_by) = unset_or_json(&patch.edited_by)?;

    sqlx::query(
        r#"
        UPDATE experiences SET
            status = COALESCE($2, status),
            aspect_ratio = COALESCE($3, aspect_ratio),
            variant = COALESCE($4, variant),
            overlay = CASE WHEN $5 THEN NULL ELSE COALESCE($6, overlay) END,
            mask = CASE WHEN $7 THEN NULL ELSE COALESCE($8, mask) END,
            scene = CASE WHEN $9 THEN NULL ELSE COALESCE($10, scene) END,
            workflow_error = CASE WHEN $11 THEN NULL ELSE COALESCE($12, workflow_error) END,
            total_task = COALESCE($13, total_task),
            workflow_id = COALESCE($14, workflow_id),
            stitch_workflow_id = COALESCE($15, stitch_workflow_id),
            credit_allowance_id = COALESCE($16, credit_allowance_id),
            credit_deduct = COALESCE($17, credit_deduct),
            catalogue_details = CASE WHEN $18 THEN NULL ELSE COALESCE($19, catalogue_details) END,
            video_generation = CASE WHEN $20 THEN NULL ELSE COALESCE($21, video_generation) END,
            edited_by = CASE WHEN $22 THEN NULL ELSE COALESCE($23, edited_by) END,
            images = COALESCE($24, images),
            videos = COALESCE($25, videos),
            audios = COALESCE($26, audios),
            three_d_assets = COALESCE($27, three_d_assets),
            updated_at = COALESCE($28, updated_at),
            name = COALESCE($29, name),
            canvas = COALESCE($30, canvas),
            qr_code = COALESCE($31, qr_code)
        WHERE id = $1
        "#,
    )
    .bind(experience_id)
    .bind(set_value(&patch.status).map(|s| s.as_str().to_string()))
    .bind(set_value(&patch.aspect_ratio))
    .bind(set_json(&patch.variant)?)
    .bind(overlay_clear)
    .bind(overlay)
    .bind(mask_clear)
    .bind(mask)
    .bind(scene_clear)
    .bind(scene)
    .bind(workflow_error_clear)
    .bind(workflow_error)
    .bind(set_value(&patch.total_task))
    .bind(set_value(&patch.workflow_id))
    .bind(set_value(&patch.stitch_workflow_id))
    .bind(set_value(&patch.credit_allowance_id))
    .bind(set_value(&patch.credit_deduct))
    .bind(catalogue_clear)
    .bind(catalogue_details)
    .bind(video_generation_clear)
    .bind(video_generation)
    .bind(edited_by_clear)
    .bind(edited_by)
    .bind(images)
    .bind(videos)
    .bind(audios)
    .bind(three_d_assets)
    .bind(set_value(&patch.updated_at))
    .bind(set_value(&patch.name))
    .bind(set_json(&patch.canvas)?)
    .bind(set_value(&patch.qr_code))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(experience)
}

/// Replace an experience document wholesale.
pub async fn replace_experience(pool: &PgPool, experience: &Experience) -> Result<(), CoreError> {
    let result = sqlx::query(
        r#"
        UPDATE experiences SET
            name = $2, campaign_id = $3, canvas = $4, is_active = $5,
            variant = $6, status = $7, images = $8, videos = $9, audios = $10,
            three_d_assets = $11, qr_code = $12, aspect_ratio = $13,
            overlay = $14, mask = $15, scene = $16, template_details = $17,
            workflow_error = $18, credit_deduct = $19, total_task = $20,
            workflow_id = $21, stitch_workflow_id = $22,
            credit_allowance_id = $23, catalogue_details = $24,
            video_generation = $25, created_by = $26, edited_by = $27,
            updated_at = $28
        WHERE id = $1
        "#,
    )
    .bind(&experience.id)
    .bind(&experience.name)
    .bind(&experience.campaign_id)
    .bind(serde_json::to_value(&experience.canvas)?)
    .bind(experience.is_active)
    .bind(serde_json::to_value(&experience.variant)?)
    .bind(experience.status.as_str())
    .bind(serde_json::to_value(&experience.images)?)
    .bind(serde_json::to_value(&experience.videos)?)
    .bind(serde_json::to_value(&experience.audios)?)
    .bind(serde_json::to_value(&experience.three_d_assets)?)
    .bind(experience.qr_code)
    .bind(experience.aspect_ratio)
    .bind(experience.overlay.as_ref().map(serde_json::to_value).transpose()?)
    .bind(experience.mask.as_ref().map(serde_json::to_value).transpose()?)
    .bind(experience.scene.as_ref().map(serde_json::to_value).transpose()?)
    .bind(
        experience
            .template_details
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?,
    )
    .bind(
        experience
            .workflow_error
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?,
    )
    .bind(experience.credit_deduct)
    .bind(experience.total_task)
    .bind(&experience.workflow_id)
    .bind(&experience.stitch_workflow_id)
    .bind(&experience.credit_allowance_id)
    .bind(
        experience
            .catalogue_details
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?,
    )
    .bind(
        experience
            .video_generation
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?,
    )
    .bind(experience.created_by.as_ref().map(serde_json::to_value).transpose()?)
    .bind(experience.edited_by.as_ref().map(serde_json::to_value).transpose()?)
    .bind(experience.updated_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::ExperienceNotFound {
            experience_id: experience.id.clone(),
        });
    }

    Ok(())
}

// ============================================================================
// Campaign Operations
// ============================================================================

/// Get a campaign by ID.
pub async fn get_campaign(pool: &PgPool, campaign_id: &str) -> Result<Campaign, CoreError> {
    let query = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1");
    let row = sqlx::query_as::<_, CampaignRow>(&query)
        .bind(campaign_id)
        .fetch_optional(pool)
        .await?;

    row.ok_or_else(|| CoreError::CampaignNotFound {
        campaign_id: campaign_id.to_string(),
    })?
    .into_campaign()
}

/// Get a campaign by its viewer short code.
pub async fn get_campaign_by_short_code(
    pool: &PgPool,
    short_code: &str,
) -> Result<Campaign, CoreError> {
    let query = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE short_code = $1");
    let row = sqlx::query_as::<_, CampaignRow>(&query)
        .bind(short_code)
        .fetch_optional(pool)
        .await?;

    row.ok_or_else(|| CoreError::CampaignNotFound {
        campaign_id: short_code.to_string(),
    })?
    .into_campaign()
}

async fn run_campaign_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    campaign_id: &str,
    patch: &CampaignPatch,
) -> Result<(), CoreError> {
    let (golive_clear, golive_at) = unset_or_time(&patch.golive_at);
    let (expires_clear, expires_at) = unset_or_time(&patch.expires_at);
    let (edited_by_clear, edited_by) = unset_or_json(&patch.edited_by)?;

    sqlx::query(
        r#"
        UPDATE campaigns SET
            scan_image_url = COALESCE($2, scan_image_url),
            scan_compressed_image_url = COALESCE($3, scan_compressed_image_url),
            icon_url = COALESCE($4, icon_url),
            milvus_ref_id = COALESCE($5, milvus_ref_id),
            status = COALESCE($6, status),
            publish = COALESCE($7, publish),
            golive_at = CASE WHEN $8 THEN NULL ELSE COALESCE($9, golive_at) END,
            expires_at = CASE WHEN $10 THEN NULL ELSE COALESCE($11, expires_at) END,
            edited_by = CASE WHEN $12 THEN NULL ELSE COALESCE($13, edited_by) END,
            updated_at = COALESCE($14, updated_at),
            version = version + 1
        WHERE id = $1
        "#,
    )
    .bind(campaign_id)
    .bind(set_value(&patch.scan_image_url))
    .bind(set_value(&patch.scan_compressed_image_url))
    .bind(set_value(&patch.icon_url))
    .bind(set_value(&patch.milvus_ref_id))
    .bind(set_value(&patch.status).map(|s| s.as_str().to_string()))
    .bind(set_value(&patch.publish))
    .bind(golive_clear)
    .bind(golive_at)
    .bind(expires_clear)
    .bind(expires_at)
    .bind(edited_by_clear)
    .bind(edited_by)
    .bind(set_value(&patch.updated_at))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Apply a patch to a campaign under a row lock.
pub async fn update_campaign(
    pool: &PgPool,
    campaign_id: &str,
    patch: &CampaignPatch,
) -> Result<Campaign, CoreError> {
    let mut tx = pool.begin().await?;

    let query = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1 FOR UPDATE");
    let row = sqlx::query_as::<_, CampaignRow>(&query)
        .bind(campaign_id)
        .fetch_optional(&mut *tx)
        .await?;
    let mut campaign = row
        .ok_or_else(|| CoreError::CampaignNotFound {
            campaign_id: campaign_id.to_string(),
        })?
        .into_campaign()?;

    patch.apply_to(&mut campaign);
    run_campaign_update(&mut tx, campaign_id, patch).await?;

    tx.commit().await?;

    Ok(campaign)
}

/// Apply a patch only while the campaign version still matches.
///
/// Returns `None` when a concurrent writer moved the version first.
pub async fn update_campaign_if_version(
    pool: &PgPool,
    campaign_id: &str,
    expected_version: i64,
    patch: &CampaignPatch,
) -> Result<Option<Campaign>, CoreError> {
    let mut tx = pool.begin().await?;

    let query = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1 FOR UPDATE");
    let row = sqlx::query_as::<_, CampaignRow>(&query)
        .bind(campaign_id)
        .fetch_optional(&mut *tx)
        .await?;
    let mut campaign = row
        .ok_or_else(|| CoreError::CampaignNotFound {
            campaign_id: campaign_id.to_string(),
        })?
        .into_campaign()?;

    if campaign.version != expected_version {
        return Ok(None);
    }

    patch.apply_to(&mut campaign);
    run_campaign_update(&mut tx, campaign_id, patch).await?;

    tx.commit().await?;

    Ok(Some(campaign))
}

/// Active categories whose pages list the campaign.
pub async fn list_campaign_categories(
    pool: &PgPool,
    short_code: &str,
) -> Result<Vec<Category>, CoreError> {
    let rows = sqlx::query_as::<_, CategoryRow>(
        r#"
        SELECT id, name, site_code
        FROM categories
        WHERE $1 = ANY(campaign_short_codes) AND is_active
        ORDER BY id
        "#,
    )
    .bind(short_code)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Category {
            id: row.id,
            name: row.name,
            site_code: row.site_code,
        })
        .collect())
}

// ============================================================================
// Remotion Render Operations
// ============================================================================

/// Get a remotion render by ID.
pub async fn get_remotion_render(
    pool: &PgPool,
    render_id: &str,
) -> Result<RemotionRender, CoreError> {
    let row = sqlx::query_as::<_, RenderRow>(
        r#"
        SELECT id, workflow_id, user_id, project_id, status, video_url,
               mask_url, created_at, updated_at
        FROM remotion_renders
        WHERE id = $1
        "#,
    )
    .bind(render_id)
    .fetch_optional(pool)
    .await?;

    row.map(RemotionRender::from)
        .ok_or_else(|| CoreError::RenderNotFound {
            render_id: render_id.to_string(),
        })
}

/// Record the outcome of a remotion render.
pub async fn update_remotion_render(
    pool: &PgPool,
    render_id: &str,
    status: &str,
    video_url: Option<&str>,
    mask_url: Option<&str>,
) -> Result<RemotionRender, CoreError> {
    let result = sqlx::query(
        r#"
        UPDATE remotion_renders SET
            status = $2,
            video_url = COALESCE($3, video_url),
            mask_url = COALESCE($4, mask_url),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(render_id)
    .bind(status)
    .bind(video_url)
    .bind(mask_url)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::RenderNotFound {
            render_id: render_id.to_string(),
        });
    }

    get_remotion_render(pool, render_id).await
}

/// Check database health.
pub async fn health_check_db(pool: &PgPool) -> Result<bool, CoreError> {
    let result: Result<(i32,), _> = sqlx::query_as("SELECT 1").fetch_one(pool).await;
    Ok(result.is_ok())
}

// ============================================================================
// Trait Implementation
// ============================================================================

#[async_trait::async_trait]
impl Persistence for PostgresPersistence {
    async fn experience_by_id(&self, experience_id: &str) -> Result<Experience, CoreError> {
        get_experience(&self.pool, experience_id).await
    }

    async fn experiences_by_campaign(
        &self,
        campaign_id: &str,
    ) -> Result<Vec<Experience>, CoreError> {
        list_campaign_experiences(&self.pool, campaign_id).await
    }

    async fn update_experience(
        &self,
        experience_id: &str,
        patch: &ExperiencePatch,
    ) -> Result<Experience, CoreError> {
        update_experience(&self.pool, experience_id, patch).await
    }

    async fn replace_experience(&self, experience: &Experience) -> Result<(), CoreError> {
        replace_experience(&self.pool, experience).await
    }

    async fn campaign_by_id(&self, campaign_id: &str) -> Result<Campaign, CoreError> {
        get_campaign(&self.pool, campaign_id).await
    }

    async fn campaign_by_short_code(&self, short_code: &str) -> Result<Campaign, CoreError> {
        get_campaign_by_short_code(&self.pool, short_code).await
    }

    async fn update_campaign(
        &self,
        campaign_id: &str,
        patch: &CampaignPatch,
    ) -> Result<Campaign, CoreError> {
        update_campaign(&self.pool, campaign_id, patch).await
    }

    async fn update_campaign_if_version(
        &self,
        campaign_id: &str,
        expected_version: i64,
        patch: &CampaignPatch,
    ) -> Result<Option<Campaign>, CoreError> {
        update_campaign_if_version(&self.pool, campaign_id, expected_version, patch).await
    }

    async fn categories_by_campaign_short_code(
        &self,
        short_code: &str,
    ) -> Result<Vec<Category>, CoreError> {
        list_campaign_categories(&self.pool, short_code).await
    }

    async fn remotion_render_by_id(&self, render_id: &str) -> Result<RemotionRender, CoreError> {
        get_remotion_render(&self.pool, render_id).await
    }

    async fn update_remotion_render(
        &self,
        render_id: &str,
        status: &str,
        video_url: Option<&str>,
        mask_url: Option<&str>,
    ) -> Result<RemotionRender, CoreError> {
        update_remotion_render(&self.pool, render_id, status, video_url, mask_url).await
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        health_check_db(&self.pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ExperienceStatus;
    use uuid::Uuid;

    static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

    // Helper to get a test database pool
    async fn test_pool() -> Option<PgPool> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = PgPool::connect(&url).await.ok()?;
        MIGRATOR.run(&pool).await.ok()?;
        Some(pool)
    }

    async fn create_test_campaign(pool: &PgPool, campaign_id: &str, short_code: &str) {
        sqlx::query(
            r#"
            INSERT INTO campaigns (id, short_code, name, status)
            VALUES ($1, $2, 'test campaign', 'CREATED')
            "#,
        )
        .bind(campaign_id)
        .bind(short_code)
        .execute(pool)
        .await
        .expect("Failed to create test campaign");
    }

    async fn create_test_experience(pool: &PgPool, experience_id: &str, campaign_id: &str) {
        sqlx::query(
            r#"
            INSERT INTO experiences (id, campaign_id, status, aspect_ratio)
            VALUES ($1, $2, 'DRAFT', 1.5)
            "#,
        )
        .bind(experience_id)
        .bind(campaign_id)
        .execute(pool)
        .await
        .expect("Failed to create test experience");
    }

    async fn cleanup(pool: &PgPool, experience_id: &str, campaign_id: &str) {
        sqlx::query("DELETE FROM experiences WHERE id = $1")
            .bind(experience_id)
            .execute(pool)
            .await
            .ok();
        sqlx::query("DELETE FROM campaigns WHERE id = $1")
            .bind(campaign_id)
            .execute(pool)
            .await
            .ok();
    }

    #[tokio::test]
    async fn test_patch_updates_only_touched_columns() {
        let Some(pool) = test_pool().await else {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        };

        let experience_id = Uuid::new_v4().to_string();
        let campaign_id = Uuid::new_v4().to_string();
        let short_code = Uuid::new_v4().to_string();
        create_test_campaign(&pool, &campaign_id, &short_code).await;
        create_test_experience(&pool, &experience_id, &campaign_id).await;

        let patch = ExperiencePatch {
            status: Patch::Set(ExperienceStatus::Processing),
            workflow_id: Patch::Set("wf-1".to_string()),
            ..ExperiencePatch::default()
        };
        let updated = update_experience(&pool, &experience_id, &patch)
            .await
            .unwrap();
        assert_eq!(updated.status, ExperienceStatus::Processing);
        assert_eq!(updated.workflow_id, "wf-1");

        let stored = get_experience(&pool, &experience_id).await.unwrap();
        assert_eq!(stored.status, ExperienceStatus::Processing);
        // Untouched column keeps its seeded value.
        assert_eq!(stored.aspect_ratio, 1.5);

        cleanup(&pool, &experience_id, &campaign_id).await;
    }

    #[tokio::test]
    async fn test_version_guard_rejects_stale_writer() {
        let Some(pool) = test_pool().await else {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        };

        let campaign_id = Uuid::new_v4().to_string();
        let short_code = Uuid::new_v4().to_string();
        create_test_campaign(&pool, &campaign_id, &short_code).await;

        let campaign = get_campaign(&pool, &campaign_id).await.unwrap();
        let patch = CampaignPatch {
            publish: Patch::Set(true),
            ..CampaignPatch::default()
        };

        let stale = update_campaign_if_version(&pool, &campaign_id, campaign.version + 7, &patch)
            .await
            .unwrap();
        assert!(stale.is_none());

        let won = update_campaign_if_version(&pool, &campaign_id, campaign.version, &patch)
            .await
            .unwrap();
        let won = won.expect("matching version applies");
        assert!(won.publish);
        assert_eq!(won.version, campaign.version + 1);

        cleanup(&pool, "none", &campaign_id).await;
    }

    #[tokio::test]
    async fn test_missing_experience_is_not_found() {
        let Some(pool) = test_pool().await else {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        };

        let result = get_experience(&pool, "does-not-exist").await;
        assert!(matches!(
            result,
            Err(CoreError::ExperienceNotFound { .. })
        ));
    }
}
