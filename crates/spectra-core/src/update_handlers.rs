// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Caller-facing update handlers for spectra-core.
//!
//! These handlers apply editor mutations to experience and campaign
//! documents: asset updates, segment edits, manual publish, reset and worker
//! stream postbacks. Every mutation is assembled into a single
//! [`ExperiencePatch`] so the derived-asset invalidation rules live in one
//! place, then the follow-up workflow is built and submitted when the update
//! re-enters the processing pipeline.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::assets::{
    kinds, AssetSet, IMAGE_DERIVED_KINDS, MASK_DERIVED_KINDS, SPAWN_DERIVED_KINDS, SPAWN_KINDS,
    VIDEO_DERIVED_KINDS,
};
use crate::bus::TaskBus;
use crate::credit::CreditLedger;
use crate::effects::{SideEffect, SideEffects};
use crate::error::{CoreError, Result};
use crate::model::{
    Campaign, Canvas, Experience, Overlay, Scene, Segments, ThreeDCoordinates, User, Variant,
    DEFAULT_IOS_CANVAS, OVERLAY_TRANSPARENT,
};
use crate::patch::{CampaignPatch, ExperiencePatch, Patch};
use crate::persistence::Persistence;
use crate::plan::PlanService;
use crate::splicer::{splice_segments, SegmentData};
use crate::status::{status_after_asset_update, ExperienceStatus, GROUND_VARIANT_CLASS};
use crate::tasks::{build_experience_workflow, MediaProcess};

/// Shared state for update handlers.
pub struct UpdateHandlerState {
    /// Document store.
    pub persistence: Arc<dyn Persistence>,
    /// Workflow submission bus.
    pub task_bus: Arc<dyn TaskBus>,
    /// Credit escrow ledger.
    pub credit: Arc<dyn CreditLedger>,
    /// Plan lookups for campaign expiry.
    pub plan: Arc<dyn PlanService>,
    /// Bounded queue for cache drops and notifications.
    pub effects: SideEffects,
}

impl UpdateHandlerState {
    /// Create a new update handler state.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        task_bus: Arc<dyn TaskBus>,
        credit: Arc<dyn CreditLedger>,
        plan: Arc<dyn PlanService>,
        effects: SideEffects,
    ) -> Self {
        Self {
            persistence,
            task_bus,
            credit,
            plan,
            effects,
        }
    }
}

// ============================================================================
// Experience update
// ============================================================================

/// One editor mutation against an experience.
///
/// Absent fields leave the stored value alone. A URL equal to the stored
/// entry of the same kind is dropped before the patch is assembled, so
/// re-saving an unchanged form never invalidates derived assets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateExperienceRequest {
    /// Target experience.
    pub experience_id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Requested status; defaults by the asset rules when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ExperienceStatus>,
    /// Whole-variant replacement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
    /// Segmented-edit payload, spliced against the stored markers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_data: Option<SegmentData>,
    /// New trigger image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Pre-crop source the trigger image was cut from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_input_url: Option<String>,
    /// Listing thumbnail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_image_url: Option<String>,
    /// Subject cut-out for ground placements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub masked_photo_url: Option<String>,
    /// Spawn placement image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn_image: Option<String>,
    /// New source video.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    /// Alpha mask video.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_url: Option<String>,
    /// Flat playback rendition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback_url: Option<String>,
    /// WebM rendition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webm_url: Option<String>,
    /// Soundtrack.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    /// GLB model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glb: Option<String>,
    /// USDZ model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usdz: Option<String>,
    /// OBJ model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obj: Option<String>,
    /// Blender project file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blend_file: Option<String>,
    /// Model texture file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture_file: Option<String>,
    /// Background overlay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<Overlay>,
    /// Parallax scene.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<Scene>,
    /// Render canvas dimensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas: Option<Canvas>,
    /// QR panel flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<bool>,
    /// Editing user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_by: Option<User>,
    /// Empty the image list. Draft only.
    #[serde(default)]
    pub delete_image: bool,
    /// Empty the video list. Draft only; conflicts with `video_url`.
    #[serde(default)]
    pub delete_video: bool,
    /// Drop the mask video and every rendition derived with it. Conflicts
    /// with `mask_url`.
    #[serde(default)]
    pub delete_mask: bool,
    /// Drop the spawn image and its compressed form. Conflicts with
    /// `spawn_image`.
    #[serde(default)]
    pub delete_spawn: bool,
    /// Drop the texture file.
    #[serde(default)]
    pub delete_texture: bool,
    /// Drop the OBJ model.
    #[serde(default)]
    pub delete_obj: bool,
    /// Drop the GLB model.
    #[serde(default)]
    pub delete_glb: bool,
    /// Drop the USDZ model.
    #[serde(default)]
    pub delete_usdz: bool,
    /// Drop the Blender project file.
    #[serde(default)]
    pub delete_blend: bool,
    /// Whether the campaign publishes when the submitted workflow completes.
    #[serde(default)]
    pub publish: bool,
}

/// Outcome of an experience update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateExperienceResponse {
    /// Experience after the patch (and workflow stamps, if any) landed.
    pub experience: Experience,
    /// Owning campaign short code.
    pub short_code: String,
    /// Workflow submitted for this update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    /// Stitch workflow submitted alongside.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stitch_workflow_id: Option<String>,
    /// Weighted task total recorded on the experience.
    #[serde(default)]
    pub total_tasks: i32,
}

/// Returns the URL only when it differs from the stored entry of `kind`.
fn fresh_url<'a>(candidate: Option<&'a str>, stored: &AssetSet, kind: &str) -> Option<&'a str> {
    let candidate = candidate?;
    if stored.url_of(kind) == Some(candidate) {
        None
    } else {
        Some(candidate)
    }
}

/// Handle an editor mutation against an experience.
///
/// Assembles the asset/scalar patch, persists it, unpublishes the campaign
/// when the status moved, then builds and submits the follow-up workflow when
/// the update re-entered the pipeline.
///
/// # Errors
///
/// - [`CoreError::AssetDeleteNotAllowed`] when a whole-list delete is
///   requested outside `DRAFT`
/// - [`CoreError::ConflictingUpdate`] when a delete flag and a fresh URL for
///   the same asset arrive in one request
#[instrument(skip(state, request), fields(experience_id = %request.experience_id))]
pub async fn handle_update_experience(
    state: &UpdateHandlerState,
    request: UpdateExperienceRequest,
) -> Result<UpdateExperienceResponse> {
    // 1. Load the experience; the whole patch is computed against this
    //    snapshot.
    let experience = state
        .persistence
        .experience_by_id(&request.experience_id)
        .await?;

    // 2. Resolve the status this update drives toward. Ground variants ship
    //    pre-processed media and land directly in PROCESSED; everything else
    //    re-enters the pipeline. A FAILED or TIMED_OUT experience is forced
    //    back even when the caller did not ask for a status.
    let effective_class = request
        .variant
        .as_ref()
        .map(|v| v.class)
        .unwrap_or(experience.variant.class);
    let target_status = request
        .status
        .unwrap_or_else(|| status_after_asset_update(Some(effective_class)));
    let mut touch_status =
        request.status.is_some() || experience.status.forces_reprocessing();

    let mut patch = ExperiencePatch::default();

    // 3. Segment splice. Buttons and markers are diffed against the stored
    //    ones; the variant is then replaced wholesale with the splice result.
    let mut segment_changes = None;
    let mut variant_update = request.variant.clone();
    if let (Some(variant), Some(data)) = (variant_update.as_mut(), request.segment_data.as_ref()) {
        if !data.button_segments.is_empty() {
            let (buttons, markers, changes) = splice_segments(&experience, data);
            let first_marker = markers.first().map(|m| m.id.clone());
            match variant.segments.as_mut() {
                Some(segments) => {
                    segments.markers = markers;
                    if let Some(id) = first_marker {
                        segments.default = id;
                    }
                    segments.use_segmented_elements = data.use_segmented_element;
                }
                None => {
                    variant.segments = Some(Segments {
                        back_color: "#FFFFFF".to_string(),
                        flush_color: "#000000".to_string(),
                        default: first_marker.unwrap_or_default(),
                        use_marker_video: false,
                        use_segmented_elements: data.use_segmented_element,
                        markers,
                    });
                }
            }
            if changes.process_stitch_video {
                // The composite is rebuilt from scratch, so every stored
                // rendition is stale.
                if let Some(segments) = variant.segments.as_mut() {
                    segments.use_marker_video = true;
                }
                patch.videos.clear_all();
            }
            variant.buttons = buttons;
            if changes.has_asset_changes() {
                touch_status = true;
            }
            segment_changes = Some(changes);
        }
    }
    if let Some(variant) = variant_update.clone() {
        patch.variant = Patch::Set(variant);
    }

    // 4. Asset deletes. Whole-list deletes are draft-only; a delete flag
    //    conflicting with a fresh URL for the same asset rejects the request.
    if request.delete_image {
        if !experience.status.allows_asset_delete() {
            return Err(CoreError::AssetDeleteNotAllowed {
                experience_id: request.experience_id.clone(),
                status: experience.status.to_string(),
            });
        }
        patch.images.clear_all();
    }
    if request.delete_spawn {
        if request.spawn_image.is_some() {
            return Err(CoreError::ConflictingUpdate {
                field: "delete_spawn".to_string(),
                message: "spawn_image supplied in the same update".to_string(),
            });
        }
        patch.images.pull_all(SPAWN_KINDS);
    }
    if request.delete_mask {
        if request.mask_url.is_some() {
            return Err(CoreError::ConflictingUpdate {
                field: "delete_mask".to_string(),
                message: "mask_url supplied in the same update".to_string(),
            });
        }
        patch.videos.pull_all(VIDEO_DERIVED_KINDS);
        touch_status = true;
    }
    if request.delete_video {
        if !experience.status.allows_asset_delete() {
            return Err(CoreError::AssetDeleteNotAllowed {
                experience_id: request.experience_id.clone(),
                status: experience.status.to_string(),
            });
        }
        if request.video_url.is_some() {
            return Err(CoreError::ConflictingUpdate {
                field: "delete_video".to_string(),
                message: "video_url supplied in the same update".to_string(),
            });
        }
        patch.videos.clear_all();
    }
    if request.delete_texture {
        patch.three_d_assets.pull(kinds::TEXTURE_FILE);
    }
    if request.delete_obj {
        patch.three_d_assets.pull(kinds::ORIGINAL_OBJ);
    }
    if request.delete_glb {
        patch.three_d_assets.pull(kinds::ORIGINAL_GLB);
    }
    if request.delete_usdz {
        patch.three_d_assets.pull(kinds::ORIGINAL_USDZ);
    }
    if request.delete_blend {
        patch.three_d_assets.pull(kinds::BLEND_FILE);
    }

    // 5. No-op elision: a URL matching the stored entry of its kind is
    //    dropped so it neither marks the status nor invalidates anything.
    let image_url = fresh_url(request.image_url.as_deref(), &experience.images, kinds::ORIGINAL);
    let original_input_url = fresh_url(
        request.original_input_url.as_deref(),
        &experience.images,
        kinds::ORIGINAL_INPUT,
    );
    let spawn_image = fresh_url(request.spawn_image.as_deref(), &experience.images, kinds::SPAWN);
    let video_url = fresh_url(request.video_url.as_deref(), &experience.videos, kinds::ORIGINAL);
    let mask_url = fresh_url(request.mask_url.as_deref(), &experience.videos, kinds::MASK);
    let webm_url = fresh_url(request.webm_url.as_deref(), &experience.videos, kinds::WEBM);

    // 6. Image merges. A fresh trigger image invalidates every derived image
    //    kind plus the overlay rendition and the stored scan mask.
    if let Some(url) = image_url {
        patch.images.upsert(kinds::ORIGINAL, url);
        touch_status = true;
        if !experience.images.is_empty() {
            patch.images.pull_all(IMAGE_DERIVED_KINDS);
        }
        if experience.mask.is_some() {
            patch.mask = Patch::Clear;
        }
    }
    if let Some(url) = spawn_image {
        patch.images.upsert(kinds::SPAWN, url);
        patch.images.pull_all(SPAWN_DERIVED_KINDS);
        touch_status = true;
    }
    if let Some(url) = original_input_url {
        patch.images.upsert(kinds::ORIGINAL_INPUT, url);
    }
    if let Some(url) = request.feature_image_url.as_deref() {
        patch.images.upsert(kinds::FEATURE_IMAGE, url);
    }
    if let Some(url) = request.masked_photo_url.as_deref() {
        patch.images.upsert(kinds::MASKED_PHOTO, url);
    }

    // 7. Video merges, same invalidation shape. A fresh mask keeps the
    //    original but stales everything cut with the old mask.
    if let Some(url) = video_url {
        patch.videos.upsert(kinds::ORIGINAL, url);
        touch_status = true;
        if !experience.videos.is_empty() {
            patch.videos.pull_all(VIDEO_DERIVED_KINDS);
        }
    }
    if let Some(url) = mask_url {
        patch.videos.upsert(kinds::MASK, url);
        touch_status = true;
        if !experience.videos.is_empty() {
            patch.videos.pull_all(MASK_DERIVED_KINDS);
        }
    }
    if let Some(url) = webm_url {
        patch.videos.upsert(kinds::WEBM, url);
    }
    if let Some(url) = request.playback_url.as_deref() {
        patch.videos.upsert(kinds::PLAYBACK, url);
        touch_status = true;
    }
    if let Some(url) = request.audio_url.as_deref() {
        patch.audios.upsert(kinds::ORIGINAL, url);
    }
    if let Some(url) = request.glb.as_deref() {
        patch.three_d_assets.upsert(kinds::ORIGINAL_GLB, url);
    }
    if let Some(url) = request.usdz.as_deref() {
        patch.three_d_assets.upsert(kinds::ORIGINAL_USDZ, url);
    }
    if let Some(url) = request.obj.as_deref() {
        patch.three_d_assets.upsert(kinds::ORIGINAL_OBJ, url);
    }
    if let Some(url) = request.blend_file.as_deref() {
        patch.three_d_assets.upsert(kinds::BLEND_FILE, url);
    }
    if let Some(url) = request.texture_file.as_deref() {
        patch.three_d_assets.upsert(kinds::TEXTURE_FILE, url);
    }

    // 8. Overlay. A caller-supplied overlay replaces the stored one and
    //    marks the status unless it renders nothing; a fresh trigger image
    //    clears the stale compressed rendition either way.
    if let Some(overlay) = request.overlay.as_ref() {
        if overlay.overlay_type != OVERLAY_TRANSPARENT {
            touch_status = true;
        }
        patch.overlay = Patch::Set(overlay.clone());
    }
    if image_url.is_some() && experience.overlay.is_some() {
        let mut overlay = request
            .overlay
            .clone()
            .or_else(|| experience.overlay.clone())
            .unwrap_or_default();
        overlay.compressed_image = String::new();
        patch.overlay = Patch::Set(overlay);
    }

    // 9. A non-ground variant has no use for the subject cut-out.
    if let Some(variant) = variant_update.as_ref() {
        if variant.class != GROUND_VARIANT_CLASS {
            patch.images.pull(kinds::MASKED_PHOTO);
        }
    }

    // 10. Plain scalars.
    if let Some(name) = request.name {
        patch.name = Patch::Set(name);
    }
    if let Some(qr_code) = request.qr_code {
        patch.qr_code = Patch::Set(qr_code);
    }
    if let Some(canvas) = request.canvas {
        patch.canvas = Patch::Set(canvas);
    }
    if let Some(scene) = request.scene {
        patch.scene = Patch::Set(scene);
    }
    if let Some(user) = request.edited_by {
        patch.edited_by = Patch::Set(user);
    }

    // 11. Status, error reset, timestamp. A caller update always clears a
    //     previous terminal failure record.
    if touch_status {
        patch.status = Patch::Set(target_status);
    }
    patch.workflow_error = Patch::Clear;
    patch.updated_at = Patch::Set(Utc::now());

    let mut updated = state
        .persistence
        .update_experience(&request.experience_id, &patch)
        .await?;

    // 12. Touch the campaign; a status move always unpublishes it until the
    //     new generation completes.
    let mut campaign_patch = CampaignPatch {
        updated_at: Patch::Set(Utc::now()),
        ..Default::default()
    };
    if !patch.status.is_keep() {
        campaign_patch.publish = Patch::Set(false);
    }
    let campaign = state
        .persistence
        .update_campaign(&updated.campaign_id, &campaign_patch)
        .await?;

    // 13. Build and submit the follow-up workflow when the update re-entered
    //     the pipeline, then stamp the new generation on the experience.
    let mut workflow_id = None;
    let mut stitch_workflow_id = None;
    let mut total_tasks = 0;
    if matches!(patch.status.as_set(), Some(ExperienceStatus::Processing)) {
        let process = MediaProcess {
            experience: updated.clone(),
            short_code: campaign.short_code.clone(),
            is_edited: true,
            publish: request.publish,
            name: campaign.name.clone(),
            created_by: campaign.created_by.clone(),
            client_id: campaign.client_id.clone(),
            ..Default::default()
        };
        if let Some(plan) = build_experience_workflow(&process, segment_changes.as_ref()) {
            state.task_bus.submit(&plan.workflow).await?;
            if let Some(stitch) = &plan.stitch_workflow {
                state.task_bus.submit(stitch).await?;
            }
            let stitch_id = plan
                .stitch_workflow
                .as_ref()
                .map(|w| w.id.clone())
                .unwrap_or_default();
            updated = handle_record_workflow(
                state,
                &updated.id,
                &plan.workflow.id,
                &stitch_id,
                plan.total_tasks,
            )
            .await?;
            info!(
                workflow_id = %plan.workflow.id,
                stitch_workflow_id = %stitch_id,
                total_tasks = plan.total_tasks,
                "workflow submitted for updated experience"
            );
            workflow_id = Some(plan.workflow.id.clone());
            stitch_workflow_id = plan.stitch_workflow.as_ref().map(|w| w.id.clone());
            total_tasks = plan.total_tasks;
        }
    }

    // 14. Viewers must not keep serving the pre-update snapshot.
    state.effects.enqueue(SideEffect::InvalidateCampaignCache {
        short_code: campaign.short_code.clone(),
    });

    Ok(UpdateExperienceResponse {
        experience: updated,
        short_code: campaign.short_code,
        workflow_id,
        stitch_workflow_id,
        total_tasks,
    })
}

// ============================================================================
// Workflow data recording
// ============================================================================

/// Stamp a freshly submitted workflow generation on the experience.
///
/// `stitch_workflow_id` is only written when non-empty so a plain update does
/// not erase the correlation of an in-flight stitch.
#[instrument(skip(state))]
pub async fn handle_record_workflow(
    state: &UpdateHandlerState,
    experience_id: &str,
    workflow_id: &str,
    stitch_workflow_id: &str,
    total_tasks: i32,
) -> Result<Experience> {
    let patch = ExperiencePatch {
        workflow_id: Patch::Set(workflow_id.to_string()),
        stitch_workflow_id: if stitch_workflow_id.is_empty() {
            Patch::Keep
        } else {
            Patch::Set(stitch_workflow_id.to_string())
        },
        total_task: Patch::Set(total_tasks),
        ..Default::default()
    };
    state.persistence.update_experience(experience_id, &patch).await
}

// ============================================================================
// Manual campaign publish
// ============================================================================

/// A manual publish of a campaign by an editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishCampaignRequest {
    /// Target campaign.
    pub campaign_id: String,
    /// Publishing user; credit consumption and notifications are attributed
    /// to them.
    pub edited_by: User,
}

/// Handle a manual campaign publish.
///
/// Consumes one publishing credit unless a sibling experience already did,
/// then flips the campaign live. Returns whether a credit was consumed by
/// this call.
///
/// The consume failure path releases the reservation before surfacing the
/// error; a failed release is logged and left for the ledger's escrow sweep.
#[instrument(skip(state, request), fields(campaign_id = %request.campaign_id))]
pub async fn handle_publish_campaign(
    state: &UpdateHandlerState,
    request: PublishCampaignRequest,
) -> Result<bool> {
    // 1. Load the campaign and its experiences.
    let campaign = state
        .persistence
        .campaign_by_id(&request.campaign_id)
        .await?;
    let experiences = state
        .persistence
        .experiences_by_campaign(&request.campaign_id)
        .await?;
    let experience = experiences
        .first()
        .ok_or_else(|| CoreError::ValidationError {
            field: "campaign_id".to_string(),
            message: "campaign has no experiences".to_string(),
        })?;

    // 2. Consume a credit unless a sibling already paid for this campaign.
    let already_paid = experiences.iter().any(|e| e.credit_deduct);
    let mut receipt = None;
    if !already_paid {
        let credit_type = experience
            .credit_type()
            .ok_or_else(|| CoreError::ValidationError {
                field: "credit_type".to_string(),
                message: "cannot publish this experience, credit type not found".to_string(),
            })?
            .to_string();

        let allowance_id = state
            .credit
            .reserve(&campaign.client_id, &credit_type)
            .await?;
        match state
            .credit
            .consume(
                &campaign.short_code,
                &campaign.name,
                &allowance_id,
                &request.edited_by.id,
            )
            .await
        {
            Ok(r) => receipt = Some(r),
            Err(consume_err) => {
                if let Err(e) = state
                    .credit
                    .release(&campaign.client_id, &credit_type, &allowance_id)
                    .await
                {
                    warn!(allowance_id = %allowance_id, "failed to release reservation: {}", e);
                }
                info!(campaign_id = %campaign.id, "publish rejected, credit not consumed");
                return Err(consume_err);
            }
        }

        // 3. Stamp the consumption on the experience that carries it.
        let stamp = ExperiencePatch {
            credit_allowance_id: Patch::Set(allowance_id),
            credit_deduct: Patch::Set(true),
            updated_at: Patch::Set(Utc::now()),
            ..Default::default()
        };
        state
            .persistence
            .update_experience(&experience.id, &stamp)
            .await?;
    }

    // 4. Flip the campaign live. A first-paid publish also stamps the go-live
    //    window from the owner's plan; a plan lookup failure aborts before
    //    anything is published.
    let mut campaign_patch = CampaignPatch {
        publish: Patch::Set(true),
        updated_at: Patch::Set(Utc::now()),
        ..Default::default()
    };
    if receipt.is_some() {
        let owner_id = experience
            .created_by
            .as_ref()
            .map(|u| u.id.as_str())
            .unwrap_or_default();
        let expiry = state.plan.campaign_expiry(owner_id).await?;
        campaign_patch.golive_at = Patch::Set(Utc::now());
        campaign_patch.expires_at = Patch::Set(expiry.expires_at);
    }
    let published = state
        .persistence
        .update_campaign(&campaign.id, &campaign_patch)
        .await?;

    // 5. First-paid publish notifies the editor.
    if let Some(receipt) = receipt {
        info!(campaign_id = %published.id, "credit consumed, campaign published");
        state.effects.enqueue(SideEffect::PublishedPush {
            campaign: published.clone(),
            recipient: request.edited_by.clone(),
        });
        let trigger_image = experience
            .images
            .url_of(kinds::ORIGINAL)
            .unwrap_or_default()
            .to_string();
        state.effects.enqueue(SideEffect::PublishedMail {
            campaign: published,
            recipient: Some(request.edited_by),
            trigger_image,
            receipt,
        });
        return Ok(true);
    }

    Ok(false)
}

// ============================================================================
// Experience reset
// ============================================================================

/// A reset of an experience back to an empty draft.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResetExperienceRequest {
    /// Target experience.
    pub experience_id: String,
    /// Display name of the rebuilt draft.
    #[serde(default)]
    pub name: String,
    /// Variant of the rebuilt draft.
    #[serde(default)]
    pub variant: Variant,
    /// Parallax scene carried into the draft.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<Scene>,
    /// Background overlay carried into the draft.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<Overlay>,
    /// Resetting user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_by: Option<User>,
}

/// Handle an experience reset.
///
/// Rebuilds the document as an empty `DRAFT` with fresh asset lists while
/// preserving creation metadata, the consumed-credit fields and the workflow
/// correlation. A `PROCESSED` experience is never reset.
#[instrument(skip(state, request), fields(experience_id = %request.experience_id))]
pub async fn handle_reset_experience(
    state: &UpdateHandlerState,
    request: ResetExperienceRequest,
) -> Result<Experience> {
    let old = state
        .persistence
        .experience_by_id(&request.experience_id)
        .await?;

    if old.status == ExperienceStatus::Processed {
        return Err(CoreError::ValidationError {
            field: "status".to_string(),
            message: "experience already processed".to_string(),
        });
    }

    // An unset placement scale renders at zero size; normalize to 1.
    let mut variant = request.variant;
    let mut scale_axis = variant.scale_axis.unwrap_or(ThreeDCoordinates {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    });
    if scale_axis.x == 0.0 {
        scale_axis.x = 1.0;
    }
    if scale_axis.y == 0.0 {
        scale_axis.y = 1.0;
    }
    variant.scale_axis = Some(scale_axis);

    let fresh = Experience {
        id: old.id.clone(),
        name: request.name,
        campaign_id: old.campaign_id.clone(),
        canvas: Canvas {
            ios: DEFAULT_IOS_CANVAS,
            android: 0,
        },
        is_active: true,
        variant,
        status: ExperienceStatus::Draft,
        scene: request.scene,
        overlay: request.overlay,
        template_details: old.template_details.clone(),
        created_by: old.created_by.clone(),
        edited_by: request.edited_by,
        created_at: old.created_at,
        updated_at: Utc::now(),
        workflow_id: old.workflow_id.clone(),
        credit_allowance_id: old.credit_allowance_id.clone(),
        credit_deduct: old.credit_deduct,
        ..Default::default()
    };
    state.persistence.replace_experience(&fresh).await?;

    let campaign_patch = CampaignPatch {
        updated_at: Patch::Set(Utc::now()),
        ..Default::default()
    };
    let campaign = state
        .persistence
        .update_campaign(&old.campaign_id, &campaign_patch)
        .await?;
    state.effects.enqueue(SideEffect::InvalidateCampaignCache {
        short_code: campaign.short_code,
    });

    info!("experience reset to draft");
    Ok(fresh)
}

// ============================================================================
// Stream postback
// ============================================================================

/// Worker-pushed stream renditions for an experience.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostbackAssetsRequest {
    /// Target experience.
    pub experience_id: String,
    /// Compressed rendition; feeds both `compressed` and
    /// `compressed_playback`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed_video: Option<String>,
    /// HLS manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hls_url: Option<String>,
    /// DASH manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dash_url: Option<String>,
    /// Pushing identity, when the worker forwards one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_by: Option<User>,
}

/// Outcome of a stream postback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostbackAssetsResponse {
    /// Experience after the merge.
    pub experience: Experience,
    /// Owning campaign.
    pub campaign: Campaign,
}

/// Handle worker-pushed stream renditions.
///
/// Each URL replaces the stored entry of its kind or is appended when the
/// kind is new; nothing else on the document moves.
#[instrument(skip(state, request), fields(experience_id = %request.experience_id))]
pub async fn handle_postback_assets(
    state: &UpdateHandlerState,
    request: PostbackAssetsRequest,
) -> Result<PostbackAssetsResponse> {
    let mut patch = ExperiencePatch {
        updated_at: Patch::Set(Utc::now()),
        ..Default::default()
    };
    if let Some(url) = request.compressed_video.as_deref() {
        patch.videos.upsert(kinds::COMPRESSED, url);
        patch.videos.upsert(kinds::COMPRESSED_PLAYBACK, url);
    }
    if let Some(url) = request.hls_url.as_deref() {
        patch.videos.upsert(kinds::HLS, url);
    }
    if let Some(url) = request.dash_url.as_deref() {
        patch.videos.upsert(kinds::DASH, url);
    }
    if let Some(user) = request.edited_by {
        patch.edited_by = Patch::Set(user);
    }

    let experience = state
        .persistence
        .update_experience(&request.experience_id, &patch)
        .await?;
    let campaign = state
        .persistence
        .campaign_by_id(&experience.campaign_id)
        .await?;

    Ok(PostbackAssetsResponse {
        experience,
        campaign,
    })
}
