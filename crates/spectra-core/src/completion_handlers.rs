// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Completion-side reconciliation of finished workflow generations.
//!
//! Each handler folds one [`WorkflowResult`] from the completion stream back
//! into the stored documents: produced renditions are merged into the
//! experience, the campaign scan target and publish state are reconciled,
//! and the reserved publishing credit is settled. Handlers are keyed by the
//! result's route; the consumer loop dispatches to them and decides between
//! acknowledge and redeliver from the returned error.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::assets::kinds;
use crate::credit::{CreditLedger, CreditReceipt};
use crate::effects::{SideEffect, SideEffects};
use crate::error::{CoreError, Result};
use crate::model::{Campaign, Experience, Mask, VideoObject, WorkflowError};
use crate::patch::{CampaignPatch, ExperiencePatch, Patch};
use crate::persistence::Persistence;
use crate::plan::PlanService;
use crate::status::{ExperienceStatus, TaskStatus};
use crate::tasks::{process, TaskKey};
use crate::wire::WorkflowResult;

/// Shared state for completion handlers.
pub struct CompletionHandlerState {
    /// Document store.
    pub persistence: Arc<dyn Persistence>,
    /// Credit escrow ledger.
    pub credit: Arc<dyn CreditLedger>,
    /// Plan lookups for campaign expiry.
    pub plan: Arc<dyn PlanService>,
    /// Bounded queue for cache drops and notifications.
    pub effects: SideEffects,
}

impl CompletionHandlerState {
    /// Create a new completion handler state.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        credit: Arc<dyn CreditLedger>,
        plan: Arc<dyn PlanService>,
        effects: SideEffects,
    ) -> Self {
        Self {
            persistence,
            credit,
            plan,
            effects,
        }
    }
}

// ============================================================================
// Publish credit settlement
// ============================================================================

/// Outcome of settling the publishing credit for a finished generation.
struct PublishCredit {
    /// Effective result status; downgraded to `NoCredit` when the ledger
    /// refused the consumption.
    status: TaskStatus,
    /// Failure details to record alongside a non-completed status.
    workflow_error: Option<WorkflowError>,
    /// Whether this generation paid for the campaign.
    consumed: bool,
    /// Ledger receipt of the consumption, surfaced in the published mail.
    receipt: Option<CreditReceipt>,
    /// Whether the stored allowance id is spent and must be dropped.
    clear_allowance: bool,
}

/// Settles the reserved publishing credit of a finished generation.
///
/// Publishing workflows carry an allowance escrowed at submission. A
/// completed generation converts it into a consumption unless an active
/// sibling already paid for the campaign; a failed one hands the escrow
/// back. A refused consumption downgrades the result to `NoCredit` so the
/// experience records the credit failure instead of going live unpaid.
async fn resolve_publish_credit(
    state: &CompletionHandlerState,
    campaign: &Campaign,
    experience: &Experience,
    result: &WorkflowResult,
) -> Result<PublishCredit> {
    let mut credit = PublishCredit {
        status: result.status,
        workflow_error: result.workflow_error.clone(),
        consumed: false,
        receipt: None,
        clear_allowance: false,
    };
    if !result.publish {
        return Ok(credit);
    }

    let siblings = state
        .persistence
        .experiences_by_campaign(&campaign.id)
        .await?;
    let already_paid = siblings
        .iter()
        .any(|sibling| sibling.is_active && sibling.credit_deduct);
    if already_paid {
        debug!(campaign_id = %campaign.id, "campaign already paid for, skipping settlement");
        return Ok(credit);
    }

    if result.status.is_completed() {
        let user_id = experience
            .effective_user()
            .map(|user| user.id.as_str())
            .unwrap_or_default();
        match state
            .credit
            .consume(
                &campaign.short_code,
                &campaign.name,
                &experience.credit_allowance_id,
                user_id,
            )
            .await
        {
            Ok(receipt) => {
                info!(campaign_id = %campaign.id, "publishing credit consumed");
                credit.consumed = true;
                credit.receipt = Some(receipt);
            }
            Err(err) => {
                warn!(campaign_id = %campaign.id, error = %err, "credit consumption refused");
                credit.status = TaskStatus::NoCredit;
                credit.workflow_error = Some(WorkflowError {
                    consumer_type: "credit".to_string(),
                    msg: err.to_string(),
                    ..Default::default()
                });
                credit.clear_allowance = true;
                release_reserved_credit(state, campaign, experience).await;
            }
        }
    } else {
        // The generation failed before going live; hand the escrow back.
        release_reserved_credit(state, campaign, experience).await;
    }
    Ok(credit)
}

/// Releases the escrowed allowance of a generation that will not consume it.
///
/// Failures are logged and swallowed; the reconciliation must not stall on
/// the ledger, and the release endpoint tolerates repeats.
async fn release_reserved_credit(
    state: &CompletionHandlerState,
    campaign: &Campaign,
    experience: &Experience,
) {
    if experience.credit_allowance_id.is_empty() {
        return;
    }
    let Some(credit_type) = experience.credit_type() else {
        warn!(
            experience_id = %experience.id,
            "no credit type in template details, cannot release reservation"
        );
        return;
    };
    if let Err(err) = state
        .credit
        .release(
            &campaign.client_id,
            credit_type,
            &experience.credit_allowance_id,
        )
        .await
    {
        warn!(
            experience_id = %experience.id,
            error = %err,
            "failed to release reserved credit"
        );
    }
}

// ============================================================================
// Experience completions
// ============================================================================

/// Video renditions a marker task produced, staged until the variant merge.
#[derive(Default)]
struct MarkerRenditions {
    compressed: String,
    hls: String,
    dash: String,
    webm: String,
    is_horizontal: Option<bool>,
}

/// Folds a finished media workflow back into its experience.
///
/// Handles both full generations and stitch-only rebuilds. Renditions are
/// merged even when the credit settlement was refused, so a later manual
/// publish does not reprocess the media; the lifecycle then records the
/// credit failure. Stitch rebuilds replace the composite video and chapter
/// windows without moving the lifecycle at all.
#[instrument(skip(state, result), fields(workflow_id = %result.workflow_id))]
pub async fn handle_experience_completion(
    state: &CompletionHandlerState,
    experience_id: &str,
    result: WorkflowResult,
) -> Result<Experience> {
    // 1. Load the experience and its campaign.
    let experience = state.persistence.experience_by_id(experience_id).await?;
    let mut campaign = state
        .persistence
        .campaign_by_id(&experience.campaign_id)
        .await?;

    // 2. Settle the reserved publishing credit.
    let credit = resolve_publish_credit(state, &campaign, &experience, &result).await?;
    let status = credit.status;

    // 3. Base patch: reconciliation marks the generation as processed until
    //    the lifecycle mapping below says otherwise.
    let mut patch = ExperiencePatch::default();
    patch.status = Patch::Set(ExperienceStatus::Processed);
    patch.updated_at = Patch::Set(Utc::now());
    if credit.consumed {
        patch.credit_deduct = Patch::Set(true);
    }
    if credit.clear_allowance {
        patch.credit_allowance_id = Patch::Clear;
    }
    let mut campaign_patch = CampaignPatch::default();

    // 4. Merge task outputs. A refused credit still keeps the finished
    //    renditions; only genuinely failed generations skip the merge.
    let og_image_url = experience
        .images
        .url_of(kinds::ORIGINAL)
        .unwrap_or_default()
        .to_string();
    let mut og_image = false;
    let mut is_stitch = match result.task_results.as_slice() {
        [only] => matches!(
            TaskKey::parse(&only.task_id),
            Some(TaskKey::Stitch { .. })
        ),
        _ => false,
    };
    let mut window_ratio = 0.0_f64;
    let mut variant = experience.variant.clone();
    let mut variant_touched = false;
    let mut scene = experience.scene.clone().unwrap_or_default();
    let mut scene_touched = false;
    let mut button_images: HashMap<String, String> = HashMap::new();
    let mut marker_videos: HashMap<String, MarkerRenditions> = HashMap::new();
    let mut marker_windows: HashMap<String, (i64, i64)> = HashMap::new();

    if matches!(status, TaskStatus::Completed | TaskStatus::NoCredit) {
        for task in &result.task_results {
            let payload = &task.payload;

            // An image-derived viewport ratio wins over a video-derived one.
            if payload.image_aspect_ratio != 0.0 {
                window_ratio = payload.image_aspect_ratio;
            } else if payload.video_aspect_ratio != 0.0 && window_ratio == 0.0 {
                let ratio = 1.0 / payload.video_aspect_ratio;
                window_ratio = (ratio * 1000.0).round() / 1000.0;
            }
            if payload.video_aspect_ratio != 0.0 {
                patch.aspect_ratio = Patch::Set(payload.video_aspect_ratio);
            }
            if let Some(horizontal) = payload.is_horizontal {
                variant.is_horizontal = Some(horizontal);
                variant_touched = true;
            }
            if !payload.template_mask_url.is_empty() {
                patch.mask = Patch::Set(Mask {
                    url: payload.template_mask_url.clone(),
                    compressed_url: payload.template_mask_url.clone(),
                    scale: 1.0,
                    ..Default::default()
                });
            }

            match TaskKey::parse(&task.task_id) {
                Some(TaskKey::Main { process_type }) => match process_type.as_str() {
                    process::OVERLAY => {
                        if !payload.overlay_compressed.is_empty() {
                            let mut overlay = experience.overlay.clone().unwrap_or_default();
                            overlay.compressed_image = payload.overlay_compressed.clone();
                            patch.overlay = Patch::Set(overlay);
                        }
                    }
                    process::FAL => {
                        if let Some(output) = &payload.genstudio_output {
                            if !output.value.is_empty() {
                                patch.videos.upsert(kinds::GREEN_SCREEN, &output.value);
                            }
                        }
                    }
                    process::IMAGE => {
                        og_image = true;
                        if !payload.compressed_image.is_empty() {
                            patch
                                .images
                                .upsert(kinds::COMPRESSED, &payload.compressed_image);
                        }
                        if !payload.color_compressed_image.is_empty() {
                            campaign_patch.scan_compressed_image_url =
                                Patch::Set(payload.color_compressed_image.clone());
                            campaign_patch.icon_url =
                                Patch::Set(payload.color_compressed_image.clone());
                            patch
                                .images
                                .upsert(kinds::COLOR_COMPRESSED, &payload.color_compressed_image);
                        }
                        if !payload.std_compressed_image.is_empty() {
                            patch
                                .images
                                .upsert(kinds::STD_COMPRESSED, &payload.std_compressed_image);
                        }
                        if !payload.feature_image.is_empty() {
                            patch
                                .images
                                .upsert(kinds::FEATURE_IMAGE, &payload.feature_image);
                        }
                        if !payload.spawn_compressed_image.is_empty() {
                            patch
                                .images
                                .upsert(kinds::COMPRESSED_SPAWN, &payload.spawn_compressed_image);
                        }
                        if !payload.original_green_screen_image.is_empty() {
                            patch.images.upsert(
                                kinds::ORIGINAL_GREEN_SCREEN,
                                &payload.original_green_screen_image,
                            );
                        }
                    }
                    process::VIDEO => {
                        if !payload.compressed_video.is_empty() {
                            patch
                                .videos
                                .upsert(kinds::COMPRESSED, &payload.compressed_video);
                            patch
                                .videos
                                .upsert(kinds::COMPRESSED_PLAYBACK, &payload.compressed_video);
                        }
                        if !payload.hls_url.is_empty() {
                            patch.videos.upsert(kinds::HLS, &payload.hls_url);
                        }
                        if !payload.dash_url.is_empty() {
                            patch.videos.upsert(kinds::DASH, &payload.dash_url);
                        }
                        if !payload.webm_url.is_empty() {
                            patch.videos.upsert(kinds::WEBM, &payload.webm_url);
                        }
                        if !payload.rgb_video_url.is_empty() {
                            patch.videos.upsert(kinds::ORIGINAL, &payload.rgb_video_url);
                        }
                        if !payload.mask_video_url.is_empty() {
                            patch.videos.upsert(kinds::MASK, &payload.mask_video_url);
                        }
                    }
                    process::IMAGE_VECTOR_LLM => {
                        if !payload.milvus_ref_id.is_empty() {
                            campaign_patch.milvus_ref_id =
                                Patch::Set(payload.milvus_ref_id.clone());
                        }
                        if !payload.product_description.is_empty() {
                            let mut details =
                                experience.catalogue_details.clone().unwrap_or_default();
                            details.description = payload.product_description.clone();
                            patch.catalogue_details = Patch::Set(details);
                        }
                    }
                    _ => {}
                },
                Some(TaskKey::Plane {
                    parallax_id,
                    plane_id,
                    process_type,
                }) => {
                    let plane = scene
                        .parallax
                        .iter_mut()
                        .find(|group| group.id == parallax_id)
                        .and_then(|group| group.planes.iter_mut().find(|plane| plane.id == plane_id));
                    if let Some(plane) = plane {
                        match process_type.as_str() {
                            process::IMAGE => {
                                plane.compressed = if !payload.std_compressed_image.is_empty() {
                                    payload.std_compressed_image.clone()
                                } else {
                                    payload.color_compressed_image.clone()
                                };
                                scene_touched = true;
                            }
                            process::VIDEO => {
                                plane.compressed = payload.compressed_video.clone();
                                plane.hls = payload.hls_url.clone();
                                plane.dash = payload.dash_url.clone();
                                plane.is_horizontal = payload.is_horizontal;
                                scene_touched = true;
                            }
                            _ => {}
                        }
                    }
                }
                Some(TaskKey::ParallaxMask { parallax_id, .. }) => {
                    let mask = scene
                        .parallax
                        .iter_mut()
                        .find(|group| group.id == parallax_id)
                        .and_then(|group| group.mask.as_mut());
                    if let Some(mask) = mask {
                        mask.compressed_url = payload.color_compressed_image.clone();
                        scene_touched = true;
                    }
                }
                Some(TaskKey::Marker {
                    marker_id,
                    process_type,
                }) => match process_type.as_str() {
                    process::IMAGE => {
                        button_images.insert(marker_id, payload.color_compressed_image.clone());
                    }
                    process::VIDEO => {
                        marker_videos.insert(
                            marker_id,
                            MarkerRenditions {
                                compressed: payload.compressed_video.clone(),
                                hls: payload.hls_url.clone(),
                                dash: payload.dash_url.clone(),
                                webm: payload.webm_url.clone(),
                                is_horizontal: payload.is_horizontal,
                            },
                        );
                    }
                    _ => {}
                },
                Some(TaskKey::Stitch { .. }) => {
                    is_stitch = true;
                    // The composite replaces every stored rendition wholesale.
                    patch.videos.clear_all();
                    if !payload.original_video.is_empty() {
                        patch.videos.upsert(kinds::ORIGINAL, &payload.original_video);
                    }
                    if !payload.compressed_video.is_empty() {
                        patch
                            .videos
                            .upsert(kinds::COMPRESSED, &payload.compressed_video);
                    }
                    if !payload.hls_url.is_empty() {
                        patch.videos.upsert(kinds::HLS, &payload.hls_url);
                    }
                    if !payload.dash_url.is_empty() {
                        patch.videos.upsert(kinds::DASH, &payload.dash_url);
                    }
                    if !payload.mask_video.is_empty() {
                        patch.videos.upsert(kinds::MASK, &payload.mask_video);
                    }
                    if !payload.webm_url.is_empty() {
                        patch.videos.upsert(kinds::WEBM, &payload.webm_url);
                    }
                    for info in &payload.segment_info {
                        if !info.marker_id.is_empty() {
                            marker_windows
                                .insert(info.marker_id.clone(), (info.start_time, info.end_time));
                        }
                    }
                }
                None => {}
            }
        }

        if !button_images.is_empty() {
            for button in &mut variant.buttons {
                if let Some(url) = button_images.get(&button.marker_id) {
                    button.compressed_asset_url = url.clone();
                }
            }
            variant_touched = true;
        }
        if !marker_videos.is_empty() {
            if let Some(segments) = variant.segments.as_mut() {
                for marker in &mut segments.markers {
                    if let Some(renditions) = marker_videos.get(&marker.id) {
                        marker.videos = VideoObject {
                            compressed: renditions.compressed.clone(),
                            hls: renditions.hls.clone(),
                            dash: renditions.dash.clone(),
                            webm: renditions.webm.clone(),
                            original: marker.videos.original.clone(),
                            mask: marker.videos.mask.clone(),
                            merge_video: marker.videos.merge_video.clone(),
                            orientation: marker.videos.orientation.clone(),
                        };
                        marker.is_horizontal = Some(renditions.is_horizontal.unwrap_or(false));
                    }
                }
            }
            variant_touched = true;
        }
        if !marker_windows.is_empty() {
            if let Some(segments) = variant.segments.as_mut() {
                let mut got_all = true;
                for marker in &mut segments.markers {
                    match marker_windows.get(&marker.id) {
                        Some((start, end)) => {
                            marker.stime = *start;
                            marker.etime = *end;
                        }
                        None => {
                            debug!(marker_id = %marker.id, "stitch reported no window for marker");
                            got_all = false;
                        }
                    }
                }
                // Only a fully addressable composite can drive playback.
                if got_all {
                    segments.use_marker_video = false;
                }
            }
            variant_touched = true;
        }
        if window_ratio != 0.0 {
            scene.window_ratio = window_ratio;
            scene_touched = true;
        }
        if scene_touched {
            patch.scene = Patch::Set(scene);
        }
        if variant_touched {
            patch.variant = Patch::Set(variant);
        }
    }

    // 5. Lifecycle mapping. Stitch rebuilds never move the lifecycle; the
    //    main generation owns it.
    if is_stitch {
        patch.status = Patch::Set(experience.status);
    } else {
        match status {
            TaskStatus::Completed => patch.workflow_error = Patch::Clear,
            other => {
                if let Some(terminal) = other.terminal_experience_status() {
                    patch.status = Patch::Set(terminal);
                    patch.workflow_error =
                        Patch::Set(credit.workflow_error.clone().unwrap_or_default());
                }
            }
        }
    }

    // 6. Persist the merged document.
    let updated = state
        .persistence
        .update_experience(experience_id, &patch)
        .await?;

    // 7. Tell the owner about a failed generation.
    if !status.is_completed() {
        state.effects.enqueue(SideEffect::FailedMail {
            campaign: campaign.clone(),
            recipient: updated.effective_user().cloned(),
        });
    }

    // 8. Campaign reconciliation: publish flip, expiry stamping and the scan
    //    target refreshed from the trigger image.
    if status.is_completed() {
        let mut needs_update = false;
        let mut publish_flip = false;
        let mut all_processed = false;
        if result.publish {
            let siblings = state
                .persistence
                .experiences_by_campaign(&campaign.id)
                .await?;
            all_processed = siblings
                .iter()
                .filter(|sibling| sibling.is_active)
                .all(|sibling| sibling.status == ExperienceStatus::Processed);
            if all_processed {
                needs_update = true;
                publish_flip = true;
                campaign_patch.publish = Patch::Set(true);
                campaign_patch.updated_at = Patch::Set(Utc::now());
            }
            if credit.consumed {
                needs_update = true;
                let owner_id = updated
                    .created_by
                    .as_ref()
                    .map(|user| user.id.as_str())
                    .unwrap_or_default();
                let expiry = state.plan.campaign_expiry(owner_id).await?;
                campaign_patch.golive_at = Patch::Set(Utc::now());
                campaign_patch.expires_at = Patch::Set(expiry.expires_at);
            }
        }
        if og_image {
            needs_update = true;
            campaign_patch.updated_at = Patch::Set(Utc::now());
            campaign_patch.scan_image_url = Patch::Set(og_image_url.clone());
        }
        if needs_update {
            if publish_flip {
                // Conditional on the version read above: with several
                // experiences finishing at once only one flip wins.
                match state
                    .persistence
                    .update_campaign_if_version(&campaign.id, campaign.version, &campaign_patch)
                    .await?
                {
                    Some(fresh) => campaign = fresh,
                    None => info!(
                        campaign_id = %campaign.id,
                        "campaign moved underneath, another generation finished the publish"
                    ),
                }
            } else {
                campaign = state
                    .persistence
                    .update_campaign(&campaign.id, &campaign_patch)
                    .await?;
            }
        }
        if result.publish && all_processed && credit.consumed {
            state.effects.enqueue(SideEffect::PublishedMail {
                campaign: campaign.clone(),
                recipient: updated.effective_user().cloned(),
                trigger_image: og_image_url.clone(),
                receipt: credit.receipt.clone().unwrap_or_default(),
            });
        }
    }

    // 9. Viewers must see the merged document on the next scan.
    state.effects.enqueue(SideEffect::InvalidateCampaignCache {
        short_code: campaign.short_code.clone(),
    });

    Ok(updated)
}

// ============================================================================
// QR overlay completions
// ============================================================================

/// Folds a finished QR overlay workflow back into its experience.
///
/// The lane regenerates the trigger image with the QR panel composited in,
/// so the merged original becomes the campaign scan target unconditionally;
/// a previous scan image without the panel would no longer match. Credit
/// settlement matches the main lane.
#[instrument(skip(state, result), fields(workflow_id = %result.workflow_id))]
pub async fn handle_qr_overlay_completion(
    state: &CompletionHandlerState,
    experience_id: &str,
    result: WorkflowResult,
) -> Result<Experience> {
    // 1. Load the experience and its campaign.
    let experience = state.persistence.experience_by_id(experience_id).await?;
    let mut campaign = state
        .persistence
        .campaign_by_id(&experience.campaign_id)
        .await?;

    // 2. Settle the reserved publishing credit.
    let credit = resolve_publish_credit(state, &campaign, &experience, &result).await?;
    let status = credit.status;

    // 3. Base patch.
    let mut patch = ExperiencePatch::default();
    patch.status = Patch::Set(ExperienceStatus::Processed);
    patch.updated_at = Patch::Set(Utc::now());
    if credit.consumed {
        patch.credit_deduct = Patch::Set(true);
    }
    if credit.clear_allowance {
        patch.credit_allowance_id = Patch::Clear;
    }
    let mut campaign_patch = CampaignPatch::default();

    // 4. Merge the composited stills. Only the image task runs in this lane;
    //    renditions the merge does not mention stay untouched.
    let mut og_image_url = String::new();
    if matches!(status, TaskStatus::Completed | TaskStatus::NoCredit) {
        for task in &result.task_results {
            let payload = &task.payload;
            let Some(TaskKey::Main { process_type }) = TaskKey::parse(&task.task_id) else {
                continue;
            };
            if process_type != process::IMAGE {
                continue;
            }
            if !payload.og_image_with_qr.is_empty() {
                og_image_url = payload.og_image_with_qr.clone();
                patch
                    .images
                    .upsert(kinds::ORIGINAL, &payload.og_image_with_qr);
                patch
                    .images
                    .upsert(kinds::ORIGINAL_INPUT, &payload.og_image_with_qr);
            }
            if !payload.compressed_image.is_empty() {
                patch
                    .images
                    .upsert(kinds::COMPRESSED, &payload.compressed_image);
            }
            if !payload.color_compressed_image.is_empty() {
                campaign_patch.scan_compressed_image_url =
                    Patch::Set(payload.color_compressed_image.clone());
                patch
                    .images
                    .upsert(kinds::COLOR_COMPRESSED, &payload.color_compressed_image);
            }
            if !payload.std_compressed_image.is_empty() {
                patch
                    .images
                    .upsert(kinds::STD_COMPRESSED, &payload.std_compressed_image);
            }
            if !payload.feature_image.is_empty() {
                patch
                    .images
                    .upsert(kinds::FEATURE_IMAGE, &payload.feature_image);
            }
            if !payload.spawn_compressed_image.is_empty() {
                patch
                    .images
                    .upsert(kinds::COMPRESSED_SPAWN, &payload.spawn_compressed_image);
            }
        }
    }

    // 5. Lifecycle mapping, same shape as the main lane.
    match status {
        TaskStatus::Completed => patch.workflow_error = Patch::Clear,
        other => {
            if let Some(terminal) = other.terminal_experience_status() {
                patch.status = Patch::Set(terminal);
                patch.workflow_error =
                    Patch::Set(credit.workflow_error.clone().unwrap_or_default());
            }
        }
    }

    // 6. Persist the merged document.
    let updated = state
        .persistence
        .update_experience(experience_id, &patch)
        .await?;

    // 7. Campaign reconciliation. The composited image replaces the scan
    //    target even when the task produced none.
    if status.is_completed() {
        let mut publish_flip = false;
        if result.publish {
            let siblings = state
                .persistence
                .experiences_by_campaign(&campaign.id)
                .await?;
            let all_processed = siblings
                .iter()
                .filter(|sibling| sibling.is_active)
                .all(|sibling| sibling.status == ExperienceStatus::Processed);
            if all_processed {
                publish_flip = true;
                campaign_patch.publish = Patch::Set(true);
            }
            if credit.consumed {
                let owner_id = updated
                    .created_by
                    .as_ref()
                    .map(|user| user.id.as_str())
                    .unwrap_or_default();
                let expiry = state.plan.campaign_expiry(owner_id).await?;
                campaign_patch.golive_at = Patch::Set(Utc::now());
                campaign_patch.expires_at = Patch::Set(expiry.expires_at);
            }
        }
        campaign_patch.updated_at = Patch::Set(Utc::now());
        campaign_patch.scan_image_url = Patch::Set(og_image_url.clone());
        if publish_flip {
            match state
                .persistence
                .update_campaign_if_version(&campaign.id, campaign.version, &campaign_patch)
                .await?
            {
                Some(fresh) => campaign = fresh,
                None => info!(
                    campaign_id = %campaign.id,
                    "campaign moved underneath, another generation finished the publish"
                ),
            }
        } else {
            campaign = state
                .persistence
                .update_campaign(&campaign.id, &campaign_patch)
                .await?;
        }
    }

    // 8. Drop the cached scan document.
    state.effects.enqueue(SideEffect::InvalidateCampaignCache {
        short_code: campaign.short_code.clone(),
    });

    Ok(updated)
}

// ============================================================================
// Campaign scan completions
// ============================================================================

/// Stores the compressed scan target produced by a campaign workflow.
///
/// Results without a produced image are acknowledged and skipped; the
/// campaign keeps its previous rendition.
#[instrument(skip(state, result), fields(workflow_id = %result.workflow_id))]
pub async fn handle_campaign_scan_completion(
    state: &CompletionHandlerState,
    short_code: &str,
    result: WorkflowResult,
) -> Result<()> {
    let url = result
        .first_payload()
        .map(|payload| payload.scan_compressed_image.as_str())
        .unwrap_or_default();
    if url.is_empty() {
        info!(short_code, "scan completion carried no compressed image, skipping");
        return Ok(());
    }

    let campaign = state.persistence.campaign_by_short_code(short_code).await?;
    let patch = CampaignPatch {
        scan_compressed_image_url: Patch::Set(url.to_string()),
        updated_at: Patch::Set(Utc::now()),
        ..Default::default()
    };
    state
        .persistence
        .update_campaign(&campaign.id, &patch)
        .await?;

    state.effects.enqueue(SideEffect::InvalidateCampaignCache {
        short_code: short_code.to_string(),
    });
    Ok(())
}

// ============================================================================
// Preview regeneration completions
// ============================================================================

/// Records the outcome of a generative preview regeneration.
///
/// Only the `video_generation` block is touched; the experience lifecycle
/// and its campaign stay as they are.
#[instrument(skip(state, result), fields(workflow_id = %result.workflow_id))]
pub async fn handle_regenerate_completion(
    state: &CompletionHandlerState,
    experience_id: &str,
    result: WorkflowResult,
) -> Result<()> {
    let experience = state.persistence.experience_by_id(experience_id).await?;
    let mut generation = experience.video_generation.clone().unwrap_or_default();
    let mut touched = false;

    if result.status.is_completed() {
        for task in &result.task_results {
            let Some(TaskKey::Main { process_type }) = TaskKey::parse(&task.task_id) else {
                continue;
            };
            if process_type != process::FAL_LOW_RESOLUTION {
                continue;
            }
            if let Some(output) = &task.payload.genstudio_output {
                if !output.value.is_empty() {
                    generation.video_url = output.value.clone();
                    generation.status = ExperienceStatus::Processed.as_str().to_string();
                    touched = true;
                }
            }
        }
    } else if matches!(result.status, TaskStatus::Failed | TaskStatus::TimedOut) {
        generation.status = ExperienceStatus::Failed.as_str().to_string();
        touched = true;
    }

    if !touched {
        debug!(experience_id, "regeneration carried no preview, nothing to record");
        return Ok(());
    }

    let patch = ExperiencePatch {
        video_generation: Patch::Set(generation),
        ..Default::default()
    };
    state
        .persistence
        .update_experience(experience_id, &patch)
        .await?;
    Ok(())
}

// ============================================================================
// Composition render completions
// ============================================================================

/// Stores the outcome of a programmatic composition render.
///
/// A completed result without the rendered video is reported as incomplete
/// and redelivered; the producer may still be attaching outputs.
#[instrument(skip(state, result), fields(workflow_id = %result.workflow_id))]
pub async fn handle_remotion_completion(
    state: &CompletionHandlerState,
    render_id: &str,
    result: WorkflowResult,
) -> Result<()> {
    if !result.status.is_completed() {
        warn!(render_id, status = ?result.status, "composition render failed");
        state
            .persistence
            .update_remotion_render(render_id, ExperienceStatus::Failed.as_str(), None, None)
            .await?;
        return Ok(());
    }

    let payload = result
        .first_payload()
        .ok_or_else(|| CoreError::IncompleteResult {
            workflow_id: result.workflow_id.clone(),
            details: "completed render carried no task result".to_string(),
        })?;
    if payload.remotion_video_url.is_empty() {
        return Err(CoreError::IncompleteResult {
            workflow_id: result.workflow_id.clone(),
            details: "completed render carried no video URL".to_string(),
        });
    }

    state
        .persistence
        .update_remotion_render(
            render_id,
            ExperienceStatus::Processed.as_str(),
            Some(&payload.remotion_video_url),
            Some(&payload.remotion_masked_video_url),
        )
        .await?;
    info!(render_id, "composition render stored");
    Ok(())
}
