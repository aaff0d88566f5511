// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed field patches for experience and campaign documents.
//!
//! Handlers never write whole documents they loaded earlier; they describe
//! their intent as a patch and persistence applies it to the freshest copy of
//! the row. A patch touches only the fields a lane actually changed, so two
//! lanes updating disjoint fields of the same document do not overwrite each
//! other.
//!
//! Application order is fixed: asset pulls, then kind-keyed adds, then
//! upserts, then scalar sets, then unsets.

use chrono::{DateTime, Utc};

use crate::assets::{AssetEntry, AssetSet};
use crate::model::{
    Campaign, Canvas, CatalogueDetails, Experience, Mask, Overlay, Scene, User, VideoGeneration,
    Variant, WorkflowError,
};
use crate::status::ExperienceStatus;

// ============================================================================
// Patch cell
// ============================================================================

/// Intent for a single document field.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Patch<T> {
    /// Leave the stored value untouched.
    #[default]
    Keep,
    /// Replace the stored value.
    Set(T),
    /// Remove the stored value (empty string, zero, or `None`).
    Clear,
}

impl<T> Patch<T> {
    /// Whether this patch leaves the field untouched.
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    /// The value this patch would write, if it sets one.
    pub fn as_set(&self) -> Option<&T> {
        match self {
            Patch::Set(value) => Some(value),
            _ => None,
        }
    }
}

impl<T: Clone + Default> Patch<T> {
    /// Apply to a required field; `Clear` restores the type default.
    pub fn apply_to(&self, slot: &mut T) {
        match self {
            Patch::Keep => {}
            Patch::Set(value) => *slot = value.clone(),
            Patch::Clear => *slot = T::default(),
        }
    }
}

impl<T: Clone> Patch<T> {
    /// Apply to an optional field; `Clear` removes it.
    pub fn apply_to_option(&self, slot: &mut Option<T>) {
        match self {
            Patch::Keep => {}
            Patch::Set(value) => *slot = Some(value.clone()),
            Patch::Clear => *slot = None,
        }
    }
}

// ============================================================================
// Asset deltas
// ============================================================================

/// Incremental change to one kind-keyed asset list.
///
/// Applied as a full clear first, then pulls, then kind-keyed adds, then
/// upserts, regardless of the order the operations were recorded in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetDelta {
    /// Whether the whole list is emptied before anything else applies.
    pub clear: bool,
    /// Kinds removed before anything is added.
    pub pull_kinds: Vec<String>,
    /// Entries added only when their kind is not already present.
    pub add_if_absent: Vec<AssetEntry>,
    /// Entries that replace an existing kind in place, or append.
    pub upsert: Vec<AssetEntry>,
}

impl AssetDelta {
    /// Whether this delta changes nothing.
    pub fn is_empty(&self) -> bool {
        !self.clear
            && self.pull_kinds.is_empty()
            && self.add_if_absent.is_empty()
            && self.upsert.is_empty()
    }

    /// Record a full clear of the list.
    pub fn clear_all(&mut self) {
        self.clear = true;
    }

    /// Record a kind for removal.
    pub fn pull(&mut self, kind: &str) {
        self.pull_kinds.push(kind.to_string());
    }

    /// Record several kinds for removal.
    pub fn pull_all(&mut self, kinds: &[&str]) {
        for kind in kinds {
            self.pull_kinds.push((*kind).to_string());
        }
    }

    /// Record a kind-keyed add.
    pub fn add_if_absent(&mut self, kind: &str, url: &str) {
        self.add_if_absent.push(AssetEntry::new(kind, url));
    }

    /// Record a replace-or-append.
    pub fn upsert(&mut self, kind: &str, url: &str) {
        self.upsert.push(AssetEntry::new(kind, url));
    }

    /// Apply this delta to an asset list.
    pub fn apply(&self, set: &mut AssetSet) {
        if self.clear {
            set.clear();
        }
        let kinds: Vec<&str> = self.pull_kinds.iter().map(String::as_str).collect();
        set.remove_kinds(&kinds);
        for entry in &self.add_if_absent {
            set.add_if_absent(&entry.kind, &entry.url);
        }
        for entry in &self.upsert {
            set.upsert_by_kind(&entry.kind, &entry.url);
        }
    }
}

// ============================================================================
// Experience patch
// ============================================================================

/// Batched intent against a single experience document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperiencePatch {
    /// Image asset changes.
    pub images: AssetDelta,
    /// Video asset changes.
    pub videos: AssetDelta,
    /// Audio asset changes.
    pub audios: AssetDelta,
    /// 3D model asset changes.
    pub three_d_assets: AssetDelta,
    /// Display name.
    pub name: Patch<String>,
    /// Processing status.
    pub status: Patch<ExperienceStatus>,
    /// Source media aspect ratio.
    pub aspect_ratio: Patch<f64>,
    /// Whole-variant replacement, used when segments or buttons change.
    pub variant: Patch<Variant>,
    /// Render canvas dimensions.
    pub canvas: Patch<Canvas>,
    /// Whether a QR panel is rendered alongside the trigger.
    pub qr_code: Patch<bool>,
    /// Background overlay.
    pub overlay: Patch<Overlay>,
    /// Scan-target mask.
    pub mask: Patch<Mask>,
    /// Parallax scene.
    pub scene: Patch<Scene>,
    /// Terminal failure details.
    pub workflow_error: Patch<WorkflowError>,
    /// Task count of the current workflow generation.
    pub total_task: Patch<i32>,
    /// Current workflow generation identifier.
    pub workflow_id: Patch<String>,
    /// Stitch workflow generation identifier.
    pub stitch_workflow_id: Patch<String>,
    /// Reserved credit escrow identifier.
    pub credit_allowance_id: Patch<String>,
    /// Credit consumption flag.
    pub credit_deduct: Patch<bool>,
    /// Commerce metadata.
    pub catalogue_details: Patch<CatalogueDetails>,
    /// Generative-video request state.
    pub video_generation: Patch<VideoGeneration>,
    /// Last editor.
    pub edited_by: Patch<User>,
    /// Update timestamp.
    pub updated_at: Patch<DateTime<Utc>>,
}

impl ExperiencePatch {
    /// Whether this patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
            && self.videos.is_empty()
            && self.audios.is_empty()
            && self.three_d_assets.is_empty()
            && self.name.is_keep()
            && self.status.is_keep()
            && self.aspect_ratio.is_keep()
            && self.variant.is_keep()
            && self.canvas.is_keep()
            && self.qr_code.is_keep()
            && self.overlay.is_keep()
            && self.mask.is_keep()
            && self.scene.is_keep()
            && self.workflow_error.is_keep()
            && self.total_task.is_keep()
            && self.workflow_id.is_keep()
            && self.stitch_workflow_id.is_keep()
            && self.credit_allowance_id.is_keep()
            && self.credit_deduct.is_keep()
            && self.catalogue_details.is_keep()
            && self.video_generation.is_keep()
            && self.edited_by.is_keep()
            && self.updated_at.is_keep()
    }

    /// Apply this patch to a document in the fixed order.
    pub fn apply_to(&self, experience: &mut Experience) {
        self.images.apply(&mut experience.images);
        self.videos.apply(&mut experience.videos);
        self.audios.apply(&mut experience.audios);
        self.three_d_assets.apply(&mut experience.three_d_assets);

        self.name.apply_to(&mut experience.name);
        self.status.apply_to(&mut experience.status);
        self.aspect_ratio.apply_to(&mut experience.aspect_ratio);
        self.variant.apply_to(&mut experience.variant);
        self.canvas.apply_to(&mut experience.canvas);
        self.qr_code.apply_to(&mut experience.qr_code);
        self.overlay.apply_to_option(&mut experience.overlay);
        self.mask.apply_to_option(&mut experience.mask);
        self.scene.apply_to_option(&mut experience.scene);
        self.workflow_error
            .apply_to_option(&mut experience.workflow_error);
        self.total_task.apply_to(&mut experience.total_task);
        self.workflow_id.apply_to(&mut experience.workflow_id);
        self.stitch_workflow_id
            .apply_to(&mut experience.stitch_workflow_id);
        self.credit_allowance_id
            .apply_to(&mut experience.credit_allowance_id);
        self.credit_deduct.apply_to(&mut experience.credit_deduct);
        self.catalogue_details
            .apply_to_option(&mut experience.catalogue_details);
        self.video_generation
            .apply_to_option(&mut experience.video_generation);
        self.edited_by.apply_to_option(&mut experience.edited_by);
        self.updated_at.apply_to(&mut experience.updated_at);
    }
}

// ============================================================================
// Campaign patch
// ============================================================================

/// Batched intent against a single campaign document.
///
/// Applying a patch always bumps the campaign's `version`, which publish uses
/// as its conditional-write token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CampaignPatch {
    /// Scan target image URL.
    pub scan_image_url: Patch<String>,
    /// Compressed scan target rendition.
    pub scan_compressed_image_url: Patch<String>,
    /// Listing icon.
    pub icon_url: Patch<String>,
    /// Vector-store reference.
    pub milvus_ref_id: Patch<String>,
    /// Processing status.
    pub status: Patch<ExperienceStatus>,
    /// Live flag.
    pub publish: Patch<bool>,
    /// Go-live time.
    pub golive_at: Patch<DateTime<Utc>>,
    /// Plan-derived expiry.
    pub expires_at: Patch<DateTime<Utc>>,
    /// Last editor.
    pub edited_by: Patch<User>,
    /// Update timestamp.
    pub updated_at: Patch<DateTime<Utc>>,
}

impl CampaignPatch {
    /// Whether this patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.scan_image_url.is_keep()
            && self.scan_compressed_image_url.is_keep()
            && self.icon_url.is_keep()
            && self.milvus_ref_id.is_keep()
            && self.status.is_keep()
            && self.publish.is_keep()
            && self.golive_at.is_keep()
            && self.expires_at.is_keep()
            && self.edited_by.is_keep()
            && self.updated_at.is_keep()
    }

    /// Apply this patch to a document and bump its version.
    pub fn apply_to(&self, campaign: &mut Campaign) {
        self.scan_image_url.apply_to(&mut campaign.scan.image_url);
        self.scan_compressed_image_url
            .apply_to(&mut campaign.scan.compressed_image_url);
        self.icon_url.apply_to(&mut campaign.icon_url);
        self.milvus_ref_id.apply_to(&mut campaign.milvus_ref_id);
        self.status.apply_to(&mut campaign.status);
        self.publish.apply_to(&mut campaign.publish);
        self.golive_at.apply_to_option(&mut campaign.golive_at);
        self.expires_at.apply_to_option(&mut campaign.expires_at);
        self.edited_by.apply_to_option(&mut campaign.edited_by);
        self.updated_at.apply_to(&mut campaign.updated_at);
        campaign.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::kinds;

    #[test]
    fn test_delta_applies_pull_before_add_before_upsert() {
        let mut set = AssetSet::new();
        set.upsert_by_kind(kinds::ORIGINAL, "https://cdn.example.com/a.jpg");
        set.upsert_by_kind(kinds::COMPRESSED, "https://cdn.example.com/a-stale.jpg");

        let mut delta = AssetDelta::default();
        // Recorded out of order on purpose; application order is fixed.
        delta.upsert(kinds::ORIGINAL, "https://cdn.example.com/b.jpg");
        delta.add_if_absent(kinds::COMPRESSED, "https://cdn.example.com/b-small.jpg");
        delta.pull(kinds::COMPRESSED);

        delta.apply(&mut set);

        assert_eq!(
            set.url_of(kinds::COMPRESSED),
            Some("https://cdn.example.com/b-small.jpg")
        );
        assert_eq!(set.url_of(kinds::ORIGINAL), Some("https://cdn.example.com/b.jpg"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_delta_is_idempotent_for_kind_keyed_adds() {
        let mut delta = AssetDelta::default();
        delta.pull_all(&[kinds::COMPRESSED]);
        delta.add_if_absent(kinds::COMPRESSED, "https://cdn.example.com/small.jpg");

        let mut set = AssetSet::new();
        delta.apply(&mut set);
        delta.apply(&mut set);

        assert_eq!(set.len(), 1);
        assert_eq!(
            set.url_of(kinds::COMPRESSED),
            Some("https://cdn.example.com/small.jpg")
        );
    }

    #[test]
    fn test_delta_clear_empties_before_adds() {
        let mut set = AssetSet::new();
        set.upsert_by_kind(kinds::ORIGINAL, "https://cdn.example.com/stale.mp4");
        set.upsert_by_kind(kinds::HLS, "https://cdn.example.com/stale.m3u8");

        let mut delta = AssetDelta::default();
        delta.clear_all();
        delta.upsert(kinds::ORIGINAL, "https://cdn.example.com/fresh.mp4");

        assert!(!delta.is_empty());
        delta.apply(&mut set);

        assert_eq!(set.len(), 1);
        assert_eq!(
            set.url_of(kinds::ORIGINAL),
            Some("https://cdn.example.com/fresh.mp4")
        );
    }

    #[test]
    fn test_experience_patch_sets_and_clears() {
        let mut experience = Experience {
            id: "exp-1".to_string(),
            campaign_id: "camp-1".to_string(),
            workflow_error: Some(WorkflowError {
                msg: "boom".to_string(),
                ..Default::default()
            }),
            credit_allowance_id: "allow-1".to_string(),
            ..Default::default()
        };

        let patch = ExperiencePatch {
            status: Patch::Set(ExperienceStatus::Processed),
            workflow_error: Patch::Clear,
            credit_allowance_id: Patch::Clear,
            credit_deduct: Patch::Set(true),
            total_task: Patch::Set(4),
            ..Default::default()
        };
        patch.apply_to(&mut experience);

        assert_eq!(experience.status, ExperienceStatus::Processed);
        assert!(experience.workflow_error.is_none());
        assert!(experience.credit_allowance_id.is_empty());
        assert!(experience.credit_deduct);
        assert_eq!(experience.total_task, 4);
    }

    #[test]
    fn test_untouched_fields_survive() {
        let mut experience = Experience {
            id: "exp-1".to_string(),
            campaign_id: "camp-1".to_string(),
            name: "Launch hero".to_string(),
            aspect_ratio: 1.5,
            ..Default::default()
        };
        experience
            .images
            .upsert_by_kind(kinds::ORIGINAL, "https://cdn.example.com/a.jpg");

        let patch = ExperiencePatch {
            status: Patch::Set(ExperienceStatus::Processing),
            ..Default::default()
        };
        patch.apply_to(&mut experience);

        assert_eq!(experience.name, "Launch hero");
        assert_eq!(experience.aspect_ratio, 1.5);
        assert_eq!(
            experience.images.url_of(kinds::ORIGINAL),
            Some("https://cdn.example.com/a.jpg")
        );
    }

    #[test]
    fn test_campaign_patch_bumps_version() {
        let mut campaign = Campaign {
            id: "camp-1".to_string(),
            version: 7,
            ..Default::default()
        };

        let patch = CampaignPatch {
            publish: Patch::Set(true),
            golive_at: Patch::Set(Utc::now()),
            ..Default::default()
        };
        patch.apply_to(&mut campaign);

        assert!(campaign.publish);
        assert!(campaign.golive_at.is_some());
        assert_eq!(campaign.version, 8);
    }

    #[test]
    fn test_empty_patch_reports_empty() {
        assert!(ExperiencePatch::default().is_empty());
        assert!(CampaignPatch::default().is_empty());
        let with_delta = ExperiencePatch {
            images: {
                let mut delta = AssetDelta::default();
                delta.pull(kinds::COMPRESSED);
                delta
            },
            ..Default::default()
        };
        assert!(!with_delta.is_empty());
    }
}
