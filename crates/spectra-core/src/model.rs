// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Document model for campaigns, experiences, and related records.
//!
//! These types mirror the stored JSON layout of the content documents. String
//! fields that may be absent on the wire use empty-string defaults and are
//! skipped on serialization; optional sub-documents use `Option`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::assets::AssetSet;
use crate::status::ExperienceStatus;

// ============================================================================
// Shared value objects
// ============================================================================

/// Actor reference embedded in documents (creator / last editor).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Stable user identifier.
    pub id: String,
    /// Contact email, used for campaign lifecycle mails.
    #[serde(default)]
    pub email: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

/// 2D point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TwoDCoordinates {
    /// Horizontal component.
    #[serde(default)]
    pub x: f64,
    /// Vertical component.
    #[serde(default)]
    pub y: f64,
}

/// 3D point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreeDCoordinates {
    /// Horizontal component.
    #[serde(default)]
    pub x: f64,
    /// Vertical component.
    #[serde(default)]
    pub y: f64,
    /// Depth component.
    #[serde(default)]
    pub z: f64,
}

/// Per-platform canvas height used by the mobile renderers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    /// iOS canvas height.
    #[serde(default)]
    pub ios: i64,
    /// Android canvas height.
    #[serde(default)]
    pub android: i64,
}

/// iOS canvas height applied when an experience is reset to draft.
pub const DEFAULT_IOS_CANVAS: i64 = 2100;

// ============================================================================
// Variant: tracking, buttons, segments
// ============================================================================

/// Cutout mask applied to a scan target or parallax layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mask {
    /// Source mask image URL.
    #[serde(default)]
    pub url: String,
    /// Placement offset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<ThreeDCoordinates>,
    /// Placement rotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<ThreeDCoordinates>,
    /// Placement scale.
    #[serde(default)]
    pub scale: f32,
    /// Pipeline-produced compressed rendition.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compressed_url: String,
}

/// Background treatment rendered behind the subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    /// One of `COLOR`, `BLUR`, `IMAGE`, `TRANSPARENT`.
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub overlay_type: String,
    /// Color value or source image URL, depending on the type.
    #[serde(default)]
    pub value: String,
    /// Pipeline-produced compressed rendition for `IMAGE` overlays.
    #[serde(default)]
    pub compressed_image: String,
}

/// Overlay type whose source image is compressed by the pipeline.
pub const OVERLAY_IMAGE: &str = "IMAGE";
/// Overlay type that renders nothing and never schedules work.
pub const OVERLAY_TRANSPARENT: &str = "TRANSPARENT";

/// Video renditions attached to a segment marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoObject {
    /// Source video URL.
    #[serde(default)]
    pub original: String,
    /// Compressed rendition.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compressed: String,
    /// Segmentation mask video.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mask: String,
    /// HLS manifest URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hls: String,
    /// DASH manifest URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dash: String,
    /// WebM rendition.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub webm: String,
    /// Pre-merged transition video played between markers.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub merge_video: String,
    /// Playback orientation hint.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub orientation: String,
}

/// One branch of a segmented story.
///
/// `next` names the marker played after this one; `show_elements` lists the
/// UI element indices visible while it plays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentMarker {
    /// Marker identifier, referenced by buttons and `next` pointers.
    pub id: String,
    /// Chroma key color.
    #[serde(default)]
    pub color: String,
    /// Color map asset.
    #[serde(default)]
    pub color_map: String,
    /// Whether the viewer may select this marker directly.
    #[serde(default)]
    pub allow_selection: bool,
    /// Playback window start, milliseconds.
    #[serde(default)]
    pub stime: i64,
    /// Playback window end, milliseconds.
    #[serde(default)]
    pub etime: i64,
    /// Identifier of the marker that plays after this one.
    #[serde(default)]
    pub next: String,
    /// Playback speed multiplier.
    #[serde(default)]
    pub multiplier: String,
    /// URL opened when the marker completes.
    #[serde(default)]
    pub redirection_url: String,
    /// Whether `redirection_url` opens in an external browser.
    #[serde(default)]
    pub web_redirect: bool,
    /// UI element indices shown while this marker plays.
    #[serde(default)]
    pub show_elements: Vec<i32>,
    /// Marker video renditions.
    #[serde(default)]
    pub videos: VideoObject,
    /// Playback orientation override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_horizontal: Option<bool>,
    /// Display name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

/// Segmented-story container on a variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Segments {
    /// Backdrop color behind segment video.
    #[serde(default)]
    pub back_color: String,
    /// Flush color shown between marker switches.
    #[serde(default)]
    pub flush_color: String,
    /// Identifier of the marker played first.
    #[serde(default)]
    pub default: String,
    /// Whether per-marker videos drive playback instead of the stitched video.
    #[serde(default)]
    pub use_marker_video: bool,
    /// Whether segmented UI elements are enabled.
    #[serde(default)]
    pub use_segmented_elements: bool,
    /// Story branches.
    #[serde(default)]
    pub markers: Vec<SegmentMarker>,
}

/// Tappable button that jumps playback to a marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractiveButton {
    /// Button identifier.
    pub id: String,
    /// Asset type, one of `image`, `video`, `gif`.
    #[serde(default, rename = "type")]
    pub button_type: String,
    /// Uploaded asset file name.
    #[serde(default)]
    pub asset_file_name: String,
    /// Source asset URL.
    #[serde(default)]
    pub asset_url: String,
    /// Pipeline-produced compressed rendition.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compressed_asset_url: String,
    /// Fallback fill color.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub color: String,
    /// Identifier of the marker this button jumps to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub marker_id: String,
    /// Placement in the scene.
    #[serde(default)]
    pub position: ThreeDCoordinates,
    /// Render scale.
    #[serde(default)]
    pub scale: TwoDCoordinates,
    /// Crop shape: 0 rectangle, 1 square, 2 circle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_id: Option<i32>,
}

/// Height/width pair used by button layout config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeightWidth {
    /// Height in layout units.
    #[serde(default)]
    pub height: i32,
    /// Width in layout units.
    #[serde(default)]
    pub width: i32,
}

/// Layout configuration for interactive buttons.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BtnConfig {
    /// Edge the button rail is attached to.
    #[serde(default)]
    pub button_layout: String,
    /// Aspect ratio of each button.
    #[serde(default)]
    pub button_aspect_ratio: HeightWidth,
    /// Aspect ratio of the video viewport.
    #[serde(default)]
    pub video_aspect_ratio: HeightWidth,
    /// Alignment of buttons along the rail.
    #[serde(default)]
    pub button_alignment: String,
    /// Gap between buttons.
    #[serde(default)]
    pub button_gap: f64,
    /// Rail offset from the edge.
    #[serde(default)]
    pub button_offset: f64,
}

/// Tracking/rendering variant of an experience.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Tracking mode, one of `POSE`, `GROUND`, `CARD`.
    #[serde(default)]
    pub track_type: String,
    /// Processing class; class 2 experiences skip media processing.
    #[serde(default)]
    pub class: i32,
    /// Interactive buttons for segmented stories.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<InteractiveButton>,
    /// Segmented-story container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<Segments>,
    /// Whether the source video carries an alpha channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_alpha: Option<bool>,
    /// Landscape playback flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_horizontal: Option<bool>,
    /// Placement offset for ground experiences.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<ThreeDCoordinates>,
    /// Per-axis render scale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_axis: Option<ThreeDCoordinates>,
    /// Button rail layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_config: Option<BtnConfig>,
    /// Whether playback uses the stitched composite video.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stitched_video: Option<bool>,
}

// ============================================================================
// Scene: parallax layers
// ============================================================================

/// One renderable layer of a parallax group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    /// Plane identifier.
    pub id: String,
    /// Owning parallax group.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parallax_id: String,
    /// Media type: 0 image, 1 video, 2 alpha video, 3 3D model, 4 webview.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub plane_type: Option<i32>,
    /// Source media URL.
    #[serde(default)]
    pub url: String,
    /// Pipeline-produced compressed rendition.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compressed: String,
    /// Alpha mask video URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mask: String,
    /// HLS manifest URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hls: String,
    /// DASH manifest URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dash: String,
    /// Placement offset.
    #[serde(default)]
    pub offset: ThreeDCoordinates,
    /// Placement rotation.
    #[serde(default)]
    pub rotation: ThreeDCoordinates,
    /// Render scale.
    #[serde(default)]
    pub scale: f64,
    /// Landscape playback flag.
    #[serde(default, rename = "isHorizontal", skip_serializing_if = "Option::is_none")]
    pub is_horizontal: Option<bool>,
}

/// Plane type constant: still image.
pub const PLANE_TYPE_IMAGE: i32 = 0;
/// Plane type constant: video.
pub const PLANE_TYPE_VIDEO: i32 = 1;
/// Plane type constant: alpha video.
pub const PLANE_TYPE_ALPHA_VIDEO: i32 = 2;

/// Group of planes sharing one scene mask.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parallax {
    /// Parallax group identifier.
    pub id: String,
    /// Optional cutout mask over the whole group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<Mask>,
    /// Layers of this group.
    #[serde(default)]
    pub planes: Vec<Plane>,
}

/// Multi-layer scene composition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Viewport aspect ratio written once by the first completed layer.
    #[serde(default)]
    pub window_ratio: f64,
    /// Parallax groups.
    #[serde(default)]
    pub parallax: Vec<Parallax>,
}

// ============================================================================
// Workflow bookkeeping
// ============================================================================

/// Terminal failure details recorded on an experience.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowError {
    /// Lane that recorded the failure, `media` or `credit`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub consumer_type: String,
    /// Failing task identifier, when the failure is task-scoped.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub task_id: String,
    /// Human-readable failure message.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub msg: String,
    /// Source file name associated with the failure, when known.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filename: String,
}

/// Commerce metadata attached to catalogue-sourced experiences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogueDetails {
    /// Product identifier in the source catalogue.
    #[serde(default)]
    pub product_id: String,
    /// Product name.
    #[serde(default)]
    pub name: String,
    /// Product description.
    #[serde(default)]
    pub description: String,
    /// Price currency code.
    #[serde(default)]
    pub currency: String,
    /// Display price.
    #[serde(default)]
    pub price: String,
    /// Product image URL.
    #[serde(default)]
    pub image_url: String,
    /// Product page URL.
    #[serde(default)]
    pub product_url: String,
    /// Catalogue category.
    #[serde(default)]
    pub category: String,
}

/// State of a generative-video request attached to an experience.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoGeneration {
    /// Generation prompt.
    #[serde(default)]
    pub prompt: String,
    /// Workflow that carries the generation job.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workflow_id: String,
    /// Generation status, `PROCESSED` or `FAILED` once terminal.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    /// Produced preview video URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub video_url: String,
}

// ============================================================================
// Experience
// ============================================================================

/// A single AR experience document.
///
/// Holds the uploaded source media, the pipeline-produced renditions grouped
/// by kind, the tracking variant, and the workflow bookkeeping fields the
/// reconciler maintains.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    /// Experience identifier.
    pub id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Owning campaign.
    pub campaign_id: String,
    /// Per-platform canvas config.
    #[serde(default)]
    pub canvas: Canvas,
    /// Whether this experience participates in publish checks.
    #[serde(default)]
    pub is_active: bool,
    /// Tracking/rendering variant.
    #[serde(default)]
    pub variant: Variant,
    /// Processing status.
    #[serde(default)]
    pub status: ExperienceStatus,
    /// Image assets grouped by kind.
    #[serde(default)]
    pub images: AssetSet,
    /// Video assets grouped by kind.
    #[serde(default)]
    pub videos: AssetSet,
    /// Audio assets grouped by kind.
    #[serde(default, skip_serializing_if = "AssetSet::is_empty")]
    pub audios: AssetSet,
    /// 3D model assets grouped by kind.
    #[serde(default, rename = "3d_assets", skip_serializing_if = "AssetSet::is_empty")]
    pub three_d_assets: AssetSet,
    /// Whether scans of this experience present a QR panel.
    #[serde(default)]
    pub qr_code: bool,
    /// Aspect ratio of the source media.
    #[serde(default)]
    pub aspect_ratio: f64,
    /// Background overlay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<Overlay>,
    /// Scan-target cutout mask.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<Mask>,
    /// Multi-layer scene, present on parallax experiences.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<Scene>,
    /// Free-form template metadata; `credit_type` lives here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_details: Option<Map<String, Value>>,
    /// Terminal failure details, cleared on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_error: Option<WorkflowError>,
    /// Whether a credit has been consumed for this experience.
    #[serde(default)]
    pub credit_deduct: bool,
    /// Number of tasks in the current workflow generation.
    #[serde(default)]
    pub total_task: i32,
    /// Identifier of the current workflow generation.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workflow_id: String,
    /// Identifier of the stitch workflow generation, when one exists.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stitch_workflow_id: String,
    /// Credit escrow reserved for this experience, consumed on completion.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub credit_allowance_id: String,
    /// Commerce metadata for catalogue-sourced experiences.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalogue_details: Option<CatalogueDetails>,
    /// Generative-video request state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_generation: Option<VideoGeneration>,
    /// Creator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<User>,
    /// Last editor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_by: Option<User>,
    /// Creation time.
    #[serde(default = "epoch")]
    pub created_at: DateTime<Utc>,
    /// Last update time.
    #[serde(default = "epoch")]
    pub updated_at: DateTime<Utc>,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl Experience {
    /// The user credit consumption and notifications are attributed to.
    ///
    /// The last editor when one is recorded, otherwise the creator.
    pub fn effective_user(&self) -> Option<&User> {
        self.edited_by.as_ref().or(self.created_by.as_ref())
    }

    /// Credit type recorded in the template metadata, if any.
    pub fn credit_type(&self) -> Option<&str> {
        self.template_details
            .as_ref()
            .and_then(|details| details.get("credit_type"))
            .and_then(Value::as_str)
    }
}

// ============================================================================
// Campaign
// ============================================================================

/// Scan-target presentation attached to a campaign.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scan {
    /// Prompt text shown over the scan target.
    #[serde(default)]
    pub scan_text: String,
    /// Scan target image URL.
    #[serde(default)]
    pub image_url: String,
    /// Compressed scan target rendition.
    #[serde(default)]
    pub compressed_image_url: String,
}

/// A campaign grouping one or more experiences behind a short code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    /// Campaign identifier.
    pub id: String,
    /// Owning client.
    #[serde(default)]
    pub client_id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Public short code used in scan URLs and cache keys.
    #[serde(default)]
    pub short_code: String,
    /// Tracking mode shared by the campaign's experiences.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub track_type: String,
    /// Scan-target presentation.
    #[serde(default)]
    pub scan: Scan,
    /// Processing status.
    #[serde(default)]
    pub status: ExperienceStatus,
    /// Soft-delete flag.
    #[serde(default)]
    pub is_active: bool,
    /// Whether the campaign is live.
    #[serde(default)]
    pub publish: bool,
    /// Icon shown in campaign listings.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon_url: String,
    /// Vector-store reference produced by catalogue embedding.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub milvus_ref_id: String,
    /// Creator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<User>,
    /// Last editor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_by: Option<User>,
    /// Creation time.
    #[serde(default = "epoch")]
    pub created_at: DateTime<Utc>,
    /// Last update time.
    #[serde(default = "epoch")]
    pub updated_at: DateTime<Utc>,
    /// Plan-derived expiry, set when the publishing credit is consumed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Go-live time, set when the campaign is published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub golive_at: Option<DateTime<Utc>>,
    /// Monotonic token bumped on every write, used for conditional publish.
    #[serde(default)]
    pub version: i64,
}

// ============================================================================
// Categories and render records
// ============================================================================

/// Discovery category that lists campaigns on site pages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Category identifier.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Site the category belongs to; part of the category cache key.
    #[serde(default)]
    pub site_code: String,
}

/// A programmatic-composition render request and its result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemotionRender {
    /// Render record identifier.
    pub id: String,
    /// Workflow that carries the render job.
    #[serde(default)]
    pub workflow_id: String,
    /// Requesting user.
    #[serde(default)]
    pub user_id: String,
    /// Source composition project.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_id: String,
    /// Render status, `PROCESSED` once the result lands.
    #[serde(default)]
    pub status: String,
    /// Produced video URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub video_url: String,
    /// Produced alpha mask video URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mask_url: String,
    /// Creation time.
    #[serde(default = "epoch")]
    pub created_at: DateTime<Utc>,
    /// Last update time.
    #[serde(default = "epoch")]
    pub updated_at: DateTime<Utc>,
}
