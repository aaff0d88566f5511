// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Segment splicing: building and diffing segmented-story variants.
//!
//! Callers describe the desired story as an ordered list of
//! [`ButtonSegment`] inputs. [`build_segments`] materializes a fresh variant
//! from that list; [`splice_segments`] diffs it against an existing
//! experience, preserving processed renditions for unchanged markers and
//! reporting which assets need reprocessing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{
    BtnConfig, Experience, InteractiveButton, SegmentMarker, Segments, ThreeDCoordinates,
    TwoDCoordinates, VideoObject,
};
use crate::wire::SegmentVideo;

/// Backdrop color applied to newly built segment containers.
pub const SEGMENT_BACK_COLOR: &str = "#FFFFFF";
/// Flush color applied to newly built segment containers.
pub const SEGMENT_FLUSH_COLOR: &str = "#000000";

// ============================================================================
// Inputs
// ============================================================================

/// One desired story branch: a button and the marker it jumps to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ButtonSegment {
    /// Button asset type, one of `image`, `video`, `gif`.
    #[serde(default)]
    pub button_type: String,
    /// Uploaded button asset file name.
    #[serde(default)]
    pub asset_file_name: String,
    /// Button asset URL.
    #[serde(default)]
    pub asset_url: String,
    /// Button fill color.
    #[serde(default)]
    pub color: String,
    /// Marker identifier; empty means a fresh one is assigned.
    #[serde(default)]
    pub marker_id: String,
    /// Button placement.
    #[serde(default)]
    pub position: ThreeDCoordinates,
    /// Button render scale.
    #[serde(default)]
    pub scale: TwoDCoordinates,
    /// Button crop shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_id: Option<i32>,
    /// UI element indices shown while the marker plays.
    #[serde(default)]
    pub show_elements: Vec<i32>,
    /// Marker source video URL.
    #[serde(default)]
    pub original_video_url: String,
    /// Pre-merged transition video.
    #[serde(default)]
    pub merge_video: String,
    /// Playback orientation; `None` leaves the stored value untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<String>,
    /// Marker mask video URL.
    #[serde(default)]
    pub mask_url: String,
}

/// Desired segmented story for an experience update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentData {
    /// Whether segmented UI elements are enabled.
    #[serde(default)]
    pub use_segmented_element: bool,
    /// Button rail layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_config: Option<BtnConfig>,
    /// Story branches in playback order.
    #[serde(default)]
    pub button_segments: Vec<ButtonSegment>,
}

// ============================================================================
// Change summary
// ============================================================================

/// A button asset that needs image processing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ButtonImageChange {
    /// Marker the button belongs to.
    pub marker_id: String,
    /// New button asset URL.
    pub asset_url: String,
}

/// A marker video that needs video processing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerVideoChange {
    /// Marker the video belongs to.
    pub marker_id: String,
    /// New source video URL.
    pub video_url: String,
    /// New mask video URL.
    pub mask_url: String,
}

/// What a splice changed, and therefore what needs reprocessing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentChanges {
    /// Button assets that changed.
    pub image_changes: Vec<ButtonImageChange>,
    /// Marker videos that changed.
    pub video_changes: Vec<MarkerVideoChange>,
    /// Final per-marker video list, in story order, for stitching.
    pub video_urls: Vec<SegmentVideo>,
    /// Whether the stitched composite must be rebuilt.
    pub process_stitch_video: bool,
}

impl SegmentChanges {
    /// Whether any asset needs reprocessing.
    pub fn has_asset_changes(&self) -> bool {
        !self.image_changes.is_empty() || !self.video_changes.is_empty()
    }
}

fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

/// Assign marker ids to inputs that lack one, in place.
fn assign_marker_ids(segments: &mut [ButtonSegment]) {
    for segment in segments.iter_mut() {
        if segment.marker_id.is_empty() {
            segment.marker_id = fresh_id();
        }
    }
}

// ============================================================================
// Build
// ============================================================================

/// Build a fresh segment container from the desired story.
///
/// Every marker points at the following one, wrapping from the last back to
/// the first; the first marker becomes the default. Everything is reported as
/// changed since nothing has been processed yet.
pub fn build_segments(
    data: &SegmentData,
) -> (Segments, Vec<InteractiveButton>, SegmentChanges) {
    let mut inputs = data.button_segments.clone();
    assign_marker_ids(&mut inputs);

    let mut buttons = Vec::with_capacity(inputs.len());
    let mut markers = Vec::with_capacity(inputs.len());
    let mut changes = SegmentChanges {
        process_stitch_video: true,
        ..Default::default()
    };

    for (i, segment) in inputs.iter().enumerate() {
        let next = inputs[(i + 1) % inputs.len()].marker_id.clone();

        buttons.push(InteractiveButton {
            id: fresh_id(),
            button_type: segment.button_type.clone(),
            asset_file_name: segment.asset_file_name.clone(),
            asset_url: segment.asset_url.clone(),
            color: segment.color.clone(),
            marker_id: segment.marker_id.clone(),
            position: segment.position,
            scale: segment.scale,
            mask_id: segment.mask_id,
            ..Default::default()
        });
        changes.image_changes.push(ButtonImageChange {
            marker_id: segment.marker_id.clone(),
            asset_url: segment.asset_url.clone(),
        });

        let mut videos = VideoObject {
            original: segment.original_video_url.clone(),
            mask: segment.mask_url.clone(),
            merge_video: segment.merge_video.clone(),
            ..Default::default()
        };
        if let Some(orientation) = &segment.orientation {
            videos.orientation = orientation.clone();
        }
        markers.push(SegmentMarker {
            id: segment.marker_id.clone(),
            next,
            show_elements: segment.show_elements.clone(),
            videos,
            ..Default::default()
        });
        changes.video_changes.push(MarkerVideoChange {
            marker_id: segment.marker_id.clone(),
            video_url: segment.original_video_url.clone(),
            mask_url: segment.mask_url.clone(),
        });
        changes.video_urls.push(SegmentVideo {
            marker_id: segment.marker_id.clone(),
            original_url: segment.original_video_url.clone(),
            mask_url: segment.mask_url.clone(),
        });
    }

    let default_marker = inputs
        .first()
        .map(|s| s.marker_id.clone())
        .unwrap_or_default();
    let segments = Segments {
        back_color: SEGMENT_BACK_COLOR.to_string(),
        flush_color: SEGMENT_FLUSH_COLOR.to_string(),
        default: default_marker,
        use_marker_video: true,
        use_segmented_elements: data.use_segmented_element,
        markers,
    };

    (segments, buttons, changes)
}

// ============================================================================
// Diff
// ============================================================================

/// Diff the desired story against an existing experience.
///
/// Markers are matched by id. Unchanged markers keep their processed
/// renditions and playback windows; a changed source or mask video resets the
/// marker's window and forces a stitch rebuild, as does any change to the
/// number of markers. A changed merge video alone is carried over without
/// reprocessing.
pub fn splice_segments(
    experience: &Experience,
    data: &SegmentData,
) -> (Vec<InteractiveButton>, Vec<SegmentMarker>, SegmentChanges) {
    let existing_buttons: std::collections::HashMap<&str, &InteractiveButton> = experience
        .variant
        .buttons
        .iter()
        .map(|b| (b.marker_id.as_str(), b))
        .collect();
    let (existing_markers, existing_count) = match &experience.variant.segments {
        Some(segments) => (
            segments
                .markers
                .iter()
                .map(|m| (m.id.as_str(), m))
                .collect::<std::collections::HashMap<&str, &SegmentMarker>>(),
            segments.markers.len(),
        ),
        None => (std::collections::HashMap::new(), 0),
    };

    let mut inputs = data.button_segments.clone();
    assign_marker_ids(&mut inputs);

    let mut buttons = Vec::with_capacity(inputs.len());
    let mut markers = Vec::with_capacity(inputs.len());
    let mut changes = SegmentChanges::default();

    for (i, input) in inputs.iter().enumerate() {
        let next = inputs[(i + 1) % inputs.len()].marker_id.clone();
        let marker_id = input.marker_id.clone();

        let mut button = match existing_buttons.get(marker_id.as_str()) {
            Some(old) => {
                let mut button = (*old).clone();
                if button.asset_url != input.asset_url {
                    changes.image_changes.push(ButtonImageChange {
                        marker_id: marker_id.clone(),
                        asset_url: input.asset_url.clone(),
                    });
                    button.asset_url = input.asset_url.clone();
                    button.compressed_asset_url.clear();
                }
                button
            }
            None => {
                changes.image_changes.push(ButtonImageChange {
                    marker_id: marker_id.clone(),
                    asset_url: input.asset_url.clone(),
                });
                InteractiveButton {
                    id: fresh_id(),
                    marker_id: marker_id.clone(),
                    asset_url: input.asset_url.clone(),
                    ..Default::default()
                }
            }
        };
        button.button_type = input.button_type.clone();
        button.asset_file_name = input.asset_file_name.clone();
        button.color = input.color.clone();
        button.position = input.position;
        button.scale = input.scale;
        button.mask_id = input.mask_id;
        buttons.push(button);

        let mut marker = match existing_markers.get(marker_id.as_str()) {
            Some(old) => {
                let mut marker = (*old).clone();
                marker.show_elements = input.show_elements.clone();
                if marker.videos.original != input.original_video_url
                    || marker.videos.mask != input.mask_url
                {
                    changes.video_changes.push(MarkerVideoChange {
                        marker_id: marker_id.clone(),
                        video_url: input.original_video_url.clone(),
                        mask_url: input.mask_url.clone(),
                    });
                    marker.videos = VideoObject {
                        original: input.original_video_url.clone(),
                        mask: input.mask_url.clone(),
                        merge_video: input.merge_video.clone(),
                        ..Default::default()
                    };
                    marker.stime = 0;
                    marker.etime = 0;
                    changes.process_stitch_video = true;
                } else if !input.merge_video.is_empty()
                    && marker.videos.merge_video != input.merge_video
                {
                    // Swapping only the transition video needs no reprocessing.
                    marker.videos.merge_video = input.merge_video.clone();
                }
                if let Some(orientation) = &input.orientation {
                    marker.videos.orientation = orientation.clone();
                }
                marker
            }
            None => {
                changes.video_changes.push(MarkerVideoChange {
                    marker_id: marker_id.clone(),
                    video_url: input.original_video_url.clone(),
                    mask_url: input.mask_url.clone(),
                });
                changes.process_stitch_video = true;
                let mut videos = VideoObject {
                    original: input.original_video_url.clone(),
                    mask: input.mask_url.clone(),
                    merge_video: input.merge_video.clone(),
                    ..Default::default()
                };
                if let Some(orientation) = &input.orientation {
                    videos.orientation = orientation.clone();
                }
                SegmentMarker {
                    id: marker_id.clone(),
                    show_elements: input.show_elements.clone(),
                    videos,
                    ..Default::default()
                }
            }
        };
        changes.video_urls.push(SegmentVideo {
            marker_id: marker_id.clone(),
            original_url: marker.videos.original.clone(),
            mask_url: marker.videos.mask.clone(),
        });
        marker.next = next;
        markers.push(marker);
    }

    if existing_count != inputs.len() {
        changes.process_stitch_video = true;
    }

    (buttons, markers, changes)
}
