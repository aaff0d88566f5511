// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire types exchanged with the media processing pipeline.
//!
//! A submitted [`Workflow`] is a set of tasks keyed by deterministic task id
//! plus a dependency map. The pipeline executes the tasks and publishes one
//! [`WorkflowResult`] to the completion stream. Both envelopes carry a typed
//! [`WorkflowRoute`] naming the consumer lane; results are never routed by
//! parsing identifier strings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{Overlay, Plane, User, Variant, WorkflowError};
use crate::status::TaskStatus;

// ============================================================================
// Routing
// ============================================================================

/// Consumer lane a workflow's result is dispatched to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "lane", rename_all = "snake_case")]
pub enum WorkflowRoute {
    /// Main experience media pipeline.
    Experience {
        /// Target experience.
        experience_id: String,
    },
    /// Stitched composite video for a segmented experience.
    StitchSegment {
        /// Target experience.
        experience_id: String,
    },
    /// Campaign scan-target processing.
    Campaign {
        /// Target campaign short code.
        short_code: String,
    },
    /// QR overlay rendering onto the scan image.
    QrOverlay {
        /// Target experience.
        experience_id: String,
    },
    /// Generative video regeneration preview.
    Regenerate {
        /// Target experience.
        experience_id: String,
    },
    /// Programmatic composition render.
    Remotion {
        /// Target render record.
        render_id: String,
    },
}

impl WorkflowRoute {
    /// Lane name for logging.
    pub fn lane_name(&self) -> &'static str {
        match self {
            Self::Experience { .. } => "experience",
            Self::StitchSegment { .. } => "stitch_segment",
            Self::Campaign { .. } => "campaign",
            Self::QrOverlay { .. } => "qr_overlay",
            Self::Regenerate { .. } => "regenerate",
            Self::Remotion { .. } => "remotion",
        }
    }
}

// ============================================================================
// Task inputs
// ============================================================================

/// One video of a stitch job, in marker order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentVideo {
    /// Source video URL.
    #[serde(default)]
    pub original_url: String,
    /// Segmentation mask video URL.
    #[serde(default)]
    pub mask_url: String,
    /// Marker the video belongs to.
    #[serde(default)]
    pub marker_id: String,
}

/// QR placement coordinate on the scan image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QrCoordinates {
    /// Horizontal position.
    pub x: f32,
    /// Vertical position.
    pub y: f32,
}

/// Programmatic composition render job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemotionJob {
    /// Composition to render.
    #[serde(default, rename = "compositionId", skip_serializing_if = "String::is_empty")]
    pub composition_id: String,
    /// Bundle entry point.
    #[serde(default, rename = "entryPoint", skip_serializing_if = "String::is_empty")]
    pub entry_point: String,
    /// Free-form props handed to the composition.
    #[serde(default, rename = "inputProps", skip_serializing_if = "Option::is_none")]
    pub input_props: Option<Value>,
    /// Output codec.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub codec: String,
    /// Whether an alpha mask render is requested alongside.
    #[serde(default)]
    pub mask: bool,
}

/// Alpha-matte extraction job chained after green-screen generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlphaVideoJob {
    /// Green-screen video to matte.
    #[serde(default)]
    pub video_url: String,
    /// Keying color family.
    #[serde(default)]
    pub color_type: String,
}

/// Generative video job parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerativeVideoJob {
    /// Job type understood by the generation service.
    #[serde(default, rename = "type")]
    pub job_type: String,
    /// Generation prompt.
    #[serde(default)]
    pub prompt: String,
    /// Upstream model/provider selector.
    #[serde(default)]
    pub video_generation_source: String,
    /// Reference media conditioning the generation.
    #[serde(default)]
    pub media_references: Vec<MediaReference>,
    /// Requesting user.
    #[serde(default)]
    pub user_id: String,
    /// Whether generated audio is kept.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub enable_audio: bool,
    /// Output category hint.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub video_category: String,
    /// Whether a fast low-resolution preview is requested.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub low_resolution: bool,
}

/// Reference medium for a generative job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaReference {
    /// Which frame the reference pins, e.g. `first`.
    #[serde(default)]
    pub frame_type: String,
    /// Media type of the reference.
    #[serde(default, rename = "type")]
    pub media_type: String,
    /// Reference URL.
    #[serde(default)]
    pub url: String,
}

/// Catalogue product embedding job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductVectorJob {
    /// Product identifier.
    #[serde(default)]
    pub id: String,
    /// Site the product belongs to.
    #[serde(default)]
    pub site_code: String,
    /// Owning client.
    #[serde(default)]
    pub client_id: String,
    /// Product name.
    #[serde(default)]
    pub name: String,
    /// Catalogue category.
    #[serde(default)]
    pub category: String,
    /// Display price.
    #[serde(default)]
    pub price: String,
    /// Price currency code.
    #[serde(default)]
    pub currency: String,
    /// Product image URL.
    #[serde(default, rename = "image")]
    pub image_url: String,
    /// Product page URL.
    #[serde(default)]
    pub product_url: String,
    /// Product description.
    #[serde(default)]
    pub description: String,
}

/// Body of a single pipeline task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInput {
    /// Source media URL; empty when the source is produced by a dependency.
    #[serde(default)]
    pub url: String,
    /// Mask URL processed together with the source.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mask_url: String,
    /// Spawn image processed when no scan source exists.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub spawn_image: String,
    /// Variant the processors shape their output for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
    /// Background overlay to composite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<Overlay>,
    /// Template metadata forwarded verbatim.
    #[serde(
        default,
        rename = "template_details",
        skip_serializing_if = "Option::is_none"
    )]
    pub template: Option<serde_json::Map<String, Value>>,
    /// Campaign short code.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub short_code: String,
    /// Whether a QR panel is composited onto scan renditions.
    #[serde(default, rename = "qrcode", skip_serializing_if = "std::ops::Not::not")]
    pub qr_code: bool,
    /// Target experience.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub experience_id: String,
    /// Public scan URL encoded into QR output.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scan_url: String,
    /// Whether the campaign publishes when the workflow completes.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub publish: bool,
    /// Composition render job.
    #[serde(default, rename = "remotion", skip_serializing_if = "Option::is_none")]
    pub remotion_job: Option<RemotionJob>,
    /// Whether a QR image must be generated.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub qr_generate: bool,
    /// Pre-provisioned QR identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub qr_id: String,
    /// QR background color.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub qr_bg_color: String,
    /// QR foreground color.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub qr_text_color: String,
    /// QR placement coordinates on the scan image.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub qr_coordinates: Vec<QrCoordinates>,
    /// Existing QR image to composite.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub qr_image_url: String,
    /// Whether this task stitches segment videos into one composite.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stitch: bool,
    /// Videos to stitch, in marker order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<SegmentVideo>,
    /// Whether a green-screen rendition is generated first.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub generate_green_screen: bool,
    /// Catalogue product embedding job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_vector_llm_product_job: Option<ProductVectorJob>,
    /// Alpha-matte extraction job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha_video_job: Option<AlphaVideoJob>,
    /// Generative video job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genstudio_job: Option<GenerativeVideoJob>,
}

// ============================================================================
// Workflow envelope
// ============================================================================

/// One unit of pipeline work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Owning workflow generation.
    #[serde(default)]
    pub workflow_id: String,
    /// Deterministic task identifier, also the dependency key.
    pub id: String,
    /// Processor subject the task is delivered to.
    pub subject: String,
    /// Task body.
    #[serde(default)]
    pub body: WorkflowInput,
}

/// A workflow submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow generation identifier.
    pub id: String,
    /// Consumer lane for the final result.
    pub route: WorkflowRoute,
    /// Tasks keyed by task identifier. Ordered map so serialized
    /// submissions are stable.
    pub tasks: BTreeMap<String, Task>,
    /// Task dependency edges, task id to prerequisite task ids.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, Vec<String>>,
    /// Stream the final result is published to.
    pub reply_subject: String,
    /// Whether the campaign publishes when this workflow completes.
    #[serde(default)]
    pub publish: bool,
}

impl Workflow {
    /// Whether the workflow carries no tasks and must not be submitted.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of tasks, recorded on the experience as `total_task`.
    pub fn task_count(&self) -> i32 {
        self.tasks.len() as i32
    }
}

// ============================================================================
// Completion results
// ============================================================================

/// Chapter bounds of one marker inside a stitched composite video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentMarkerInfo {
    /// Marker the chapter belongs to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub marker_id: String,
    /// Chapter start, milliseconds.
    #[serde(default, rename = "stime")]
    pub start_time: i64,
    /// Chapter end, milliseconds.
    #[serde(default, rename = "etime")]
    pub end_time: i64,
}

/// Output of a generative video task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenStudioOutput {
    /// Produced video URL.
    #[serde(default)]
    pub value: String,
}

/// Media URLs produced by one finished task.
///
/// Every field is optional on the wire; consumer lanes read the subset their
/// task type produces and ignore the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResultPayload {
    /// Target document identifier echoed by the processor.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Segment marker the result belongs to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub marker_id: String,
    /// Segmentation mask video.
    #[serde(default, rename = "mask", skip_serializing_if = "String::is_empty")]
    pub mask_video: String,
    /// Compressed video rendition.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compressed_video: String,
    /// Compressed playback rendition.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compressed_playback_video: String,
    /// Compressed image rendition.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compressed_image: String,
    /// Compressed overlay image.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub overlay_compressed: String,
    /// HLS manifest URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hls_url: String,
    /// DASH manifest URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dash_url: String,
    /// Normalized source video.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub original_video: String,
    /// Playback rendition.
    #[serde(default, rename = "playback_url", skip_serializing_if = "String::is_empty")]
    pub playback_video: String,
    /// Standard-definition compressed image.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub std_compressed_image: String,
    /// Color-corrected compressed image.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub color_compressed_image: String,
    /// Compressed template mask.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub template_mask_url: String,
    /// Aspect ratio measured from the source video.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub video_aspect_ratio: f64,
    /// Aspect ratio measured from the source image.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub image_aspect_ratio: f64,
    /// Feature image rendition.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub feature_image: String,
    /// Editor the change is attributed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_by: Option<User>,
    /// Landscape flag measured from the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_horizontal: Option<bool>,
    /// Compressed spawn image rendition.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub spawn_compressed_image: String,
    /// Processed parallax plane, echoed with produced renditions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plane: Option<Plane>,
    /// Whether the owning workflow publishes its campaign.
    #[serde(default)]
    pub publish: bool,
    /// Rendered composition video.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remotion_video_url: String,
    /// Rendered composition alpha mask video.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remotion_masked_video_url: String,
    /// Compressed scan-target rendition.
    #[serde(
        default,
        rename = "scan_compressed_image_url",
        skip_serializing_if = "String::is_empty"
    )]
    pub scan_compressed_image: String,
    /// Scan image with the QR panel composited in.
    #[serde(default, rename = "og_image_with_qr", skip_serializing_if = "String::is_empty")]
    pub og_image_with_qr: String,
    /// Processor-reported failure message.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
    /// Chapter bounds of the stitched composite.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segment_info: Vec<SegmentMarkerInfo>,
    /// WebM rendition.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub webm_url: String,
    /// Vector-store reference for catalogue embeddings.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub milvus_ref_id: String,
    /// LLM-generated product description for the catalogue entry.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub product_description: String,
    /// Generated green-screen still.
    #[serde(
        default,
        rename = "original_green_screen_img_url",
        skip_serializing_if = "String::is_empty"
    )]
    pub original_green_screen_image: String,
    /// RGB half of an alpha-matte extraction.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rgb_video_url: String,
    /// Mask half of an alpha-matte extraction.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mask_video_url: String,
    /// Generative task output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genstudio_output: Option<GenStudioOutput>,
}

fn is_zero(value: &f64) -> bool {
    *value == 0.0
}

/// Result of one task inside a finished workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Owning workflow generation.
    #[serde(default)]
    pub workflow_id: String,
    /// Task this result belongs to.
    pub task_id: String,
    /// Terminal task status.
    #[serde(default)]
    pub status: TaskStatus,
    /// Media produced by the task.
    #[serde(default)]
    pub payload: TaskResultPayload,
}

/// Final result of a workflow, published once to the completion stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// Workflow generation this result belongs to.
    pub workflow_id: String,
    /// Consumer lane the result dispatches to.
    pub route: WorkflowRoute,
    /// Terminal workflow status.
    pub status: TaskStatus,
    /// Per-task results, in completion order.
    #[serde(default)]
    pub task_results: Vec<TaskResult>,
    /// Pipeline-reported failure details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_error: Option<WorkflowError>,
    /// Whether the campaign publishes now that the workflow is done.
    #[serde(default)]
    pub publish: bool,
}

impl WorkflowResult {
    /// Result for a specific task id, if present.
    pub fn find_task(&self, task_id: &str) -> Option<&TaskResult> {
        self.task_results.iter().find(|r| r.task_id == task_id)
    }

    /// Payload of the first task result, if any.
    pub fn first_payload(&self) -> Option<&TaskResultPayload> {
        self.task_results.first().map(|r| &r.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_tag_names() {
        let route = WorkflowRoute::Campaign {
            short_code: "FLAM42".to_string(),
        };
        let json = serde_json::to_value(&route).unwrap();
        assert_eq!(json["lane"], "campaign");
        assert_eq!(json["short_code"], "FLAM42");

        let back: WorkflowRoute = serde_json::from_value(json).unwrap();
        assert_eq!(back, route);

        let remotion: WorkflowRoute =
            serde_json::from_str(r#"{"lane": "remotion", "render_id": "ren-9"}"#).unwrap();
        assert_eq!(
            remotion,
            WorkflowRoute::Remotion {
                render_id: "ren-9".to_string()
            }
        );
    }

    #[test]
    fn test_workflow_serialization_is_stable() {
        let mut tasks = BTreeMap::new();
        for id in ["main_video", "main_fal", "main_alpha_video"] {
            tasks.insert(
                id.to_string(),
                Task {
                    workflow_id: "wf-1".to_string(),
                    id: id.to_string(),
                    subject: "MEDIAPROCESSOR.video.process".to_string(),
                    body: WorkflowInput::default(),
                },
            );
        }
        let workflow = Workflow {
            id: "wf-1".to_string(),
            route: WorkflowRoute::Experience {
                experience_id: "exp-1".to_string(),
            },
            tasks,
            dependencies: BTreeMap::new(),
            reply_subject: "workflow.completed".to_string(),
            publish: false,
        };

        let first = serde_json::to_string(&workflow).unwrap();
        let second = serde_json::to_string(&workflow).unwrap();
        assert_eq!(first, second);
        // BTreeMap orders task ids lexicographically.
        let alpha = first.find("main_alpha_video").unwrap();
        let fal = first.find("main_fal").unwrap();
        let video = first.find("main_video").unwrap();
        assert!(alpha < fal && fal < video);
    }

    #[test]
    fn test_result_payload_wire_names() {
        let payload: TaskResultPayload = serde_json::from_str(
            r#"{
                "compressed_image": "https://cdn.example.com/c.jpg",
                "scan_compressed_image_url": "https://cdn.example.com/scan.jpg",
                "og_image_with_qr": "https://cdn.example.com/qr.jpg",
                "mask": "https://cdn.example.com/mask.mp4",
                "playback_url": "https://cdn.example.com/play.mp4",
                "image_aspect_ratio": 0.75
            }"#,
        )
        .unwrap();

        assert_eq!(payload.compressed_image, "https://cdn.example.com/c.jpg");
        assert_eq!(payload.scan_compressed_image, "https://cdn.example.com/scan.jpg");
        assert_eq!(payload.og_image_with_qr, "https://cdn.example.com/qr.jpg");
        assert_eq!(payload.mask_video, "https://cdn.example.com/mask.mp4");
        assert_eq!(payload.playback_video, "https://cdn.example.com/play.mp4");
        assert_eq!(payload.image_aspect_ratio, 0.75);
    }

    #[test]
    fn test_result_round_trip_with_partial_results() {
        let result = WorkflowResult {
            workflow_id: "wf-1".to_string(),
            route: WorkflowRoute::Experience {
                experience_id: "exp-1".to_string(),
            },
            status: TaskStatus::Failed,
            task_results: vec![TaskResult {
                workflow_id: "wf-1".to_string(),
                task_id: "main_image".to_string(),
                status: TaskStatus::Completed,
                payload: TaskResultPayload {
                    compressed_image: "https://cdn.example.com/c.jpg".to_string(),
                    ..Default::default()
                },
            }],
            workflow_error: Some(WorkflowError {
                consumer_type: "media".to_string(),
                task_id: "main_video".to_string(),
                msg: "transcode failed".to_string(),
                ..Default::default()
            }),
            publish: false,
        };

        let json = serde_json::to_string(&result).unwrap();
        let back: WorkflowResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
        assert!(back.find_task("main_image").is_some());
        assert!(back.find_task("main_video").is_none());
        assert_eq!(
            back.first_payload().unwrap().compressed_image,
            "https://cdn.example.com/c.jpg"
        );
    }
}
