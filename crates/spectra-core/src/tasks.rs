// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow task building.
//!
//! The update path describes what changed as a [`MediaProcess`]; this module
//! turns it into concrete pipeline tasks with deterministic identifiers and a
//! dependency map, grouped into a main workflow and, when segment stitching
//! is required, a separate stitch workflow. A task is only emitted when its
//! source media exists; absent inputs are not scheduled at all.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assets::kinds;
use crate::model::{
    Experience, Scene, User, Variant, OVERLAY_IMAGE, PLANE_TYPE_ALPHA_VIDEO, PLANE_TYPE_IMAGE,
    PLANE_TYPE_VIDEO,
};
use crate::splicer::SegmentChanges;
use crate::wire::{
    AlphaVideoJob, GenerativeVideoJob, ProductVectorJob, Task, Workflow, WorkflowInput,
    WorkflowRoute,
};

/// Stream every workflow reports its final result on.
pub const WORKFLOW_COMPLETE_SUBJECT: &str = "workflow.completed";

/// Weight a video-processing task adds to the recorded task total. Video
/// tasks fan out into multiple renditions, so progress accounting counts
/// them heavier than image tasks.
pub const VIDEO_TASK_WEIGHT: i32 = 4;

/// Processor handler types addressed by task subjects.
pub mod process {
    /// Still image processing.
    pub const IMAGE: &str = "image";
    /// Video transcode and rendition fan-out.
    pub const VIDEO: &str = "video";
    /// Overlay compositing.
    pub const OVERLAY: &str = "overlay";
    /// Generative video synthesis.
    pub const FAL: &str = "fal";
    /// Low-resolution generative preview.
    pub const FAL_LOW_RESOLUTION: &str = "fal_low_resolution";
    /// Alpha-matte extraction from green-screen footage.
    pub const ALPHA_VIDEO: &str = "alpha_video";
    /// Catalogue product embedding.
    pub const IMAGE_VECTOR_LLM: &str = "image_vector_llm";
    /// Scan-target image processing.
    pub const SCAN_IMAGE: &str = "scan_image";
}

fn media_subject(process_type: &str) -> String {
    format!("MEDIAPROCESSOR.{process_type}.process")
}

fn genstudio_subject(process_type: &str) -> String {
    format!("GENSTUDIO.{process_type}.process")
}

// ============================================================================
// Task identifiers
// ============================================================================

/// Identifier of a main-lane task, e.g. `main_image`.
pub fn main_task_id(process_type: &str) -> String {
    format!("main_{process_type}")
}

/// Identifier of a parallax plane task.
pub fn plane_task_id(parallax_id: &str, plane_id: &str, process_type: &str) -> String {
    format!("parallaxId_{parallax_id}_planeId_{plane_id}_{process_type}")
}

/// Identifier of a parallax group mask task.
pub fn parallax_mask_task_id(parallax_id: &str, process_type: &str) -> String {
    format!("parallaxId_{parallax_id}_mask_{process_type}")
}

/// Identifier of a per-marker segment task.
pub fn marker_task_id(marker_id: &str, process_type: &str) -> String {
    format!("markerId_{marker_id}_{process_type}")
}

/// Identifier of the stitch task of a segmented experience.
pub fn stitch_task_id(experience_id: &str, process_type: &str) -> String {
    format!("stitchsegment_{experience_id}_{process_type}")
}

/// Parsed form of a task identifier, used by the reconciler to route each
/// task result to the document field it feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKey {
    /// Main-lane task; `process_type` is e.g. `image` or `fal_low_resolution`.
    Main {
        /// Handler type after the `main_` prefix.
        process_type: String,
    },
    /// Parallax plane task.
    Plane {
        /// Owning parallax group.
        parallax_id: String,
        /// Target plane.
        plane_id: String,
        /// Handler type.
        process_type: String,
    },
    /// Parallax group mask task.
    ParallaxMask {
        /// Owning parallax group.
        parallax_id: String,
        /// Handler type.
        process_type: String,
    },
    /// Per-marker segment task.
    Marker {
        /// Target marker.
        marker_id: String,
        /// Handler type.
        process_type: String,
    },
    /// Stitch task of a segmented experience.
    Stitch {
        /// Target experience.
        experience_id: String,
        /// Handler type.
        process_type: String,
    },
}

impl TaskKey {
    /// Parse a task identifier back into its components.
    pub fn parse(task_id: &str) -> Option<TaskKey> {
        let parts: Vec<&str> = task_id.split('_').collect();
        match parts.as_slice() {
            ["main", rest @ ..] if !rest.is_empty() => Some(TaskKey::Main {
                process_type: rest.join("_"),
            }),
            ["parallaxId", parallax_id, "planeId", plane_id, rest @ ..] if !rest.is_empty() => {
                Some(TaskKey::Plane {
                    parallax_id: (*parallax_id).to_string(),
                    plane_id: (*plane_id).to_string(),
                    process_type: rest.join("_"),
                })
            }
            ["parallaxId", parallax_id, "mask", rest @ ..] if !rest.is_empty() => {
                Some(TaskKey::ParallaxMask {
                    parallax_id: (*parallax_id).to_string(),
                    process_type: rest.join("_"),
                })
            }
            ["markerId", marker_id, rest @ ..] if !rest.is_empty() => Some(TaskKey::Marker {
                marker_id: (*marker_id).to_string(),
                process_type: rest.join("_"),
            }),
            ["stitchsegment", experience_id, rest @ ..] if !rest.is_empty() => {
                Some(TaskKey::Stitch {
                    experience_id: (*experience_id).to_string(),
                    process_type: rest.join("_"),
                })
            }
            _ => None,
        }
    }
}

// ============================================================================
// Media process handoff
// ============================================================================

/// What one experience mutation needs processed.
///
/// Built by the update path from the freshly persisted experience; consumed
/// here to derive the task set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaProcess {
    /// Experience after the caller's update was applied.
    pub experience: Experience,
    /// Owning campaign short code.
    #[serde(default)]
    pub short_code: String,
    /// Public scan URL, set when a scan-target image must be produced.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scan_url: String,
    /// Whether this mutation came from an edit rather than first creation.
    #[serde(default)]
    pub is_edited: bool,
    /// Whether the campaign publishes when the workflow completes.
    #[serde(default)]
    pub publish: bool,
    /// Campaign display name, carried for notifications.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Campaign creator, carried for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<User>,
    /// Owning client.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_id: String,
    /// Whether a green-screen generation chain is scheduled before the video
    /// task.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub generate_green_screen: bool,
    /// Catalogue embedding job, when the experience is catalogue-sourced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_vector_job: Option<ProductVectorJob>,
    /// Generative video job parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generative_video_job: Option<GenerativeVideoJob>,
}

impl MediaProcess {
    fn original_image(&self) -> Option<&str> {
        self.experience.images.url_of(kinds::ORIGINAL)
    }

    fn spawn_image(&self) -> Option<&str> {
        self.experience.images.url_of(kinds::SPAWN)
    }

    fn original_video(&self) -> Option<&str> {
        self.experience.videos.url_of(kinds::ORIGINAL)
    }

    fn mask_video(&self) -> Option<&str> {
        self.experience.videos.url_of(kinds::MASK)
    }
}

// ============================================================================
// Individual task builders
// ============================================================================

/// Main image task. `None` when the experience has neither an original nor a
/// spawn image.
pub fn image_task(process: &MediaProcess, workflow_id: &str) -> Option<Task> {
    let original = process.original_image().unwrap_or_default();
    let spawn = process.spawn_image().unwrap_or_default();
    if original.is_empty() && spawn.is_empty() {
        return None;
    }
    Some(Task {
        workflow_id: workflow_id.to_string(),
        id: main_task_id(process::IMAGE),
        subject: media_subject(process::IMAGE),
        body: WorkflowInput {
            url: original.to_string(),
            spawn_image: spawn.to_string(),
            variant: Some(process.experience.variant.clone()),
            qr_code: process.experience.qr_code,
            template: process.experience.template_details.clone(),
            short_code: process.short_code.clone(),
            experience_id: process.experience.id.clone(),
            publish: process.publish,
            scan_url: process.scan_url.clone(),
            generate_green_screen: process.generate_green_screen,
            ..Default::default()
        },
    })
}

/// Main video task. `None` when the experience has no original video.
pub fn video_task(process: &MediaProcess, workflow_id: &str) -> Option<Task> {
    let original = process.original_video()?.to_string();
    Some(Task {
        workflow_id: workflow_id.to_string(),
        id: main_task_id(process::VIDEO),
        subject: media_subject(process::VIDEO),
        body: WorkflowInput {
            url: original,
            mask_url: process.mask_video().unwrap_or_default().to_string(),
            variant: Some(process.experience.variant.clone()),
            qr_code: process.experience.qr_code,
            short_code: process.short_code.clone(),
            experience_id: process.experience.id.clone(),
            publish: process.publish,
            ..Default::default()
        },
    })
}

/// Main video task whose source arrives from an upstream task instead of a
/// stored URL. Used at the end of the green-screen generation chain.
pub fn chained_video_task(process: &MediaProcess, workflow_id: &str) -> Task {
    Task {
        workflow_id: workflow_id.to_string(),
        id: main_task_id(process::VIDEO),
        subject: media_subject(process::VIDEO),
        body: WorkflowInput {
            variant: Some(process.experience.variant.clone()),
            qr_code: process.experience.qr_code,
            short_code: process.short_code.clone(),
            experience_id: process.experience.id.clone(),
            publish: process.publish,
            ..Default::default()
        },
    }
}

/// Overlay compositing task. `None` unless the experience carries an image
/// overlay with a source value.
pub fn overlay_task(process: &MediaProcess, workflow_id: &str) -> Option<Task> {
    let overlay = process.experience.overlay.as_ref()?;
    if overlay.overlay_type != OVERLAY_IMAGE || overlay.value.is_empty() {
        return None;
    }
    Some(Task {
        workflow_id: workflow_id.to_string(),
        id: main_task_id(process::OVERLAY),
        subject: media_subject(process::OVERLAY),
        body: WorkflowInput {
            url: process.original_image().unwrap_or_default().to_string(),
            overlay: Some(overlay.clone()),
            short_code: process.short_code.clone(),
            experience_id: process.experience.id.clone(),
            publish: process.publish,
            ..Default::default()
        },
    })
}

/// Scan-target image task. `None` when no scan URL was supplied.
pub fn scan_image_task(process: &MediaProcess, workflow_id: &str) -> Option<Task> {
    if process.scan_url.is_empty() {
        return None;
    }
    Some(Task {
        workflow_id: workflow_id.to_string(),
        id: main_task_id(process::SCAN_IMAGE),
        // Scan targets run through the plain image processor.
        subject: media_subject(process::IMAGE),
        body: WorkflowInput {
            short_code: process.short_code.clone(),
            scan_url: process.scan_url.clone(),
            ..Default::default()
        },
    })
}

/// Catalogue embedding task. `None` without an original image or a job.
pub fn product_vector_task(process: &MediaProcess, workflow_id: &str) -> Option<Task> {
    let job = process.product_vector_job.as_ref()?;
    process.original_image()?;
    Some(Task {
        workflow_id: workflow_id.to_string(),
        id: main_task_id(process::IMAGE_VECTOR_LLM),
        subject: media_subject(process::IMAGE_VECTOR_LLM),
        body: WorkflowInput {
            short_code: process.short_code.clone(),
            image_vector_llm_product_job: Some(job.clone()),
            ..Default::default()
        },
    })
}

/// Generative video task. Low-resolution jobs get their own identifier so
/// regenerate results can be told apart from full-quality ones.
pub fn generative_video_task(process: &MediaProcess, workflow_id: &str) -> Option<Task> {
    let job = process.generative_video_job.as_ref()?;
    let id = if job.low_resolution {
        main_task_id(process::FAL_LOW_RESOLUTION)
    } else {
        main_task_id(process::FAL)
    };
    Some(Task {
        workflow_id: workflow_id.to_string(),
        id,
        subject: genstudio_subject(process::VIDEO),
        body: WorkflowInput {
            genstudio_job: Some(job.clone()),
            ..Default::default()
        },
    })
}

/// Alpha-matte extraction task. The source video URL is resolved by the
/// pipeline from the upstream generative task's output.
pub fn alpha_video_task(workflow_id: &str) -> Task {
    Task {
        workflow_id: workflow_id.to_string(),
        id: main_task_id(process::ALPHA_VIDEO),
        subject: media_subject(process::ALPHA_VIDEO),
        body: WorkflowInput {
            alpha_video_job: Some(AlphaVideoJob::default()),
            ..Default::default()
        },
    }
}

// ============================================================================
// Parallax tasks
// ============================================================================

/// Per-plane and per-mask tasks for a parallax scene, with their combined
/// task weight.
pub fn parallax_tasks(scene: &Scene, workflow_id: &str, variant: &Variant) -> (Vec<Task>, i32) {
    let mut tasks = Vec::new();
    let mut weight = 0;

    for parallax in &scene.parallax {
        if let Some(mask) = &parallax.mask {
            if !mask.url.is_empty() {
                tasks.push(Task {
                    workflow_id: workflow_id.to_string(),
                    id: parallax_mask_task_id(&parallax.id, process::IMAGE),
                    subject: media_subject(process::IMAGE),
                    body: WorkflowInput {
                        url: mask.url.clone(),
                        experience_id: parallax.id.clone(),
                        ..Default::default()
                    },
                });
                weight += 1;
            }
        }
        for plane in &parallax.planes {
            match plane.plane_type {
                Some(PLANE_TYPE_IMAGE) => {
                    tasks.push(Task {
                        workflow_id: workflow_id.to_string(),
                        id: plane_task_id(&parallax.id, &plane.id, process::IMAGE),
                        subject: media_subject(process::IMAGE),
                        body: WorkflowInput {
                            url: plane.url.clone(),
                            experience_id: plane.id.clone(),
                            // Processors switch to the parallax image path on
                            // this track type.
                            variant: Some(Variant {
                                track_type: "PARALLAX".to_string(),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                    });
                    weight += 1;
                }
                Some(PLANE_TYPE_VIDEO) | Some(PLANE_TYPE_ALPHA_VIDEO) => {
                    tasks.push(Task {
                        workflow_id: workflow_id.to_string(),
                        id: plane_task_id(&parallax.id, &plane.id, process::VIDEO),
                        subject: media_subject(process::VIDEO),
                        body: WorkflowInput {
                            url: plane.url.clone(),
                            mask_url: plane.mask.clone(),
                            experience_id: plane.id.clone(),
                            variant: Some(variant.clone()),
                            ..Default::default()
                        },
                    });
                    weight += VIDEO_TASK_WEIGHT;
                }
                _ => {}
            }
        }
    }

    (tasks, weight)
}

// ============================================================================
// Segment tasks
// ============================================================================

/// Per-marker tasks and the stitch task derived from a splice outcome.
///
/// Returns `(marker_tasks, stitch_tasks, weight)`. Stitch tasks run in their
/// own workflow and do not count toward the main task weight.
pub fn segment_tasks(
    changes: &SegmentChanges,
    workflow_id: &str,
    stitch_workflow_id: &str,
    experience_id: &str,
) -> (Vec<Task>, Vec<Task>, i32) {
    let mut tasks = Vec::new();
    let mut stitch_tasks = Vec::new();
    let mut weight = 0;
    let mut is_alpha = false;

    for image in &changes.image_changes {
        tasks.push(Task {
            workflow_id: workflow_id.to_string(),
            id: marker_task_id(&image.marker_id, process::IMAGE),
            subject: media_subject(process::IMAGE),
            body: WorkflowInput {
                url: image.asset_url.clone(),
                experience_id: experience_id.to_string(),
                ..Default::default()
            },
        });
        weight += 1;
    }

    for video in &changes.video_changes {
        let mut body = WorkflowInput {
            url: video.video_url.clone(),
            experience_id: experience_id.to_string(),
            ..Default::default()
        };
        if !video.mask_url.is_empty() {
            is_alpha = true;
            body.mask_url = video.mask_url.clone();
            body.variant = Some(Variant {
                is_alpha: Some(true),
                class: 3,
                ..Default::default()
            });
        }
        tasks.push(Task {
            workflow_id: workflow_id.to_string(),
            id: marker_task_id(&video.marker_id, process::VIDEO),
            subject: media_subject(process::VIDEO),
            body,
        });
        weight += VIDEO_TASK_WEIGHT;
    }

    if !changes.video_urls.is_empty() && changes.process_stitch_video {
        stitch_tasks.push(Task {
            workflow_id: stitch_workflow_id.to_string(),
            id: stitch_task_id(experience_id, process::VIDEO),
            subject: media_subject(process::VIDEO),
            body: WorkflowInput {
                stitch: true,
                experience_id: experience_id.to_string(),
                variant: Some(Variant {
                    class: 3,
                    track_type: "CARD".to_string(),
                    is_alpha: Some(is_alpha),
                    ..Default::default()
                }),
                segments: changes.video_urls.clone(),
                ..Default::default()
            },
        });
    }

    (tasks, stitch_tasks, weight)
}

/// Segment tasks for every marker and button currently on the experience,
/// used when a full reprocess is requested rather than a diffed edit.
pub fn all_segment_tasks(
    experience: &Experience,
    workflow_id: &str,
    stitch_workflow_id: &str,
) -> (Vec<Task>, Vec<Task>, i32) {
    let Some(segments) = &experience.variant.segments else {
        return (Vec::new(), Vec::new(), 0);
    };
    if segments.markers.is_empty() {
        return (Vec::new(), Vec::new(), 0);
    }

    let mut changes = SegmentChanges {
        // A full pass always restitches.
        process_stitch_video: true,
        ..Default::default()
    };
    for marker in &segments.markers {
        if marker.videos.original.is_empty() {
            continue;
        }
        changes.video_changes.push(crate::splicer::MarkerVideoChange {
            marker_id: marker.id.clone(),
            video_url: marker.videos.original.clone(),
            mask_url: marker.videos.mask.clone(),
        });
        changes.video_urls.push(crate::wire::SegmentVideo {
            marker_id: marker.id.clone(),
            original_url: marker.videos.original.clone(),
            mask_url: marker.videos.mask.clone(),
        });
    }
    for button in &experience.variant.buttons {
        if button.button_type == "image" && !button.asset_url.is_empty() {
            changes.image_changes.push(crate::splicer::ButtonImageChange {
                marker_id: button.marker_id.clone(),
                asset_url: button.asset_url.clone(),
            });
        }
    }
    if !changes.has_asset_changes() {
        return (Vec::new(), Vec::new(), 0);
    }

    segment_tasks(&changes, workflow_id, stitch_workflow_id, &experience.id)
}

// ============================================================================
// Workflow assembly
// ============================================================================

/// Group tasks into a submission envelope.
pub fn assemble_workflow(
    tasks: Vec<Task>,
    route: WorkflowRoute,
    publish: bool,
    workflow_id: &str,
    dependencies: BTreeMap<String, Vec<String>>,
) -> Workflow {
    let tasks: BTreeMap<String, Task> = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
    Workflow {
        id: workflow_id.to_string(),
        route,
        tasks,
        dependencies,
        reply_subject: WORKFLOW_COMPLETE_SUBJECT.to_string(),
        publish,
    }
}

/// One experience mutation's workflow submissions.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowPlan {
    /// Main media workflow.
    pub workflow: Workflow,
    /// Stitch workflow, when the segment composite must be rebuilt.
    pub stitch_workflow: Option<Workflow>,
    /// Weighted task total recorded on the experience.
    pub total_tasks: i32,
}

/// Build the task set for one mutated experience.
///
/// `segment_changes` carries the splice outcome of a segmented edit; `None`
/// schedules a full segment reprocess from the stored markers. Returns `None`
/// when nothing needs processing.
pub fn build_experience_workflow(
    process: &MediaProcess,
    segment_changes: Option<&SegmentChanges>,
) -> Option<WorkflowPlan> {
    let workflow_id = Uuid::new_v4().to_string();
    let stitch_workflow_id = Uuid::new_v4().to_string();
    let experience = &process.experience;

    let mut tasks = Vec::new();
    let mut dependencies: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut total = 0;

    let image = image_task(process, &workflow_id);
    let green_screen_chain = process.generate_green_screen
        && process.generative_video_job.is_some()
        && image.is_some();

    if let Some(task) = image {
        tasks.push(task);
        total += 1;
    }

    if green_screen_chain {
        // Generation feeds matting feeds the video transcode; each stage
        // waits on the previous one.
        let generative = generative_video_task(process, &workflow_id)?;
        let alpha = alpha_video_task(&workflow_id);
        let video = chained_video_task(process, &workflow_id);
        dependencies.insert(generative.id.clone(), vec![main_task_id(process::IMAGE)]);
        dependencies.insert(alpha.id.clone(), vec![generative.id.clone()]);
        dependencies.insert(video.id.clone(), vec![alpha.id.clone()]);
        total += 3 * VIDEO_TASK_WEIGHT;
        tasks.push(generative);
        tasks.push(alpha);
        tasks.push(video);
    } else if let Some(task) = video_task(process, &workflow_id) {
        tasks.push(task);
        total += VIDEO_TASK_WEIGHT;
    }

    if let Some(task) = overlay_task(process, &workflow_id) {
        tasks.push(task);
        total += 1;
    }
    if let Some(task) = scan_image_task(process, &workflow_id) {
        tasks.push(task);
        total += 1;
    }
    if let Some(task) = product_vector_task(process, &workflow_id) {
        tasks.push(task);
        total += 1;
    }

    if let Some(scene) = &experience.scene {
        let (parallax, weight) = parallax_tasks(scene, &workflow_id, &experience.variant);
        tasks.extend(parallax);
        total += weight;
    }

    let (marker_tasks, stitch_tasks, segment_weight) = match segment_changes {
        Some(changes) => segment_tasks(changes, &workflow_id, &stitch_workflow_id, &experience.id),
        None => all_segment_tasks(experience, &workflow_id, &stitch_workflow_id),
    };
    let marker_video_ids: Vec<String> = marker_tasks
        .iter()
        .filter(|t| t.subject == media_subject(process::VIDEO))
        .map(|t| t.id.clone())
        .collect();
    tasks.extend(marker_tasks);
    total += segment_weight;

    let stitch_workflow = if stitch_tasks.is_empty() {
        None
    } else {
        let mut stitch_dependencies = BTreeMap::new();
        if !marker_video_ids.is_empty() {
            for task in &stitch_tasks {
                stitch_dependencies.insert(task.id.clone(), marker_video_ids.clone());
            }
        }
        Some(assemble_workflow(
            stitch_tasks,
            WorkflowRoute::StitchSegment {
                experience_id: experience.id.clone(),
            },
            false,
            &stitch_workflow_id,
            stitch_dependencies,
        ))
    };

    if tasks.is_empty() && stitch_workflow.is_none() {
        return None;
    }

    let workflow = assemble_workflow(
        tasks,
        WorkflowRoute::Experience {
            experience_id: experience.id.clone(),
        },
        process.publish,
        &workflow_id,
        dependencies,
    );

    Some(WorkflowPlan {
        workflow,
        stitch_workflow,
        total_tasks: total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Mask, Overlay, Parallax, Plane, SegmentMarker, Segments, VideoObject};
    use crate::splicer::{ButtonImageChange, MarkerVideoChange};

    fn media_process() -> MediaProcess {
        let mut experience = Experience {
            id: "exp-1".to_string(),
            campaign_id: "camp-1".to_string(),
            ..Default::default()
        };
        experience
            .images
            .upsert_by_kind(kinds::ORIGINAL, "https://cdn.example.com/a.jpg");
        experience
            .videos
            .upsert_by_kind(kinds::ORIGINAL, "https://cdn.example.com/a.mp4");
        MediaProcess {
            experience,
            short_code: "FLAM42".to_string(),
            publish: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_image_task_requires_source() {
        let mut process = media_process();
        let task = image_task(&process, "wf-1").unwrap();
        assert_eq!(task.id, "main_image");
        assert_eq!(task.subject, "MEDIAPROCESSOR.image.process");
        assert_eq!(task.body.url, "https://cdn.example.com/a.jpg");
        assert!(task.body.publish);
        assert_eq!(task.body.short_code, "FLAM42");

        process.experience.images = Default::default();
        assert!(image_task(&process, "wf-1").is_none());

        // A spawn image alone is enough.
        process
            .experience
            .images
            .upsert_by_kind(kinds::SPAWN, "https://cdn.example.com/spawn.png");
        let task = image_task(&process, "wf-1").unwrap();
        assert!(task.body.url.is_empty());
        assert_eq!(task.body.spawn_image, "https://cdn.example.com/spawn.png");
    }

    #[test]
    fn test_video_task_carries_mask() {
        let mut process = media_process();
        process
            .experience
            .videos
            .upsert_by_kind(kinds::MASK, "https://cdn.example.com/mask.mp4");

        let task = video_task(&process, "wf-1").unwrap();
        assert_eq!(task.id, "main_video");
        assert_eq!(task.body.url, "https://cdn.example.com/a.mp4");
        assert_eq!(task.body.mask_url, "https://cdn.example.com/mask.mp4");

        process.experience.videos = Default::default();
        assert!(video_task(&process, "wf-1").is_none());
    }

    #[test]
    fn test_chained_video_task_has_no_source_url() {
        let process = media_process();
        let task = chained_video_task(&process, "wf-1");
        assert_eq!(task.id, "main_video");
        assert!(task.body.url.is_empty());
        assert_eq!(task.body.experience_id, "exp-1");
    }

    #[test]
    fn test_overlay_task_only_for_image_overlays() {
        let mut process = media_process();
        assert!(overlay_task(&process, "wf-1").is_none());

        process.experience.overlay = Some(Overlay {
            overlay_type: "COLOR".to_string(),
            value: "#102030".to_string(),
            ..Default::default()
        });
        assert!(overlay_task(&process, "wf-1").is_none());

        process.experience.overlay = Some(Overlay {
            overlay_type: "IMAGE".to_string(),
            value: "https://cdn.example.com/bg.jpg".to_string(),
            ..Default::default()
        });
        let task = overlay_task(&process, "wf-1").unwrap();
        assert_eq!(task.id, "main_overlay");
        assert_eq!(task.body.url, "https://cdn.example.com/a.jpg");
        assert_eq!(
            task.body.overlay.as_ref().unwrap().value,
            "https://cdn.example.com/bg.jpg"
        );
    }

    #[test]
    fn test_scan_task_uses_image_processor() {
        let mut process = media_process();
        assert!(scan_image_task(&process, "wf-1").is_none());

        process.scan_url = "https://view.example.com/FLAM42".to_string();
        let task = scan_image_task(&process, "wf-1").unwrap();
        assert_eq!(task.id, "main_scan_image");
        assert_eq!(task.subject, "MEDIAPROCESSOR.image.process");
        assert_eq!(task.body.scan_url, "https://view.example.com/FLAM42");
    }

    #[test]
    fn test_generative_task_low_resolution_id() {
        let mut process = media_process();
        assert!(generative_video_task(&process, "wf-1").is_none());

        process.generative_video_job = Some(GenerativeVideoJob {
            job_type: "video".to_string(),
            prompt: "studio shot".to_string(),
            ..Default::default()
        });
        let task = generative_video_task(&process, "wf-1").unwrap();
        assert_eq!(task.id, "main_fal");
        assert_eq!(task.subject, "GENSTUDIO.video.process");

        process.generative_video_job.as_mut().unwrap().low_resolution = true;
        let task = generative_video_task(&process, "wf-1").unwrap();
        assert_eq!(task.id, "main_fal_low_resolution");
    }

    #[test]
    fn test_parallax_tasks_and_weights() {
        let scene = Scene {
            parallax: vec![Parallax {
                id: "par-1".to_string(),
                mask: Some(Mask {
                    url: "https://cdn.example.com/mask.png".to_string(),
                    ..Default::default()
                }),
                planes: vec![
                    Plane {
                        id: "pl-1".to_string(),
                        plane_type: Some(PLANE_TYPE_IMAGE),
                        url: "https://cdn.example.com/layer.png".to_string(),
                        ..Default::default()
                    },
                    Plane {
                        id: "pl-2".to_string(),
                        plane_type: Some(PLANE_TYPE_ALPHA_VIDEO),
                        url: "https://cdn.example.com/layer.mp4".to_string(),
                        mask: "https://cdn.example.com/layer-mask.mp4".to_string(),
                        ..Default::default()
                    },
                ],
            }],
            ..Default::default()
        };
        let variant = Variant {
            track_type: "CARD".to_string(),
            ..Default::default()
        };

        let (tasks, weight) = parallax_tasks(&scene, "wf-1", &variant);
        assert_eq!(tasks.len(), 3);
        assert_eq!(weight, 1 + 1 + VIDEO_TASK_WEIGHT);

        assert_eq!(tasks[0].id, "parallaxId_par-1_mask_image");
        assert_eq!(tasks[1].id, "parallaxId_par-1_planeId_pl-1_image");
        assert_eq!(
            tasks[1].body.variant.as_ref().unwrap().track_type,
            "PARALLAX"
        );
        assert_eq!(tasks[2].id, "parallaxId_par-1_planeId_pl-2_video");
        assert_eq!(tasks[2].body.mask_url, "https://cdn.example.com/layer-mask.mp4");
        assert_eq!(tasks[2].body.variant.as_ref().unwrap().track_type, "CARD");
    }

    #[test]
    fn test_segment_tasks_alpha_and_stitch() {
        let changes = SegmentChanges {
            image_changes: vec![ButtonImageChange {
                marker_id: "m1".to_string(),
                asset_url: "https://cdn.example.com/b.png".to_string(),
            }],
            video_changes: vec![MarkerVideoChange {
                marker_id: "m1".to_string(),
                video_url: "https://cdn.example.com/m1.mp4".to_string(),
                mask_url: "https://cdn.example.com/m1-mask.mp4".to_string(),
            }],
            video_urls: vec![crate::wire::SegmentVideo {
                marker_id: "m1".to_string(),
                original_url: "https://cdn.example.com/m1.mp4".to_string(),
                mask_url: "https://cdn.example.com/m1-mask.mp4".to_string(),
            }],
            process_stitch_video: true,
        };

        let (tasks, stitch, weight) = segment_tasks(&changes, "wf-1", "wf-stitch", "exp-1");
        assert_eq!(tasks.len(), 2);
        assert_eq!(weight, 1 + VIDEO_TASK_WEIGHT);

        assert_eq!(tasks[0].id, "markerId_m1_image");
        assert_eq!(tasks[1].id, "markerId_m1_video");
        let video_variant = tasks[1].body.variant.as_ref().unwrap();
        assert_eq!(video_variant.is_alpha, Some(true));
        assert_eq!(video_variant.class, 3);

        assert_eq!(stitch.len(), 1);
        assert_eq!(stitch[0].id, "stitchsegment_exp-1_video");
        assert_eq!(stitch[0].workflow_id, "wf-stitch");
        assert!(stitch[0].body.stitch);
        assert_eq!(stitch[0].body.segments.len(), 1);
        assert_eq!(stitch[0].body.variant.as_ref().unwrap().is_alpha, Some(true));
    }

    #[test]
    fn test_segment_tasks_skip_stitch_when_not_requested() {
        let changes = SegmentChanges {
            video_changes: vec![MarkerVideoChange {
                marker_id: "m1".to_string(),
                video_url: "https://cdn.example.com/m1.mp4".to_string(),
                mask_url: String::new(),
            }],
            video_urls: vec![crate::wire::SegmentVideo {
                marker_id: "m1".to_string(),
                original_url: "https://cdn.example.com/m1.mp4".to_string(),
                mask_url: String::new(),
            }],
            process_stitch_video: false,
            ..Default::default()
        };

        let (tasks, stitch, _) = segment_tasks(&changes, "wf-1", "wf-stitch", "exp-1");
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].body.variant.is_none());
        assert!(stitch.is_empty());
    }

    #[test]
    fn test_all_segment_tasks_from_stored_story() {
        let mut process = media_process();
        process.experience.variant.segments = Some(Segments {
            markers: vec![
                SegmentMarker {
                    id: "m1".to_string(),
                    videos: VideoObject {
                        original: "https://cdn.example.com/m1.mp4".to_string(),
                        ..Default::default()
                    },
                    ..Default::default()
                },
                // No source video: nothing to schedule for this marker.
                SegmentMarker {
                    id: "m2".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        });

        let (tasks, stitch, weight) = all_segment_tasks(&process.experience, "wf-1", "wf-stitch");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "markerId_m1_video");
        assert_eq!(weight, VIDEO_TASK_WEIGHT);
        assert_eq!(stitch.len(), 1);

        let bare = Experience {
            id: "exp-2".to_string(),
            campaign_id: "camp-1".to_string(),
            ..Default::default()
        };
        let (tasks, stitch, weight) = all_segment_tasks(&bare, "wf-1", "wf-stitch");
        assert!(tasks.is_empty());
        assert!(stitch.is_empty());
        assert_eq!(weight, 0);
    }

    #[test]
    fn test_build_workflow_green_screen_chain() {
        let mut process = media_process();
        process.experience.videos = Default::default();
        process.generate_green_screen = true;
        process.generative_video_job = Some(GenerativeVideoJob {
            job_type: "video".to_string(),
            ..Default::default()
        });
        process.product_vector_job = Some(ProductVectorJob {
            id: "prod-1".to_string(),
            ..Default::default()
        });

        let plan = build_experience_workflow(&process, None).unwrap();
        let workflow = &plan.workflow;
        assert!(workflow.tasks.contains_key("main_image"));
        assert!(workflow.tasks.contains_key("main_fal"));
        assert!(workflow.tasks.contains_key("main_alpha_video"));
        assert!(workflow.tasks.contains_key("main_video"));
        assert!(workflow.tasks.contains_key("main_image_vector_llm"));

        assert_eq!(workflow.dependencies["main_fal"], vec!["main_image"]);
        assert_eq!(workflow.dependencies["main_alpha_video"], vec!["main_fal"]);
        assert_eq!(workflow.dependencies["main_video"], vec!["main_alpha_video"]);

        assert_eq!(plan.total_tasks, 1 + 3 * VIDEO_TASK_WEIGHT + 1);
        assert!(plan.stitch_workflow.is_none());
        assert!(workflow.publish);
        assert_eq!(workflow.reply_subject, WORKFLOW_COMPLETE_SUBJECT);
        assert_eq!(
            workflow.route,
            WorkflowRoute::Experience {
                experience_id: "exp-1".to_string()
            }
        );
    }

    #[test]
    fn test_build_workflow_stitch_lane_separated() {
        let mut process = media_process();
        process.experience.images = Default::default();
        process.experience.videos = Default::default();

        let changes = SegmentChanges {
            video_changes: vec![MarkerVideoChange {
                marker_id: "m1".to_string(),
                video_url: "https://cdn.example.com/m1.mp4".to_string(),
                mask_url: String::new(),
            }],
            video_urls: vec![crate::wire::SegmentVideo {
                marker_id: "m1".to_string(),
                original_url: "https://cdn.example.com/m1.mp4".to_string(),
                mask_url: String::new(),
            }],
            process_stitch_video: true,
            ..Default::default()
        };

        let plan = build_experience_workflow(&process, Some(&changes)).unwrap();
        assert_eq!(plan.workflow.tasks.len(), 1);
        assert!(plan.workflow.tasks.contains_key("markerId_m1_video"));

        let stitch = plan.stitch_workflow.unwrap();
        assert_eq!(stitch.tasks.len(), 1);
        assert_ne!(stitch.id, plan.workflow.id);
        assert!(!stitch.publish);
        assert_eq!(
            stitch.route,
            WorkflowRoute::StitchSegment {
                experience_id: "exp-1".to_string()
            }
        );
        assert_eq!(
            stitch.dependencies["stitchsegment_exp-1_video"],
            vec!["markerId_m1_video"]
        );
        // Stitch work is not part of the recorded task total.
        assert_eq!(plan.total_tasks, VIDEO_TASK_WEIGHT);
    }

    #[test]
    fn test_build_workflow_returns_none_when_idle() {
        let process = MediaProcess {
            experience: Experience {
                id: "exp-1".to_string(),
                campaign_id: "camp-1".to_string(),
                ..Default::default()
            },
            short_code: "FLAM42".to_string(),
            ..Default::default()
        };
        assert!(build_experience_workflow(&process, None).is_none());
    }

    #[test]
    fn test_task_key_parsing() {
        assert_eq!(
            TaskKey::parse("main_image"),
            Some(TaskKey::Main {
                process_type: "image".to_string()
            })
        );
        assert_eq!(
            TaskKey::parse("main_fal_low_resolution"),
            Some(TaskKey::Main {
                process_type: "fal_low_resolution".to_string()
            })
        );
        assert_eq!(
            TaskKey::parse(&plane_task_id("par-1", "pl-2", "video")),
            Some(TaskKey::Plane {
                parallax_id: "par-1".to_string(),
                plane_id: "pl-2".to_string(),
                process_type: "video".to_string()
            })
        );
        assert_eq!(
            TaskKey::parse(&parallax_mask_task_id("par-1", "image")),
            Some(TaskKey::ParallaxMask {
                parallax_id: "par-1".to_string(),
                process_type: "image".to_string()
            })
        );
        assert_eq!(
            TaskKey::parse(&marker_task_id("m1", "video")),
            Some(TaskKey::Marker {
                marker_id: "m1".to_string(),
                process_type: "video".to_string()
            })
        );
        assert_eq!(
            TaskKey::parse(&stitch_task_id("exp-1", "video")),
            Some(TaskKey::Stitch {
                experience_id: "exp-1".to_string(),
                process_type: "video".to_string()
            })
        );

        assert_eq!(TaskKey::parse(""), None);
        assert_eq!(TaskKey::parse("main"), None);
        assert_eq!(TaskKey::parse("unrelated_id"), None);
    }
}
