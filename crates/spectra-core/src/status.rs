// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Experience and task status machines.
//!
//! An experience status is stored on the document in SCREAMING_SNAKE_CASE;
//! workflow and task results arrive from the processing workers in
//! snake_case. The two sets overlap but are distinct types on purpose so a
//! wire status never lands in the document unmapped.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Template variant class that ships pre-processed media and skips the
/// processing pipeline entirely.
pub const GROUND_VARIANT_CLASS: i32 = 2;

// ============================================================================
// Experience status
// ============================================================================

/// Processing status of an experience document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperienceStatus {
    /// Freshly created, no workflow submitted yet.
    #[default]
    Created,
    /// Caller-editable staging state; the only state that allows asset deletes.
    Draft,
    /// A workflow generation is in flight.
    Processing,
    /// Every required asset kind is populated and no task is outstanding.
    Processed,
    /// The workflow generation failed.
    Failed,
    /// Credit consumption failed; persisted as FAILED, kept for wire compat.
    NoCredit,
    /// The workflow generation exceeded its processing deadline.
    TimedOut,
    /// The workflow generation was cancelled upstream.
    Cancelled,
}

impl ExperienceStatus {
    /// Wire/storage form of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Draft => "DRAFT",
            Self::Processing => "PROCESSING",
            Self::Processed => "PROCESSED",
            Self::Failed => "FAILED",
            Self::NoCredit => "NO_CREDIT",
            Self::TimedOut => "TIMED_OUT",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Whether this status ends a workflow generation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Processed | Self::Failed | Self::NoCredit | Self::TimedOut | Self::Cancelled
        )
    }

    /// Asset deletes are only legal while the experience is a draft.
    pub fn allows_asset_delete(&self) -> bool {
        matches!(self, Self::Draft)
    }

    /// Whether a caller update must force the status back to PROCESSING even
    /// when the caller asked for something else.
    pub fn forces_reprocessing(&self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut)
    }
}

impl fmt::Display for ExperienceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperienceStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "DRAFT" => Ok(Self::Draft),
            "PROCESSING" => Ok(Self::Processing),
            "PROCESSED" => Ok(Self::Processed),
            "FAILED" => Ok(Self::Failed),
            "NO_CREDIT" => Ok(Self::NoCredit),
            "TIMED_OUT" => Ok(Self::TimedOut),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(CoreError::ValidationError {
                field: "status".to_string(),
                message: format!("unknown experience status '{}'", other),
            }),
        }
    }
}

/// Status an experience enters after a caller touches an asset-affecting
/// field. Ground variants ship pre-processed media and are terminal at
/// creation; everything else re-enters the pipeline.
pub fn status_after_asset_update(variant_class: Option<i32>) -> ExperienceStatus {
    if variant_class == Some(GROUND_VARIANT_CLASS) {
        ExperienceStatus::Processed
    } else {
        ExperienceStatus::Processing
    }
}

// ============================================================================
// Workflow / task result status
// ============================================================================

/// Status reported by the processing workers, shared by the aggregate
/// workflow result and each per-task result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted, not yet picked up.
    #[default]
    Pending,
    /// Picked up by a worker.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled before completion.
    Cancelled,
    /// Rejected by the credit ledger.
    NoCredit,
    /// Exceeded the processing deadline.
    TimedOut,
}

impl TaskStatus {
    /// Wire form of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::NoCredit => "no_credit",
            Self::TimedOut => "timed_out",
        }
    }

    /// Whether the workflow generation finished successfully.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// The experience status a finished generation lands in, or `None` for
    /// statuses that do not end a generation.
    ///
    /// A no-credit outcome is persisted as FAILED; the distinction lives in
    /// the recorded workflow error, not in the document status.
    pub fn terminal_experience_status(&self) -> Option<ExperienceStatus> {
        match self {
            Self::Completed => Some(ExperienceStatus::Processed),
            Self::Failed => Some(ExperienceStatus::Failed),
            Self::NoCredit => Some(ExperienceStatus::Failed),
            Self::TimedOut => Some(ExperienceStatus::TimedOut),
            Self::Cancelled => Some(ExperienceStatus::Cancelled),
            Self::Pending | Self::Running => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_experience_status_round_trip() {
        for status in [
            ExperienceStatus::Created,
            ExperienceStatus::Draft,
            ExperienceStatus::Processing,
            ExperienceStatus::Processed,
            ExperienceStatus::Failed,
            ExperienceStatus::NoCredit,
            ExperienceStatus::TimedOut,
            ExperienceStatus::Cancelled,
        ] {
            let parsed: ExperienceStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);

            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }

        assert!("SHIPPED".parse::<ExperienceStatus>().is_err());
    }

    #[test]
    fn test_task_status_wire_names() {
        let json = serde_json::to_string(&TaskStatus::NoCredit).unwrap();
        assert_eq!(json, "\"no_credit\"");
        let json = serde_json::to_string(&TaskStatus::TimedOut).unwrap();
        assert_eq!(json, "\"timed_out\"");

        let parsed: TaskStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(parsed, TaskStatus::Completed);
    }

    #[test]
    fn test_terminal_mapping() {
        assert_eq!(
            TaskStatus::Completed.terminal_experience_status(),
            Some(ExperienceStatus::Processed)
        );
        assert_eq!(
            TaskStatus::Failed.terminal_experience_status(),
            Some(ExperienceStatus::Failed)
        );
        // No-credit is persisted as a plain failure.
        assert_eq!(
            TaskStatus::NoCredit.terminal_experience_status(),
            Some(ExperienceStatus::Failed)
        );
        assert_eq!(
            TaskStatus::TimedOut.terminal_experience_status(),
            Some(ExperienceStatus::TimedOut)
        );
        assert_eq!(
            TaskStatus::Cancelled.terminal_experience_status(),
            Some(ExperienceStatus::Cancelled)
        );
        assert_eq!(TaskStatus::Running.terminal_experience_status(), None);
    }

    #[test]
    fn test_delete_and_reprocess_rules() {
        assert!(ExperienceStatus::Draft.allows_asset_delete());
        assert!(!ExperienceStatus::Processed.allows_asset_delete());
        assert!(!ExperienceStatus::Processing.allows_asset_delete());

        assert!(ExperienceStatus::Failed.forces_reprocessing());
        assert!(ExperienceStatus::TimedOut.forces_reprocessing());
        assert!(!ExperienceStatus::Processed.forces_reprocessing());
    }

    #[test]
    fn test_ground_variant_skips_pipeline() {
        assert_eq!(
            status_after_asset_update(Some(GROUND_VARIANT_CLASS)),
            ExperienceStatus::Processed
        );
        assert_eq!(
            status_after_asset_update(Some(1)),
            ExperienceStatus::Processing
        );
        assert_eq!(status_after_asset_update(None), ExperienceStatus::Processing);
    }
}
