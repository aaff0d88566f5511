// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for spectra-core.
//!
//! Provides a unified error type shared by the synchronous update path,
//! the asynchronous reconciler, and the bus consumer.

use std::fmt;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur while mutating experiences and campaigns.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// Experience was not found in the document store.
    ExperienceNotFound {
        /// The experience ID that was not found.
        experience_id: String,
    },

    /// Campaign was not found in the document store.
    CampaignNotFound {
        /// The campaign ID that was not found.
        campaign_id: String,
    },

    /// Remotion render record was not found.
    RenderNotFound {
        /// The render ID that was not found.
        render_id: String,
    },

    /// An asset delete was requested outside draft status.
    AssetDeleteNotAllowed {
        /// The experience ID.
        experience_id: String,
        /// The status the experience was actually in.
        status: String,
    },

    /// Two mutually exclusive update fields were set in one request.
    ConflictingUpdate {
        /// The field pair that conflicted.
        field: String,
        /// Description of the conflict.
        message: String,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// A bus message could not be decoded and will not be retried.
    MalformedMessage {
        /// The stream the message arrived on.
        stream: String,
        /// Decode error details.
        details: String,
    },

    /// A decodable result arrived without the payload its lane requires.
    /// Redelivered, since the producer may still be attaching outputs.
    IncompleteResult {
        /// The workflow the result belongs to.
        workflow_id: String,
        /// What was missing.
        details: String,
    },

    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// Redis operation (bus or cache) failed.
    RedisError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// Credit ledger call failed for a reason other than exhaustion.
    CreditLedgerError {
        /// The ledger operation (reserve, consume, release).
        operation: String,
        /// Error details.
        details: String,
    },

    /// Credit ledger reported that no credits are available.
    NoCreditsAvailable {
        /// The campaign the consume was attempted for.
        campaign_id: String,
    },

    /// Plan service lookup failed.
    PlanServiceError {
        /// Error details.
        details: String,
    },

    /// Notification delivery (mail or push) failed.
    NotificationError {
        /// The notification channel that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ExperienceNotFound { .. } => "EXPERIENCE_NOT_FOUND",
            Self::CampaignNotFound { .. } => "CAMPAIGN_NOT_FOUND",
            Self::RenderNotFound { .. } => "RENDER_NOT_FOUND",
            Self::AssetDeleteNotAllowed { .. } => "ASSET_DELETE_NOT_ALLOWED",
            Self::ConflictingUpdate { .. } => "CONFLICTING_UPDATE",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::MalformedMessage { .. } => "MALFORMED_MESSAGE",
            Self::IncompleteResult { .. } => "INCOMPLETE_RESULT",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
            Self::RedisError { .. } => "REDIS_ERROR",
            Self::CreditLedgerError { .. } => "CREDIT_LEDGER_ERROR",
            Self::NoCreditsAvailable { .. } => "NO_CREDITS_AVAILABLE",
            Self::PlanServiceError { .. } => "PLAN_SERVICE_ERROR",
            Self::NotificationError { .. } => "NOTIFICATION_ERROR",
        }
    }

    /// Whether a bus message that failed with this error should be redelivered.
    ///
    /// Business-rule rejections and undecodable payloads are final; transport
    /// and upstream failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::IncompleteResult { .. }
                | Self::DatabaseError { .. }
                | Self::RedisError { .. }
                | Self::CreditLedgerError { .. }
                | Self::PlanServiceError { .. }
                | Self::NotificationError { .. }
        )
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExperienceNotFound { experience_id } => {
                write!(f, "Experience '{}' not found", experience_id)
            }
            Self::CampaignNotFound { campaign_id } => {
                write!(f, "Campaign '{}' not found", campaign_id)
            }
            Self::RenderNotFound { render_id } => {
                write!(f, "Render '{}' not found", render_id)
            }
            Self::AssetDeleteNotAllowed {
                experience_id,
                status,
            } => {
                write!(
                    f,
                    "Assets of experience '{}' can only be deleted in draft status, got '{}'",
                    experience_id, status
                )
            }
            Self::ConflictingUpdate { field, message } => {
                write!(f, "Conflicting update for '{}': {}", field, message)
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::MalformedMessage { stream, details } => {
                write!(f, "Malformed message on '{}': {}", stream, details)
            }
            Self::IncompleteResult {
                workflow_id,
                details,
            } => {
                write!(f, "Incomplete result for workflow '{}': {}", workflow_id, details)
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
            Self::RedisError { operation, details } => {
                write!(f, "Redis error during '{}': {}", operation, details)
            }
            Self::CreditLedgerError { operation, details } => {
                write!(f, "Credit ledger error during '{}': {}", operation, details)
            }
            Self::NoCreditsAvailable { campaign_id } => {
                write!(f, "No credits available for campaign '{}'", campaign_id)
            }
            Self::PlanServiceError { details } => {
                write!(f, "Plan service error: {}", details)
            }
            Self::NotificationError { operation, details } => {
                write!(f, "Notification error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::DatabaseError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<redis::RedisError> for CoreError {
    fn from(err: redis::RedisError) -> Self {
        CoreError::RedisError {
            operation: "command".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        CoreError::NotificationError {
            operation: "http".to_string(),
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let test_cases = vec![
            (
                CoreError::ExperienceNotFound {
                    experience_id: "exp-1".to_string(),
                },
                "EXPERIENCE_NOT_FOUND",
            ),
            (
                CoreError::CampaignNotFound {
                    campaign_id: "cmp-1".to_string(),
                },
                "CAMPAIGN_NOT_FOUND",
            ),
            (
                CoreError::RenderNotFound {
                    render_id: "ren-1".to_string(),
                },
                "RENDER_NOT_FOUND",
            ),
            (
                CoreError::AssetDeleteNotAllowed {
                    experience_id: "exp-1".to_string(),
                    status: "PROCESSED".to_string(),
                },
                "ASSET_DELETE_NOT_ALLOWED",
            ),
            (
                CoreError::ConflictingUpdate {
                    field: "mask_url".to_string(),
                    message: "delete_mask set in the same request".to_string(),
                },
                "CONFLICTING_UPDATE",
            ),
            (
                CoreError::ValidationError {
                    field: "experience_id".to_string(),
                    message: "must not be empty".to_string(),
                },
                "VALIDATION_ERROR",
            ),
            (
                CoreError::MalformedMessage {
                    stream: "workflow.completed".to_string(),
                    details: "missing field `workflow_id`".to_string(),
                },
                "MALFORMED_MESSAGE",
            ),
            (
                CoreError::DatabaseError {
                    operation: "update".to_string(),
                    details: "connection refused".to_string(),
                },
                "DATABASE_ERROR",
            ),
            (
                CoreError::RedisError {
                    operation: "xadd".to_string(),
                    details: "broken pipe".to_string(),
                },
                "REDIS_ERROR",
            ),
            (
                CoreError::CreditLedgerError {
                    operation: "consume".to_string(),
                    details: "503".to_string(),
                },
                "CREDIT_LEDGER_ERROR",
            ),
            (
                CoreError::NoCreditsAvailable {
                    campaign_id: "cmp-1".to_string(),
                },
                "NO_CREDITS_AVAILABLE",
            ),
            (
                CoreError::PlanServiceError {
                    details: "timeout".to_string(),
                },
                "PLAN_SERVICE_ERROR",
            ),
            (
                CoreError::NotificationError {
                    operation: "mail".to_string(),
                    details: "template missing".to_string(),
                },
                "NOTIFICATION_ERROR",
            ),
        ];

        for (error, expected_code) in test_cases {
            assert_eq!(
                error.error_code(),
                expected_code,
                "Error {:?} should have code {}",
                error,
                expected_code
            );
            assert!(!error.to_string().is_empty(), "Message should not be empty");
        }
    }

    #[test]
    fn test_error_display() {
        let err = CoreError::ExperienceNotFound {
            experience_id: "abc-123".to_string(),
        };
        assert_eq!(err.to_string(), "Experience 'abc-123' not found");

        let err = CoreError::AssetDeleteNotAllowed {
            experience_id: "abc-123".to_string(),
            status: "PROCESSED".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Assets of experience 'abc-123' can only be deleted in draft status, got 'PROCESSED'"
        );

        let err = CoreError::ConflictingUpdate {
            field: "spawn_image".to_string(),
            message: "delete_spawn_image set in the same request".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Conflicting update for 'spawn_image': delete_spawn_image set in the same request"
        );

        let err = CoreError::NoCreditsAvailable {
            campaign_id: "cmp-9".to_string(),
        };
        assert_eq!(err.to_string(), "No credits available for campaign 'cmp-9'");

        let err = CoreError::DatabaseError {
            operation: "update".to_string(),
            details: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Database error during 'update': connection refused"
        );
    }

    #[test]
    fn test_retryable_classification() {
        // Transport and upstream failures are retryable.
        assert!(
            CoreError::DatabaseError {
                operation: "update".to_string(),
                details: "timeout".to_string(),
            }
            .is_retryable()
        );
        assert!(
            CoreError::RedisError {
                operation: "xack".to_string(),
                details: "timeout".to_string(),
            }
            .is_retryable()
        );
        assert!(
            CoreError::CreditLedgerError {
                operation: "reserve".to_string(),
                details: "502".to_string(),
            }
            .is_retryable()
        );

        // Business outcomes and undecodable payloads are final.
        assert!(
            !CoreError::NoCreditsAvailable {
                campaign_id: "cmp-1".to_string(),
            }
            .is_retryable()
        );
        assert!(
            !CoreError::AssetDeleteNotAllowed {
                experience_id: "exp-1".to_string(),
                status: "PROCESSED".to_string(),
            }
            .is_retryable()
        );
        assert!(
            !CoreError::MalformedMessage {
                stream: "workflow.completed".to_string(),
                details: "bad json".to_string(),
            }
            .is_retryable()
        );
        assert!(
            !CoreError::ExperienceNotFound {
                experience_id: "exp-1".to_string(),
            }
            .is_retryable()
        );
    }
}
