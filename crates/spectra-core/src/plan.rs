// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! User plan lookups.
//!
//! When the publishing credit is consumed, the campaign's expiry is derived
//! from the owner's plan: the user service reports a validity window
//! (`YEAR`/`MONTH`/`DAY` plus a count) and the campaign expires that far from
//! now. Year and month windows follow the calendar; a day window is a plain
//! day count.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Days, Months, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::error::{CoreError, Result};

/// Plan validity window as the user service reports it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Validity {
    /// One of `YEAR`, `MONTH`, `DAY`.
    #[serde(default)]
    pub unit: String,
    /// Number of units.
    #[serde(default)]
    pub value: i64,
}

/// Expiry computed from a user's plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanExpiry {
    /// Absolute time the campaign expires.
    pub expires_at: DateTime<Utc>,
    /// Plan owner's display name.
    pub user_name: String,
}

/// Plan lookups the publish transition depends on.
///
/// The production implementation is [`PlanClient`]; handler tests substitute
/// an in-memory double.
#[async_trait]
pub trait PlanService: Send + Sync {
    /// Campaign expiry derived from the plan of `register_user_id`.
    async fn campaign_expiry(&self, register_user_id: &str) -> Result<PlanExpiry>;
}

#[derive(Deserialize)]
struct PlanData {
    #[serde(default, rename = "expiry_duration")]
    validity: Validity,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct PlanEnvelope {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    message: String,
    data: Option<PlanData>,
}

/// Add a plan validity window to a point in time.
///
/// Month and year windows use calendar arithmetic; a target day past the end
/// of the target month clamps to that month's last day.
pub fn add_validity(now: DateTime<Utc>, validity: &Validity) -> Result<DateTime<Utc>> {
    let count = u32::try_from(validity.value).map_err(|_| CoreError::PlanServiceError {
        details: format!("invalid validity value: {}", validity.value),
    })?;
    let expires_at = match validity.unit.as_str() {
        "YEAR" => now.checked_add_months(Months::new(12 * count)),
        "MONTH" => now.checked_add_months(Months::new(count)),
        "DAY" => now.checked_add_days(Days::new(u64::from(count))),
        other => {
            return Err(CoreError::PlanServiceError {
                details: format!("invalid unit: {other}"),
            });
        }
    };
    expires_at.ok_or_else(|| CoreError::PlanServiceError {
        details: format!("validity overflows: {} {}", validity.value, validity.unit),
    })
}

/// Client for the user service's plan endpoint.
#[derive(Debug, Clone)]
pub struct PlanClient {
    http: reqwest::Client,
    base_url: String,
    service_token: String,
}

impl PlanClient {
    /// Build a client for the given user service base URL.
    ///
    /// `timeout` bounds every lookup.
    pub fn new(
        base_url: impl Into<String>,
        service_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::PlanServiceError {
                details: e.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            service_token: service_token.into(),
        })
    }
}

#[async_trait]
impl PlanService for PlanClient {
    async fn campaign_expiry(&self, register_user_id: &str) -> Result<PlanExpiry> {
        let url = format!(
            "{}/api/v1/users/service/user_details?register_user_id={}",
            self.base_url, register_user_id
        );
        let response = self
            .http
            .get(&url)
            .header("Authorization", &self.service_token)
            .send()
            .await
            .map_err(|e| CoreError::PlanServiceError {
                details: e.to_string(),
            })?;

        let envelope: PlanEnvelope =
            response
                .json()
                .await
                .map_err(|e| CoreError::PlanServiceError {
                    details: format!("invalid response body: {e}"),
                })?;
        if envelope.status != 200 {
            return Err(CoreError::PlanServiceError {
                details: format!(
                    "unexpected status {}: {}",
                    envelope.status, envelope.message
                ),
            });
        }
        let data = envelope.data.ok_or_else(|| CoreError::PlanServiceError {
            details: "response carries no plan data".to_string(),
        })?;

        let expires_at = add_validity(Utc::now(), &data.validity)?;
        debug!(
            register_user_id,
            unit = %data.validity.unit,
            value = data.validity.value,
            %expires_at,
            "resolved plan expiry"
        );
        Ok(PlanExpiry {
            expires_at,
            user_name: data.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_validity_units() {
        let now = at(2025, 3, 10);

        let year = Validity {
            unit: "YEAR".to_string(),
            value: 1,
        };
        assert_eq!(add_validity(now, &year).unwrap(), at(2026, 3, 10));

        let month = Validity {
            unit: "MONTH".to_string(),
            value: 2,
        };
        assert_eq!(add_validity(now, &month).unwrap(), at(2025, 5, 10));

        let day = Validity {
            unit: "DAY".to_string(),
            value: 30,
        };
        assert_eq!(add_validity(now, &day).unwrap(), at(2025, 4, 9));
    }

    #[test]
    fn test_month_end_clamps() {
        let now = at(2025, 1, 31);
        let month = Validity {
            unit: "MONTH".to_string(),
            value: 1,
        };
        assert_eq!(add_validity(now, &month).unwrap(), at(2025, 2, 28));
    }

    #[test]
    fn test_unknown_unit_rejected() {
        let now = at(2025, 3, 10);
        let bad = Validity {
            unit: "FORTNIGHT".to_string(),
            value: 1,
        };
        let err = add_validity(now, &bad).unwrap_err();
        assert!(matches!(err, CoreError::PlanServiceError { .. }));
        assert!(err.to_string().contains("invalid unit"));

        let negative = Validity {
            unit: "DAY".to_string(),
            value: -3,
        };
        assert!(add_validity(now, &negative).is_err());
    }

    #[test]
    fn test_envelope_field_names() {
        let envelope: PlanEnvelope = serde_json::from_str(
            r#"{
                "status": 200,
                "message": "ok",
                "data": {
                    "expiry_duration": {"unit": "MONTH", "value": 6},
                    "name": "Dana"
                },
                "error": false
            }"#,
        )
        .unwrap();
        assert_eq!(envelope.status, 200);
        let data = envelope.data.unwrap();
        assert_eq!(data.validity.unit, "MONTH");
        assert_eq!(data.validity.value, 6);
        assert_eq!(data.name, "Dana");
    }
}
