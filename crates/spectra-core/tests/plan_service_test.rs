// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire-level tests for the plan service client.
//!
//! Campaign expiry is derived from the owner's plan at the moment the
//! publishing credit is consumed. The user service reports a validity window;
//! everything else (calendar arithmetic, unit validation) happens client-side.

use std::time::Duration;

use chrono::Utc;
use spectra_core::error::CoreError;
use spectra_core::plan::{add_validity, PlanClient, PlanService, Validity};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> PlanClient {
    PlanClient::new(server.uri(), "service-token", Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_expiry_from_month_plan() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/service/user_details"))
        .and(query_param("register_user_id", "user-9"))
        .and(header("Authorization", "service-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": 200,
            "message": "ok",
            "data": {
                "expiry_duration": {"unit": "MONTH", "value": 6},
                "name": "Dana",
            },
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let validity = Validity {
        unit: "MONTH".to_string(),
        value: 6,
    };
    let before = Utc::now();
    let expiry = client(&mock_server).campaign_expiry("user-9").await.unwrap();
    let after = Utc::now();

    assert_eq!(expiry.user_name, "Dana");
    assert!(expiry.expires_at >= add_validity(before, &validity).unwrap());
    assert!(expiry.expires_at <= add_validity(after, &validity).unwrap());
}

#[tokio::test]
async fn test_unexpected_envelope_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/service/user_details"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": 404,
            "message": "user not found",
        })))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .campaign_expiry("ghost")
        .await
        .unwrap_err();
    match err {
        CoreError::PlanServiceError { details } => {
            assert!(details.contains("404"), "details: {details}");
            assert!(details.contains("user not found"), "details: {details}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_plan_data_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/service/user_details"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": 200,
            "message": "ok",
        })))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .campaign_expiry("user-9")
        .await
        .unwrap_err();
    match err {
        CoreError::PlanServiceError { details } => {
            assert!(details.contains("no plan data"), "details: {details}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_validity_unit_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/service/user_details"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": 200,
            "message": "ok",
            "data": {
                "expiry_duration": {"unit": "FORTNIGHT", "value": 2},
                "name": "Dana",
            },
        })))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .campaign_expiry("user-9")
        .await
        .unwrap_err();
    match err {
        CoreError::PlanServiceError { details } => {
            assert!(details.contains("invalid unit"), "details: {details}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
