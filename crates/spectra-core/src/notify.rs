// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Campaign lifecycle notifications.
//!
//! Publish and failure events reach the campaign owner through the user
//! service, which renders the mail and delivers pushes. Dispatch failures
//! surface to the caller; the side-effect worker logs them and moves on.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::credit::CreditReceipt;
use crate::error::{CoreError, Result};
use crate::model::{Campaign, User};

/// Event sent when a campaign goes live for the first time.
pub const EVENT_CAMPAIGN_PUBLISHED: &str = "campaign_published";
/// Event sent when a workflow ends in anything but completion.
pub const EVENT_CAMPAIGN_FAILED: &str = "campaign_failed";

const MAIL_PATH: &str = "/api/v1/users/service/send/mail";
const PUSH_PATH: &str = "/api/v1/users/service/notification";

#[derive(Serialize)]
struct CampaignMail<'a> {
    campaign_id: &'a str,
    created_at: i64,
    updated_at: i64,
    name: &'a str,
    client_id: &'a str,
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_by: Option<&'a User>,
    trigger_image: &'a str,
    track_type: &'a str,
    notification_type: &'a str,
    credit_type: &'a str,
    balance: i32,
    unlimited: bool,
}

#[derive(Serialize)]
struct CampaignPush<'a> {
    send_push: bool,
    campaign_id: &'a str,
    short_code: &'a str,
    user_id: &'a str,
    created_at: i64,
    name: &'a str,
    client_id: &'a str,
    variables: serde_json::Value,
    email: &'a str,
    recipient_type: &'a str,
    notif_type: &'a str,
}

fn mail_body<'a>(
    campaign: &'a Campaign,
    recipient: Option<&'a User>,
    trigger_image: &'a str,
    event: &'a str,
    credit_type: &'a str,
    balance: i32,
    unlimited: bool,
) -> CampaignMail<'a> {
    CampaignMail {
        campaign_id: &campaign.short_code,
        created_at: campaign.created_at.timestamp_millis(),
        updated_at: campaign.updated_at.timestamp_millis(),
        name: &campaign.name,
        client_id: &campaign.client_id,
        email: recipient.map(|u| u.email.as_str()).unwrap_or_default(),
        created_by: recipient,
        trigger_image,
        track_type: &campaign.track_type,
        notification_type: event,
        credit_type,
        balance,
        unlimited,
    }
}

fn push_body<'a>(campaign: &'a Campaign, recipient: &'a User, event: &'a str) -> CampaignPush<'a> {
    CampaignPush {
        send_push: true,
        campaign_id: &campaign.short_code,
        short_code: &campaign.short_code,
        user_id: &recipient.id,
        created_at: chrono::Utc::now().timestamp_millis(),
        name: &campaign.name,
        client_id: &campaign.client_id,
        variables: json!({
            "campaign_name": campaign.name,
            "campaign_id": campaign.id,
            "short_code": campaign.short_code,
        }),
        email: "",
        recipient_type: "user",
        notif_type: event,
    }
}

fn notify_error(operation: &str, details: impl Into<String>) -> CoreError {
    CoreError::NotificationError {
        operation: operation.to_string(),
        details: details.into(),
    }
}

/// Outbound campaign notifications.
///
/// The production implementation is [`UserServiceNotifier`]; the side-effect
/// worker holds this as a trait object so tests can capture dispatches.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Mails the owner that their campaign went live, including the credit
    /// receipt of the publish.
    async fn campaign_published_mail(
        &self,
        campaign: &Campaign,
        recipient: Option<&User>,
        trigger_image: &str,
        receipt: &CreditReceipt,
    ) -> Result<()>;

    /// Mails the owner that processing failed.
    async fn campaign_failed_mail(
        &self,
        campaign: &Campaign,
        recipient: Option<&User>,
    ) -> Result<()>;

    /// Pushes a publish notification to the campaign owner's devices.
    async fn campaign_published_push(&self, campaign: &Campaign, recipient: &User) -> Result<()>;
}

/// Client for the user service's mail and push endpoints.
#[derive(Debug, Clone)]
pub struct UserServiceNotifier {
    http: reqwest::Client,
    base_url: String,
    service_token: String,
}

impl UserServiceNotifier {
    /// Builds a notifier for the given user service base URL.
    ///
    /// `timeout` bounds every dispatch.
    pub fn new(
        base_url: impl Into<String>,
        service_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            service_token: service_token.into(),
        })
    }

    async fn dispatch<B: Serialize>(&self, operation: &str, path: &str, body: &B) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .header("Authorization", &self.service_token)
            .json(body)
            .send()
            .await
            .map_err(|e| notify_error(operation, e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(notify_error(operation, format!("http status {status}")));
        }
        debug!(operation, path, "notification dispatched");
        Ok(())
    }
}

#[async_trait]
impl Notifier for UserServiceNotifier {
    async fn campaign_published_mail(
        &self,
        campaign: &Campaign,
        recipient: Option<&User>,
        trigger_image: &str,
        receipt: &CreditReceipt,
    ) -> Result<()> {
        let body = mail_body(
            campaign,
            recipient,
            trigger_image,
            EVENT_CAMPAIGN_PUBLISHED,
            &receipt.credit_type,
            receipt.balance,
            receipt.unlimited,
        );
        self.dispatch("mail", MAIL_PATH, &body).await
    }

    async fn campaign_failed_mail(
        &self,
        campaign: &Campaign,
        recipient: Option<&User>,
    ) -> Result<()> {
        let body = mail_body(campaign, recipient, "", EVENT_CAMPAIGN_FAILED, "", 0, false);
        self.dispatch("mail", MAIL_PATH, &body).await
    }

    async fn campaign_published_push(&self, campaign: &Campaign, recipient: &User) -> Result<()> {
        let body = push_body(campaign, recipient, EVENT_CAMPAIGN_PUBLISHED);
        self.dispatch("push", PUSH_PATH, &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn campaign() -> Campaign {
        Campaign {
            id: "cmp-1".to_string(),
            client_id: "client-9".to_string(),
            name: "Spring Launch".to_string(),
            short_code: "spr24".to_string(),
            track_type: "CARD".to_string(),
            created_at: chrono::Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
            updated_at: chrono::Utc.with_ymd_and_hms(2025, 1, 3, 3, 4, 5).unwrap(),
            ..Campaign::default()
        }
    }

    fn owner() -> User {
        User {
            id: "user-7".to_string(),
            email: "owner@example.com".to_string(),
            name: "Dana".to_string(),
        }
    }

    #[test]
    fn test_published_mail_wire_shape() {
        let campaign = campaign();
        let owner = owner();
        let body = mail_body(
            &campaign,
            Some(&owner),
            "https://cdn/trigger.png",
            EVENT_CAMPAIGN_PUBLISHED,
            "premium",
            4,
            false,
        );
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["campaign_id"], "spr24");
        assert_eq!(value["notification_type"], "campaign_published");
        assert_eq!(value["email"], "owner@example.com");
        assert_eq!(value["trigger_image"], "https://cdn/trigger.png");
        assert_eq!(value["track_type"], "CARD");
        assert_eq!(value["credit_type"], "premium");
        assert_eq!(value["balance"], 4);
        assert_eq!(value["unlimited"], false);
        assert_eq!(value["created_by"]["id"], "user-7");
    }

    #[test]
    fn test_failed_mail_zeroes_credit_fields() {
        let campaign = campaign();
        let body = mail_body(&campaign, None, "", EVENT_CAMPAIGN_FAILED, "", 0, false);
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["notification_type"], "campaign_failed");
        assert_eq!(value["trigger_image"], "");
        assert_eq!(value["credit_type"], "");
        assert_eq!(value["balance"], 0);
        assert_eq!(value["email"], "");
        assert!(value.get("created_by").is_none());
    }

    #[test]
    fn test_push_targets_owner() {
        let campaign = campaign();
        let owner = owner();
        let body = push_body(&campaign, &owner, EVENT_CAMPAIGN_PUBLISHED);
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["send_push"], true);
        assert_eq!(value["recipient_type"], "user");
        assert_eq!(value["user_id"], "user-7");
        assert_eq!(value["notif_type"], "campaign_published");
        assert_eq!(value["variables"]["campaign_name"], "Spring Launch");
        assert_eq!(value["variables"]["short_code"], "spr24");
        assert_eq!(value["variables"]["campaign_id"], "cmp-1");
    }
}
