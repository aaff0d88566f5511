// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Credit ledger client.
//!
//! Publishing a campaign costs one credit. The payment service escrows the
//! credit first (`reserve`), converts the escrow into a consumption when the
//! workflow completes (`consume`), and reverses the escrow when the paid flow
//! is abandoned (`release`). The reserve-before-consume ordering is the
//! caller's responsibility; this client only speaks the wire protocol.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CoreError, Result};

/// Ledger message that distinguishes exhaustion from transport failures.
const NO_CREDITS_MESSAGE: &str = "no credits available";

/// What the ledger reports back when a credit is consumed; forwarded into the
/// published-campaign mail.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CreditReceipt {
    /// Remaining balance after consumption.
    #[serde(default)]
    pub balance: i32,
    /// Whether the plan is uncapped; `balance` is meaningless when set.
    #[serde(default)]
    pub unlimited: bool,
    /// Credit type that was consumed.
    #[serde(default)]
    pub credit_type: String,
}

/// Escrow operations of the payment service.
///
/// The production implementation is [`CreditLedgerClient`]; handler tests
/// substitute an in-memory double.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Escrow-reserves one credit of `credit_type` for a client.
    ///
    /// Returns the allowance id the reservation is tracked under.
    async fn reserve(&self, client_id: &str, credit_type: &str) -> Result<String>;

    /// Reverses a reservation that will not be consumed.
    ///
    /// Safe to call for an already-released allowance; the ledger treats the
    /// reversal as idempotent.
    async fn release(&self, client_id: &str, credit_type: &str, allowance_id: &str) -> Result<()>;

    /// Converts a reservation into a consumption attributed to `user_id`.
    ///
    /// `short_code` and `campaign_name` label the ledger entry.
    async fn consume(
        &self,
        short_code: &str,
        campaign_name: &str,
        allowance_id: &str,
        user_id: &str,
    ) -> Result<CreditReceipt>;
}

#[derive(Serialize)]
struct EscrowRequest<'a> {
    client_id: &'a str,
    credit_type: &'a str,
    reverse: bool,
    #[serde(skip_serializing_if = "str::is_empty")]
    credit_allowance_id: &'a str,
}

#[derive(Deserialize)]
struct EscrowData {
    #[serde(default)]
    credit_allowance_id: String,
}

#[derive(Deserialize)]
struct EscrowResponse {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<EscrowData>,
    #[serde(default)]
    error: bool,
}

#[derive(Serialize)]
struct ConsumeRequest<'a> {
    ref_id: &'a str,
    ref_name: &'a str,
    ref_type: &'a str,
    credit_allowance_id: &'a str,
    user_id: &'a str,
}

#[derive(Deserialize)]
struct ConsumeResponse {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<CreditReceipt>,
    #[serde(default)]
    error: bool,
}

/// HTTP client for the payment service's credit endpoints.
#[derive(Debug, Clone)]
pub struct CreditLedgerClient {
    http: reqwest::Client,
    base_url: String,
    service_token: String,
}

impl CreditLedgerClient {
    /// Build a client for the given payment service base URL.
    ///
    /// `timeout` bounds every ledger request.
    pub fn new(
        base_url: impl Into<String>,
        service_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::CreditLedgerError {
                operation: "client".to_string(),
                details: e.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            service_token: service_token.into(),
        })
    }

    async fn post_escrow(&self, request: &EscrowRequest<'_>) -> Result<EscrowResponse> {
        let url = format!("{}/api/v1/credit/escrow", self.base_url);
        let operation = if request.reverse { "release" } else { "reserve" };

        let response = self
            .http
            .post(&url)
            .header("Authorization", &self.service_token)
            .json(request)
            .send()
            .await
            .map_err(|e| CoreError::CreditLedgerError {
                operation: operation.to_string(),
                details: e.to_string(),
            })?;

        let body: EscrowResponse = Self::decode(response, operation).await?;
        if body.error {
            return Err(Self::ledger_error(operation, &body.message, request.client_id));
        }
        Ok(body)
    }

    /// Decode a ledger response, folding HTTP error statuses into the
    /// enveloped `message` the body carries.
    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        operation: &str,
    ) -> Result<T> {
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CoreError::CreditLedgerError {
                operation: operation.to_string(),
                details: e.to_string(),
            })?;
        if !status.is_success() {
            // Failed calls still carry the envelope; surface its message.
            if let Ok(envelope) = serde_json::from_slice::<serde_json::Value>(&bytes) {
                if let Some(message) = envelope.get("message").and_then(|m| m.as_str()) {
                    if message == NO_CREDITS_MESSAGE {
                        return Err(CoreError::NoCreditsAvailable {
                            campaign_id: String::new(),
                        });
                    }
                    return Err(CoreError::CreditLedgerError {
                        operation: operation.to_string(),
                        details: message.to_string(),
                    });
                }
            }
            warn!(%status, operation, "credit ledger returned an unreadable error body");
            return Err(CoreError::CreditLedgerError {
                operation: operation.to_string(),
                details: format!("http status {status}"),
            });
        }
        serde_json::from_slice(&bytes).map_err(|e| CoreError::CreditLedgerError {
            operation: operation.to_string(),
            details: format!("invalid response body: {e}"),
        })
    }

    fn ledger_error(operation: &str, message: &str, subject: &str) -> CoreError {
        if message == NO_CREDITS_MESSAGE {
            CoreError::NoCreditsAvailable {
                campaign_id: subject.to_string(),
            }
        } else {
            CoreError::CreditLedgerError {
                operation: operation.to_string(),
                details: message.to_string(),
            }
        }
    }
}

#[async_trait]
impl CreditLedger for CreditLedgerClient {
    async fn reserve(&self, client_id: &str, credit_type: &str) -> Result<String> {
        let response = self
            .post_escrow(&EscrowRequest {
                client_id,
                credit_type,
                reverse: false,
                credit_allowance_id: "",
            })
            .await?;
        debug!(client_id, credit_type, "credit reserved");
        Ok(response
            .data
            .map(|d| d.credit_allowance_id)
            .unwrap_or_default())
    }

    async fn release(&self, client_id: &str, credit_type: &str, allowance_id: &str) -> Result<()> {
        self.post_escrow(&EscrowRequest {
            client_id,
            credit_type,
            reverse: true,
            credit_allowance_id: allowance_id,
        })
        .await?;
        debug!(client_id, allowance_id, "credit reservation released");
        Ok(())
    }

    async fn consume(
        &self,
        short_code: &str,
        campaign_name: &str,
        allowance_id: &str,
        user_id: &str,
    ) -> Result<CreditReceipt> {
        let url = format!("{}/api/v1/credit/consume", self.base_url);
        let request = ConsumeRequest {
            ref_id: short_code,
            ref_name: campaign_name,
            ref_type: "CAMPAIGN",
            credit_allowance_id: allowance_id,
            user_id,
        };

        let response = self
            .http
            .post(&url)
            .header("Authorization", &self.service_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| CoreError::CreditLedgerError {
                operation: "consume".to_string(),
                details: e.to_string(),
            })?;

        let body: ConsumeResponse = Self::decode(response, "consume").await?;
        if body.error {
            return Err(Self::ledger_error("consume", &body.message, short_code));
        }
        let receipt = body.data.unwrap_or_default();
        debug!(
            short_code,
            balance = receipt.balance,
            unlimited = receipt.unlimited,
            "credit consumed"
        );
        Ok(receipt)
    }
}
