// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Completion stream consumer.
//!
//! Pulls final workflow results off the completion bus, routes them to the
//! lane handlers and settles each entry: acknowledge on success and on
//! non-retryable errors, leave pending on retryable ones. Undecodable
//! entries and entries past their delivery limit are acknowledged and
//! dropped so poison messages never loop.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::bus::redis_stream::COMPLETED_STREAM;
use crate::bus::{BusMessage, CompletionBus, RedisStreamBus};
use crate::completion_handlers::{
    handle_campaign_scan_completion, handle_experience_completion, handle_qr_overlay_completion,
    handle_regenerate_completion, handle_remotion_completion, CompletionHandlerState,
};
use crate::error::CoreError;
use crate::wire::{WorkflowResult, WorkflowRoute};

/// Tuning for the consumer loops.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// Entries pulled per fetch.
    pub fetch_batch: usize,
    /// Poll block while the stream is empty.
    pub fetch_wait: Duration,
    /// Deliveries after which an entry is dropped instead of retried.
    pub max_deliveries: i64,
    /// Idle time before the reclaim loop takes over an entry.
    pub reclaim_idle: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            fetch_batch: 10,
            fetch_wait: Duration::from_millis(500),
            max_deliveries: 3,
            reclaim_idle: Duration::from_secs(30),
        }
    }
}

/// Pull-and-dispatch loop over the completion stream.
///
/// Runs until the owning task is aborted.
pub async fn run_completion_consumer(
    state: Arc<CompletionHandlerState>,
    bus: Arc<dyn CompletionBus>,
    settings: ConsumerSettings,
) {
    info!(
        fetch_batch = settings.fetch_batch,
        "completion consumer started"
    );
    loop {
        let messages = match bus.fetch(settings.fetch_batch, settings.fetch_wait).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("completion fetch failed: {}", e);
                tokio::time::sleep(settings.fetch_wait).await;
                continue;
            }
        };
        for message in messages {
            dispatch_message(&state, bus.as_ref(), &message, settings.max_deliveries).await;
        }
    }
}

/// Redelivery loop for entries stuck in the pending list.
///
/// A consumer that dies mid-dispatch leaves its entries pending forever;
/// this loop claims entries idle past `reclaim_idle` and runs them through
/// the same dispatch as fresh deliveries.
pub async fn run_reclaim_loop(
    state: Arc<CompletionHandlerState>,
    bus: Arc<RedisStreamBus>,
    settings: ConsumerSettings,
) {
    info!(
        idle_secs = settings.reclaim_idle.as_secs(),
        "completion reclaim loop started"
    );
    loop {
        tokio::time::sleep(settings.reclaim_idle).await;
        let messages = match bus
            .reclaim(settings.reclaim_idle, settings.fetch_batch)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!("pending reclaim failed: {}", e);
                continue;
            }
        };
        if !messages.is_empty() {
            info!(count = messages.len(), "reclaimed stalled completion entries");
        }
        for message in messages {
            dispatch_message(&state, bus.as_ref(), &message, settings.max_deliveries).await;
        }
    }
}

/// Decode, route and settle one completion entry.
async fn dispatch_message(
    state: &CompletionHandlerState,
    bus: &dyn CompletionBus,
    message: &BusMessage,
    max_deliveries: i64,
) {
    if message.deliveries > max_deliveries {
        error!(
            entry_id = %message.id,
            deliveries = message.deliveries,
            "completion entry exhausted its deliveries, dropping"
        );
        ack(bus, message).await;
        return;
    }

    let result: WorkflowResult = match serde_json::from_str(&message.payload) {
        Ok(result) => result,
        Err(e) => {
            let err = CoreError::MalformedMessage {
                stream: COMPLETED_STREAM.to_string(),
                details: e.to_string(),
            };
            error!(entry_id = %message.id, "undecodable completion entry, dropping: {}", err);
            ack(bus, message).await;
            return;
        }
    };

    let workflow_id = result.workflow_id.clone();
    let lane = result.route.lane_name();
    debug!(entry_id = %message.id, workflow_id = %workflow_id, lane, "dispatching completion");

    let outcome = match result.route.clone() {
        WorkflowRoute::Experience { experience_id }
        | WorkflowRoute::StitchSegment { experience_id } => {
            handle_experience_completion(state, &experience_id, result)
                .await
                .map(|_| ())
        }
        WorkflowRoute::Campaign { short_code } => {
            handle_campaign_scan_completion(state, &short_code, result).await
        }
        WorkflowRoute::QrOverlay { experience_id } => {
            handle_qr_overlay_completion(state, &experience_id, result)
                .await
                .map(|_| ())
        }
        WorkflowRoute::Regenerate { experience_id } => {
            handle_regenerate_completion(state, &experience_id, result).await
        }
        WorkflowRoute::Remotion { render_id } => {
            handle_remotion_completion(state, &render_id, result).await
        }
    };

    match outcome {
        Ok(()) => {
            debug!(workflow_id = %workflow_id, lane, "completion settled");
            ack(bus, message).await;
        }
        Err(e) if e.is_retryable() => {
            warn!(
                workflow_id = %workflow_id,
                lane,
                "completion failed, leaving for redelivery: {}", e
            );
            if let Err(nack_err) = bus.nack(message).await {
                warn!(entry_id = %message.id, "nack failed: {}", nack_err);
            }
        }
        Err(e) => {
            error!(workflow_id = %workflow_id, lane, "completion rejected, dropping: {}", e);
            ack(bus, message).await;
        }
    }
}

async fn ack(bus: &dyn CompletionBus, message: &BusMessage) {
    if let Err(e) = bus.ack(message).await {
        warn!(entry_id = %message.id, "ack failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::credit::{CreditLedger, CreditReceipt};
    use crate::effects::SideEffects;
    use crate::error::Result;
    use crate::model::{Campaign, Experience};
    use crate::persistence::mock::MockPersistence;
    use crate::plan::{PlanExpiry, PlanService};
    use crate::status::{ExperienceStatus, TaskStatus};

    struct MockCompletionBus {
        acked: Mutex<Vec<String>>,
        nacked: Mutex<Vec<String>>,
    }

    impl MockCompletionBus {
        fn new() -> Self {
            Self {
                acked: Mutex::new(Vec::new()),
                nacked: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionBus for MockCompletionBus {
        async fn fetch(&self, _max: usize, _wait: Duration) -> Result<Vec<BusMessage>> {
            Ok(Vec::new())
        }

        async fn ack(&self, message: &BusMessage) -> Result<()> {
            self.acked.lock().unwrap().push(message.id.clone());
            Ok(())
        }

        async fn nack(&self, message: &BusMessage) -> Result<()> {
            self.nacked.lock().unwrap().push(message.id.clone());
            Ok(())
        }
    }

    struct NoopCredit;

    #[async_trait]
    impl CreditLedger for NoopCredit {
        async fn reserve(&self, _client_id: &str, _credit_type: &str) -> Result<String> {
            Ok(String::new())
        }

        async fn release(
            &self,
            _client_id: &str,
            _credit_type: &str,
            _allowance_id: &str,
        ) -> Result<()> {
            Ok(())
        }

        async fn consume(
            &self,
            _short_code: &str,
            _campaign_name: &str,
            _allowance_id: &str,
            _user_id: &str,
        ) -> Result<CreditReceipt> {
            Ok(CreditReceipt::default())
        }
    }

    struct NoopPlan;

    #[async_trait]
    impl PlanService for NoopPlan {
        async fn campaign_expiry(&self, _register_user_id: &str) -> Result<PlanExpiry> {
            Ok(PlanExpiry {
                expires_at: Utc::now(),
                user_name: String::new(),
            })
        }
    }

    fn state_over(persistence: MockPersistence) -> (CompletionHandlerState, Arc<MockPersistence>) {
        let persistence = Arc::new(persistence);
        let (effects, _effects_rx) = SideEffects::with_capacity(16);
        let state = CompletionHandlerState::new(
            persistence.clone(),
            Arc::new(NoopCredit),
            Arc::new(NoopPlan),
            effects,
        );
        (state, persistence)
    }

    fn seeded_persistence() -> MockPersistence {
        MockPersistence::new()
            .with_experience(Experience {
                id: "exp-1".to_string(),
                campaign_id: "camp-1".to_string(),
                status: ExperienceStatus::Processing,
                is_active: true,
                ..Default::default()
            })
            .with_campaign(Campaign {
                id: "camp-1".to_string(),
                short_code: "sd1".to_string(),
                is_active: true,
                ..Default::default()
            })
    }

    fn result_json(route: WorkflowRoute, status: TaskStatus) -> String {
        let result = WorkflowResult {
            workflow_id: "wf-1".to_string(),
            route,
            status,
            task_results: Vec::new(),
            workflow_error: None,
            publish: false,
        };
        serde_json::to_string(&result).unwrap()
    }

    fn message(payload: &str, deliveries: i64) -> BusMessage {
        BusMessage {
            id: "1-0".to_string(),
            deliveries,
            payload: payload.to_string(),
        }
    }

    #[tokio::test]
    async fn test_decoded_result_is_dispatched_and_acked() {
        let (state, persistence) = state_over(seeded_persistence());
        let bus = MockCompletionBus::new();

        let payload = result_json(
            WorkflowRoute::Experience {
                experience_id: "exp-1".to_string(),
            },
            TaskStatus::Completed,
        );
        dispatch_message(&state, &bus, &message(&payload, 1), 3).await;

        let stored = persistence.stored_experience("exp-1").unwrap();
        assert_eq!(stored.status, ExperienceStatus::Processed);
        assert_eq!(bus.acked.lock().unwrap().as_slice(), ["1-0"]);
        assert!(bus.nacked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_poison_message_is_acked() {
        let (state, persistence) = state_over(seeded_persistence());
        let bus = MockCompletionBus::new();

        dispatch_message(&state, &bus, &message("not json", 1), 3).await;

        // Dropped without touching any document.
        let stored = persistence.stored_experience("exp-1").unwrap();
        assert_eq!(stored.status, ExperienceStatus::Processing);
        assert_eq!(bus.acked.lock().unwrap().as_slice(), ["1-0"]);
    }

    #[tokio::test]
    async fn test_exhausted_delivery_is_dropped() {
        let (state, persistence) = state_over(seeded_persistence());
        let bus = MockCompletionBus::new();

        let payload = result_json(
            WorkflowRoute::Experience {
                experience_id: "exp-1".to_string(),
            },
            TaskStatus::Completed,
        );
        dispatch_message(&state, &bus, &message(&payload, 4), 3).await;

        // Past the delivery limit: acked without dispatching.
        let stored = persistence.stored_experience("exp-1").unwrap();
        assert_eq!(stored.status, ExperienceStatus::Processing);
        assert_eq!(bus.acked.lock().unwrap().as_slice(), ["1-0"]);
    }

    #[tokio::test]
    async fn test_retryable_failure_is_nacked() {
        let (state, _persistence) = state_over(MockPersistence::new());
        let bus = MockCompletionBus::new();

        // A completed render without its payload is incomplete, and
        // incomplete results are redelivered.
        let payload = result_json(
            WorkflowRoute::Remotion {
                render_id: "render-1".to_string(),
            },
            TaskStatus::Completed,
        );
        dispatch_message(&state, &bus, &message(&payload, 1), 3).await;

        assert!(bus.acked.lock().unwrap().is_empty());
        assert_eq!(bus.nacked.lock().unwrap().as_slice(), ["1-0"]);
    }

    #[tokio::test]
    async fn test_missing_document_is_dropped() {
        let (state, _persistence) = state_over(MockPersistence::new());
        let bus = MockCompletionBus::new();

        let payload = result_json(
            WorkflowRoute::Experience {
                experience_id: "ghost".to_string(),
            },
            TaskStatus::Completed,
        );
        dispatch_message(&state, &bus, &message(&payload, 1), 3).await;

        // A result for a deleted experience can never succeed; drop it.
        assert_eq!(bus.acked.lock().unwrap().as_slice(), ["1-0"]);
        assert!(bus.nacked.lock().unwrap().is_empty());
    }
}
