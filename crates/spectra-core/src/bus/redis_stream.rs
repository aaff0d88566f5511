// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Redis Streams bus binding.
//!
//! Workflows are published to the submit stream with `XADD`; final results
//! are pulled from the completion stream through a consumer group with
//! `XREADGROUP` and settled with `XACK`. A nack simply leaves the entry in
//! the pending list; [`RedisStreamBus::reclaim`] picks stalled entries back
//! up with `XAUTOCLAIM` so redelivery works across consumer restarts.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamPendingCountReply,
    StreamReadOptions, StreamReadReply,
};
use redis::AsyncCommands;
use tracing::{debug, info};

use crate::error::{CoreError, Result};
use crate::wire::Workflow;

use super::{BusMessage, CompletionBus, TaskBus};

/// Stream workflows are submitted to.
pub const SUBMIT_STREAM: &str = "spectra:workflows";
/// Stream final results arrive on.
pub const COMPLETED_STREAM: &str = "spectra:workflows:completed";
/// Consumer group name on the completion stream.
pub const CONSUMER_GROUP: &str = "spectra-core";

/// Logical subject recorded on each submitted entry.
const SUBMIT_SUBJECT: &str = "workflow.submit";
const SUBJECT_FIELD: &str = "subject";
const PAYLOAD_FIELD: &str = "payload";

fn redis_error(operation: &str, err: redis::RedisError) -> CoreError {
    CoreError::RedisError {
        operation: operation.to_string(),
        details: err.to_string(),
    }
}

/// Redis Streams implementation of both bus seams.
#[derive(Clone)]
pub struct RedisStreamBus {
    conn: ConnectionManager,
    submit_stream: String,
    completed_stream: String,
    group: String,
    consumer: String,
}

impl RedisStreamBus {
    /// Connect to Redis and ensure the completion consumer group exists.
    pub async fn connect(url: &str, consumer: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| redis_error("connect", e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| redis_error("connect", e))?;

        let bus = Self {
            conn,
            submit_stream: SUBMIT_STREAM.to_string(),
            completed_stream: COMPLETED_STREAM.to_string(),
            group: CONSUMER_GROUP.to_string(),
            consumer: consumer.to_string(),
        };
        bus.ensure_group().await?;

        info!(
            submit = %bus.submit_stream,
            completed = %bus.completed_stream,
            group = %bus.group,
            consumer = %bus.consumer,
            "redis stream bus connected"
        );
        Ok(bus)
    }

    async fn ensure_group(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let created: std::result::Result<(), redis::RedisError> = conn
            .xgroup_create_mkstream(&self.completed_stream, &self.group, "$")
            .await;
        match created {
            Ok(()) => Ok(()),
            // The group surviving a restart is the normal case.
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(redis_error("xgroup_create", e)),
        }
    }

    fn message_from_entry(entry: &StreamId, deliveries: i64) -> BusMessage {
        BusMessage {
            id: entry.id.clone(),
            deliveries,
            payload: entry.get::<String>(PAYLOAD_FIELD).unwrap_or_default(),
        }
    }

    /// Claim entries that have sat unacknowledged for at least `min_idle`.
    ///
    /// Each claimed entry comes back with its pending-list delivery count so
    /// the consumer can dead-letter exhausted ones. The scan restarts from
    /// the beginning of the pending list on every call; entries beyond
    /// `max` are picked up on the next pass.
    pub async fn reclaim(&self, min_idle: Duration, max: usize) -> Result<Vec<BusMessage>> {
        let mut conn = self.conn.clone();

        let opts = StreamAutoClaimOptions::default().count(max);
        let reply: StreamAutoClaimReply = conn
            .xautoclaim_options(
                &self.completed_stream,
                &self.group,
                &self.consumer,
                min_idle.as_millis() as usize,
                "0-0",
                opts,
            )
            .await
            .map_err(|e| redis_error("xautoclaim", e))?;

        if reply.claimed.is_empty() {
            return Ok(Vec::new());
        }

        // XAUTOCLAIM does not report delivery counts; read them off the
        // pending list for the claimed id range.
        let first = reply.claimed[0].id.clone();
        let last = reply.claimed[reply.claimed.len() - 1].id.clone();
        let pending: StreamPendingCountReply = conn
            .xpending_count(
                &self.completed_stream,
                &self.group,
                &first,
                &last,
                reply.claimed.len(),
            )
            .await
            .map_err(|e| redis_error("xpending", e))?;
        let counts: std::collections::HashMap<&str, i64> = pending
            .ids
            .iter()
            .map(|p| (p.id.as_str(), p.times_delivered as i64))
            .collect();

        let messages = reply
            .claimed
            .iter()
            .map(|entry| {
                let deliveries = counts.get(entry.id.as_str()).copied().unwrap_or(1);
                Self::message_from_entry(entry, deliveries)
            })
            .collect::<Vec<_>>();

        debug!(claimed = messages.len(), "reclaimed stalled completion entries");
        Ok(messages)
    }
}

#[async_trait]
impl TaskBus for RedisStreamBus {
    async fn submit(&self, workflow: &Workflow) -> Result<()> {
        let payload = serde_json::to_string(workflow)?;
        let mut conn = self.conn.clone();
        conn.xadd::<_, _, _, _, ()>(
            &self.submit_stream,
            "*",
            &[
                (SUBJECT_FIELD, SUBMIT_SUBJECT),
                (PAYLOAD_FIELD, payload.as_str()),
            ],
        )
        .await
        .map_err(|e| redis_error("xadd", e))?;

        debug!(
            workflow_id = %workflow.id,
            lane = workflow.route.lane_name(),
            tasks = workflow.tasks.len(),
            "workflow submitted"
        );
        Ok(())
    }
}

#[async_trait]
impl CompletionBus for RedisStreamBus {
    async fn fetch(&self, max: usize, wait: Duration) -> Result<Vec<BusMessage>> {
        let mut conn = self.conn.clone();

        let opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(max)
            .block(wait.as_millis() as usize);
        let reply: StreamReadReply = conn
            .xread_options(&[&self.completed_stream], &[">"], &opts)
            .await
            .map_err(|e| redis_error("xreadgroup", e))?;

        let mut messages = Vec::new();
        for key in &reply.keys {
            for entry in &key.ids {
                // A `>` read only returns never-delivered entries.
                messages.push(Self::message_from_entry(entry, 1));
            }
        }
        Ok(messages)
    }

    async fn ack(&self, message: &BusMessage) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.xack::<_, _, _, ()>(&self.completed_stream, &self.group, &[&message.id])
            .await
            .map_err(|e| redis_error("xack", e))?;
        Ok(())
    }

    async fn nack(&self, message: &BusMessage) -> Result<()> {
        // The entry stays in the pending list; the reclaim pass redelivers
        // it once it has idled long enough.
        debug!(id = %message.id, deliveries = message.deliveries, "completion entry left pending");
        Ok(())
    }
}
