// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow message buses.
//!
//! The processing pipeline is reached through two seams: a [`TaskBus`] the
//! handlers submit workflows to, and a [`CompletionBus`] the consumer loop
//! pulls final results from. Both are trait objects so tests can swap in
//! in-memory buses; production binds them to Redis Streams.

pub mod redis_stream;

pub use self::redis_stream::RedisStreamBus;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::wire::Workflow;

/// One pulled completion entry.
///
/// Carries the broker-side entry id and delivery count next to the raw
/// payload. Decoding is the consumer's job so an undecodable entry can
/// still be acknowledged and dropped.
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// Broker entry id, used for ack.
    pub id: String,
    /// Times the broker has handed this entry to a consumer.
    pub deliveries: i64,
    /// Raw JSON body of the final result.
    pub payload: String,
}

/// Submission side of the pipeline.
#[async_trait]
pub trait TaskBus: Send + Sync {
    /// Publish a workflow to the pipeline.
    async fn submit(&self, workflow: &Workflow) -> Result<()>;
}

/// Completion side of the pipeline, pull-based with explicit acknowledgement.
#[async_trait]
pub trait CompletionBus: Send + Sync {
    /// Pull up to `max` completion entries, waiting at most `wait` when the
    /// stream is empty.
    async fn fetch(&self, max: usize, wait: Duration) -> Result<Vec<BusMessage>>;

    /// Acknowledge an entry; the broker will not redeliver it.
    async fn ack(&self, message: &BusMessage) -> Result<()>;

    /// Leave an entry pending so the broker redelivers it later.
    async fn nack(&self, message: &BusMessage) -> Result<()>;
}
