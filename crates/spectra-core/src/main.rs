// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Spectra Core - AR Experience Reconciliation Engine
//!
//! This binary runs the reconciliation side of the platform:
//! - Completion consumer (merges finished workflow results into documents)
//! - Reclaim loop (re-delivers entries a dead consumer left pending)
//! - Side-effect worker (cache expiry, mails, push)
//!
//! Note: the editor-facing update handlers are a library surface; the API
//! layer in front of them is a separate deployment.

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use spectra_core::bus::{CompletionBus, RedisStreamBus};
use spectra_core::cache::ExperienceCache;
use spectra_core::completion_handlers::CompletionHandlerState;
use spectra_core::config::Config;
use spectra_core::consumer;
use spectra_core::credit::CreditLedgerClient;
use spectra_core::effects::SideEffectWorker;
use spectra_core::migrations;
use spectra_core::notify::UserServiceNotifier;
use spectra_core::persistence::PostgresPersistence;
use spectra_core::plan::PlanClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("spectra_core=info".parse().unwrap()),
        )
        .init();

    info!("Starting Spectra Core");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        pool_size = config.database_pool,
        fetch_batch = config.consumer.fetch_batch,
        max_deliveries = config.consumer.max_deliveries,
        "Configuration loaded"
    );

    // Connect to database
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database_pool)
        .connect(&config.database_url)
        .await?;

    info!("Database connection established");

    // Verify connection
    let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&pool).await?;
    info!(result = row.0, "Database health check passed");

    info!("Running database migrations...");
    migrations::run_postgres(&pool).await?;
    info!("Migrations completed");

    // Connect to Redis for the cache and the workflow streams
    let consumer_name = format!("spectra-core-{}", std::process::id());
    let cache = ExperienceCache::connect(&config.redis_url).await?;
    let bus = Arc::new(RedisStreamBus::connect(&config.redis_url, &consumer_name).await?);
    info!(consumer = %consumer_name, "Redis connection established");

    // HTTP clients for the credit ledger and the user service
    let credit = Arc::new(CreditLedgerClient::new(
        config.credit_service_url.clone(),
        config.credit_service_token.clone(),
        config.http_timeout,
    )?);
    let plan = Arc::new(PlanClient::new(
        config.user_service_url.clone(),
        config.user_service_token.clone(),
        config.http_timeout,
    )?);
    let notifier = Arc::new(UserServiceNotifier::new(
        config.user_service_url.clone(),
        config.user_service_token.clone(),
        config.http_timeout,
    )?);

    // Create persistence backend and shared handler state
    let persistence = Arc::new(PostgresPersistence::new(pool.clone()));
    let effects = SideEffectWorker::new(persistence.clone(), cache, notifier)
        .spawn(config.effect_queue_capacity);
    let completion_state = Arc::new(CompletionHandlerState::new(
        persistence,
        credit,
        plan,
        effects,
    ));

    info!("Spectra Core initialized successfully");

    // Start the completion consumer (fresh deliveries)
    let consumer_state = completion_state.clone();
    let consumer_bus = bus.clone() as Arc<dyn CompletionBus>;
    let consumer_settings = config.consumer.clone();
    let consumer_handle = tokio::spawn(async move {
        consumer::run_completion_consumer(consumer_state, consumer_bus, consumer_settings).await;
    });

    // Start the reclaim loop (entries stranded by dead consumers)
    let reclaim_state = completion_state.clone();
    let reclaim_bus = bus.clone();
    let reclaim_settings = config.consumer.clone();
    let reclaim_handle = tokio::spawn(async move {
        consumer::run_reclaim_loop(reclaim_state, reclaim_bus, reclaim_settings).await;
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    // Cancel consumer tasks
    consumer_handle.abort();
    reclaim_handle.abort();

    pool.close().await;
    info!("Shutdown complete");

    Ok(())
}
