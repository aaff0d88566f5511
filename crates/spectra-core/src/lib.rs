// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Spectra Core - AR Experience Reconciliation Engine
//!
//! This crate keeps campaign and experience documents consistent with the
//! media renditions produced for them. Editors mutate experiences through the
//! update handlers; the handlers diff the mutation against the stored
//! document, derive the processing work it implies, and submit that work as a
//! workflow. When the processing pipeline finishes, the completion consumer
//! merges the reported renditions back into the documents, settles the credit
//! escrow, and flips publish state.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Authoring Clients                              │
//! │                   (campaign studio, experience editor)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    │ update handlers
//!                                    ▼
//! ┌───────────────────────┐   ┌─────────────────────┐   ┌──────────────────┐
//! │      PostgreSQL       │◄──│    spectra-core     │──►│  Redis Streams   │
//! │ (campaigns,           │   │    (this crate)     │   │ spectra:workflows│
//! │  experiences,         │   │                     │◄──│ spectra:workflows│
//! │  renders)             │   │ update handlers     │   │    :completed    │
//! └───────────────────────┘   │ completion consumer │   └──────────────────┘
//!                             │ side-effect worker  │            ▲
//!                             └─────────┬───────────┘            │
//!                                       │ HTTP                   │ results
//!                       ┌───────────────┴───────────────┐        │
//!                       ▼                               ▼        │
//!             ┌──────────────────┐            ┌──────────────────┴───┐
//!             │  Credit Ledger   │            │   Media Processors   │
//!             │  User Service    │            │ (image, video, FAL,  │
//!             │ (plans, mails,   │            │  overlay, stitch,    │
//!             │  push)           │            │  Remotion)           │
//!             └──────────────────┘            └──────────────────────┘
//! ```
//!
//! # Update Handlers
//!
//! The update side is the library surface an API layer calls into. Each
//! handler loads the stored document, applies the mutation as a patch, and
//! submits derived processing work where assets changed.
//!
//! | Handler | Description |
//! |---------|-------------|
//! | `handle_update_experience` | Apply an editor mutation, reserve credit, submit the derived generation workflow |
//! | `handle_record_workflow` | Stamp a submitted workflow generation on the experience |
//! | `handle_publish_campaign` | Toggle campaign publish state and notify subscribers |
//! | `handle_reset_experience` | Return an experience to its pre-processing shape |
//! | `handle_postback_assets` | Accept processor-pushed assets outside a workflow |
//!
//! # Completion Consumer
//!
//! Final workflow results arrive on a Redis stream. The consumer decodes each
//! entry, routes it by the workflow's subject document, and acknowledges it
//! once reconciliation lands. Retryable failures are left pending for the
//! reclaim loop; poison messages are dropped after a bounded number of
//! deliveries.
//!
//! | Handler | Description |
//! |---------|-------------|
//! | `handle_experience_completion` | Merge finished renditions into the experience, settle credit, flip publish |
//! | `handle_qr_overlay_completion` | Replace the scan target with its QR-composited rendition |
//! | `handle_campaign_scan_completion` | Store the compressed campaign scan image |
//! | `handle_regenerate_completion` | Record the preview video of a regeneration |
//! | `handle_remotion_completion` | Record a finished portrait render |
//!
//! # Experience Status State Machine
//!
//! ```text
//!                     ┌─────────┐
//!                     │ CREATED │
//!                     └────┬────┘
//!                          │ first save
//!                          ▼
//!                     ┌─────────┐
//!          ┌─────────►│  DRAFT  │
//!          │          └────┬────┘
//!          │               │ asset change
//!     reset│               ▼
//!          │         ┌────────────┐
//!          ├─────────│ PROCESSING │
//!          │         └─────┬──────┘
//!          │               │ workflow completion
//!          │               ▼
//!          │   ┌───────────┬───────────┬───────────┬───────────┐
//!          │   ▼           ▼           ▼           ▼           ▼
//!     ┌─────────┐   ┌────────┐  ┌───────────┐ ┌───────────┐ ┌───────────┐
//!     │PROCESSED│   │ FAILED │  │ NO_CREDIT │ │ TIMED_OUT │ │ CANCELLED │
//!     └─────────┘   └────────┘  └───────────┘ └───────────┘ └───────────┘
//! ```
//!
//! | Status | Description |
//! |--------|-------------|
//! | `CREATED` | Experience exists but has never been saved with assets |
//! | `DRAFT` | Saved without anything left to process |
//! | `PROCESSING` | A generation workflow is in flight |
//! | `PROCESSED` | Last generation completed and renditions are merged |
//! | `FAILED` | Last generation failed, or credit was refused at publish |
//! | `NO_CREDIT` | Publish-time credit consumption was refused |
//! | `TIMED_OUT` | The processing pipeline gave up on the generation |
//! | `CANCELLED` | The generation was cancelled before finishing |
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `SPECTRA_DATABASE_URL` | Yes | - | PostgreSQL connection string |
//! | `SPECTRA_REDIS_URL` | Yes | - | Redis connection string |
//! | `SPECTRA_CREDIT_SERVICE_URL` | Yes | - | Credit ledger base URL |
//! | `SPECTRA_USER_SERVICE_URL` | Yes | - | User service base URL |
//! | `SPECTRA_DATABASE_POOL` | No | `10` | Database pool size |
//! | `SPECTRA_CREDIT_SERVICE_TOKEN` | No | empty | Credit ledger bearer token |
//! | `SPECTRA_USER_SERVICE_TOKEN` | No | empty | User service bearer token |
//! | `SPECTRA_HTTP_TIMEOUT_SECS` | No | `30` | Outbound HTTP request timeout |
//! | `SPECTRA_EFFECT_QUEUE` | No | `64` | Side-effect queue capacity |
//! | `SPECTRA_FETCH_BATCH` | No | `10` | Completion entries per fetch |
//! | `SPECTRA_FETCH_WAIT_MS` | No | `500` | Fetch block on an empty stream |
//! | `SPECTRA_MAX_DELIVERIES` | No | `3` | Deliveries before dead-letter |
//! | `SPECTRA_RECLAIM_IDLE_SECS` | No | `30` | Pending idle before reclaim |
//!
//! # Modules
//!
//! - [`assets`]: Asset kind names and stored-asset list edits
//! - [`bus`]: Workflow submission and completion buses over Redis Streams
//! - [`cache`]: Redis cache of reconciled experience documents
//! - [`completion_handlers`]: Reconciliation of finished workflow results
//! - [`config`]: Configuration from environment variables
//! - [`consumer`]: Completion stream consumer and reclaim loops
//! - [`credit`]: Credit ledger client (reserve, release, consume)
//! - [`effects`]: Bounded side-effect queue and its drain worker
//! - [`error`]: Error types and retry classification
//! - [`migrations`]: Embedded PostgreSQL migrations
//! - [`model`]: Campaign, experience and render documents
//! - [`notify`]: User-service notifications (mails, push)
//! - [`patch`]: Three-state patches applied to stored documents
//! - [`persistence`]: Persistence trait and the PostgreSQL backend
//! - [`plan`]: Plan service client for campaign expiry
//! - [`splicer`]: Segment marker splicing for stitched composites
//! - [`status`]: Experience and task status vocabularies
//! - [`tasks`]: Task derivation and workflow assembly
//! - [`update_handlers`]: Editor-facing mutation handlers
//! - [`wire`]: Workflow and result wire formats

#![deny(missing_docs)]

/// Asset kind names and stored-asset list edits.
pub mod assets;

/// Workflow submission and completion buses over Redis Streams.
pub mod bus;

/// Redis cache of reconciled experience documents.
pub mod cache;

/// Reconciliation of finished workflow results into documents.
pub mod completion_handlers;

/// Configuration loaded from environment variables.
pub mod config;

/// Completion stream consumer and reclaim loops.
pub mod consumer;

/// Credit ledger client for the reserve/release/consume escrow.
pub mod credit;

/// Bounded side-effect queue and its drain worker.
pub mod effects;

/// Error types for engine operations with retry classification.
pub mod error;

/// Embedded PostgreSQL migrations.
pub mod migrations;

/// Campaign, experience and render documents.
pub mod model;

/// User-service notifications (mails, push).
pub mod notify;

/// Three-state patches applied to stored documents.
pub mod patch;

/// Persistence trait and the PostgreSQL backend.
pub mod persistence;

/// Plan service client for campaign expiry stamps.
pub mod plan;

/// Segment marker splicing for stitched composites.
pub mod splicer;

/// Experience and task status vocabularies.
pub mod status;

/// Task derivation and workflow assembly.
pub mod tasks;

/// Editor-facing mutation handlers.
pub mod update_handlers;

/// Workflow and result wire formats.
pub mod wire;
