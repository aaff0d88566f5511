// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deferred side effects of the reconciliation path.
//!
//! Cache invalidation and user notifications never run inline with a
//! document update. Handlers enqueue them on a bounded channel and a worker
//! drains it; a full queue drops the effect with a warning and a worker
//! failure is logged and never reaches the caller.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, ExperienceCache};
use crate::credit::CreditReceipt;
use crate::model::{Campaign, User};
use crate::notify::Notifier;
use crate::persistence::Persistence;

/// One deferred side effect, carrying everything the worker needs as an
/// owned snapshot.
#[derive(Debug)]
pub enum SideEffect {
    /// Drop the cached experience lists for a campaign and the category
    /// pages that embed it.
    InvalidateCampaignCache {
        /// Viewer short code of the campaign.
        short_code: String,
    },
    /// Send the go-live mail for a published campaign.
    PublishedMail {
        /// Campaign snapshot at publish time.
        campaign: Campaign,
        /// Mail recipient; falls back to the campaign owner when `None`.
        recipient: Option<User>,
        /// Scan image shown in the mail body.
        trigger_image: String,
        /// Credit receipt the mail reports.
        receipt: CreditReceipt,
    },
    /// Send the failure mail for a campaign whose generation did not finish.
    FailedMail {
        /// Campaign snapshot at failure time.
        campaign: Campaign,
        /// Mail recipient; falls back to the campaign owner when `None`.
        recipient: Option<User>,
    },
    /// Send the go-live push notification to the campaign owner.
    PublishedPush {
        /// Campaign snapshot at publish time.
        campaign: Campaign,
        /// Push recipient.
        recipient: User,
    },
}

impl SideEffect {
    fn kind(&self) -> &'static str {
        match self {
            Self::InvalidateCampaignCache { .. } => "invalidate_campaign_cache",
            Self::PublishedMail { .. } => "published_mail",
            Self::FailedMail { .. } => "failed_mail",
            Self::PublishedPush { .. } => "published_push",
        }
    }
}

/// Handle for enqueueing side effects. Cheap to clone.
#[derive(Clone)]
pub struct SideEffects {
    tx: mpsc::Sender<SideEffect>,
}

impl SideEffects {
    /// Enqueue a side effect. A full queue drops the effect with a warning;
    /// the document update that produced it has already committed.
    pub fn enqueue(&self, effect: SideEffect) {
        if let Err(e) = self.tx.try_send(effect) {
            let effect = match &e {
                mpsc::error::TrySendError::Full(effect) => effect,
                mpsc::error::TrySendError::Closed(effect) => effect,
            };
            warn!(kind = effect.kind(), "side-effect queue rejected effect, dropping: {}", e);
        }
    }

    /// Channel for tests that want to observe enqueued effects directly.
    #[cfg(test)]
    pub(crate) fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<SideEffect>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

/// Collaborators the side-effect worker needs.
pub struct SideEffectWorker {
    persistence: Arc<dyn Persistence>,
    cache: ExperienceCache,
    notifier: Arc<dyn Notifier>,
}

impl SideEffectWorker {
    /// Create a worker over the given collaborators.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        cache: ExperienceCache,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            persistence,
            cache,
            notifier,
        }
    }

    /// Create the queue and spawn the drain loop.
    ///
    /// Returns the enqueue handle. The loop ends when every handle is
    /// dropped and the queue has drained.
    pub fn spawn(self, capacity: usize) -> SideEffects {
        let (tx, mut rx) = mpsc::channel::<SideEffect>(capacity);
        tokio::spawn(async move {
            info!(capacity, "side-effect worker started");
            while let Some(effect) = rx.recv().await {
                let kind = effect.kind();
                if let Err(e) = self.run(effect).await {
                    warn!(kind, "side effect failed: {}", e);
                }
            }
            info!("side-effect worker stopped");
        });
        SideEffects { tx }
    }

    async fn run(&self, effect: SideEffect) -> Result<(), crate::error::CoreError> {
        match effect {
            SideEffect::InvalidateCampaignCache { short_code } => {
                self.invalidate_campaign_cache(&short_code).await
            }
            SideEffect::PublishedMail {
                campaign,
                recipient,
                trigger_image,
                receipt,
            } => {
                self.notifier
                    .campaign_published_mail(&campaign, recipient.as_ref(), &trigger_image, &receipt)
                    .await
            }
            SideEffect::FailedMail {
                campaign,
                recipient,
            } => {
                self.notifier
                    .campaign_failed_mail(&campaign, recipient.as_ref())
                    .await
            }
            SideEffect::PublishedPush {
                campaign,
                recipient,
            } => {
                self.notifier
                    .campaign_published_push(&campaign, &recipient)
                    .await
            }
        }
    }

    /// Drop the campaign's cached experience list plus the list of every
    /// active category page that embeds the campaign.
    async fn invalidate_campaign_cache(
        &self,
        short_code: &str,
    ) -> Result<(), crate::error::CoreError> {
        self.cache.expire(CacheKey::Campaign(short_code)).await?;

        let categories = self
            .persistence
            .categories_by_campaign_short_code(short_code)
            .await?;
        for category in &categories {
            if let Err(e) = self
                .cache
                .expire(CacheKey::Category(&category.site_code))
                .await
            {
                warn!(
                    site_code = %category.site_code,
                    "category cache expiry failed: {}", e
                );
            }
        }

        debug!(
            short_code,
            categories = categories.len(),
            "campaign cache invalidated"
        );
        Ok(())
    }
}
