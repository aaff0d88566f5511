// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory persistence double for handler unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{CoreError, Result};
use crate::model::{Campaign, Category, Experience, RemotionRender};
use crate::patch::{CampaignPatch, ExperiencePatch};

use super::Persistence;

/// Mock persistence backed by hash maps.
pub struct MockPersistence {
    experiences: Mutex<HashMap<String, Experience>>,
    campaigns: Mutex<HashMap<String, Campaign>>,
    categories: Mutex<HashMap<String, Vec<Category>>>,
    renders: Mutex<HashMap<String, RemotionRender>>,
    fail_experience_update: Mutex<bool>,
    fail_campaign_update: Mutex<bool>,
}

impl MockPersistence {
    pub fn new() -> Self {
        Self {
            experiences: Mutex::new(HashMap::new()),
            campaigns: Mutex::new(HashMap::new()),
            categories: Mutex::new(HashMap::new()),
            renders: Mutex::new(HashMap::new()),
            fail_experience_update: Mutex::new(false),
            fail_campaign_update: Mutex::new(false),
        }
    }

    pub fn with_experience(self, experience: Experience) -> Self {
        self.experiences
            .lock()
            .unwrap()
            .insert(experience.id.clone(), experience);
        self
    }

    pub fn with_campaign(self, campaign: Campaign) -> Self {
        self.campaigns
            .lock()
            .unwrap()
            .insert(campaign.id.clone(), campaign);
        self
    }

    pub fn with_categories(self, short_code: &str, categories: Vec<Category>) -> Self {
        self.categories
            .lock()
            .unwrap()
            .insert(short_code.to_string(), categories);
        self
    }

    pub fn with_render(self, render: RemotionRender) -> Self {
        self.renders
            .lock()
            .unwrap()
            .insert(render.id.clone(), render);
        self
    }

    pub fn set_fail_experience_update(&self) {
        *self.fail_experience_update.lock().unwrap() = true;
    }

    pub fn set_fail_campaign_update(&self) {
        *self.fail_campaign_update.lock().unwrap() = true;
    }

    /// Current stored state of an experience, for assertions.
    pub fn stored_experience(&self, experience_id: &str) -> Option<Experience> {
        self.experiences.lock().unwrap().get(experience_id).cloned()
    }

    /// Current stored state of a campaign, for assertions.
    pub fn stored_campaign(&self, campaign_id: &str) -> Option<Campaign> {
        self.campaigns.lock().unwrap().get(campaign_id).cloned()
    }

    /// Current stored state of a render, for assertions.
    pub fn stored_render(&self, render_id: &str) -> Option<RemotionRender> {
        self.renders.lock().unwrap().get(render_id).cloned()
    }
}

#[async_trait]
impl Persistence for MockPersistence {
    async fn experience_by_id(&self, experience_id: &str) -> Result<Experience> {
        self.experiences
            .lock()
            .unwrap()
            .get(experience_id)
            .cloned()
            .ok_or_else(|| CoreError::ExperienceNotFound {
                experience_id: experience_id.to_string(),
            })
    }

    async fn experiences_by_campaign(&self, campaign_id: &str) -> Result<Vec<Experience>> {
        let mut experiences: Vec<Experience> = self
            .experiences
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.campaign_id == campaign_id)
            .cloned()
            .collect();
        experiences.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(experiences)
    }

    async fn update_experience(
        &self,
        experience_id: &str,
        patch: &ExperiencePatch,
    ) -> Result<Experience> {
        if *self.fail_experience_update.lock().unwrap() {
            return Err(CoreError::DatabaseError {
                operation: "update_experience".to_string(),
                details: "mock update failure".to_string(),
            });
        }
        let mut experiences = self.experiences.lock().unwrap();
        let experience =
            experiences
                .get_mut(experience_id)
                .ok_or_else(|| CoreError::ExperienceNotFound {
                    experience_id: experience_id.to_string(),
                })?;
        patch.apply_to(experience);
        Ok(experience.clone())
    }

    async fn replace_experience(&self, experience: &Experience) -> Result<()> {
        let mut experiences = self.experiences.lock().unwrap();
        if !experiences.contains_key(&experience.id) {
            return Err(CoreError::ExperienceNotFound {
                experience_id: experience.id.clone(),
            });
        }
        experiences.insert(experience.id.clone(), experience.clone());
        Ok(())
    }

    async fn campaign_by_id(&self, campaign_id: &str) -> Result<Campaign> {
        self.campaigns
            .lock()
            .unwrap()
            .get(campaign_id)
            .cloned()
            .ok_or_else(|| CoreError::CampaignNotFound {
                campaign_id: campaign_id.to_string(),
            })
    }

    async fn campaign_by_short_code(&self, short_code: &str) -> Result<Campaign> {
        self.campaigns
            .lock()
            .unwrap()
            .values()
            .find(|c| c.short_code == short_code)
            .cloned()
            .ok_or_else(|| CoreError::CampaignNotFound {
                campaign_id: short_code.to_string(),
            })
    }

    async fn update_campaign(
        &self,
        campaign_id: &str,
        patch: &CampaignPatch,
    ) -> Result<Campaign> {
        if *self.fail_campaign_update.lock().unwrap() {
            return Err(CoreError::DatabaseError {
                operation: "update_campaign".to_string(),
                details: "mock update failure".to_string(),
            });
        }
        let mut campaigns = self.campaigns.lock().unwrap();
        let campaign =
            campaigns
                .get_mut(campaign_id)
                .ok_or_else(|| CoreError::CampaignNotFound {
                    campaign_id: campaign_id.to_string(),
                })?;
        patch.apply_to(campaign);
        Ok(campaign.clone())
    }

    async fn update_campaign_if_version(
        &self,
        campaign_id: &str,
        expected_version: i64,
        patch: &CampaignPatch,
    ) -> Result<Option<Campaign>> {
        if *self.fail_campaign_update.lock().unwrap() {
            return Err(CoreError::DatabaseError {
                operation: "update_campaign_if_version".to_string(),
                details: "mock update failure".to_string(),
            });
        }
        let mut campaigns = self.campaigns.lock().unwrap();
        let campaign =
            campaigns
                .get_mut(campaign_id)
                .ok_or_else(|| CoreError::CampaignNotFound {
                    campaign_id: campaign_id.to_string(),
                })?;
        if campaign.version != expected_version {
            return Ok(None);
        }
        patch.apply_to(campaign);
        Ok(Some(campaign.clone()))
    }

    async fn categories_by_campaign_short_code(&self, short_code: &str) -> Result<Vec<Category>> {
        Ok(self
            .categories
            .lock()
            .unwrap()
            .get(short_code)
            .cloned()
            .unwrap_or_default())
    }

    async fn remotion_render_by_id(&self, render_id: &str) -> Result<RemotionRender> {
        self.renders
            .lock()
            .unwrap()
            .get(render_id)
            .cloned()
            .ok_or_else(|| CoreError::RenderNotFound {
                render_id: render_id.to_string(),
            })
    }

    async fn update_remotion_render(
        &self,
        render_id: &str,
        status: &str,
        video_url: Option<&str>,
        mask_url: Option<&str>,
    ) -> Result<RemotionRender> {
        let mut renders = self.renders.lock().unwrap();
        let render = renders
            .get_mut(render_id)
            .ok_or_else(|| CoreError::RenderNotFound {
                render_id: render_id.to_string(),
            })?;
        render.status = status.to_string();
        if let Some(url) = video_url {
            render.video_url = url.to_string();
        }
        if let Some(url) = mask_url {
            render.mask_url = url.to_string();
        }
        render.updated_at = Utc::now();
        Ok(render.clone())
    }

    async fn health_check_db(&self) -> Result<bool> {
        Ok(true)
    }
}
