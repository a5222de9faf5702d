use crate::db::DatabaseError;
use crate::models::{
    AdCampaign, AdCampaignMetadata, Campaign, CampaignPost, ConnectedAccount, PostMetrics,
    ProvisioningLedger, ProvisioningStep,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Identifiers written to an ad campaign when provisioning completes.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalIds {
    pub campaign_id: String,
    pub adset_id: String,
    pub ad_id: String,
}

#[async_trait]
pub trait AdStore: Send + Sync {
    async fn get_campaign(&self, campaign_id: i32) -> Result<Option<Campaign>, DatabaseError>;

    async fn get_ad_campaign(&self, ad_campaign_id: i32)
        -> Result<Option<AdCampaign>, DatabaseError>;

    /// Creates the draft ad campaign for `campaign_id`, or updates the budget
    /// and metadata of the existing one while it is still a draft.
    /// Returns `None` when an ad campaign exists but is no longer a draft.
    async fn upsert_draft_ad_campaign(
        &self,
        campaign_id: i32,
        budget: f64,
        metadata: &AdCampaignMetadata,
    ) -> Result<Option<AdCampaign>, DatabaseError>;

    /// Posts of a campaign, oldest first.
    async fn list_posts(&self, campaign_id: i32) -> Result<Vec<CampaignPost>, DatabaseError>;

    async fn get_post(&self, post_id: i32) -> Result<Option<CampaignPost>, DatabaseError>;

    /// First credential the user connected for `provider`.
    async fn find_credential(
        &self,
        user_id: i32,
        provider: &str,
    ) -> Result<Option<ConnectedAccount>, DatabaseError>;

    /// Moves `draft -> provisioning` stamping `lease`, or takes over a
    /// `provisioning` lease stamped before `stale_before`. Returns whether the
    /// lease was acquired.
    async fn try_acquire_provisioning(
        &self,
        ad_campaign_id: i32,
        lease: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Moves `provisioning -> draft` if `lease` is still the current one.
    async fn release_provisioning(
        &self,
        ad_campaign_id: i32,
        lease: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    async fn load_ledger(&self, ad_campaign_id: i32) -> Result<ProvisioningLedger, DatabaseError>;

    async fn record_step(
        &self,
        ad_campaign_id: i32,
        step: ProvisioningStep,
        external_id: &str,
    ) -> Result<(), DatabaseError>;

    /// Writes the external ids and `active` status in one statement and
    /// clears the step ledger. Returns false if `lease` is no longer held.
    async fn complete_provisioning(
        &self,
        ad_campaign_id: i32,
        lease: DateTime<Utc>,
        ids: &ExternalIds,
    ) -> Result<bool, DatabaseError>;

    async fn update_post_metrics(
        &self,
        post_id: i32,
        metrics: &PostMetrics,
    ) -> Result<(), DatabaseError>;
}
