use crate::classify::{classify, ProvisionError};
use crate::config::Config;
use crate::constants::{
    FACEBOOK_PROVIDER, FB_BID_STRATEGY, FB_BILLING_EVENT, FB_BUYING_TYPE, FB_CAMPAIGN_OBJECTIVE,
    FB_OPTIMIZATION_GOAL, FB_STATUS_PAUSED, PROVISIONING_LEASE_SECS,
};
use crate::creative::{creative_payload, resolve_image_url, CreativeSelector, EarliestPost};
use crate::facebook::{created_id, GraphApi};
use crate::models::{
    AdCampaign, AdCampaignMetadata, AdCampaignStatus, Campaign, CampaignPost, ProvisionResult,
    ProvisioningLedger, ProvisioningStep, Segmentation,
};
use crate::store::{AdStore, ExternalIds};
use crate::targeting::{SegmentLocations, TargetingSpec, TargetingTranslator};
use chrono::{DateTime, SubsecRound, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;

/// Caller-supplied destination for a publish.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    /// Ad account id, with or without the `act_` prefix.
    pub ad_account_id: String,
    pub page_id: String,
}

impl PublishRequest {
    fn ad_account_node(&self) -> Result<String, ProvisionError> {
        let raw = self.ad_account_id.trim();
        let digits = raw.strip_prefix("act_").unwrap_or(raw);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ProvisionError::Validation(format!(
                "invalid ad account id: {:?}",
                self.ad_account_id
            )));
        }
        Ok(format!("act_{digits}"))
    }

    fn page_id(&self) -> Result<&str, ProvisionError> {
        let page_id = self.page_id.trim();
        if page_id.is_empty() {
            return Err(ProvisionError::Validation("page id is required".to_string()));
        }
        Ok(page_id)
    }
}

/// Converts a major-unit budget to the platform's minor unit, truncating
/// toward zero: `12.345 -> 1234`.
///
/// Works on the shortest decimal form of the float, so values such as `0.29`
/// are not pulled down by binary representation error.
pub fn budget_to_minor_units(budget: f64) -> Option<i64> {
    if !budget.is_finite() || budget < 0.0 {
        return None;
    }

    let text = budget.to_string();
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let whole: i64 = whole.parse().ok()?;
    let cents: i64 = fraction
        .chars()
        .chain(std::iter::repeat('0'))
        .take(2)
        .collect::<String>()
        .parse()
        .ok()?;

    whole.checked_mul(100)?.checked_add(cents)
}

fn campaign_name(campaign: &Campaign) -> String {
    let name = campaign.name.trim();
    if name.is_empty() {
        format!("Campaign {}", campaign.id)
    } else {
        name.to_string()
    }
}

fn campaign_payload(name: &str) -> Value {
    json!({
        "name": name,
        "objective": FB_CAMPAIGN_OBJECTIVE,
        "buying_type": FB_BUYING_TYPE,
        "special_ad_categories": [],
        "is_adset_budget_sharing_enabled": false,
        "status": FB_STATUS_PAUSED,
    })
}

fn adset_payload(
    name: &str,
    campaign_id: &str,
    daily_budget: i64,
    targeting: &TargetingSpec,
    start_time: DateTime<Utc>,
) -> Value {
    json!({
        "name": format!("{name} - Ad Set"),
        "campaign_id": campaign_id,
        "daily_budget": daily_budget,
        "billing_event": FB_BILLING_EVENT,
        "optimization_goal": FB_OPTIMIZATION_GOAL,
        "bid_strategy": FB_BID_STRATEGY,
        "targeting": targeting,
        "status": FB_STATUS_PAUSED,
        "start_time": start_time.to_rfc3339(),
    })
}

fn ad_payload(name: &str, adset_id: &str, creative_id: &str) -> Value {
    json!({
        "name": format!("{name} - Ad"),
        "adset_id": adset_id,
        "creative": { "creative_id": creative_id },
        "status": FB_STATUS_PAUSED,
    })
}

pub struct AdProvisioner {
    graph: Arc<dyn GraphApi>,
    store: Arc<dyn AdStore>,
    translator: TargetingTranslator,
    selector: Box<dyn CreativeSelector>,
    media_base_url: Option<Url>,
    lease: chrono::Duration,
}

impl AdProvisioner {
    pub fn new(graph: Arc<dyn GraphApi>, store: Arc<dyn AdStore>) -> Self {
        Self {
            graph,
            store,
            translator: TargetingTranslator::new(),
            selector: Box::new(EarliestPost),
            media_base_url: None,
            lease: chrono::Duration::seconds(PROVISIONING_LEASE_SECS),
        }
    }

    pub fn from_config(graph: Arc<dyn GraphApi>, store: Arc<dyn AdStore>, config: &Config) -> Self {
        let mut translator = TargetingTranslator::new();
        if config.use_segment_locations {
            translator = translator.with_extension(SegmentLocations);
        }

        Self::new(graph, store)
            .with_translator(translator)
            .with_media_base_url(config.media_base_url.clone())
            .with_lease(config.provisioning_lease)
    }

    pub fn with_translator(mut self, translator: TargetingTranslator) -> Self {
        self.translator = translator;
        self
    }

    pub fn with_selector(mut self, selector: impl CreativeSelector + 'static) -> Self {
        self.selector = Box::new(selector);
        self
    }

    pub fn with_media_base_url(mut self, media_base_url: Option<Url>) -> Self {
        self.media_base_url = media_base_url;
        self
    }

    pub fn with_lease(mut self, lease: chrono::Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Creates or updates the draft ad campaign of `campaign_id`.
    #[tracing::instrument(skip(self, segmentation, brief))]
    pub async fn configure(
        &self,
        campaign_id: i32,
        budget: f64,
        segmentation: Segmentation,
        brief: Option<String>,
    ) -> Result<AdCampaign, ProvisionError> {
        if budget_to_minor_units(budget).is_none() {
            return Err(ProvisionError::Validation(format!(
                "budget must be a non-negative amount, got {budget}"
            )));
        }

        if self.store.get_campaign(campaign_id).await?.is_none() {
            return Err(ProvisionError::NotFound(format!("campaign {campaign_id}")));
        }

        let metadata = AdCampaignMetadata {
            segmentation,
            brief,
        };
        self.store
            .upsert_draft_ad_campaign(campaign_id, budget, &metadata)
            .await?
            .ok_or_else(|| {
                ProvisionError::Validation(format!(
                    "ad campaign for campaign {campaign_id} is no longer a draft"
                ))
            })
    }

    /// Loads everything a publish needs and provisions the ad campaign.
    #[tracing::instrument(skip(self, request), fields(ad_account = %request.ad_account_id, page_id = %request.page_id))]
    pub async fn publish(
        &self,
        ad_campaign_id: i32,
        request: &PublishRequest,
    ) -> Result<ProvisionResult, ProvisionError> {
        let ad_campaign = self
            .store
            .get_ad_campaign(ad_campaign_id)
            .await?
            .ok_or_else(|| ProvisionError::NotFound(format!("ad campaign {ad_campaign_id}")))?;

        let campaign = self
            .store
            .get_campaign(ad_campaign.campaign_id)
            .await?
            .ok_or_else(|| {
                ProvisionError::NotFound(format!("campaign {}", ad_campaign.campaign_id))
            })?;

        let posts = self.store.list_posts(campaign.id).await?;
        let source = self.selector.select(&posts).ok_or_else(|| {
            ProvisionError::Validation(format!("campaign {} has no posts", campaign.id))
        })?;

        let credential = self
            .store
            .find_credential(campaign.user_id, FACEBOOK_PROVIDER)
            .await?
            .ok_or_else(|| {
                ProvisionError::NotFound(format!(
                    "connected {FACEBOOK_PROVIDER} account for user {}",
                    campaign.user_id
                ))
            })?;
        if credential.is_expired(Utc::now()) {
            return Err(ProvisionError::NotFound(format!(
                "connected {FACEBOOK_PROVIDER} account for user {} has expired",
                campaign.user_id
            )));
        }

        self.provision(
            &ad_campaign,
            &campaign,
            source,
            &credential.access_token,
            request,
        )
        .await
    }

    /// Runs the provisioning chain for `ad_campaign` using `source` as the
    /// creative. Validation happens before any external call.
    pub async fn provision(
        &self,
        ad_campaign: &AdCampaign,
        campaign: &Campaign,
        source: &CampaignPost,
        access_token: &str,
        request: &PublishRequest,
    ) -> Result<ProvisionResult, ProvisionError> {
        match ad_campaign.status {
            AdCampaignStatus::Draft | AdCampaignStatus::Provisioning => {}
            other => {
                return Err(ProvisionError::Validation(format!(
                    "ad campaign {} is {other}, only drafts can be published",
                    ad_campaign.id
                )))
            }
        }

        let budget = ad_campaign.budget.ok_or_else(|| {
            ProvisionError::Validation(format!("ad campaign {} has no budget", ad_campaign.id))
        })?;
        let daily_budget = budget_to_minor_units(budget).ok_or_else(|| {
            ProvisionError::Validation(format!("invalid budget {budget}"))
        })?;
        let account_node = request.ad_account_node()?;
        let page_id = request.page_id()?;

        // Postgres keeps microseconds; the lease must compare equal after a round trip.
        let lease = Utc::now().trunc_subsecs(6);
        let acquired = self
            .store
            .try_acquire_provisioning(ad_campaign.id, lease, lease - self.lease)
            .await?;
        if !acquired {
            return Err(ProvisionError::InProgress(ad_campaign.id));
        }

        let mut ledger = match self.store.load_ledger(ad_campaign.id).await {
            Ok(ledger) => ledger,
            Err(e) => {
                self.release(ad_campaign.id, lease).await;
                return Err(e.into());
            }
        };

        let chain = Chain {
            ad_campaign,
            campaign,
            source,
            access_token,
            account_node: &account_node,
            page_id,
            daily_budget,
            lease,
        };

        match self.run_chain(&chain, &mut ledger).await {
            Ok(result) => Ok(result),
            Err(err) => {
                if !ledger.is_empty() {
                    warn!(
                        ad_campaign_id = ad_campaign.id,
                        external_campaign_id = ?ledger.campaign_id,
                        external_adset_id = ?ledger.adset_id,
                        external_creative_id = ?ledger.creative_id,
                        external_ad_id = ?ledger.ad_id,
                        error = %err,
                        "provisioning failed; created objects stay live and are reused on retry"
                    );
                }
                self.release(ad_campaign.id, lease).await;
                Err(err)
            }
        }
    }

    async fn run_chain(
        &self,
        chain: &Chain<'_>,
        ledger: &mut ProvisioningLedger,
    ) -> Result<ProvisionResult, ProvisionError> {
        let ad_campaign_id = chain.ad_campaign.id;
        let name = campaign_name(chain.campaign);

        let external_campaign_id = self
            .run_step(chain, ledger, ProvisioningStep::Campaign, "campaigns", || {
                campaign_payload(&name)
            })
            .await?;

        let targeting = self
            .translator
            .translate(&chain.ad_campaign.metadata.segmentation);
        let external_adset_id = self
            .run_step(chain, ledger, ProvisioningStep::AdSet, "adsets", || {
                adset_payload(
                    &name,
                    &external_campaign_id,
                    chain.daily_budget,
                    &targeting,
                    Utc::now(),
                )
            })
            .await?;

        let image_url =
            resolve_image_url(chain.source.image_url.as_deref(), self.media_base_url.as_ref());
        let external_creative_id = self
            .run_step(chain, ledger, ProvisioningStep::Creative, "adcreatives", || {
                creative_payload(
                    &format!("{name} - Creative"),
                    chain.page_id,
                    chain.source,
                    image_url.as_deref(),
                )
            })
            .await?;

        let external_ad_id = self
            .run_step(chain, ledger, ProvisioningStep::Ad, "ads", || {
                ad_payload(&name, &external_adset_id, &external_creative_id)
            })
            .await?;

        let ids = ExternalIds {
            campaign_id: external_campaign_id,
            adset_id: external_adset_id,
            ad_id: external_ad_id,
        };
        if !self
            .store
            .complete_provisioning(ad_campaign_id, chain.lease, &ids)
            .await?
        {
            return Err(ProvisionError::InProgress(ad_campaign_id));
        }

        info!(
            ad_campaign_id,
            external_campaign_id = %ids.campaign_id,
            external_ad_id = %ids.ad_id,
            "ad campaign is active"
        );

        Ok(ProvisionResult {
            ad_campaign_id,
            external_campaign_id: ids.campaign_id,
            external_adset_id: ids.adset_id,
            external_creative_id,
            external_ad_id: ids.ad_id,
            status: AdCampaignStatus::Active,
        })
    }

    async fn run_step<F>(
        &self,
        chain: &Chain<'_>,
        ledger: &mut ProvisioningLedger,
        step: ProvisioningStep,
        edge: &str,
        payload: F,
    ) -> Result<String, ProvisionError>
    where
        F: FnOnce() -> Value,
    {
        let ad_campaign_id = chain.ad_campaign.id;
        if let Some(existing) = ledger.get(step) {
            info!(ad_campaign_id, step = step.as_str(), external_id = existing, "step already done");
            return Ok(existing.to_string());
        }

        let response = self
            .graph
            .create(chain.access_token, chain.account_node, edge, &payload())
            .await
            .map_err(|e| classify(&e))?;
        let external_id = created_id(&response).map_err(|e| classify(&e))?;

        ledger.set(step, external_id.clone());
        self.store
            .record_step(ad_campaign_id, step, &external_id)
            .await?;
        info!(ad_campaign_id, step = step.as_str(), external_id = %external_id, "created");

        Ok(external_id)
    }

    async fn release(&self, ad_campaign_id: i32, lease: DateTime<Utc>) {
        if let Err(e) = self.store.release_provisioning(ad_campaign_id, lease).await {
            error!(ad_campaign_id, error = %e, "failed to release provisioning lease");
        }
    }
}

struct Chain<'a> {
    ad_campaign: &'a AdCampaign,
    campaign: &'a Campaign,
    source: &'a CampaignPost,
    access_token: &'a str,
    account_node: &'a str,
    page_id: &'a str,
    daily_budget: i64,
    lease: DateTime<Utc>,
}
