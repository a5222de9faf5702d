#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use marketing_ads::db::DatabaseError;
use marketing_ads::facebook::{FacebookApiError, GraphErrorKind};
use marketing_ads::models::{
    AdCampaign, AdCampaignMetadata, AdCampaignStatus, Campaign, CampaignPost, ConnectedAccount,
    PostMetrics, PostStatus, ProvisioningLedger, ProvisioningStep,
};
use marketing_ads::store::{AdStore, ExternalIds};
use marketing_ads::GraphApi;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
struct State {
    next_id: i32,
    campaigns: BTreeMap<i32, Campaign>,
    ad_campaigns: BTreeMap<i32, AdCampaign>,
    posts: BTreeMap<i32, CampaignPost>,
    credentials: Vec<ConnectedAccount>,
    ledgers: HashMap<i32, ProvisioningLedger>,
    metric_writes: usize,
    fail_metric_writes: bool,
}

impl State {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory `AdStore` with the same conditional-update rules as the
/// Postgres implementation.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_campaign(&self, user_id: i32, name: &str) -> Campaign {
        let mut state = self.state.lock().unwrap();
        let campaign = Campaign {
            id: state.next_id(),
            user_id,
            name: name.to_string(),
        };
        state.campaigns.insert(campaign.id, campaign.clone());
        campaign
    }

    pub fn add_ad_campaign(&self, campaign_id: i32, budget: Option<f64>) -> AdCampaign {
        let mut state = self.state.lock().unwrap();
        let ad_campaign = AdCampaign {
            id: state.next_id(),
            campaign_id,
            status: AdCampaignStatus::Draft,
            budget,
            external_campaign_id: None,
            external_adset_id: None,
            external_ad_id: None,
            metadata: AdCampaignMetadata::default(),
            provisioning_started_at: None,
        };
        state.ad_campaigns.insert(ad_campaign.id, ad_campaign.clone());
        ad_campaign
    }

    pub fn add_post(&self, campaign_id: i32, content: &str, minutes_ago: i64) -> CampaignPost {
        let mut state = self.state.lock().unwrap();
        let post = CampaignPost {
            id: state.next_id(),
            campaign_id,
            platform: "facebook".to_string(),
            content: content.to_string(),
            image_url: None,
            status: PostStatus::Draft,
            metadata: Value::Object(Default::default()),
            metrics: PostMetrics::default(),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        };
        state.posts.insert(post.id, post.clone());
        post
    }

    pub fn add_published_post(&self, campaign_id: i32, metadata: Value) -> CampaignPost {
        let mut post = self.add_post(campaign_id, "published", 60);
        post.status = PostStatus::Published;
        post.metadata = metadata;
        self.put_post(post.clone());
        post
    }

    pub fn add_credential(&self, user_id: i32, access_token: &str) -> ConnectedAccount {
        let mut state = self.state.lock().unwrap();
        let account = ConnectedAccount {
            id: state.next_id(),
            user_id,
            provider: "facebook".to_string(),
            access_token: access_token.to_string(),
            expires_at: None,
        };
        state.credentials.push(account.clone());
        account
    }

    pub fn add_expiring_credential(
        &self,
        user_id: i32,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> ConnectedAccount {
        let mut account = self.add_credential(user_id, access_token);
        account.expires_at = Some(expires_at);
        let mut state = self.state.lock().unwrap();
        if let Some(stored) = state.credentials.iter_mut().find(|c| c.id == account.id) {
            *stored = account.clone();
        }
        account
    }

    pub fn put_ad_campaign(&self, ad_campaign: AdCampaign) {
        let mut state = self.state.lock().unwrap();
        state.ad_campaigns.insert(ad_campaign.id, ad_campaign);
    }

    pub fn put_post(&self, post: CampaignPost) {
        let mut state = self.state.lock().unwrap();
        state.posts.insert(post.id, post);
    }

    pub fn ad_campaign(&self, id: i32) -> AdCampaign {
        self.state.lock().unwrap().ad_campaigns[&id].clone()
    }

    pub fn post(&self, id: i32) -> CampaignPost {
        self.state.lock().unwrap().posts[&id].clone()
    }

    pub fn ledger(&self, ad_campaign_id: i32) -> ProvisioningLedger {
        self.state
            .lock()
            .unwrap()
            .ledgers
            .get(&ad_campaign_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn metric_writes(&self) -> usize {
        self.state.lock().unwrap().metric_writes
    }

    pub fn fail_metric_writes(&self) {
        self.state.lock().unwrap().fail_metric_writes = true;
    }
}

#[async_trait]
impl AdStore for MemoryStore {
    async fn get_campaign(&self, campaign_id: i32) -> Result<Option<Campaign>, DatabaseError> {
        Ok(self.state.lock().unwrap().campaigns.get(&campaign_id).cloned())
    }

    async fn get_ad_campaign(
        &self,
        ad_campaign_id: i32,
    ) -> Result<Option<AdCampaign>, DatabaseError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .ad_campaigns
            .get(&ad_campaign_id)
            .cloned())
    }

    async fn upsert_draft_ad_campaign(
        &self,
        campaign_id: i32,
        budget: f64,
        metadata: &AdCampaignMetadata,
    ) -> Result<Option<AdCampaign>, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        let existing = state
            .ad_campaigns
            .values_mut()
            .find(|a| a.campaign_id == campaign_id);

        match existing {
            Some(ad_campaign) if ad_campaign.status == AdCampaignStatus::Draft => {
                let changed =
                    ad_campaign.budget != Some(budget) || ad_campaign.metadata != *metadata;
                ad_campaign.budget = Some(budget);
                ad_campaign.metadata = metadata.clone();
                let updated = ad_campaign.clone();
                if changed {
                    if let Some(ledger) = state.ledgers.get_mut(&updated.id) {
                        ledger.reset_from(ProvisioningStep::AdSet);
                    }
                }
                Ok(Some(updated))
            }
            Some(_) => Ok(None),
            None => {
                let ad_campaign = AdCampaign {
                    id: state.next_id(),
                    campaign_id,
                    status: AdCampaignStatus::Draft,
                    budget: Some(budget),
                    external_campaign_id: None,
                    external_adset_id: None,
                    external_ad_id: None,
                    metadata: metadata.clone(),
                    provisioning_started_at: None,
                };
                state.ad_campaigns.insert(ad_campaign.id, ad_campaign.clone());
                Ok(Some(ad_campaign))
            }
        }
    }

    async fn list_posts(&self, campaign_id: i32) -> Result<Vec<CampaignPost>, DatabaseError> {
        let mut posts: Vec<CampaignPost> = self
            .state
            .lock()
            .unwrap()
            .posts
            .values()
            .filter(|p| p.campaign_id == campaign_id)
            .cloned()
            .collect();
        posts.sort_by_key(|p| (p.created_at, p.id));
        Ok(posts)
    }

    async fn get_post(&self, post_id: i32) -> Result<Option<CampaignPost>, DatabaseError> {
        Ok(self.state.lock().unwrap().posts.get(&post_id).cloned())
    }

    async fn find_credential(
        &self,
        user_id: i32,
        provider: &str,
    ) -> Result<Option<ConnectedAccount>, DatabaseError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .credentials
            .iter()
            .find(|c| c.user_id == user_id && c.provider == provider)
            .cloned())
    }

    async fn try_acquire_provisioning(
        &self,
        ad_campaign_id: i32,
        lease: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        let Some(ad_campaign) = state.ad_campaigns.get_mut(&ad_campaign_id) else {
            return Ok(false);
        };

        let available = match ad_campaign.status {
            AdCampaignStatus::Draft => true,
            AdCampaignStatus::Provisioning => ad_campaign
                .provisioning_started_at
                .map_or(true, |started| started < stale_before),
            _ => false,
        };
        if available {
            ad_campaign.status = AdCampaignStatus::Provisioning;
            ad_campaign.provisioning_started_at = Some(lease);
        }
        Ok(available)
    }

    async fn release_provisioning(
        &self,
        ad_campaign_id: i32,
        lease: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        if let Some(ad_campaign) = state.ad_campaigns.get_mut(&ad_campaign_id) {
            if ad_campaign.status == AdCampaignStatus::Provisioning
                && ad_campaign.provisioning_started_at == Some(lease)
            {
                ad_campaign.status = AdCampaignStatus::Draft;
                ad_campaign.provisioning_started_at = None;
            }
        }
        Ok(())
    }

    async fn load_ledger(&self, ad_campaign_id: i32) -> Result<ProvisioningLedger, DatabaseError> {
        Ok(self.ledger(ad_campaign_id))
    }

    async fn record_step(
        &self,
        ad_campaign_id: i32,
        step: ProvisioningStep,
        external_id: &str,
    ) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        state
            .ledgers
            .entry(ad_campaign_id)
            .or_default()
            .set(step, external_id.to_string());
        Ok(())
    }

    async fn complete_provisioning(
        &self,
        ad_campaign_id: i32,
        lease: DateTime<Utc>,
        ids: &ExternalIds,
    ) -> Result<bool, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        let Some(ad_campaign) = state.ad_campaigns.get_mut(&ad_campaign_id) else {
            return Ok(false);
        };
        if ad_campaign.status != AdCampaignStatus::Provisioning
            || ad_campaign.provisioning_started_at != Some(lease)
        {
            return Ok(false);
        }

        ad_campaign.external_campaign_id = Some(ids.campaign_id.clone());
        ad_campaign.external_adset_id = Some(ids.adset_id.clone());
        ad_campaign.external_ad_id = Some(ids.ad_id.clone());
        ad_campaign.status = AdCampaignStatus::Active;
        ad_campaign.provisioning_started_at = None;
        state.ledgers.remove(&ad_campaign_id);
        Ok(true)
    }

    async fn update_post_metrics(
        &self,
        post_id: i32,
        metrics: &PostMetrics,
    ) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_metric_writes {
            return Err(DatabaseError::InvalidData("metrics write rejected".to_string()));
        }
        if let Some(post) = state.posts.get_mut(&post_id) {
            post.metrics = metrics.clone();
        }
        state.metric_writes += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphCall {
    pub access_token: String,
    pub node_id: String,
    pub edge: Option<String>,
    pub payload: Value,
}

/// `GraphApi` fake. Creates succeed with `{edge}-{n}` ids unless a failure
/// is scripted for the edge; fetches pop scripted responses in order.
#[derive(Default)]
pub struct ScriptedGraph {
    calls: Mutex<Vec<GraphCall>>,
    failures: Mutex<HashMap<String, (String, Option<i64>)>>,
    fetches: Mutex<VecDeque<Result<Value, String>>>,
}

impl ScriptedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_edge(&self, edge: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(edge.to_string(), (message.to_string(), Some(100)));
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn push_fetch(&self, response: Value) {
        self.fetches.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_fetch_error(&self, message: &str) {
        self.fetches
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> Vec<GraphCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn edges(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| c.edge)
            .collect()
    }

    pub fn call_for(&self, edge: &str) -> Option<GraphCall> {
        self.calls()
            .into_iter()
            .find(|c| c.edge.as_deref() == Some(edge))
    }
}

#[async_trait]
impl GraphApi for ScriptedGraph {
    async fn create(
        &self,
        access_token: &str,
        node_id: &str,
        edge: &str,
        payload: &Value,
    ) -> Result<Value, FacebookApiError> {
        tokio::task::yield_now().await;
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(GraphCall {
                access_token: access_token.to_string(),
                node_id: node_id.to_string(),
                edge: Some(edge.to_string()),
                payload: payload.clone(),
            });
            calls.len()
        };

        if let Some((message, code)) = self.failures.lock().unwrap().get(edge).cloned() {
            return Err(FacebookApiError::Graph {
                message,
                code,
                subcode: None,
                user_title: None,
                user_message: None,
                kind: GraphErrorKind::from_code(code),
            });
        }
        Ok(json!({ "id": format!("{edge}-{n}") }))
    }

    async fn fetch(
        &self,
        access_token: &str,
        node_id: &str,
        fields: &str,
    ) -> Result<Value, FacebookApiError> {
        self.calls.lock().unwrap().push(GraphCall {
            access_token: access_token.to_string(),
            node_id: node_id.to_string(),
            edge: None,
            payload: json!({ "fields": fields }),
        });

        match self.fetches.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(FacebookApiError::RequestFailed(message)),
            None => Err(FacebookApiError::RequestFailed(
                "no scripted response".to_string(),
            )),
        }
    }
}
