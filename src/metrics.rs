use crate::constants::{
    FACEBOOK_PROVIDER, FB_POST_CLICKS, FB_POST_IMPRESSIONS, FB_POST_IMPRESSIONS_UNIQUE,
    FB_POST_INSIGHT_FIELDS, FB_POST_REACTIONS,
};
use crate::db::DatabaseError;
use crate::facebook::GraphApi;
use crate::models::{CampaignPost, PostMetrics, PostStatus};
use crate::store::AdStore;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    OtherPlatform(String),
    NotPublished(PostStatus),
    MissingExternalPostId,
    NoAccessToken,
    PostNotFound,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OtherPlatform(platform) => write!(f, "post is on {platform}"),
            Self::NotPublished(status) => write!(f, "post is {}", status.as_str()),
            Self::MissingExternalPostId => f.write_str("post has no external post id"),
            Self::NoAccessToken => f.write_str("no access token available"),
            Self::PostNotFound => f.write_str("post not found"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Reconciled(PostMetrics),
    Skipped(SkipReason),
    Failed(String),
}

/// Raw values read from one insights response. `None` means the metric was
/// absent from the response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsightValues {
    pub impressions: Option<i64>,
    pub impressions_unique: Option<i64>,
    pub clicks: Option<i64>,
    pub reactions: Option<i64>,
}

/// Scalar value of an insight; breakdown maps are summed.
fn metric_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(breakdown) => Some(breakdown.values().filter_map(metric_value).sum()),
        _ => None,
    }
}

pub fn parse_insights(response: &Value) -> InsightValues {
    let mut values = InsightValues::default();
    let Some(data) = response["insights"]["data"].as_array() else {
        return values;
    };

    for metric in data {
        let value = metric["values"]
            .as_array()
            .and_then(|vs| vs.first())
            .and_then(|v| metric_value(&v["value"]));

        match metric["name"].as_str() {
            Some(FB_POST_IMPRESSIONS) => values.impressions = value,
            Some(FB_POST_IMPRESSIONS_UNIQUE) => values.impressions_unique = value,
            Some(FB_POST_CLICKS) => values.clicks = value,
            Some(FB_POST_REACTIONS) => values.reactions = value,
            _ => {}
        }
    }
    values
}

// Impressions only grow; clicks and reactions take the latest observed value.
pub fn merge(current: &PostMetrics, observed: &InsightValues, now: DateTime<Utc>) -> PostMetrics {
    let impressions = [observed.impressions, observed.impressions_unique]
        .into_iter()
        .flatten()
        .fold(current.impressions, i64::max);

    PostMetrics {
        impressions,
        clicks: observed.clicks.unwrap_or(current.clicks),
        reactions: observed.reactions.unwrap_or(current.reactions),
        spend: current.spend,
        updated_at: Some(now),
    }
}

/// Object id used for the insights lookup: `{page_id}_{post_id}` unless the
/// stored id already carries the page prefix.
pub fn insights_object_id(external_post_id: &str, page_id: Option<&str>) -> String {
    match page_id {
        Some(page_id) if !external_post_id.contains('_') && !page_id.is_empty() => {
            format!("{page_id}_{external_post_id}")
        }
        _ => external_post_id.to_string(),
    }
}

pub struct MetricsReconciler {
    graph: Arc<dyn GraphApi>,
    store: Arc<dyn AdStore>,
}

impl MetricsReconciler {
    pub fn new(graph: Arc<dyn GraphApi>, store: Arc<dyn AdStore>) -> Self {
        Self { graph, store }
    }

    pub async fn reconcile_post(&self, post_id: i32) -> ReconcileOutcome {
        match self.store.get_post(post_id).await {
            Ok(Some(post)) => self.reconcile(&post).await,
            Ok(None) => ReconcileOutcome::Skipped(SkipReason::PostNotFound),
            Err(e) => ReconcileOutcome::Failed(e.to_string()),
        }
    }

    pub async fn reconcile_campaign(
        &self,
        campaign_id: i32,
    ) -> Result<Vec<(i32, ReconcileOutcome)>, DatabaseError> {
        let posts = self.store.list_posts(campaign_id).await?;
        let mut outcomes = Vec::with_capacity(posts.len());
        for post in &posts {
            outcomes.push((post.id, self.reconcile(post).await));
        }
        Ok(outcomes)
    }

    /// Refreshes the stored metrics of one post. Never fails; failures leave
    /// the stored snapshot untouched and are reported as `Failed`.
    #[tracing::instrument(skip(self, post), fields(post_id = post.id))]
    pub async fn reconcile(&self, post: &CampaignPost) -> ReconcileOutcome {
        if !post.is_on(FACEBOOK_PROVIDER) {
            return ReconcileOutcome::Skipped(SkipReason::OtherPlatform(post.platform.clone()));
        }
        if post.status != PostStatus::Published {
            return ReconcileOutcome::Skipped(SkipReason::NotPublished(post.status));
        }

        let metadata = post.publish_metadata();
        let Some(external_post_id) = metadata
            .external_post_id
            .as_deref()
            .filter(|id| !id.is_empty())
        else {
            return ReconcileOutcome::Skipped(SkipReason::MissingExternalPostId);
        };

        let access_token = match metadata.page_access_token.filter(|t| !t.is_empty()) {
            Some(token) => token,
            None => match self.user_token(post).await {
                Ok(Some(token)) => token,
                Ok(None) => return ReconcileOutcome::Skipped(SkipReason::NoAccessToken),
                Err(e) => {
                    warn!(error = %e, "could not look up connected account");
                    return ReconcileOutcome::Failed(e.to_string());
                }
            },
        };

        let object_id = insights_object_id(external_post_id, metadata.page_id.as_deref());
        let response = match self
            .graph
            .fetch(&access_token, &object_id, FB_POST_INSIGHT_FIELDS)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(object_id = %object_id, error = %e, "insights request failed");
                return ReconcileOutcome::Failed(e.to_string());
            }
        };

        let metrics = merge(&post.metrics, &parse_insights(&response), Utc::now());
        if metrics.impressions == 0 && metrics.reactions == 0 {
            warn!(
                object_id = %object_id,
                "insights returned no impressions or reactions; the token may lack insights permission"
            );
        }

        if let Err(e) = self.store.update_post_metrics(post.id, &metrics).await {
            warn!(error = %e, "failed to store reconciled metrics");
            return ReconcileOutcome::Failed(e.to_string());
        }

        info!(
            impressions = metrics.impressions,
            clicks = metrics.clicks,
            reactions = metrics.reactions,
            "metrics reconciled"
        );
        ReconcileOutcome::Reconciled(metrics)
    }

    /// Fallback to the campaign owner's first connected credential. This is
    /// a user token and may not carry page insights permission.
    async fn user_token(&self, post: &CampaignPost) -> Result<Option<String>, DatabaseError> {
        let Some(campaign) = self.store.get_campaign(post.campaign_id).await? else {
            return Ok(None);
        };
        let credential = self
            .store
            .find_credential(campaign.user_id, FACEBOOK_PROVIDER)
            .await?;

        if credential.is_some() {
            debug!(user_id = campaign.user_id, "no page token stored, using user token");
        }
        Ok(credential.map(|c| c.access_token).filter(|t| !t.is_empty()))
    }
}
