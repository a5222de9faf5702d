use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdCampaignStatus {
    Draft,
    Provisioning,
    Active,
    Paused,
    Completed,
    Archived,
}

impl AdCampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Provisioning => "provisioning",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for AdCampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdCampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "provisioning" => Ok(Self::Provisioning),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "archived" => Ok(Self::Archived),
            other => Err(format!("unknown ad campaign status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Published => "published",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "scheduled" => Ok(Self::Scheduled),
            "published" => Ok(Self::Published),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown post status: {other}")),
        }
    }
}

fn lenient_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_age(value: &Value) -> Option<u32> {
    lenient_i64(value).and_then(|age| u32::try_from(age).ok())
}

/// A single string reads as a one-element list.
fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(lenient_string).collect(),
        other => lenient_string(other).into_iter().collect(),
    }
}

/// Audience description produced upstream, before translation into a
/// platform targeting spec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct Segmentation {
    pub age_range: Vec<u32>,
    pub locations: Vec<String>,
    pub interests: Vec<String>,
    pub behaviors: Vec<String>,
}

// Ages are positional (min, max), so reading stops at the first unusable entry.
impl From<Value> for Segmentation {
    fn from(value: Value) -> Self {
        Self {
            age_range: value["age_range"]
                .as_array()
                .map(|ages| ages.iter().map_while(lenient_age).collect())
                .unwrap_or_default(),
            locations: string_list(&value["locations"]),
            interests: string_list(&value["interests"]),
            behaviors: string_list(&value["behaviors"]),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct AdCampaignMetadata {
    pub segmentation: Segmentation,
    pub brief: Option<String>,
}

impl From<Value> for AdCampaignMetadata {
    fn from(value: Value) -> Self {
        Self {
            segmentation: Segmentation::from(value["segmentation"].clone()),
            brief: lenient_string(&value["brief"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdCampaign {
    pub id: i32,
    pub campaign_id: i32,
    pub status: AdCampaignStatus,
    /// Daily budget in major currency units.
    pub budget: Option<f64>,
    pub external_campaign_id: Option<String>,
    pub external_adset_id: Option<String>,
    pub external_ad_id: Option<String>,
    pub metadata: AdCampaignMetadata,
    pub provisioning_started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Campaign {
    pub id: i32,
    pub user_id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CampaignPost {
    pub id: i32,
    pub campaign_id: i32,
    pub platform: String,
    pub content: String,
    pub image_url: Option<String>,
    pub status: PostStatus,
    pub metadata: serde_json::Value,
    pub metrics: PostMetrics,
    pub created_at: DateTime<Utc>,
}

impl CampaignPost {
    pub fn is_on(&self, platform: &str) -> bool {
        self.platform.eq_ignore_ascii_case(platform)
    }

    pub fn publish_metadata(&self) -> PostMetadata {
        PostMetadata::from(self.metadata.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct PostMetadata {
    pub external_post_id: Option<String>,
    pub page_id: Option<String>,
    pub page_access_token: Option<String>,
}

impl From<Value> for PostMetadata {
    fn from(value: Value) -> Self {
        Self {
            external_post_id: ["external_post_id", "facebook_post_id", "post_id"]
                .iter()
                .find_map(|key| lenient_string(&value[*key])),
            page_id: lenient_string(&value["page_id"]),
            page_access_token: lenient_string(&value["page_access_token"]),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct PostMetrics {
    pub impressions: i64,
    pub clicks: i64,
    pub reactions: i64,
    pub spend: f64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<Value> for PostMetrics {
    fn from(value: Value) -> Self {
        let spend = match &value["spend"] {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };

        Self {
            impressions: lenient_i64(&value["impressions"]).unwrap_or(0),
            clicks: lenient_i64(&value["clicks"]).unwrap_or(0),
            reactions: lenient_i64(&value["reactions"]).unwrap_or(0),
            spend: spend.filter(|s| s.is_finite()).unwrap_or(0.0),
            updated_at: value["updated_at"]
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|at| at.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectedAccount {
    pub id: i32,
    pub user_id: i32,
    pub provider: String,
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ConnectedAccount {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |expiry| expiry <= now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisioningStep {
    Campaign,
    AdSet,
    Creative,
    Ad,
}

impl ProvisioningStep {
    pub const ORDER: [Self; 4] = [Self::Campaign, Self::AdSet, Self::Creative, Self::Ad];

    /// This step and every step that runs after it.
    pub fn and_later(self) -> &'static [Self] {
        let position = Self::ORDER
            .iter()
            .position(|step| *step == self)
            .unwrap_or(0);
        &Self::ORDER[position..]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Campaign => "campaign",
            Self::AdSet => "adset",
            Self::Creative => "creative",
            Self::Ad => "ad",
        }
    }
}

impl FromStr for ProvisioningStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "campaign" => Ok(Self::Campaign),
            "adset" => Ok(Self::AdSet),
            "creative" => Ok(Self::Creative),
            "ad" => Ok(Self::Ad),
            other => Err(format!("unknown provisioning step: {other}")),
        }
    }
}

/// External ids returned so far by an unfinished provisioning run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProvisioningLedger {
    pub campaign_id: Option<String>,
    pub adset_id: Option<String>,
    pub creative_id: Option<String>,
    pub ad_id: Option<String>,
}

impl ProvisioningLedger {
    pub fn get(&self, step: ProvisioningStep) -> Option<&str> {
        match step {
            ProvisioningStep::Campaign => self.campaign_id.as_deref(),
            ProvisioningStep::AdSet => self.adset_id.as_deref(),
            ProvisioningStep::Creative => self.creative_id.as_deref(),
            ProvisioningStep::Ad => self.ad_id.as_deref(),
        }
    }

    pub fn set(&mut self, step: ProvisioningStep, external_id: String) {
        let slot = match step {
            ProvisioningStep::Campaign => &mut self.campaign_id,
            ProvisioningStep::AdSet => &mut self.adset_id,
            ProvisioningStep::Creative => &mut self.creative_id,
            ProvisioningStep::Ad => &mut self.ad_id,
        };
        *slot = Some(external_id);
    }

    /// Forgets `step` and everything after it.
    pub fn reset_from(&mut self, step: ProvisioningStep) {
        for later in step.and_later() {
            match later {
                ProvisioningStep::Campaign => self.campaign_id = None,
                ProvisioningStep::AdSet => self.adset_id = None,
                ProvisioningStep::Creative => self.creative_id = None,
                ProvisioningStep::Ad => self.ad_id = None,
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.campaign_id.is_none()
            && self.adset_id.is_none()
            && self.creative_id.is_none()
            && self.ad_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionResult {
    pub ad_campaign_id: i32,
    pub external_campaign_id: String,
    pub external_adset_id: String,
    pub external_creative_id: String,
    pub external_ad_id: String,
    pub status: AdCampaignStatus,
}
