// API Versions
pub const FACEBOOK_API_VERSION: &str = "v20.0";

// API Base URLs
pub const FACEBOOK_BASE_URL: &str = "https://graph.facebook.com";
pub const FACEBOOK_PAGE_URL: &str = "https://www.facebook.com";

// Provider key used for connected accounts
pub const FACEBOOK_PROVIDER: &str = "facebook";

// Gateway / provisioning settings
pub const GRAPH_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const PROVISIONING_LEASE_SECS: i64 = 600;

// Campaign payload
pub const FB_CAMPAIGN_OBJECTIVE: &str = "OUTCOME_ENGAGEMENT";
pub const FB_BUYING_TYPE: &str = "AUCTION";

// Ad set payload
pub const FB_BILLING_EVENT: &str = "IMPRESSIONS";
pub const FB_OPTIMIZATION_GOAL: &str = "REACH";
pub const FB_BID_STRATEGY: &str = "LOWEST_COST_WITHOUT_CAP";
pub const FB_STATUS_PAUSED: &str = "PAUSED";

// Targeting defaults
pub const DEFAULT_AGE_MIN: u32 = 18;
pub const DEFAULT_AGE_MAX: u32 = 65;
pub const FALLBACK_COUNTRIES: &[&str] = &["TH", "US"];
pub const PUBLISHER_PLATFORMS: &[&str] = &["facebook", "instagram"];

// Insights
pub const FB_POST_IMPRESSIONS: &str = "post_impressions";
pub const FB_POST_IMPRESSIONS_UNIQUE: &str = "post_impressions_unique";
pub const FB_POST_CLICKS: &str = "post_clicks";
pub const FB_POST_REACTIONS: &str = "post_reactions_by_type_total";
pub const FB_POST_INSIGHT_FIELDS: &str = "insights.metric(post_impressions,post_impressions_unique,post_clicks,post_reactions_by_type_total).period(lifetime)";

// Budget-related wording in English and Thai error messages
pub const BUDGET_ERROR_KEYWORDS: &[&str] = &[
    "budget",
    "insufficient funds",
    "spend limit",
    "spending limit",
    "งบประมาณ",
    "ยอดเงินไม่เพียงพอ",
    "วงเงิน",
];
