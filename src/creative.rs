use crate::constants::FACEBOOK_PAGE_URL;
use crate::models::CampaignPost;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

/// Chooses which campaign post an ad is built from.
pub trait CreativeSelector: Send + Sync {
    fn select<'a>(&self, posts: &'a [CampaignPost]) -> Option<&'a CampaignPost>;
}

/// Picks the earliest-created post; ties go to the lower id.
#[derive(Debug, Default)]
pub struct EarliestPost;

impl CreativeSelector for EarliestPost {
    fn select<'a>(&self, posts: &'a [CampaignPost]) -> Option<&'a CampaignPost> {
        posts.iter().min_by_key(|post| (post.created_at, post.id))
    }
}

/// Turns a stored image reference into an absolute URL the platform can fetch.
pub fn resolve_image_url(image_ref: Option<&str>, media_base: Option<&Url>) -> Option<String> {
    let image_ref = image_ref.map(str::trim).filter(|r| !r.is_empty())?;

    if let Ok(url) = Url::parse(image_ref) {
        return Some(url.to_string());
    }

    match media_base.map(|base| base.join(image_ref.trim_start_matches('/'))) {
        Some(Ok(url)) => Some(url.to_string()),
        _ => {
            debug!(image_ref, "image reference could not be resolved, omitting picture");
            None
        }
    }
}

pub fn page_link(page_id: &str) -> String {
    format!("{FACEBOOK_PAGE_URL}/{page_id}")
}

pub fn creative_payload(
    name: &str,
    page_id: &str,
    post: &CampaignPost,
    image_url: Option<&str>,
) -> Value {
    let mut link_data = json!({
        "message": post.content,
        "link": page_link(page_id),
    });
    if let Some(picture) = image_url {
        link_data["picture"] = json!(picture);
    }

    json!({
        "name": name,
        "object_story_spec": {
            "page_id": page_id,
            "link_data": link_data,
        },
    })
}
