use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sentinel author name for posts with no resolvable author. Never tracked
/// in the author registry.
pub const UNKNOWN_AUTHOR: &str = "unknown";

/// One collected post, normalized from the loosely-typed API payload.
///
/// Serializes to the fixed 16-column CSV row; `raw_json` is kept out of the
/// tabular sink and written verbatim to the JSONL archive instead.
#[derive(Debug, Clone, Serialize)]
pub struct PostRecord {
    pub post_id: String,
    pub url: String,
    pub title: String,
    pub content: String,
    pub link_url: String,
    pub author_name: String,
    pub author_id: Option<String>,
    pub submolt: String,
    pub submolt_display: String,
    pub upvotes: i64,
    pub downvotes: i64,
    pub score: i64,
    pub comment_count: i64,
    pub created_at: String,
    pub scraped_at: String,
    pub is_pinned: bool,
    #[serde(skip_serializing)]
    pub raw_json: String,
}

/// Registry entry for one distinct author. Created on first observation,
/// updated on every newly ingested post by that author, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorEntry {
    pub first_seen: String,
    pub last_seen: String,
    pub post_count: u64,
    pub submolts: Vec<String>,
}

/// Durable form of the seen-post set, written to `state.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub seen_posts: Vec<String>,
    pub last_updated: String,
}

/// Totals reported after a full run over all requested submolts.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub new_posts: usize,
    pub total_seen: usize,
    pub total_authors: usize,
}

/// Pagination loop tuning. Defaults match the Moltbook feed behavior: 25
/// posts per page sorted newest-first, stop after 3 consecutive pages of
/// already-seen posts.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub page_size: u32,
    pub sort: String,
    pub max_stale_pages: u32,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            page_size: 25,
            sort: "new".to_string(),
            max_stale_pages: 3,
        }
    }
}

/// Moltbook API client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Applied before every request, including the first of a session.
    pub request_delay: Duration,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn moltbook(api_key: Option<String>) -> Self {
        Self {
            base_url: "https://www.moltbook.com/api/v1".to_string(),
            api_key,
            request_delay: Duration::from_secs(1),
            user_agent: "moltscrape/1.0".to_string(),
        }
    }
}
