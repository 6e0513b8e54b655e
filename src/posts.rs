use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::Hash;

use crate::fingerprint;
use crate::sources::RawPost;

/// A single published essay, HTML already stripped to plain text.
#[derive(Debug, Clone, Eq, Default, Serialize, Deserialize)]
pub struct Post {
    /// Stable fingerprint of (platform_name, url).
    pub id: String,

    pub platform_name: String,
    pub title: String,
    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    pub content: String,

    /// Hash of the normalized content, keys the embedding cache.
    pub content_hash: String,

    #[serde(default)]
    pub word_count: usize,
}

impl Hash for Post {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl PartialEq for Post {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Post {
    /// Build a post from a raw adapter record, deriving id, content hash
    /// and word count.
    pub fn from_raw(platform_name: &str, raw: RawPost) -> Self {
        let content_hash = fingerprint::content_hash(&raw.content);
        let word_count = raw.content.split_whitespace().count();

        Post {
            id: fingerprint::post_id(platform_name, &raw.url),
            platform_name: platform_name.to_string(),
            title: raw.title,
            url: raw.url,
            published_at: raw.published_at,
            content: raw.content,
            content_hash,
            word_count,
        }
    }
}

/// Listing view of a post, without the full content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostSummary {
    pub id: String,
    pub platform_name: String,
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub word_count: usize,
}

impl From<&Post> for PostSummary {
    fn from(post: &Post) -> Self {
        PostSummary {
            id: post.id.clone(),
            platform_name: post.platform_name.clone(),
            title: post.title.clone(),
            url: post.url.clone(),
            published_at: post.published_at,
            word_count: post.word_count,
        }
    }
}

/// Cached posts for one configured platform.
///
/// `posts` is replaced wholesale on a successful fetch; a failed fetch
/// leaves the previous snapshot intact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fetched_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub posts: Vec<Post>,
}
