//! Per-platform source adapters.
//!
//! An adapter turns a configured blog URL into raw post records. Adapters
//! only fetch and parse; identity, hashing and caching happen in the store.
//! The store also guarantees an adapter is never invoked more than once
//! concurrently for the same platform.

pub mod feed;
pub mod medium;
pub mod substack;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::PlatformKind;

/// A post as fetched from a platform feed, HTML already stripped.
#[derive(Debug, Clone)]
pub struct RawPost {
    pub title: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub content: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed parse error: {0}")]
    Feed(String),

    #[error("invalid platform url '{0}'")]
    Url(String),
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Fetch up to `max_posts` posts from the platform at `url`.
    ///
    /// A failing entry is skipped, never fails the whole fetch; a failing
    /// feed or request fails with `FetchError`.
    async fn fetch(&self, url: &str, max_posts: usize) -> Result<Vec<RawPost>, FetchError>;
}

/// Adapter for a configured platform type.
pub fn adapter_for(kind: PlatformKind) -> Box<dyn SourceAdapter> {
    match kind {
        PlatformKind::Substack => Box::new(substack::SubstackAdapter),
        PlatformKind::Medium => Box::new(medium::MediumAdapter),
    }
}
