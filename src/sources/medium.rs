//! Medium adapter: posts come from the per-user RSS feed at
//! `https://medium.com/feed/@username`.

use async_trait::async_trait;

use super::{feed, FetchError, RawPost, SourceAdapter};

pub struct MediumAdapter;

/// Extract the Medium username from a profile URL.
///
/// Accepts `https://medium.com/@user`, `https://medium.com/@user/about`,
/// and custom-path forms like `https://medium.com/some-publication` where
/// the last path segment is taken as-is.
fn username(url: &str) -> Option<String> {
    if let Some(after_at) = url.split('@').nth(1) {
        let name = after_at.split('/').next().unwrap_or(after_at);
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }

    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.contains('.'))
        .map(|segment| segment.to_string())
}

#[async_trait]
impl SourceAdapter for MediumAdapter {
    async fn fetch(&self, url: &str, max_posts: usize) -> Result<Vec<RawPost>, FetchError> {
        let user = username(url).ok_or_else(|| FetchError::Url(url.to_string()))?;
        let feed_url = format!("https://medium.com/feed/@{user}");
        feed::fetch_feed(&feed_url, max_posts).await
    }
}
