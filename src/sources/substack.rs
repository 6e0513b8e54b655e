//! Substack adapter: the feed lives at `<blog url>/feed`.

use async_trait::async_trait;

use super::{feed, FetchError, RawPost, SourceAdapter};

pub struct SubstackAdapter;

/// Derive the feed URL from a configured blog URL.
fn feed_url(url: &str) -> String {
    if url.ends_with('/') {
        format!("{url}feed")
    } else {
        format!("{url}/feed")
    }
}

#[async_trait]
impl SourceAdapter for SubstackAdapter {
    async fn fetch(&self, url: &str, max_posts: usize) -> Result<Vec<RawPost>, FetchError> {
        feed::fetch_feed(&feed_url(url), max_posts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_url_appends_feed() {
        assert_eq!(
            feed_url("https://example.substack.com"),
            "https://example.substack.com/feed"
        );
        assert_eq!(
            feed_url("https://example.substack.com/"),
            "https://example.substack.com/feed"
        );
    }
}
