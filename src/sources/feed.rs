//! Shared RSS/Atom plumbing for the feed-backed adapters.

use std::time::Duration;

use feed_rs::model::Entry;

use super::{FetchError, RawPost};

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:124.0) Gecko/20100101 Firefox/124.0";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetch a feed URL and convert its entries to raw posts.
///
/// Entries that cannot be converted (no link, no text) are skipped with a
/// warning so one bad entry never fails the platform.
pub async fn fetch_feed(feed_url: &str, max_posts: usize) -> Result<Vec<RawPost>, FetchError> {
    log::info!("fetching feed: {feed_url}");

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()?;

    let response = client.get(feed_url).send().await?.error_for_status()?;
    let body = response.bytes().await?;

    let feed = feed_rs::parser::parse(body.as_ref())
        .map_err(|err| FetchError::Feed(err.to_string()))?;

    log::info!("found {} entries in {feed_url}", feed.entries.len());

    Ok(entries_to_posts(feed.entries, max_posts))
}

/// Convert feed entries into raw posts, at most `max_posts` of them.
///
/// Invalid entries are dropped before the cap applies, so they never eat
/// into the returned count.
fn entries_to_posts(entries: Vec<Entry>, max_posts: usize) -> Vec<RawPost> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let id = entry.id.clone();
            match entry_to_raw(entry) {
                Some(post) => Some(post),
                None => {
                    log::warn!("skipping feed entry without link or text: {id}");
                    None
                }
            }
        })
        .take(max_posts)
        .collect()
}

/// Convert one feed entry into a raw post.
///
/// Content falls back to the summary when the feed omits full content.
fn entry_to_raw(entry: Entry) -> Option<RawPost> {
    let url = entry.links.first().map(|link| link.href.clone())?;

    let title = entry
        .title
        .map(|title| title.content.trim().to_string())
        .unwrap_or_default();

    let html = entry
        .content
        .and_then(|content| content.body)
        .or_else(|| entry.summary.map(|summary| summary.content))?;

    let content = strip_html(&html);
    if title.is_empty() && content.is_empty() {
        return None;
    }

    Some(RawPost {
        title,
        url,
        published_at: entry.published.or(entry.updated),
        content,
    })
}

/// Strip HTML tags from feed content, collapsing whitespace between text
/// nodes into single spaces.
pub fn strip_html(html: &str) -> String {
    let fragment = scraper::Html::parse_fragment(html);
    let text = fragment
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
