//! Text preparation for embedding input.
//!
//! A post is embedded as its title plus the head of its content, clipped so
//! very long essays do not blow up inference time. Queries are clipped the
//! same way with a larger budget.

/// Character budget for post content fed to the model.
const MAX_CONTENT_CHARS: usize = 5000;

/// Character budget for free-form query text.
pub const MAX_QUERY_CHARS: usize = 10_000;

/// Build the embedding input for a post from its title and content.
///
/// Returns `None` if both are empty after trimming — there is nothing
/// meaningful to embed.
pub fn embedding_input(title: &str, content: &str) -> Option<String> {
    let title = title.trim();
    let content = clip(content.trim(), MAX_CONTENT_CHARS);

    if title.is_empty() && content.is_empty() {
        return None;
    }

    if title.is_empty() {
        Some(content.to_string())
    } else if content.is_empty() {
        Some(title.to_string())
    } else {
        Some(format!("{title} {content}"))
    }
}

/// Truncate text to at most `max_chars` characters, on a char boundary.
pub fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
