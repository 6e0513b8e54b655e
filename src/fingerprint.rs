//! Stable post identity and content hashing.
//!
//! `post_id` ties a post to its platform + URL so re-fetching never
//! duplicates or orphans cached embeddings. `content_hash` is computed over
//! whitespace-normalized text so trivial re-renders of the same post do not
//! force re-embedding. Both are pure functions with no failure modes.

use sha2::{Digest, Sha256};

/// Hex length of a post id (prefix of the full SHA-256 digest).
const POST_ID_LEN: usize = 16;

/// Derive the stable id for a post from its platform name and URL.
///
/// Deterministic and collision-free for practical input domains:
/// same platform + url always yields the same id.
pub fn post_id(platform_name: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(platform_name.as_bytes());
    hasher.update(b":");
    hasher.update(url.as_bytes());
    let digest = hasher.finalize();

    digest
        .iter()
        .take(POST_ID_LEN / 2)
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

/// Collapse all runs of whitespace into single spaces and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hash of normalized text, used to detect edits and key the embedding cache.
///
/// Reacts to any byte change in the text itself, but not to
/// whitespace-only differences.
pub fn content_hash(text: &str) -> String {
    let normalized = normalize_whitespace(text);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_id_deterministic() {
        let a = post_id("My Substack", "https://example.substack.com/p/essay");
        let b = post_id("My Substack", "https://example.substack.com/p/essay");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_post_id_differs_by_platform_and_url() {
        let a = post_id("My Substack", "https://example.com/p/essay");
        let b = post_id("My Medium", "https://example.com/p/essay");
        let c = post_id("My Substack", "https://example.com/p/other");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_content_hash_stable() {
        let h1 = content_hash("An essay about rivers.");
        let h2 = content_hash("An essay about rivers.");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn test_content_hash_whitespace_insensitive() {
        let h1 = content_hash("An essay  about\n\trivers. ");
        let h2 = content_hash("An essay about rivers.");
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_content_hash_reacts_to_edits() {
        let h1 = content_hash("An essay about rivers.");
        let h2 = content_hash("An essay about lakes.");
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n b\t\tc "), "a b c");
        assert_eq!(normalize_whitespace(""), "");
        assert_eq!(normalize_whitespace("   "), "");
    }
}
