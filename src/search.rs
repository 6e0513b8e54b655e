//! Cosine-similarity retrieval over the cached corpus.
//!
//! Search never fetches: it ranks whatever the store currently holds.
//! Ranking is deterministic, ties broken by publication date (newest
//! first, undated last) and then by post id.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;

use crate::posts::Post;
use crate::semantic::{EmbeddingProvider, ProviderError};
use crate::store::PostStore;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("top_n must be greater than 0")]
    InvalidTopN,

    #[error("min_similarity must be within [-1.0, 1.0], got {0}")]
    InvalidMinSimilarity(f32),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub post: Post,
    pub score: f32,
}

pub struct RetrievalEngine {
    store: Arc<PostStore>,
    provider: Arc<EmbeddingProvider>,
}

impl RetrievalEngine {
    pub fn new(store: Arc<PostStore>, provider: Arc<EmbeddingProvider>) -> Self {
        Self { store, provider }
    }

    /// Rank the cached corpus against `query`.
    ///
    /// Blocking: embedding the query may invoke the model. Posts without a
    /// cached vector are skipped rather than embedded on the query path.
    pub fn search(
        &self,
        query: &str,
        top_n: usize,
        min_similarity: f32,
    ) -> Result<Vec<SearchHit>, SearchError> {
        if top_n == 0 {
            return Err(SearchError::InvalidTopN);
        }
        if !(-1.0..=1.0).contains(&min_similarity) {
            return Err(SearchError::InvalidMinSimilarity(min_similarity));
        }

        // nothing to ask or nothing to rank: empty result, not an error
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let posts = self.store.all_posts();
        if posts.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.provider.embed_query(query)?;
        let query_norm = norm(&query_vector);

        let mut hits = Vec::with_capacity(posts.len());
        for post in posts {
            let Some(vector) = self.provider.vector_for(&post.content_hash)? else {
                log::debug!("post {} has no cached vector, skipping", post.id);
                continue;
            };

            let Some(score) = cosine(&query_vector, query_norm, &vector) else {
                continue;
            };

            if score >= min_similarity {
                hits.push(SearchHit { post, score });
            }
        }

        rank_hits(&mut hits);
        hits.truncate(top_n);

        Ok(hits)
    }
}

/// Score descending, then newest publication date (undated last), then id.
fn rank_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| match (a.post.published_at, b.post.published_at) {
                (Some(x), Some(y)) => y.cmp(&x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| a.post.id.cmp(&b.post.id))
    });
}

fn norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity, `None` when either vector has zero norm or the
/// dimensions disagree.
fn cosine(query: &[f32], query_norm: f32, vector: &[f32]) -> Option<f32> {
    if query.len() != vector.len() {
        return None;
    }

    let vector_norm = norm(vector);
    if query_norm < f32::EPSILON || vector_norm < f32::EPSILON {
        return None;
    }

    let dot: f32 = query.iter().zip(vector).map(|(a, b)| a * b).sum();
    Some(dot / (query_norm * vector_norm))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn hit(id: &str, score: f32, published: Option<i64>) -> SearchHit {
        SearchHit {
            post: Post {
                id: id.to_string(),
                published_at: published.map(|ts| Utc.timestamp_opt(ts, 0).unwrap()),
                ..Default::default()
            },
            score,
        }
    }

    #[test]
    fn test_cosine_basics() {
        let q = [1.0, 0.0];
        let qn = norm(&q);

        assert_eq!(cosine(&q, qn, &[1.0, 0.0]), Some(1.0));
        assert_eq!(cosine(&q, qn, &[0.0, 1.0]), Some(0.0));
        assert_eq!(cosine(&q, qn, &[-1.0, 0.0]), Some(-1.0));

        let score = cosine(&q, qn, &[0.9, 0.1]).unwrap();
        assert!((score - 0.9939).abs() < 1e-3);
    }

    #[test]
    fn test_cosine_rejects_degenerate_vectors() {
        let q = [1.0, 0.0];
        let qn = norm(&q);

        assert_eq!(cosine(&q, qn, &[0.0, 0.0]), None);
        assert_eq!(cosine(&q, qn, &[1.0, 0.0, 0.0]), None);
        assert_eq!(cosine(&[0.0, 0.0], 0.0, &[1.0, 0.0]), None);
    }

    #[test]
    fn test_rank_by_score_descending() {
        let mut hits = vec![hit("a", 0.2, None), hit("b", 0.9, None), hit("c", 0.5, None)];
        rank_hits(&mut hits);

        let ids: Vec<&str> = hits.iter().map(|h| h.post.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_ties_break_by_date_then_id() {
        let mut hits = vec![
            hit("d", 0.5, None),
            hit("c", 0.5, Some(100)),
            hit("b", 0.5, Some(200)),
            hit("a", 0.5, None),
        ];
        rank_hits(&mut hits);

        let ids: Vec<&str> = hits.iter().map(|h| h.post.id.as_str()).collect();
        // newest first, undated last, then id ascending
        assert_eq!(ids, vec!["b", "c", "a", "d"]);
    }

    #[test]
    fn test_rank_is_stable_across_input_order() {
        let forward = vec![
            hit("a", 0.5, Some(100)),
            hit("b", 0.5, Some(100)),
            hit("c", 0.8, None),
        ];
        let mut reversed: Vec<SearchHit> = forward.iter().rev().cloned().collect();
        let mut forward = forward;

        rank_hits(&mut forward);
        rank_hits(&mut reversed);

        let f: Vec<&str> = forward.iter().map(|h| h.post.id.as_str()).collect();
        let r: Vec<&str> = reversed.iter().map(|h| h.post.id.as_str()).collect();
        assert_eq!(f, r);
        assert_eq!(f, vec!["c", "a", "b"]);
    }
}
