//! Hash-keyed embedding provider.
//!
//! Owns the encoder and the persistent cache behind one lock. The model is
//! loaded lazily on first use, so commands that never touch search start
//! without paying model initialization.
//!
//! Every vector request goes through the content hash: identical text never
//! hits the model twice, for posts and queries alike.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::SemanticConfig;
use crate::fingerprint;
use crate::posts::Post;

use super::cache::{EmbeddingCache, EmbeddingCacheError};
use super::embeddings::{EmbeddingError, FastembedEncoder, TextEncoder};
use super::preprocess::{self, embedding_input};

/// Filename for the persistent vector cache.
const CACHE_FILE: &str = "embeddings.bin";

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("embedding cache error: {0}")]
    Cache(#[from] EmbeddingCacheError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Outcome of embedding a batch of posts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbedReport {
    /// Vectors computed by the model in this batch.
    pub embedded: usize,
    /// Posts whose content hash was already in the cache.
    pub cached: usize,
    /// Posts that could not be embedded (no text, or the encoder failed).
    pub failed: usize,
}

struct ProviderState {
    encoder: Box<dyn TextEncoder>,
    cache: EmbeddingCache,
}

pub struct EmbeddingProvider {
    state: Mutex<Option<ProviderState>>,
    config: SemanticConfig,
    base_path: PathBuf,
}

impl EmbeddingProvider {
    pub fn new(config: SemanticConfig, base_path: PathBuf) -> Self {
        Self {
            state: Mutex::new(None),
            config,
            base_path,
        }
    }

    /// Construct an already-initialized provider around an injected encoder.
    #[cfg(test)]
    pub fn with_encoder(
        encoder: Box<dyn TextEncoder>,
        base_path: PathBuf,
    ) -> Result<Self, ProviderError> {
        let cache_path = base_path.join(CACHE_FILE);
        let cache = EmbeddingCache::open(cache_path, encoder.model_id(), encoder.dimensions())?;

        Ok(Self {
            state: Mutex::new(Some(ProviderState { encoder, cache })),
            config: SemanticConfig::default(),
            base_path,
        })
    }

    /// Load the model and open the cache. Blocking, can take minutes on
    /// first run while the model downloads.
    pub fn initialize(&self) -> Result<(), ProviderError> {
        let mut guard = self.lock_state()?;
        if guard.is_some() {
            return Ok(());
        }

        log::info!("initializing embedding model '{}'", self.config.model);

        let encoder = FastembedEncoder::new(
            &self.config.model,
            self.base_path.clone(),
            Some(Duration::from_secs(self.config.download_timeout_secs)),
        )?;

        let cache_path = self.base_path.join(CACHE_FILE);
        let cache = EmbeddingCache::open(cache_path, encoder.model_id(), encoder.dimensions())?;

        log::info!(
            "embedding model ready: {} dims, {} cached vectors",
            encoder.dimensions(),
            cache.len()
        );

        *guard = Some(ProviderState {
            encoder: Box::new(encoder),
            cache,
        });

        Ok(())
    }

    /// Embed a free-form query, clipped to the query budget.
    ///
    /// Cached by the hash of the clipped text, so a repeated query is a
    /// pure cache lookup.
    pub fn embed_query(&self, query: &str) -> Result<Vec<f32>, ProviderError> {
        self.initialize()?;

        let clipped = preprocess::clip(query.trim(), preprocess::MAX_QUERY_CHARS);
        if clipped.is_empty() {
            return Err(ProviderError::Embedding(EmbeddingError::EmptyInput));
        }

        let hash = fingerprint::content_hash(clipped);

        let mut guard = self.lock_state()?;
        let state = guard
            .as_mut()
            .ok_or_else(|| ProviderError::Internal("provider not initialized".to_string()))?;

        if let Some(vector) = state.cache.get(&hash) {
            return Ok(vector.to_vec());
        }

        let vector = state.encoder.encode(clipped)?;
        state.cache.insert(&hash, vector.clone())?;
        state.cache.save()?;

        Ok(vector)
    }

    /// Embed every post in the batch that is not already cached.
    ///
    /// A post that fails to encode is logged and skipped; the rest of the
    /// batch still goes through. The cache is saved once at the end.
    pub fn embed_posts(&self, posts: &[Post]) -> Result<EmbedReport, ProviderError> {
        self.initialize()?;

        let mut guard = self.lock_state()?;
        let state = guard
            .as_mut()
            .ok_or_else(|| ProviderError::Internal("provider not initialized".to_string()))?;

        let mut report = EmbedReport::default();

        for post in posts {
            if state.cache.contains(&post.content_hash) {
                report.cached += 1;
                continue;
            }

            let Some(input) = embedding_input(&post.title, &post.content) else {
                log::warn!("post {} has no embeddable text, skipping", post.id);
                report.failed += 1;
                continue;
            };

            match state.encoder.encode(&input) {
                Ok(vector) => match state.cache.insert(&post.content_hash, vector) {
                    Ok(()) => report.embedded += 1,
                    Err(err) => {
                        log::warn!("failed to cache vector for post {}: {err}", post.id);
                        report.failed += 1;
                    }
                },
                Err(err) => {
                    log::warn!("failed to embed post {}: {err}", post.id);
                    report.failed += 1;
                }
            }
        }

        if report.embedded > 0 {
            state.cache.save()?;
        }

        Ok(report)
    }

    /// Look up the cached vector for a content hash, without touching the
    /// model.
    pub fn vector_for(&self, content_hash: &str) -> Result<Option<Vec<f32>>, ProviderError> {
        let guard = self.lock_state()?;
        let Some(state) = guard.as_ref() else {
            return Ok(None);
        };
        Ok(state.cache.get(content_hash).map(|v| v.to_vec()))
    }

    fn lock_state(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Option<ProviderState>>, ProviderError> {
        self.state
            .lock()
            .map_err(|e| ProviderError::Internal(format!("provider lock poisoned: {e}")))
    }
}
