//! Application facade: one object the CLI and the HTTP daemon both drive.
//!
//! Owns the store, the embedding provider, the retrieval engine and the
//! refresh coordinator, and applies config defaults to caller-supplied
//! search parameters.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{Config, ConfigError};
use crate::posts::{Post, PostSummary};
use crate::refresh::{PlatformStatus, RefreshCoordinator, RefreshError, RefreshSummary};
use crate::search::{RetrievalEngine, SearchError, SearchHit};
use crate::semantic::EmbeddingProvider;
use crate::storage::BackendLocal;
use crate::store::{PlatformInfo, PostStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RefreshError> for AppError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::UnknownPlatform(name) => AppError::NotFound(format!("platform '{name}'")),
            RefreshError::Internal(reason) => AppError::Internal(reason),
        }
    }
}

pub struct App {
    config: Config,
    store: Arc<PostStore>,
    engine: RetrievalEngine,
    coordinator: RefreshCoordinator,
}

impl App {
    pub fn new(config: Config) -> Result<Self, AppError> {
        let storage = Box::new(BackendLocal::new(config.base_path())?);
        let store = Arc::new(PostStore::new(&config, storage));
        let provider = Arc::new(EmbeddingProvider::new(
            config.semantic.clone(),
            PathBuf::from(config.base_path()),
        ));
        Ok(Self::assemble(config, store, provider))
    }

    #[cfg(test)]
    pub fn with_parts(
        config: Config,
        store: Arc<PostStore>,
        provider: Arc<EmbeddingProvider>,
    ) -> Self {
        Self::assemble(config, store, provider)
    }

    fn assemble(config: Config, store: Arc<PostStore>, provider: Arc<EmbeddingProvider>) -> Self {
        let engine = RetrievalEngine::new(store.clone(), provider.clone());
        let coordinator =
            RefreshCoordinator::new(store.clone(), provider, config.refresh_concurrency);
        Self {
            config,
            store,
            engine,
            coordinator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn platforms(&self) -> Vec<PlatformInfo> {
        self.store.platforms()
    }

    /// Listing of cached posts, optionally narrowed to one platform.
    pub fn list_posts(&self, platform: Option<&str>) -> Result<Vec<PostSummary>, AppError> {
        let posts = match platform {
            Some(name) => match self.store.posts_for(name) {
                Ok(posts) => posts,
                Err(StoreError::UnknownPlatform(name)) => {
                    return Err(AppError::NotFound(format!("platform '{name}'")))
                }
                Err(err) => return Err(err.into()),
            },
            None => self.store.all_posts(),
        };
        Ok(posts.iter().map(PostSummary::from).collect())
    }

    pub fn get_post(&self, post_id: &str) -> Result<Post, AppError> {
        self.store
            .get(post_id)
            .ok_or_else(|| AppError::NotFound(format!("post '{post_id}'")))
    }

    /// Rank the cached corpus against `query`, config defaults filling in
    /// whatever the caller left out. Blocking: may run model inference.
    pub fn search(
        &self,
        query: &str,
        top_n: Option<usize>,
        min_similarity: Option<f32>,
    ) -> Result<Vec<SearchHit>, AppError> {
        let top_n = top_n.unwrap_or(self.config.default_top_n);
        let min_similarity = min_similarity.unwrap_or(self.config.min_similarity);
        Ok(self.engine.search(query, top_n, min_similarity)?)
    }

    /// Refresh one platform or all of them.
    pub async fn refresh(
        &self,
        platform: Option<&str>,
        force: bool,
    ) -> Result<RefreshSummary, AppError> {
        match platform {
            Some(name) => {
                let outcome = self.coordinator.refresh_one(name, force).await?;
                Ok(RefreshSummary {
                    platforms: vec![PlatformStatus {
                        platform: name.to_string(),
                        outcome,
                    }],
                })
            }
            None => Ok(self.coordinator.refresh_all(force).await),
        }
    }

    /// Daemon warm-up: model load, TTL-gated refresh, vector backfill.
    pub async fn preload(&self) -> RefreshSummary {
        self.coordinator.preload().await
    }
}
