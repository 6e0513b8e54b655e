//! Refresh orchestration: fetch, then embed, per platform.
//!
//! The coordinator is the only caller that runs fetch and embedding as one
//! unit. A global semaphore caps how many platforms refresh at once;
//! embedding runs on the blocking pool so model inference never stalls the
//! async runtime.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;

use crate::semantic::EmbeddingProvider;
use crate::store::{PostStore, RefreshResult, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("unknown platform '{0}'")]
    UnknownPlatform(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Per-platform result of a refresh pass.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// A fetch ran; the snapshot was replaced and new content embedded.
    /// `cached` posts already had vectors; `failed` posts could not be
    /// embedded and are excluded from search until a later pass.
    Refreshed {
        posts: usize,
        embedded: usize,
        cached: usize,
        failed: usize,
    },
    /// Snapshot was within TTL, nothing fetched.
    Fresh { posts: usize },
    /// Fetch failed; the previous snapshot is still being served.
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformStatus {
    pub platform: String,
    #[serde(flatten)]
    pub outcome: RefreshOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshSummary {
    pub platforms: Vec<PlatformStatus>,
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    store: Arc<PostStore>,
    provider: Arc<EmbeddingProvider>,
    semaphore: Arc<Semaphore>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<PostStore>,
        provider: Arc<EmbeddingProvider>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            provider,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Refresh one platform and embed whatever the fetch brought in.
    ///
    /// A failed fetch is an outcome, not an error: the platform keeps its
    /// previous snapshot and the caller learns why. Only an unknown
    /// platform name is an error.
    pub async fn refresh_one(
        &self,
        platform_name: &str,
        force: bool,
    ) -> Result<RefreshOutcome, RefreshError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|err| RefreshError::Internal(err.to_string()))?;

        match self.store.refresh(platform_name, force).await {
            Ok(RefreshResult::Refreshed(posts)) => {
                let post_count = posts.len();
                let provider = self.provider.clone();

                let report = tokio::task::spawn_blocking(move || provider.embed_posts(&posts))
                    .await
                    .map_err(|err| RefreshError::Internal(err.to_string()))?;

                match report {
                    Ok(report) => Ok(RefreshOutcome::Refreshed {
                        posts: post_count,
                        embedded: report.embedded,
                        cached: report.cached,
                        failed: report.failed,
                    }),
                    Err(err) => {
                        // snapshot already replaced, vectors can catch up later
                        log::error!("embedding failed for '{platform_name}': {err}");
                        Ok(RefreshOutcome::Refreshed {
                            posts: post_count,
                            embedded: 0,
                            cached: 0,
                            failed: post_count,
                        })
                    }
                }
            }
            Ok(RefreshResult::Fresh(posts)) => Ok(RefreshOutcome::Fresh { posts: posts.len() }),
            Err(StoreError::UnknownPlatform(name)) => Err(RefreshError::UnknownPlatform(name)),
            Err(err) => Ok(RefreshOutcome::Failed {
                reason: err.to_string(),
            }),
        }
    }

    /// Refresh every configured platform, failures isolated per platform.
    pub async fn refresh_all(&self, force: bool) -> RefreshSummary {
        let mut handles = Vec::new();
        for name in self.store.platform_names() {
            let coordinator = self.clone();
            let task_name = name.clone();
            handles.push((
                name,
                tokio::spawn(async move { coordinator.refresh_one(&task_name, force).await }),
            ));
        }

        let mut platforms = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let outcome = match handle.await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(err)) => RefreshOutcome::Failed {
                    reason: err.to_string(),
                },
                Err(err) => RefreshOutcome::Failed {
                    reason: err.to_string(),
                },
            };
            platforms.push(PlatformStatus {
                platform: name,
                outcome,
            });
        }

        RefreshSummary { platforms }
    }

    /// Daemon warm-up: load the model, refresh stale platforms, then make
    /// sure every cached post has a vector (snapshots restored from disk
    /// may predate the embedding cache).
    pub async fn preload(&self) -> RefreshSummary {
        let provider = self.provider.clone();
        let init = tokio::task::spawn_blocking(move || provider.initialize()).await;
        match init {
            Ok(Ok(())) => {}
            Ok(Err(err)) => log::error!("model preload failed: {err}"),
            Err(err) => log::error!("model preload panicked: {err}"),
        }

        let summary = self.refresh_all(false).await;

        let provider = self.provider.clone();
        let posts = self.store.all_posts();
        if !posts.is_empty() {
            let backfill =
                tokio::task::spawn_blocking(move || provider.embed_posts(&posts)).await;
            match backfill {
                Ok(Ok(report)) if report.embedded > 0 => {
                    log::info!("backfilled {} embeddings from snapshots", report.embedded);
                }
                Ok(Ok(_)) => {}
                Ok(Err(err)) => log::error!("embedding backfill failed: {err}"),
                Err(err) => log::error!("embedding backfill panicked: {err}"),
            }
        }

        summary
    }
}
