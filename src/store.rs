//! Per-platform post snapshots with TTL-gated, coalesced refresh.
//!
//! Each configured platform gets one slot holding the last good snapshot.
//! A successful fetch replaces the snapshot wholesale and persists it; a
//! failed fetch leaves the previous snapshot intact so search keeps
//! serving stale-but-available data.
//!
//! Concurrent refreshes of the same platform coalesce on a per-slot fetch
//! gate: one caller does the network work, everyone waiting behind it
//! inherits the outcome, success or failure, without a second fetch.

use chrono::{DateTime, Utc};
use std::sync::{PoisonError, RwLock};

use crate::config::{Config, PlatformConfig, PlatformKind};
use crate::posts::{PlatformState, Post};
use crate::sources::{self, SourceAdapter};
use crate::storage::StorageManager;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown platform '{0}'")]
    UnknownPlatform(String),

    #[error("fetch failed for '{platform}': {reason}")]
    Fetch { platform: String, reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("snapshot serialization error: {0}")]
    Snapshot(String),
}

/// What a refresh call actually did.
#[derive(Debug)]
pub enum RefreshResult {
    /// A fetch ran and the snapshot was replaced.
    Refreshed(Vec<Post>),
    /// The snapshot was within TTL, or a concurrent caller just fetched it.
    Fresh(Vec<Post>),
}

/// Status view of one platform slot.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PlatformInfo {
    pub name: String,
    pub platform: PlatformKind,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub post_count: usize,
}

/// Completed fetch attempt, used by gate waiters to inherit the outcome.
#[derive(Debug, Clone)]
struct FetchAttempt {
    at: DateTime<Utc>,
    error: Option<String>,
}

struct PlatformSlot {
    config: PlatformConfig,
    adapter: Box<dyn SourceAdapter>,
    state: RwLock<PlatformState>,
    fetch_gate: tokio::sync::Mutex<()>,
    last_attempt: RwLock<Option<FetchAttempt>>,
}

pub struct PostStore {
    slots: Vec<PlatformSlot>,
    storage: Box<dyn StorageManager>,
    max_posts: usize,
    ttl: chrono::Duration,
}

impl PostStore {
    pub fn new(config: &Config, storage: Box<dyn StorageManager>) -> Self {
        let adapters = config
            .platforms
            .iter()
            .map(|p| sources::adapter_for(p.platform))
            .collect();
        Self::build(config, storage, adapters)
    }

    /// Construct a store with injected adapters, paired with the
    /// configured platforms in order.
    #[cfg(test)]
    pub fn with_adapters(
        config: &Config,
        storage: Box<dyn StorageManager>,
        adapters: Vec<Box<dyn SourceAdapter>>,
    ) -> Self {
        assert_eq!(config.platforms.len(), adapters.len());
        Self::build(config, storage, adapters)
    }

    fn build(
        config: &Config,
        storage: Box<dyn StorageManager>,
        adapters: Vec<Box<dyn SourceAdapter>>,
    ) -> Self {
        let slots = config
            .platforms
            .iter()
            .cloned()
            .zip(adapters)
            .map(|(platform, adapter)| {
                let state = load_snapshot(storage.as_ref(), &platform.name);
                PlatformSlot {
                    config: platform,
                    adapter,
                    state: RwLock::new(state),
                    fetch_gate: tokio::sync::Mutex::new(()),
                    last_attempt: RwLock::new(None),
                }
            })
            .collect();

        Self {
            slots,
            storage,
            max_posts: config.max_posts,
            ttl: config.ttl(),
        }
    }

    pub fn platform_names(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.config.name.clone()).collect()
    }

    pub fn platforms(&self) -> Vec<PlatformInfo> {
        self.slots
            .iter()
            .map(|slot| {
                let state = read(&slot.state);
                PlatformInfo {
                    name: slot.config.name.clone(),
                    platform: slot.config.platform,
                    url: slot.config.url.clone(),
                    last_fetched_at: state.last_fetched_at,
                    post_count: state.posts.len(),
                }
            })
            .collect()
    }

    /// Posts for one platform, in feed order.
    pub fn posts_for(&self, platform_name: &str) -> Result<Vec<Post>, StoreError> {
        let slot = self.slot(platform_name)?;
        Ok(read(&slot.state).posts.clone())
    }

    /// Every cached post, platforms in configured order.
    pub fn all_posts(&self) -> Vec<Post> {
        self.slots
            .iter()
            .flat_map(|slot| read(&slot.state).posts.clone())
            .collect()
    }

    pub fn get(&self, post_id: &str) -> Option<Post> {
        self.slots.iter().find_map(|slot| {
            read(&slot.state)
                .posts
                .iter()
                .find(|p| p.id == post_id)
                .cloned()
        })
    }

    /// Bring the platform's snapshot up to date.
    ///
    /// Within TTL and not forced, this is a no-op returning the current
    /// snapshot. Otherwise one fetch runs per gate; callers that queued up
    /// behind an in-flight fetch inherit its result instead of fetching
    /// again.
    pub async fn refresh(
        &self,
        platform_name: &str,
        force: bool,
    ) -> Result<RefreshResult, StoreError> {
        let slot = self.slot(platform_name)?;

        if !force && !self.slot_is_stale(slot) {
            return Ok(RefreshResult::Fresh(read(&slot.state).posts.clone()));
        }

        let requested_at = Utc::now();
        let _gate = slot.fetch_gate.lock().await;

        // an attempt finished while we waited for the gate: inherit it
        if let Some(attempt) = read(&slot.last_attempt).clone() {
            if attempt.at >= requested_at {
                return match attempt.error {
                    None => Ok(RefreshResult::Fresh(read(&slot.state).posts.clone())),
                    Some(reason) => Err(StoreError::Fetch {
                        platform: slot.config.name.clone(),
                        reason,
                    }),
                };
            }
        }

        if !force && !self.slot_is_stale(slot) {
            return Ok(RefreshResult::Fresh(read(&slot.state).posts.clone()));
        }

        log::info!(
            "fetching '{}' ({}) from {}",
            slot.config.name,
            slot.config.platform,
            slot.config.url
        );

        let fetched = slot.adapter.fetch(&slot.config.url, self.max_posts).await;
        let now = Utc::now();

        match fetched {
            Ok(raw_posts) => {
                let posts: Vec<Post> = raw_posts
                    .into_iter()
                    .map(|raw| Post::from_raw(&slot.config.name, raw))
                    .collect();

                let new_state = PlatformState {
                    last_fetched_at: Some(now),
                    posts: posts.clone(),
                };

                // persist before swapping, so a storage failure leaves the
                // previous snapshot and its TTL untouched and the next
                // refresh retries the whole fetch
                if let Err(err) = self.persist_state(&slot.config.name, &new_state) {
                    *write(&slot.last_attempt) = Some(FetchAttempt {
                        at: now,
                        error: Some(err.to_string()),
                    });
                    log::warn!(
                        "failed to persist snapshot for '{}', keeping previous: {err}",
                        slot.config.name
                    );
                    return Err(err);
                }

                *write(&slot.state) = new_state;
                *write(&slot.last_attempt) = Some(FetchAttempt { at: now, error: None });

                log::info!("'{}' refreshed, {} posts", slot.config.name, posts.len());
                Ok(RefreshResult::Refreshed(posts))
            }
            Err(err) => {
                let reason = err.to_string();
                *write(&slot.last_attempt) = Some(FetchAttempt {
                    at: now,
                    error: Some(reason.clone()),
                });

                log::warn!(
                    "fetch failed for '{}', keeping previous snapshot: {reason}",
                    slot.config.name
                );
                Err(StoreError::Fetch {
                    platform: slot.config.name.clone(),
                    reason,
                })
            }
        }
    }

    fn slot(&self, platform_name: &str) -> Result<&PlatformSlot, StoreError> {
        self.slots
            .iter()
            .find(|s| s.config.name == platform_name)
            .ok_or_else(|| StoreError::UnknownPlatform(platform_name.to_string()))
    }

    fn slot_is_stale(&self, slot: &PlatformSlot) -> bool {
        match read(&slot.state).last_fetched_at {
            Some(fetched_at) => Utc::now() - fetched_at >= self.ttl,
            None => true,
        }
    }

    fn persist_state(&self, platform_name: &str, state: &PlatformState) -> Result<(), StoreError> {
        let data =
            serde_json::to_vec_pretty(state).map_err(|err| StoreError::Snapshot(err.to_string()))?;
        self.storage.write(&snapshot_ident(platform_name), &data)?;
        Ok(())
    }
}

/// Snapshot filename for a platform, name slugged to stay filesystem-safe.
fn snapshot_ident(platform_name: &str) -> String {
    let slug: String = platform_name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("posts-{slug}.json")
}

fn load_snapshot(storage: &dyn StorageManager, platform_name: &str) -> PlatformState {
    let ident = snapshot_ident(platform_name);
    if !storage.exists(&ident) {
        return PlatformState::default();
    }

    match storage
        .read(&ident)
        .map_err(|err| err.to_string())
        .and_then(|data| serde_json::from_slice(&data).map_err(|err| err.to_string()))
    {
        Ok(state) => state,
        Err(err) => {
            log::warn!("discarding unreadable snapshot for '{platform_name}': {err}");
            PlatformState::default()
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
