//! Test doubles shared across module and integration tests.
//!
//! Clones share their counters, so one mock can back several platform
//! slots and still report global call and concurrency figures.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::app::App;
use crate::config::{Config, PlatformConfig, PlatformKind};
use crate::semantic::{EmbeddingError, EmbeddingProvider, TextEncoder};
use crate::sources::{FetchError, RawPost, SourceAdapter};
use crate::storage::BackendLocal;
use crate::store::PostStore;

/// Substack platform entries named after `names`, everything else default.
pub fn test_config(names: &[&str]) -> Config {
    Config {
        platforms: names
            .iter()
            .map(|name| PlatformConfig {
                platform: PlatformKind::Substack,
                url: format!("https://{name}.substack.com"),
                name: name.to_string(),
            })
            .collect(),
        ..Default::default()
    }
}

/// Full application over mock adapters and a mock encoder, persisting
/// into `dir`. Adapters pair with `config.platforms` in order.
pub fn build_app(
    dir: &tempfile::TempDir,
    config: Config,
    adapters: Vec<MockAdapter>,
    encoder: MockEncoder,
) -> App {
    let storage = Box::new(BackendLocal::new(dir.path().to_str().unwrap()).unwrap());
    let boxed = adapters
        .into_iter()
        .map(|adapter| Box::new(adapter) as Box<dyn SourceAdapter>)
        .collect();
    let store = Arc::new(PostStore::with_adapters(&config, storage, boxed));
    let provider = Arc::new(
        EmbeddingProvider::with_encoder(Box::new(encoder), dir.path().to_path_buf()).unwrap(),
    );
    App::with_parts(config, store, provider)
}

/// Canned-feed adapter with call counting, failure injection and an
/// optional artificial delay.
#[derive(Clone)]
pub struct MockAdapter {
    posts: Arc<Vec<RawPost>>,
    delay_ms: u64,
    calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockAdapter {
    /// One post per entry, each with a distinct url and a descending
    /// publication date.
    pub fn with_posts(contents: &[&str]) -> Self {
        let posts = contents
            .iter()
            .enumerate()
            .map(|(i, content)| RawPost {
                title: format!("Post {content}"),
                url: format!("https://example.com/p/{}", content.replace(' ', "-")),
                published_at: Utc.timestamp_opt(1_700_000_000 - i as i64 * 3600, 0).single(),
                content: content.to_string(),
            })
            .collect();

        Self {
            posts: Arc::new(posts),
            delay_ms: 0,
            calls: Arc::new(AtomicUsize::new(0)),
            failing: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for MockAdapter {
    async fn fetch(&self, _url: &str, max_posts: usize) -> Result<Vec<RawPost>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::Feed("simulated fetch failure".to_string()));
        }

        Ok(self.posts.iter().take(max_posts).cloned().collect())
    }
}

/// Deterministic encoder: named texts map through a vector table, anything
/// else falls back to a byte-sum vector. Counts actual model invocations.
#[derive(Clone)]
pub struct MockEncoder {
    dims: usize,
    table: Arc<Vec<(String, Vec<f32>)>>,
    fail_on: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl MockEncoder {
    pub fn new() -> Self {
        Self {
            dims: 2,
            table: Arc::new(Vec::new()),
            fail_on: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Encoder that answers with `vector` for any text containing `key`.
    pub fn with_vectors(pairs: &[(&str, &[f32])]) -> Self {
        let dims = pairs.first().map(|(_, v)| v.len()).unwrap_or(2);
        let table = pairs
            .iter()
            .map(|(key, vector)| (key.to_string(), vector.to_vec()))
            .collect();
        Self {
            dims,
            table: Arc::new(table),
            fail_on: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make any text containing `key` fail to encode.
    pub fn failing_on(mut self, key: &str) -> Self {
        self.fail_on = Some(key.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextEncoder for MockEncoder {
    fn model_name(&self) -> &str {
        "mock-encoder"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(key) = &self.fail_on {
            if text.contains(key.as_str()) {
                return Err(EmbeddingError::EncodeFailed(
                    "simulated encoder failure".to_string(),
                ));
            }
        }

        for (key, vector) in self.table.iter() {
            if text.contains(key.as_str()) {
                return Ok(vector.clone());
            }
        }

        // arbitrary but stable direction derived from the text bytes
        let sum: u32 = text.bytes().map(u32::from).sum();
        let angle = (sum % 360) as f32 * std::f32::consts::PI / 180.0;
        let mut vector = vec![0.1; self.dims];
        vector[0] = angle.cos();
        if self.dims > 1 {
            vector[1] = angle.sin();
        }
        Ok(vector)
    }
}
