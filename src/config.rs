use crate::storage::{self, StorageManager};
use serde::{Deserialize, Serialize};

/// Default cap on posts fetched per platform per refresh.
const DEFAULT_MAX_POSTS: usize = 100;
/// Default snapshot TTL: one week.
const DEFAULT_TTL_MINUTES: i64 = 7 * 24 * 60;
/// Default number of results returned by search.
const DEFAULT_TOP_N: usize = 10;
/// Default ceiling on concurrent platform refreshes.
const DEFAULT_REFRESH_CONCURRENCY: usize = 4;
/// Default embedding model, matches what the corpus was built with.
const DEFAULT_SEMANTIC_MODEL: &str = "all-MiniLM-L6-v2";
/// Default model download timeout in seconds.
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config is malformed: {0}")]
    Malformed(String),

    #[error("max_posts must be greater than 0")]
    InvalidMaxPosts,

    #[error("ttl_minutes must be greater than 0")]
    InvalidTtl,

    #[error("default_top_n must be greater than 0")]
    InvalidTopN,

    #[error("min_similarity must be within [-1.0, 1.0], got {0}")]
    InvalidMinSimilarity(f32),

    #[error("refresh_concurrency must be greater than 0")]
    InvalidConcurrency,

    #[error("semantic.download_timeout_secs must be greater than 0")]
    InvalidDownloadTimeout,

    #[error("platform '{name}' has a malformed url: {url}")]
    InvalidPlatformUrl { name: String, url: String },

    #[error("duplicate platform name '{0}'")]
    DuplicatePlatform(String),

    #[error("unknown platform '{0}'")]
    UnknownPlatform(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Supported blogging platform types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Substack,
    Medium,
}

impl std::fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformKind::Substack => write!(f, "substack"),
            PlatformKind::Medium => write!(f, "medium"),
        }
    }
}

/// One configured blog to ingest.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub platform: PlatformKind,
    pub url: String,
    /// Display name, also the key used for snapshots and post ids.
    pub name: String,
}

/// Configuration for embedding generation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SemanticConfig {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_semantic_model")]
    pub model: String,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_SEMANTIC_MODEL.to_string(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

fn default_semantic_model() -> String {
    DEFAULT_SEMANTIC_MODEL.to_string()
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_max_posts() -> usize {
    DEFAULT_MAX_POSTS
}

fn default_ttl_minutes() -> i64 {
    DEFAULT_TTL_MINUTES
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

fn default_refresh_concurrency() -> usize {
    DEFAULT_REFRESH_CONCURRENCY
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub platforms: Vec<PlatformConfig>,

    #[serde(default = "default_max_posts")]
    pub max_posts: usize,

    /// Minutes before a platform snapshot is considered stale.
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: i64,

    #[serde(default = "default_top_n")]
    pub default_top_n: usize,

    /// Minimum cosine similarity for search results [-1.0, 1.0].
    #[serde(default)]
    pub min_similarity: f32,

    #[serde(default = "default_refresh_concurrency")]
    pub refresh_concurrency: usize,

    #[serde(default)]
    pub semantic: SemanticConfig,

    #[serde(skip_serializing, skip_deserializing)]
    pub(crate) base_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platforms: Vec::new(),
            max_posts: DEFAULT_MAX_POSTS,
            ttl_minutes: DEFAULT_TTL_MINUTES,
            default_top_n: DEFAULT_TOP_N,
            min_similarity: 0.0,
            refresh_concurrency: DEFAULT_REFRESH_CONCURRENCY,
            semantic: SemanticConfig::default(),
            base_path: String::new(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_posts == 0 {
            return Err(ConfigError::InvalidMaxPosts);
        }

        if self.ttl_minutes <= 0 {
            return Err(ConfigError::InvalidTtl);
        }

        if self.default_top_n == 0 {
            return Err(ConfigError::InvalidTopN);
        }

        if !(-1.0..=1.0).contains(&self.min_similarity) {
            return Err(ConfigError::InvalidMinSimilarity(self.min_similarity));
        }

        if self.refresh_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }

        if self.semantic.download_timeout_secs == 0 {
            return Err(ConfigError::InvalidDownloadTimeout);
        }

        let mut seen = std::collections::HashSet::new();
        for platform in &self.platforms {
            if url::Url::parse(&platform.url).is_err() {
                return Err(ConfigError::InvalidPlatformUrl {
                    name: platform.name.clone(),
                    url: platform.url.clone(),
                });
            }

            if !seen.insert(platform.name.as_str()) {
                return Err(ConfigError::DuplicatePlatform(platform.name.clone()));
            }
        }

        Ok(())
    }

    pub fn load_with(base_path: &str) -> Result<Self, ConfigError> {
        let store = storage::BackendLocal::new(base_path)?;

        // create new if does not exist
        if !store.exists("config.yaml") {
            let default = serde_yml::to_string(&Self::default())
                .map_err(|err| ConfigError::Malformed(err.to_string()))?;
            store.write("config.yaml", default.as_bytes())?;
        }

        let config_str = String::from_utf8(store.read("config.yaml")?)
            .map_err(|err| ConfigError::Malformed(err.to_string()))?;
        let mut config: Self = serde_yml::from_str(&config_str)
            .map_err(|err| ConfigError::Malformed(err.to_string()))?;

        config.base_path = base_path.to_string();

        config.validate()?;

        // resave in case config version needs an upgrade
        let resaved = serde_yml::to_string(&config)
            .map_err(|err| ConfigError::Malformed(err.to_string()))?;
        if config_str != resaved {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let store = storage::BackendLocal::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)
            .map_err(|err| ConfigError::Malformed(err.to_string()))?;
        store.write("config.yaml", config_str.as_bytes())?;
        Ok(())
    }

    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.ttl_minutes)
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform(name: &str, url: &str) -> PlatformConfig {
        PlatformConfig {
            platform: PlatformKind::Substack,
            url: url.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.max_posts, 100);
        assert_eq!(config.default_top_n, 10);
        assert_eq!(config.ttl_minutes, 7 * 24 * 60);
    }

    #[test]
    fn test_rejects_zero_top_n() {
        let config = Config {
            default_top_n: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTopN)));
    }

    #[test]
    fn test_rejects_out_of_range_min_similarity() {
        let config = Config {
            min_similarity: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMinSimilarity(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_platform_url() {
        let config = Config {
            platforms: vec![platform("blog", "not a url")],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPlatformUrl { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_platform_names() {
        let config = Config {
            platforms: vec![
                platform("blog", "https://a.substack.com"),
                platform("blog", "https://b.substack.com"),
            ],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicatePlatform(_))
        ));
    }

    #[test]
    fn test_load_with_creates_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_str().unwrap();

        let config = Config::load_with(base).unwrap();
        assert!(config.platforms.is_empty());
        assert!(dir.path().join("config.yaml").exists());

        // second load parses what the first one wrote
        let again = Config::load_with(base).unwrap();
        assert_eq!(again.max_posts, config.max_posts);
    }

    #[test]
    fn test_yaml_roundtrip_keeps_platforms() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_str().unwrap();

        let mut config = Config::load_with(base).unwrap();
        config.platforms = vec![platform("essays", "https://essays.substack.com")];
        config.save().unwrap();

        let back = Config::load_with(base).unwrap();
        assert_eq!(back.platforms.len(), 1);
        assert_eq!(back.platforms[0].name, "essays");
    }
}
