use crate::{SmartpickError, SmartpickResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level configuration, usually read from `smartpick.toml`.
///
/// Every section and field is optional; missing values fall back to the
/// defaults below. Relative file paths are resolved against `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartpickConfig {
    /// Directory relative file paths are resolved against.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Vector store section.
    #[serde(default)]
    pub store: StoreConfig,
    /// Semantic cache section.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Two-stage retrieval section.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// Persistent vector store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Vector log file.
    #[serde(default = "default_store_file")]
    pub file: PathBuf,
    /// Fixed embedding dimension of the store.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Tag table used by stage-1 filtering.
    #[serde(default = "default_tag_file")]
    pub tag_file: PathBuf,
}

/// Semantic cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Keyword index document.
    #[serde(default = "default_index_file")]
    pub index_file: PathBuf,
    /// Payload document.
    #[serde(default = "default_payload_file")]
    pub payload_file: PathBuf,
    /// Matches scoring below this are ignored.
    #[serde(default)]
    pub min_score: f64,
    /// Upper bound on matches considered per lookup.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Optional vocabulary TOML; the built-in tablet vocabulary is used when absent.
    #[serde(default)]
    pub vocabulary: Option<PathBuf>,
}

/// Two-stage retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Maximum number of stage-1 candidates handed to the vector stage.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    /// Keywords whose weight is multiplied by `must_have_boost`.
    #[serde(default = "default_must_have")]
    pub must_have: Vec<String>,
    /// Multiplier for must-have keywords.
    #[serde(default = "default_must_have_boost")]
    pub must_have_boost: f32,
    /// Documents published longer ago than this are excluded.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
    /// Number of ranked documents returned by the vector stage.
    #[serde(default = "default_k")]
    pub k: usize,
}

impl Default for SmartpickConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            store: StoreConfig::default(),
            cache: CacheConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            file: default_store_file(),
            dimension: default_dimension(),
            tag_file: default_tag_file(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            index_file: default_index_file(),
            payload_file: default_payload_file(),
            min_score: 0.0,
            max_results: default_max_results(),
            vocabulary: None,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_limit: default_candidate_limit(),
            must_have: default_must_have(),
            must_have_boost: default_must_have_boost(),
            max_age_days: default_max_age_days(),
            k: default_k(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_store_file() -> PathBuf {
    PathBuf::from("vectors.jsonl")
}
fn default_tag_file() -> PathBuf {
    PathBuf::from("tags.json")
}
fn default_dimension() -> usize {
    256
}
fn default_index_file() -> PathBuf {
    PathBuf::from("keyword_index.json")
}
fn default_payload_file() -> PathBuf {
    PathBuf::from("payloads.json")
}
fn default_max_results() -> usize {
    10
}
fn default_candidate_limit() -> usize {
    50
}
fn default_must_have() -> Vec<String> {
    vec!["태블릿".to_string()]
}
fn default_must_have_boost() -> f32 {
    6.0
}
fn default_max_age_days() -> i64 {
    730
}
fn default_k() -> usize {
    5
}

impl SmartpickConfig {
    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml_str(s: &str) -> SmartpickResult<Self> {
        let config: SmartpickConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML configuration file.
    pub fn load(path: &Path) -> SmartpickResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SmartpickError::Config(format!(
                "Failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        let config = Self::from_toml_str(&raw)?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Resolve a configured path: absolute paths pass through, relative ones
    /// are joined onto `data_dir`.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    /// Reject values no store or matcher can work with.
    pub fn validate(&self) -> SmartpickResult<()> {
        if self.store.dimension == 0 {
            return Err(SmartpickError::Config(
                "store.dimension must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.cache.min_score) {
            return Err(SmartpickError::Config(format!(
                "cache.min_score must be within 0.0..=1.0, got {}",
                self.cache.min_score
            )));
        }
        if self.cache.max_results == 0 || self.retrieval.k == 0 {
            return Err(SmartpickError::Config(
                "cache.max_results and retrieval.k must be at least 1".to_string(),
            ));
        }
        if self.retrieval.must_have_boost < 1.0 {
            return Err(SmartpickError::Config(format!(
                "retrieval.must_have_boost must be >= 1.0, got {}",
                self.retrieval.must_have_boost
            )));
        }
        Ok(())
    }
}
