use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{GravityError, Result};

/// Top-level configuration for the Gravity orchestrator.
///
/// Loaded from `~/.gravity/config.toml` by default. Each section corresponds
/// to one bounded context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GravityConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub actions: ActionsConfig,
}

impl GravityConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: GravityConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject configurations that would fail later at the first I/O call.
    pub fn validate(&self) -> Result<()> {
        let c = &self.chunking;
        if c.leaf_size == 0 {
            return Err(GravityError::Config("chunking.leaf_size must be at least 1".into()));
        }
        if c.overlap >= c.leaf_size {
            return Err(GravityError::Config(format!(
                "chunking.overlap ({}) must be smaller than chunking.leaf_size ({})",
                c.overlap, c.leaf_size
            )));
        }
        if c.max_depth == 0 {
            return Err(GravityError::Config("chunking.max_depth must be at least 1".into()));
        }
        if c.fan_out < 2 {
            return Err(GravityError::Config("chunking.fan_out must be at least 2".into()));
        }
        if self.vector.dimension == 0 {
            return Err(GravityError::Config("vector.dimension must be positive".into()));
        }
        if self.vector.collection.trim().is_empty() {
            return Err(GravityError::Config("vector.collection must not be empty".into()));
        }
        if !matches!(self.vector.metric.as_str(), "cosine" | "dot" | "euclidean") {
            return Err(GravityError::Config(format!(
                "vector.metric must be cosine, dot or euclidean (got {})",
                self.vector.metric
            )));
        }
        let t = self.classifier.confidence_threshold;
        if !(0.0..=1.0).contains(&t) {
            return Err(GravityError::Config(format!(
                "classifier.confidence_threshold must be within [0, 1] (got {})",
                t
            )));
        }
        if self.retrieval.source_timeout_ms == 0 {
            return Err(GravityError::Config("retrieval.source_timeout_ms must be positive".into()));
        }
        if self.retrieval.recency_half_life_hours <= 0.0 {
            return Err(GravityError::Config(
                "retrieval.recency_half_life_hours must be positive".into(),
            ));
        }
        if self.actions.ttl_secs == 0 {
            return Err(GravityError::Config("actions.ttl_secs must be positive".into()));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// HTTP API port (bound on 127.0.0.1).
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            port: 3040,
        }
    }
}

/// Hierarchical chunking parameters (sizes in tokens).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub leaf_size: usize,
    pub overlap: usize,
    /// Deepest leaf level; the root is always level 0.
    pub max_depth: u32,
    /// Siblings grouped under one parent.
    pub fan_out: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            leaf_size: 256,
            overlap: 32,
            max_depth: 3,
            fan_out: 4,
        }
    }
}

/// Vector collection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub collection: String,
    pub dimension: usize,
    /// "cosine", "dot" or "euclidean".
    pub metric: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            collection: "knowledge".to_string(),
            dimension: 384,
            metric: "cosine".to_string(),
        }
    }
}

/// Intent classifier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Number of recent turns passed as context.
    pub context_turns: usize,
    /// Below this confidence the intent becomes a clarification.
    pub confidence_threshold: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            context_turns: 5,
            confidence_threshold: 0.5,
        }
    }
}

/// Federated retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub retrieval_k: usize,
    pub aggregation_k: usize,
    /// Per-source budget in milliseconds.
    pub source_timeout_ms: u64,
    pub recency_half_life_hours: f64,
    /// Ranked results kept after merging.
    pub max_results: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            retrieval_k: 5,
            aggregation_k: 20,
            source_timeout_ms: 2_500,
            recency_half_life_hours: 168.0,
            max_results: 8,
        }
    }
}

/// Pending action settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    /// Seconds a proposal stays confirmable.
    pub ttl_secs: u64,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self { ttl_secs: 900 }
    }
}
