//! Configuration module for the matching core.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `RC_` and use double underscores
//! to separate nested levels:
//! - `RC_MATCHING__MIN_THRESHOLD=0.3` sets `matching.min_threshold`
//! - `RC_BATCH__WORKERS=8` sets `batch.workers`
//! - `RC_NOTIFICATION__BACKEND_URL=https://api.example.com` sets `notification.backend_url`

use crate::error::{MatchError, MatchResult};
use crate::types::{Tier, VectorKind};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = ".reciprocity";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Snapshot file holding accounts, vectors, matches and feedback
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub matching: MatchingConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub feedback: FeedbackConfig,

    #[serde(default)]
    pub notification: NotificationConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Local ONNX model through fastembed
    Fastembed,
    /// Deterministic feature hashing, no model download
    Hashing,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_backend")]
    pub backend: EmbeddingBackend,

    /// fastembed model name
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Folded into every cache key; bump it to invalidate cached vectors
    #[serde(default = "default_model_version")]
    pub model_version: String,

    /// Output dimension of the hashing backend
    #[serde(default = "default_hashing_dimension")]
    pub hashing_dimension: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Eviction {
    Lru,
    Fifo,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    /// Entries kept by the in-process cache
    #[serde(default = "default_local_capacity")]
    pub local_capacity: usize,

    #[serde(default = "default_eviction")]
    pub eviction: Eviction,

    /// Shared cache TTL in seconds (default: 7 days)
    #[serde(default = "default_shared_ttl_secs")]
    pub shared_ttl_secs: u64,

    #[serde(default = "default_true")]
    pub shared_enabled: bool,
}

/// Score breakpoints, each the inclusive lower bound of its tier.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct TierBreakpoints {
    #[serde(default = "default_fair")]
    pub fair: f64,
    #[serde(default = "default_good")]
    pub good: f64,
    #[serde(default = "default_excellent")]
    pub excellent: f64,
}

/// Relative weight per dimension.
///
/// The requirements/offerings cross dimension uses the larger of its two
/// weights. A zero weight removes the dimension from scoring.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct WeightTable {
    #[serde(default)]
    pub requirements: f64,
    #[serde(default)]
    pub offerings: f64,
    #[serde(default)]
    pub skills: f64,
    #[serde(default)]
    pub industry: f64,
    #[serde(default)]
    pub stage: f64,
    #[serde(default)]
    pub culture: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MatchingConfig {
    /// Candidates below this aggregate score are left out of ranked results
    #[serde(default = "default_min_threshold")]
    pub min_threshold: f64,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default)]
    pub tiers: TierBreakpoints,

    #[serde(default)]
    pub weights: WeightTable,

    /// Dimensions a candidate must clear `required_floor` on, when present
    #[serde(default = "default_required")]
    pub required: Vec<VectorKind>,

    #[serde(default = "default_required_floor")]
    pub required_floor: f64,

    /// Dimensions at or above this similarity are named in explanations
    #[serde(default = "default_highlight_floor")]
    pub highlight_floor: f64,

    /// Ask the text generator to polish template explanations
    #[serde(default = "default_false")]
    pub polish_explanations: bool,

    /// Longest wait for one polished explanation before the template is used
    #[serde(default = "default_polish_timeout_ms")]
    pub polish_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BatchConfig {
    /// Concurrent phase 1 / phase 2 tasks
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Attempts per user per phase before the user is skipped
    #[serde(default = "default_task_attempts")]
    pub task_attempts: u32,

    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// New pairs a single dirty user may contribute to one batch
    #[serde(default = "default_max_pairs_per_user")]
    pub max_pairs_per_user: usize,

    /// Send the batch webhook even when no new pairs were found
    #[serde(default = "default_false")]
    pub notify_empty: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FeedbackConfig {
    #[serde(default = "default_positive_step")]
    pub positive_step: f32,

    #[serde(default = "default_negative_step")]
    pub negative_step: f32,

    /// Upper bound on any single nudge after intensity scaling
    #[serde(default = "default_max_step")]
    pub max_step: f32,

    /// Multiplier for "very" grades
    #[serde(default = "default_intensity")]
    pub intensity_multiplier: f32,

    /// Adjustments remembered per user
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// On positive feedback also move the subject's requirements toward the
    /// author's offerings, at half the step
    #[serde(default)]
    pub adjust_both_users: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotificationConfig {
    /// Backend receiving webhooks. When unset, deliveries are only recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_url: Option<String>,

    /// Sent as `X-API-KEY`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_delivery_attempts")]
    pub max_attempts: u32,

    /// Base delay, doubled after every failed attempt
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// HTTP server bind address
    #[serde(default = "default_bind_address")]
    pub bind: String,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_state_path() -> PathBuf {
    PathBuf::from(".reciprocity/state.json")
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_backend() -> EmbeddingBackend {
    EmbeddingBackend::Fastembed
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_model_version() -> String {
    "all-minilm-l6-v2@1".to_string()
}
fn default_hashing_dimension() -> usize {
    256
}
fn default_local_capacity() -> usize {
    1000
}
fn default_eviction() -> Eviction {
    Eviction::Lru
}
fn default_shared_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}
fn default_fair() -> f64 {
    0.5
}
fn default_good() -> f64 {
    0.65
}
fn default_excellent() -> f64 {
    0.8
}
fn default_min_threshold() -> f64 {
    0.5
}
fn default_top_k() -> usize {
    10
}
fn default_required() -> Vec<VectorKind> {
    vec![VectorKind::Requirements, VectorKind::Offerings]
}
fn default_required_floor() -> f64 {
    0.3
}
fn default_highlight_floor() -> f64 {
    0.7
}
fn default_polish_timeout_ms() -> u64 {
    2000
}
fn default_workers() -> usize {
    num_cpus::get()
}
fn default_task_attempts() -> u32 {
    2
}
fn default_task_timeout_ms() -> u64 {
    30_000
}
fn default_retry_backoff_ms() -> u64 {
    200
}
fn default_max_pairs_per_user() -> usize {
    10
}
fn default_positive_step() -> f32 {
    0.05
}
fn default_negative_step() -> f32 {
    0.03
}
fn default_max_step() -> f32 {
    0.1
}
fn default_intensity() -> f32 {
    1.5
}
fn default_history_limit() -> usize {
    50
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_delivery_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    500
}
fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            state_path: default_state_path(),
            debug: false,
            embedding: EmbeddingConfig::default(),
            cache: CacheConfig::default(),
            matching: MatchingConfig::default(),
            batch: BatchConfig::default(),
            feedback: FeedbackConfig::default(),
            notification: NotificationConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            model: default_embedding_model(),
            model_version: default_model_version(),
            hashing_dimension: default_hashing_dimension(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_capacity: default_local_capacity(),
            eviction: default_eviction(),
            shared_ttl_secs: default_shared_ttl_secs(),
            shared_enabled: true,
        }
    }
}

impl Default for TierBreakpoints {
    fn default() -> Self {
        Self {
            fair: default_fair(),
            good: default_good(),
            excellent: default_excellent(),
        }
    }
}

impl TierBreakpoints {
    pub fn tier_for(&self, score: f64) -> Tier {
        if score >= self.excellent {
            Tier::Excellent
        } else if score >= self.good {
            Tier::Good
        } else if score >= self.fair {
            Tier::Fair
        } else {
            Tier::Poor
        }
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            requirements: 0.5,
            offerings: 0.5,
            skills: 0.2,
            industry: 0.15,
            stage: 0.1,
            culture: 0.05,
        }
    }
}

impl WeightTable {
    /// All weights zero; callers set the dimensions they care about.
    pub fn empty() -> Self {
        Self {
            requirements: 0.0,
            offerings: 0.0,
            skills: 0.0,
            industry: 0.0,
            stage: 0.0,
            culture: 0.0,
        }
    }

    pub fn get(&self, kind: VectorKind) -> f64 {
        match kind {
            VectorKind::Requirements => self.requirements,
            VectorKind::Offerings => self.offerings,
            VectorKind::Skills => self.skills,
            VectorKind::Industry => self.industry,
            VectorKind::Stage => self.stage,
            VectorKind::Culture => self.culture,
        }
    }

    pub fn with(mut self, kind: VectorKind, weight: f64) -> Self {
        let slot = match kind {
            VectorKind::Requirements => &mut self.requirements,
            VectorKind::Offerings => &mut self.offerings,
            VectorKind::Skills => &mut self.skills,
            VectorKind::Industry => &mut self.industry,
            VectorKind::Stage => &mut self.stage,
            VectorKind::Culture => &mut self.culture,
        };
        *slot = weight;
        self
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_threshold: default_min_threshold(),
            top_k: default_top_k(),
            tiers: TierBreakpoints::default(),
            weights: WeightTable::default(),
            required: default_required(),
            required_floor: default_required_floor(),
            highlight_floor: default_highlight_floor(),
            polish_explanations: false,
            polish_timeout_ms: default_polish_timeout_ms(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            task_attempts: default_task_attempts(),
            task_timeout_ms: default_task_timeout_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_pairs_per_user: default_max_pairs_per_user(),
            notify_empty: false,
        }
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            positive_step: default_positive_step(),
            negative_step: default_negative_step(),
            max_step: default_max_step(),
            intensity_multiplier: default_intensity(),
            history_limit: default_history_limit(),
            adjust_both_users: false,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            api_key: None,
            timeout_secs: default_request_timeout_secs(),
            max_attempts: default_delivery_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
        }
    }
}

fn env_provider() -> Env {
    // Double underscore separates nested levels, single underscores stay
    Env::prefixed("RC_").map(|key| key.as_str().to_lowercase().replace("__", ".").into())
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        Self::figment(config_path).extract().map_err(Box::new)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(env_provider())
    }

    /// Find the settings file by looking for a .reciprocity directory
    /// from the current directory up to the root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join("settings.toml"))
    }

    /// Get the workspace root directory (where .reciprocity is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Check if configuration is properly initialized
    pub fn check_init() -> Result<(), String> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        if !config_path.exists() {
            return Err("No configuration file found".to_string());
        }

        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| format!("Cannot read configuration file: {e}"))?;
        toml::from_str::<Settings>(&content).map_err(|e| {
            format!(
                "Configuration file is corrupted: {e}\nRun 'reciprocity init --force' to regenerate."
            )
        })?;

        Ok(())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> MatchResult<()> {
        let invalid = |reason: String| Err(MatchError::Config { reason });
        let unit = |value: f64| (0.0..=1.0).contains(&value);

        let tiers = &self.matching.tiers;
        if ![tiers.fair, tiers.good, tiers.excellent].into_iter().all(unit) {
            return invalid(format!(
                "tier breakpoints must lie in [0, 1], got fair={} good={} excellent={}",
                tiers.fair, tiers.good, tiers.excellent
            ));
        }
        if !(tiers.fair < tiers.good && tiers.good < tiers.excellent) {
            return invalid(format!(
                "tier breakpoints must be strictly increasing, got fair={} good={} excellent={}",
                tiers.fair, tiers.good, tiers.excellent
            ));
        }

        let weights = &self.matching.weights;
        if let Some(kind) = VectorKind::ALL
            .into_iter()
            .find(|kind| weights.get(*kind) < 0.0 || weights.get(*kind).is_nan())
        {
            return invalid(format!("weight for {kind} must be non-negative"));
        }
        if VectorKind::ALL.into_iter().all(|kind| weights.get(kind) == 0.0) {
            return invalid("at least one dimension weight must be positive".to_string());
        }

        for (name, value) in [
            ("matching.min_threshold", self.matching.min_threshold),
            ("matching.required_floor", self.matching.required_floor),
            ("matching.highlight_floor", self.matching.highlight_floor),
        ] {
            if !unit(value) {
                return invalid(format!("{name} must lie in [0, 1], got {value}"));
            }
        }

        if self.matching.top_k == 0 {
            return invalid("matching.top_k must be at least 1".to_string());
        }
        if self.batch.workers == 0 || self.batch.task_attempts == 0 {
            return invalid("batch.workers and batch.task_attempts must be at least 1".to_string());
        }
        if self.notification.max_attempts == 0 {
            return invalid("notification.max_attempts must be at least 1".to_string());
        }
        if self.cache.local_capacity == 0 {
            return invalid("cache.local_capacity must be at least 1".to_string());
        }
        if self.embedding.hashing_dimension == 0 {
            return invalid("embedding.hashing_dimension must be at least 1".to_string());
        }

        let feedback = &self.feedback;
        if !(feedback.positive_step >= 0.0
            && feedback.negative_step >= 0.0
            && feedback.max_step > 0.0
            && feedback.max_step <= 1.0)
        {
            return invalid(
                "feedback steps must be non-negative and max_step must lie in (0, 1]".to_string(),
            );
        }

        Ok(())
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        Self::init_config_file_at(Path::new("."), force)
    }

    /// Same as [`Settings::init_config_file`] rooted at `root`.
    pub fn init_config_file_at(
        root: &Path,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# Reciprocity Configuration File

# Version of the configuration schema
version = 1

# Snapshot holding accounts, vectors, matches and feedback
state_path = ".reciprocity/state.json"

# Global debug mode
debug = false

[embedding]
# "fastembed" (local ONNX model) or "hashing" (deterministic, no download)
backend = "fastembed"
model = "AllMiniLML6V2"

# Part of every cache key. Change it when the model changes.
model_version = "all-minilm-l6-v2@1"

# Only used by the hashing backend
hashing_dimension = 256

[cache]
# In-process cache entries and eviction policy ("lru" or "fifo")
local_capacity = 1000
eviction = "lru"

# Shared cache TTL in seconds (7 days)
shared_ttl_secs = 604800
shared_enabled = true

[matching]
# Ranked results drop candidates below this score
min_threshold = 0.5
top_k = 10

# Candidates scoring below required_floor on a required dimension are excluded
required = ["requirements", "offerings"]
required_floor = 0.3

# Dimensions at or above this similarity are named in explanations
highlight_floor = 0.7
polish_explanations = false
polish_timeout_ms = 2000

[matching.tiers]
fair = 0.5
good = 0.65
excellent = 0.8

# Weights are re-normalized over the dimensions both users have
[matching.weights]
requirements = 0.5
offerings = 0.5
skills = 0.2
industry = 0.15
stage = 0.1
culture = 0.05

[batch]
# Concurrent tasks in phases 1 and 2 (defaults to CPU count)
# workers = {}
task_attempts = 2
task_timeout_ms = 30000
retry_backoff_ms = 200
max_pairs_per_user = 10
notify_empty = false

[feedback]
positive_step = 0.05
negative_step = 0.03
max_step = 0.1
intensity_multiplier = 1.5
history_limit = 50
adjust_both_users = false

[notification]
# backend_url = "https://backend.example.com"
# api_key = "..."
timeout_secs = 30
max_attempts = 3
backoff_ms = 500

[server]
bind = "127.0.0.1:8080"
"#,
            num_cpus::get()
        );

        std::fs::write(&config_path, template)?;

        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.state_path, PathBuf::from(".reciprocity/state.json"));
        assert_eq!(settings.matching.min_threshold, 0.5);
        assert_eq!(settings.matching.top_k, 10);
        assert_eq!(settings.cache.local_capacity, 1000);
        assert_eq!(settings.cache.shared_ttl_secs, 604_800);
        assert_eq!(settings.notification.max_attempts, 3);
        assert!(settings.batch.workers > 0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
debug = true

[matching]
min_threshold = 0.3
required = ["requirements"]

[matching.weights]
requirements = 0.6
skills = 0.4

[cache]
eviction = "fifo"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert!(settings.debug);
        assert_eq!(settings.matching.min_threshold, 0.3);
        assert_eq!(settings.matching.required, vec![VectorKind::Requirements]);
        assert_eq!(settings.matching.weights.get(VectorKind::Requirements), 0.6);
        assert_eq!(settings.matching.weights.get(VectorKind::Skills), 0.4);
        assert_eq!(settings.cache.eviction, Eviction::Fifo);
        // Untouched sections keep their defaults
        assert_eq!(settings.matching.tiers, TierBreakpoints::default());
        assert_eq!(settings.feedback.history_limit, 50);
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.batch.workers = 2;
        settings.notification.backend_url = Some("http://localhost:9000".to_string());

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.batch.workers, 2);
        assert_eq!(
            loaded.notification.backend_url.as_deref(),
            Some("http://localhost:9000")
        );
    }

    #[test]
    fn test_template_parses_and_validates() {
        let temp_dir = TempDir::new().unwrap();
        let path = Settings::init_config_file_at(temp_dir.path(), false).unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.matching.weights, WeightTable::default());

        assert!(Settings::init_config_file_at(temp_dir.path(), false).is_err());
        assert!(Settings::init_config_file_at(temp_dir.path(), true).is_ok());
    }

    #[test]
    fn test_threshold_env_override() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[matching]\nmin_threshold = 0.7\n").unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("RC_MATCHING__MIN_THRESHOLD", "0.3");
            jail.set_env("RC_BATCH__MAX_PAIRS_PER_USER", "4");
            let settings = Settings::load_from(&config_path).map_err(|e| *e)?;
            assert_eq!(settings.matching.min_threshold, 0.3);
            assert_eq!(settings.batch.max_pairs_per_user, 4);
            Ok(())
        });
    }

    #[test]
    fn test_validate_rejects_bad_tiers() {
        let mut settings = Settings::default();
        settings.matching.tiers.good = 0.9;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("strictly increasing"));

        let mut settings = Settings::default();
        settings.matching.tiers.excellent = 1.2;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_weights() {
        let mut settings = Settings::default();
        settings.matching.weights = WeightTable::empty();
        assert!(settings.validate().is_err());

        settings.matching.weights = WeightTable::empty()
            .with(VectorKind::Requirements, 1.0)
            .with(VectorKind::Culture, -0.1);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_tier_breakpoints_are_inclusive() {
        let tiers = TierBreakpoints::default();
        assert_eq!(tiers.tier_for(0.8), Tier::Excellent);
        assert_eq!(tiers.tier_for(0.79), Tier::Good);
        assert_eq!(tiers.tier_for(0.65), Tier::Good);
        assert_eq!(tiers.tier_for(0.5), Tier::Fair);
        assert_eq!(tiers.tier_for(0.49), Tier::Poor);
    }
}
