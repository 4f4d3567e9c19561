//! Configuration for the screen session logger.

use crate::collector::CollectorConfig;
use crate::core::change::DEFAULT_DISTANCE_THRESHOLD;
use crate::core::classifier::{DEFAULT_TOP_K_APPS, DEFAULT_TOP_K_TEXT};
use crate::core::embedding::EMBEDDING_DIM;
use crate::core::recorder::{RecorderSettings, DEFAULT_JPEG_QUALITY};
use crate::store::DuplicatePolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const APP_DIR: &str = "screen-session-logger";

/// Main configuration for the logger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory for the database, transparency stats and scratch files
    pub data_path: PathBuf,

    /// SQLite database holding finalized sessions
    pub db_path: PathBuf,

    /// Directory for exports
    pub export_path: PathBuf,

    /// Label vocabulary file
    pub labels_path: PathBuf,

    /// Minimum embedding distance for a click to start a new session
    pub distance_threshold: f32,

    /// Embedding backend
    pub embedder: EmbedderBackend,

    /// Output size of the sketch backend; CLIP is fixed at 512
    pub embedding_dim: usize,

    /// Where downloaded model weights are cached
    pub model_cache_path: PathBuf,

    /// Applications contributing to the action vote
    pub top_k_apps: usize,

    /// Free-text labels reported per session
    pub top_k_text: usize,

    pub jpeg_quality: u8,

    /// Merge queue bound; `None` means unbounded
    pub queue_capacity: Option<usize>,

    /// Keystrokes kept per session; `None` means unbounded
    pub max_buffered_keys: Option<usize>,

    pub duplicate_policy: DuplicatePolicy,

    /// Deadline for one screen capture
    #[serde(rename = "capture_timeout_ms", with = "duration_ms")]
    pub capture_timeout: Duration,

    /// Custom capture command; `{out}` is replaced by the image path
    pub capture_command: Option<Vec<String>>,

    /// Which input sources to capture
    pub sources: SourceConfig,

    /// Whether collection is currently paused
    pub paused: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        Self {
            db_path: data_dir.join("screen_log.db"),
            export_path: data_dir.join("exports"),
            data_path: data_dir.clone(),
            labels_path: config_dir().join("labels.json"),
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            embedder: EmbedderBackend::default(),
            embedding_dim: EMBEDDING_DIM,
            model_cache_path: data_dir.join("models"),
            top_k_apps: DEFAULT_TOP_K_APPS,
            top_k_text: DEFAULT_TOP_K_TEXT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            queue_capacity: None,
            max_buffered_keys: Some(10_000),
            duplicate_policy: DuplicatePolicy::Ignore,
            capture_timeout: Duration::from_secs(5),
            capture_command: None,
            sources: SourceConfig::default(),
            paused: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(ConfigError::Parse)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        config_dir().join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)?;
        std::fs::create_dir_all(&self.data_path)?;
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Where the capture backend writes its scratch image.
    pub fn capture_scratch_path(&self) -> PathBuf {
        self.data_path.join("capture.png")
    }

    /// Scratch image handed to model backends that read from disk.
    pub fn embed_scratch_path(&self) -> PathBuf {
        self.data_path.join("embed.png")
    }

    /// Where transparency totals are persisted.
    pub fn transparency_path(&self) -> PathBuf {
        self.data_path.join("transparency.json")
    }

    /// Recorder tuning taken from this configuration.
    pub fn recorder_settings(&self) -> RecorderSettings {
        RecorderSettings {
            distance_threshold: self.distance_threshold,
            jpeg_quality: self.jpeg_quality,
            max_buffered_keys: self.max_buffered_keys,
        }
    }

    /// Which producers to start.
    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            capture_keyboard: self.sources.keyboard,
            capture_pointer: self.sources.mouse,
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Which embedding backend the recorder uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderBackend {
    /// Model-free luminance and trigram sketches
    #[default]
    Sketch,
    /// CLIP ViT-B/32; needs the `clip` cargo feature
    Clip,
}

/// Configuration for which input sources to capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub keyboard: bool,
    pub mouse: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            keyboard: true,
            mouse: true,
        }
    }
}

impl SourceConfig {
    /// Parse source configuration from a comma-separated string.
    pub fn from_csv(s: &str) -> Self {
        let sources: Vec<String> = s.split(',').map(|s| s.trim().to_lowercase()).collect();

        Self {
            keyboard: sources.iter().any(|s| s == "keyboard" || s == "all"),
            mouse: sources.iter().any(|s| s == "mouse" || s == "all"),
        }
    }

    /// Sessions are opened by clicks, so the mouse must be on.
    pub fn can_record(&self) -> bool {
        self.mouse
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("serialize error: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Serde support for a Duration stored as whole milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_config_parsing() {
        let config = SourceConfig::from_csv("keyboard,mouse");
        assert!(config.keyboard);
        assert!(config.mouse);

        let config = SourceConfig::from_csv("keyboard");
        assert!(config.keyboard);
        assert!(!config.mouse);
        assert!(!config.can_record());

        let config = SourceConfig::from_csv("all");
        assert!(config.keyboard);
        assert!(config.mouse);
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.distance_threshold, 0.01);
        assert_eq!(config.embedding_dim, 512);
        assert_eq!(config.embedder, EmbedderBackend::Sketch);
        assert_eq!(config.top_k_apps, 3);
        assert_eq!(config.top_k_text, 5);
        assert_eq!(config.jpeg_quality, 90);
        assert_eq!(config.queue_capacity, None);
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Ignore);
        assert_eq!(config.capture_timeout, Duration::from_secs(5));
        assert!(!config.paused);
        assert!(config.db_path.starts_with(&config.data_path));
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg").join("config.json");

        let mut config = Config::default();
        config.paused = true;
        config.queue_capacity = Some(64);
        config.duplicate_policy = DuplicatePolicy::Reject;
        config.capture_timeout = Duration::from_millis(1500);
        config.save_to(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"capture_timeout_ms\": 1500"));
        assert!(raw.contains("\"reject\""));

        let loaded = Config::load_from(&path).unwrap();
        assert!(loaded.paused);
        assert_eq!(loaded.queue_capacity, Some(64));
        assert_eq!(loaded.duplicate_policy, DuplicatePolicy::Reject);
        assert_eq!(loaded.capture_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"distance_threshold": 0.2}"#).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.distance_threshold, 0.2);
        assert_eq!(loaded.embedder, EmbedderBackend::Sketch);
        assert_eq!(loaded.top_k_apps, 3);
    }

    #[test]
    fn test_clip_backend_is_selectable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"embedder": "clip"}"#).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().embedder, EmbedderBackend::Clip);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("nope.json")).unwrap();
        assert!(!loaded.paused);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
    }
}
