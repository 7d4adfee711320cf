//! Runtime configuration.
//!
//! [`BookreelConfig`] is read from an optional JSON file, then environment
//! variables override individual fields:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `BOOKREEL_WORK_DIR` | `work_dir` |
//! | `BOOKREEL_CHUNK_SIZE` | `chunk_size` |
//! | `BOOKREEL_LOG_LEVEL` | `logging.level` |
//! | `BOOKREEL_FFMPEG` | `video.ffmpeg_binary` |
//! | `OPENAI_API_KEY`, then `SECRET_KEY` | `openai.api_key` |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::chunking::DEFAULT_CHUNK_SIZE;
use crate::cost::PriceTable;
use crate::errors::{BookreelError, Result};
use crate::retry::RetryPolicy;

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// OpenAI account and model selection.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API key. Never serialized.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Chat model used for scene analysis.
    #[serde(default = "default_analysis_model")]
    pub analysis_model: String,
    /// Image model.
    #[serde(default = "default_image_model")]
    pub image_model: String,
    /// Image dimensions.
    #[serde(default = "default_image_size")]
    pub image_size: String,
    /// Image quality.
    #[serde(default = "default_image_quality")]
    pub image_quality: String,
    /// Text-to-speech model.
    #[serde(default = "default_tts_model")]
    pub tts_model: String,
    /// Narration voice.
    #[serde(default = "default_voice")]
    pub voice: String,
    /// Speech-to-text model.
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_analysis_model() -> String {
    "gpt-4-1106-preview".to_string()
}

fn default_image_model() -> String {
    "dall-e-3".to_string()
}

fn default_image_size() -> String {
    "1024x1024".to_string()
}

fn default_image_quality() -> String {
    "standard".to_string()
}

fn default_tts_model() -> String {
    "tts-1".to_string()
}

fn default_voice() -> String {
    "alloy".to_string()
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    600
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            analysis_model: default_analysis_model(),
            image_model: default_image_model(),
            image_size: default_image_size(),
            image_quality: default_image_quality(),
            tts_model: default_tts_model(),
            voice: default_voice(),
            transcription_model: default_transcription_model(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("analysis_model", &self.analysis_model)
            .field("image_model", &self.image_model)
            .field("tts_model", &self.tts_model)
            .field("voice", &self.voice)
            .field("transcription_model", &self.transcription_model)
            .finish_non_exhaustive()
    }
}

/// Rendering settings for the ffmpeg compositor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConfig {
    /// ffmpeg executable name or path.
    #[serde(default = "default_ffmpeg_binary")]
    pub ffmpeg_binary: String,
    /// Output width in pixels; height keeps the image aspect ratio.
    #[serde(default = "default_video_width")]
    pub width: u32,
    /// Frames per second.
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Title font size.
    #[serde(default = "default_title_font_size")]
    pub title_font_size: u32,
    /// Caption font size.
    #[serde(default = "default_caption_font_size")]
    pub caption_font_size: u32,
    /// libx264 preset.
    #[serde(default = "default_preset")]
    pub preset: String,
}

fn default_ffmpeg_binary() -> String {
    "ffmpeg".to_string()
}

const fn default_video_width() -> u32 {
    1920
}

const fn default_fps() -> u32 {
    24
}

const fn default_title_font_size() -> u32 {
    70
}

const fn default_caption_font_size() -> u32 {
    48
}

fn default_preset() -> String {
    "ultrafast".to_string()
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            ffmpeg_binary: default_ffmpeg_binary(),
            width: default_video_width(),
            fps: default_fps(),
            title_font_size: default_title_font_size(),
            caption_font_size: default_caption_font_size(),
            preset: default_preset(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookreelConfig {
    /// Directory for intermediate and final files.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Retry behavior for every external call.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Prices used for cost estimates.
    #[serde(default)]
    pub prices: PriceTable,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// OpenAI settings.
    #[serde(default)]
    pub openai: OpenAiConfig,
    /// Video rendering settings.
    #[serde(default)]
    pub video: VideoConfig,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

const fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for BookreelConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            chunk_size: default_chunk_size(),
            retry: RetryPolicy::default(),
            prices: PriceTable::default(),
            logging: LoggingConfig::default(),
            openai: OpenAiConfig::default(),
            video: VideoConfig::default(),
        }
    }
}

impl BookreelConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| BookreelError::Config(format!("invalid config: {e}")))
    }

    /// Reads a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BookreelError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// Loads the file (if any), applies process environment overrides and validates.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.with_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides read through `lookup`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("BOOKREEL_WORK_DIR") {
            self.work_dir = PathBuf::from(dir);
        }
        if let Some(size) = lookup("BOOKREEL_CHUNK_SIZE") {
            self.chunk_size = size.trim().parse().map_err(|_| {
                BookreelError::Config(format!("BOOKREEL_CHUNK_SIZE is not a number: '{size}'"))
            })?;
        }
        if let Some(level) = lookup("BOOKREEL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(binary) = lookup("BOOKREEL_FFMPEG") {
            self.video.ffmpeg_binary = binary;
        }
        if let Some(key) = lookup("OPENAI_API_KEY").or_else(|| lookup("SECRET_KEY")) {
            if !key.trim().is_empty() {
                self.openai.api_key = Some(key.trim().to_string());
            }
        }
        Ok(self)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(BookreelError::InvalidChunkSize(self.chunk_size));
        }
        if self.video.width == 0 || self.video.fps == 0 {
            return Err(BookreelError::Config(
                "video.width and video.fps must be positive".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(BookreelError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    /// Sets the chunk size.
    #[must_use]
    pub const fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the price table.
    #[must_use]
    pub fn with_prices(mut self, prices: PriceTable) -> Self {
        self.prices = prices;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BookreelConfig::default();
        assert_eq!(config.chunk_size, 4000);
        assert_eq!(config.retry.max_attempts, 10);
        assert_eq!(config.retry.cooldown_secs, 3600);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.openai.voice, "alloy");
        assert!(config.openai.api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = BookreelConfig::from_json_str(
            r#"{"chunk_size": 2000, "retry": {"max_attempts": 3}, "openai": {"voice": "nova"}}"#,
        )
        .unwrap();

        assert_eq!(config.chunk_size, 2000);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.cooldown_secs, 3600);
        assert_eq!(config.openai.voice, "nova");
        assert_eq!(config.openai.tts_model, "tts-1");
        assert_eq!(config.video, VideoConfig::default());
    }

    #[test]
    fn test_video_settings() {
        let config = BookreelConfig::from_json_str(r#"{"video": {"fps": 30}}"#)
            .unwrap()
            .with_env_overrides(env(&[("BOOKREEL_FFMPEG", "/opt/ffmpeg/bin/ffmpeg")]))
            .unwrap();

        assert_eq!(config.video.fps, 30);
        assert_eq!(config.video.width, 1920);
        assert_eq!(config.video.ffmpeg_binary, "/opt/ffmpeg/bin/ffmpeg");

        let mut broken = config;
        broken.video.width = 0;
        assert!(broken.validate().is_err());
    }

    #[test]
    fn test_invalid_json() {
        let err = BookreelConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, BookreelError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let config = BookreelConfig::default()
            .with_env_overrides(env(&[
                ("BOOKREEL_WORK_DIR", "/tmp/out"),
                ("BOOKREEL_CHUNK_SIZE", " 1500 "),
                ("SECRET_KEY", "sk-secret"),
            ]))
            .unwrap();

        assert_eq!(config.work_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.chunk_size, 1500);
        assert_eq!(config.openai.api_key.as_deref(), Some("sk-secret"));
    }

    #[test]
    fn test_openai_api_key_wins_over_secret_key() {
        let config = BookreelConfig::default()
            .with_env_overrides(env(&[("OPENAI_API_KEY", "sk-a"), ("SECRET_KEY", "sk-b")]))
            .unwrap();
        assert_eq!(config.openai.api_key.as_deref(), Some("sk-a"));
    }

    #[test]
    fn test_bad_chunk_size_override() {
        let err = BookreelConfig::default()
            .with_env_overrides(env(&[("BOOKREEL_CHUNK_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(err, BookreelError::Config(_)));
    }

    #[test]
    fn test_validate() {
        let zero_chunks = BookreelConfig::default().with_chunk_size(0);
        assert!(matches!(
            zero_chunks.validate(),
            Err(BookreelError::InvalidChunkSize(0))
        ));

        let zero_attempts =
            BookreelConfig::default().with_retry(RetryPolicy::new().with_max_attempts(0));
        assert!(zero_attempts.validate().is_err());
    }

    #[test]
    fn test_api_key_is_not_serialized_or_printed() {
        let mut config = BookreelConfig::default();
        config.openai.api_key = Some("sk-live".to_string());

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-live"));
        assert!(!format!("{config:?}").contains("sk-live"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bookreel.json");
        std::fs::write(&path, r#"{"work_dir": "videos"}"#).unwrap();

        let config = BookreelConfig::from_file(&path).unwrap();
        assert_eq!(config.work_dir, PathBuf::from("videos"));
        assert!(BookreelConfig::from_file(&dir.path().join("missing.json")).is_err());
    }
}
