use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::model::PlatformKind;
use crate::retry::RetryPolicy;

/// Top-level configuration for the harvester
#[derive(Debug, Deserialize, Clone, Default)]
pub struct HarvestConfig {
    /// Generative model providers used for structured extraction
    #[serde(default)]
    pub llm: LlmConfig,
    /// Web page fetching
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Video media resolution and download
    #[serde(default)]
    pub video: VideoConfig,
    /// Frame and audio sampling
    #[serde(default)]
    pub sampler: SamplerConfig,
    /// Speech-to-text
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    /// Job queue and retry policy
    #[serde(default)]
    pub jobs: JobsConfig,
    /// Where cover images are persisted
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Generative model configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Default provider to use when not specified
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Map of provider name to provider configuration
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Fallback configuration for automatic provider switching
    #[serde(default)]
    pub fallback: FallbackConfig,
    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            providers: HashMap::new(),
            fallback: FallbackConfig::default(),
            timeout: default_llm_timeout(),
        }
    }
}

/// Configuration for a specific model provider
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// Whether this provider is enabled
    pub enabled: bool,
    /// Model identifier (e.g., "gpt-4.1-mini", "claude-sonnet-4-5")
    pub model: String,
    /// Temperature for generation (0.0-1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// API key for authentication (can also be set via environment variable)
    pub api_key: Option<String>,
    /// Base URL for API endpoint (for custom or proxy endpoints)
    pub base_url: Option<String>,
}

/// Configuration for provider fallback and retry behavior
#[derive(Debug, Deserialize, Clone)]
pub struct FallbackConfig {
    /// Whether fallback is enabled
    #[serde(default)]
    pub enabled: bool,
    /// Order of providers to try (first to last)
    #[serde(default)]
    pub order: Vec<String>,
    /// Number of retry attempts per provider before fallback
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Initial delay between retries in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            order: Vec::new(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Web page fetching
#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    /// User-Agent pool rotated across requests
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,
    /// Retry budget and randomized delay used when a site rate-limits or blocks us
    #[serde(default = "default_rate_limit_policy")]
    pub rate_limit: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            user_agents: default_user_agents(),
            rate_limit: default_rate_limit_policy(),
        }
    }
}

/// Video resolution, download and decoding
#[derive(Debug, Deserialize, Clone)]
pub struct VideoConfig {
    /// Lookup services tried in order
    #[serde(default)]
    pub providers: Vec<VideoProviderConfig>,
    /// Try Instagram's public embed page after the configured providers
    #[serde(default = "default_true")]
    pub instagram_embed: bool,
    /// Attempts per provider before falling through to the next one
    #[serde(default = "default_provider_attempts")]
    pub provider_attempts: u32,
    /// Timeout for a single provider lookup in seconds
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,
    /// Timeout for a whole media download in seconds
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
    /// Downloads larger than this are rejected
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: u64,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            instagram_embed: true,
            provider_attempts: default_provider_attempts(),
            provider_timeout_secs: default_provider_timeout(),
            download_timeout_secs: default_download_timeout(),
            max_download_bytes: default_max_download_bytes(),
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
        }
    }
}

/// A JSON lookup service that turns a post URL into a playable media URL
#[derive(Debug, Deserialize, Clone)]
pub struct VideoProviderConfig {
    /// Name used in logs
    pub name: String,
    /// Platforms this service understands; empty means all video platforms
    #[serde(default)]
    pub platforms: Vec<PlatformKind>,
    pub base_url: String,
    /// Request path; `{url}`, `{id}` and `{platform}` are substituted
    #[serde(default = "default_lookup_path")]
    pub path: String,
    pub api_key: Option<String>,
    /// Header carrying `api_key`
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
    /// Extra static headers (e.g. a RapidAPI host header)
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// JSON pointer to the media URL in the response
    #[serde(default = "default_media_url_pointer")]
    pub media_url_pointer: String,
    /// JSON pointer to the duration in seconds, if the service reports it
    pub duration_pointer: Option<String>,
    /// JSON pointer to the post caption, if the service reports it
    pub caption_pointer: Option<String>,
}

/// Frame and audio sampling
#[derive(Debug, Deserialize, Clone)]
pub struct SamplerConfig {
    /// Upper bound on sampled frames per video
    #[serde(default = "default_max_frames")]
    pub max_frames: u32,
    /// Width frames are scaled to; height keeps the aspect ratio
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,
    #[serde(default)]
    pub audio: AudioConfig,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            max_frames: default_max_frames(),
            frame_width: default_frame_width(),
            audio: AudioConfig::default(),
        }
    }
}

/// Downsampling applied to audio before transcription
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u32,
    /// ffmpeg bit rate string, e.g. "32k"
    #[serde(default = "default_bitrate")]
    pub bitrate: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            bitrate: default_bitrate(),
        }
    }
}

/// Speech-to-text
#[derive(Debug, Deserialize, Clone)]
pub struct TranscriptionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Google Cloud API key (falls back to GOOGLE_API_KEY)
    pub api_key: Option<String>,
    #[serde(default = "default_speech_base_url")]
    pub base_url: String,
    #[serde(default = "default_language_code")]
    pub language_code: String,
    #[serde(default = "default_transcription_timeout")]
    pub timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: default_speech_base_url(),
            language_code: default_language_code(),
            timeout_secs: default_transcription_timeout(),
        }
    }
}

/// Job queue and retry policy
#[derive(Debug, Deserialize, Clone)]
pub struct JobsConfig {
    /// Concurrent workers pulling from the queue
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Retries after the first attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff between job attempts; `max_attempts` is ignored here
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Attempts at persisting a terminal state before giving up
    #[serde(default = "default_commit_attempts")]
    pub commit_attempts: u32,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_retries: default_max_retries(),
            retry: RetryPolicy::default(),
            commit_attempts: default_commit_attempts(),
        }
    }
}

/// Cover image persistence
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_cover_dir")]
    pub cover_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cover_dir: default_cover_dir(),
        }
    }
}

// Default value functions
fn default_provider() -> String {
    "openai".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_user_agents() -> Vec<String> {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15".to_string(),
        "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0".to_string(),
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1".to_string(),
    ]
}

fn default_rate_limit_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 2000,
        max_delay_ms: 8000,
        jitter: true,
    }
}

fn default_true() -> bool {
    true
}

fn default_provider_attempts() -> u32 {
    2
}

fn default_provider_timeout() -> u64 {
    20
}

fn default_download_timeout() -> u64 {
    180
}

fn default_max_download_bytes() -> u64 {
    300 * 1024 * 1024
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_lookup_path() -> String {
    "/?url={url}".to_string()
}

fn default_api_key_header() -> String {
    "x-api-key".to_string()
}

fn default_media_url_pointer() -> String {
    "/video_url".to_string()
}

fn default_max_frames() -> u32 {
    60
}

fn default_frame_width() -> u32 {
    640
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_channels() -> u32 {
    1
}

fn default_bitrate() -> String {
    "32k".to_string()
}

fn default_speech_base_url() -> String {
    "https://speech.googleapis.com".to_string()
}

fn default_language_code() -> String {
    "en-US".to_string()
}

fn default_transcription_timeout() -> u64 {
    120
}

fn default_workers() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_commit_attempts() -> u32 {
    3
}

fn default_cover_dir() -> PathBuf {
    std::env::temp_dir().join("recipe-harvest").join("covers")
}

impl HarvestConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables with HARVEST__ prefix
    /// 2. harvest.toml file in current directory
    /// 3. Default values
    ///
    /// Environment variable format: HARVEST__JOBS__MAX_RETRIES
    pub fn load() -> Result<Self, ConfigError> {
        load_config(None)
    }

    /// Load configuration from an explicit file, still honouring HARVEST__ overrides
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        load_config(Some(path))
    }
}

fn load_config(path: Option<&Path>) -> Result<HarvestConfig, ConfigError> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name("harvest").required(false),
    };

    let settings = Config::builder()
        .add_source(file)
        // Use double underscore for nested: HARVEST__LLM__PROVIDERS__OPENAI__API_KEY
        .add_source(
            Environment::with_prefix("HARVEST")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_values() {
        let config = HarvestConfig::default();
        assert_eq!(config.llm.default_provider, "openai");
        assert_eq!(config.jobs.max_retries, 3);
        assert_eq!(config.jobs.workers, 4);
        assert_eq!(config.sampler.max_frames, 60);
        assert_eq!(config.sampler.audio.sample_rate, 16_000);
        assert_eq!(config.sampler.audio.channels, 1);
        assert_eq!(config.fetch.user_agents.len(), 4);
        assert!(config.video.providers.is_empty());
        assert!(config.video.instagram_embed);
    }

    #[test]
    fn test_fallback_config_default() {
        let fallback = FallbackConfig::default();
        assert!(!fallback.enabled);
        assert!(fallback.order.is_empty());
        assert_eq!(fallback.retry_attempts, 2);
        assert_eq!(fallback.retry_delay_ms, 1000);
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[llm]
default_provider = "anthropic"

[llm.providers.anthropic]
enabled = true
model = "claude-sonnet-4-5"
api_key = "test-key"

[jobs]
max_retries = 5
workers = 2

[jobs.retry]
base_delay_ms = 250
jitter = false

[sampler]
max_frames = 30

[[video.providers]]
name = "social-lookup"
platforms = ["tiktok", "instagram"]
base_url = "https://lookup.example.com"
path = "/v1/media?url={{url}}"
api_key = "secret"
media_url_pointer = "/data/play"
"#
        )
        .unwrap();

        let config = HarvestConfig::load_from(file.path()).unwrap();
        assert_eq!(config.llm.default_provider, "anthropic");
        assert_eq!(config.llm.providers["anthropic"].temperature, 0.2);
        assert_eq!(config.jobs.max_retries, 5);
        assert_eq!(config.jobs.workers, 2);
        assert_eq!(config.jobs.retry.base_delay_ms, 250);
        assert_eq!(config.jobs.retry.max_attempts, 3);
        assert!(!config.jobs.retry.jitter);
        assert_eq!(config.sampler.max_frames, 30);

        let provider = &config.video.providers[0];
        assert_eq!(provider.name, "social-lookup");
        assert_eq!(
            provider.platforms,
            vec![PlatformKind::Tiktok, PlatformKind::Instagram]
        );
        assert_eq!(provider.path, "/v1/media?url={url}");
        assert_eq!(provider.api_key_header, "x-api-key");
        assert_eq!(provider.media_url_pointer, "/data/play");
        assert!(provider.duration_pointer.is_none());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = HarvestConfig::load_from(Path::new("/definitely/not/here.toml"));
        assert!(result.is_err());
    }
}
