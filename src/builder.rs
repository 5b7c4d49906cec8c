use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::acquire::{
    Acquirer, HttpMediaDownloader, HttpPageFetcher, InstagramEmbedResolver, LookupApiResolver,
    MediaDownloader, MediaResolver, PageFetcher, ResolverChain, VideoFetcher, WebsiteFetcher,
};
use crate::config::{HarvestConfig, ProviderConfig};
use crate::error::HarvestError;
use crate::extract::StructuredExtractor;
use crate::jobs::{InMemoryJobStore, JobStore, Orchestrator};
use crate::media::{FfmpegDecoder, GoogleSpeechTranscriber, MediaDecoder, MediaSampler, Transcriber};
use crate::pipeline::Pipeline;
use crate::providers::{FallbackProvider, LlmProvider, ProviderFactory};
use crate::storage::{BlobStore, LocalBlobStore};

/// Generative model vendor selectable from code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAI,
    Anthropic,
    Google,
    Ollama,
}

impl LlmBackend {
    /// Convert to provider name string used by the factory
    fn as_str(&self) -> &'static str {
        match self {
            LlmBackend::OpenAI => "openai",
            LlmBackend::Anthropic => "anthropic",
            LlmBackend::Google => "google",
            LlmBackend::Ollama => "ollama",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            LlmBackend::OpenAI => "gpt-4.1-mini",
            LlmBackend::Anthropic => "claude-sonnet-4-5",
            LlmBackend::Google => "gemini-2.5-flash",
            LlmBackend::Ollama => "llama3.2",
        }
    }
}

/// Builder for a running [`Orchestrator`].
///
/// Everything not set explicitly comes from [`HarvestConfig`]. Collaborators
/// can be injected to replace the network, ffmpeg or storage backed defaults.
#[derive(Default)]
pub struct HarvesterBuilder {
    config: Option<HarvestConfig>,
    provider: Option<LlmBackend>,
    api_key: Option<String>,
    model: Option<String>,
    timeout: Option<Duration>,
    workers: Option<usize>,
    max_retries: Option<u32>,
    store: Option<Arc<dyn JobStore>>,
    page_fetcher: Option<Arc<dyn PageFetcher>>,
    resolvers: Option<Vec<Arc<dyn MediaResolver>>>,
    downloader: Option<Arc<dyn MediaDownloader>>,
    decoder: Option<Arc<dyn MediaDecoder>>,
    transcriber: Option<Arc<dyn Transcriber>>,
    blob_store: Option<Arc<dyn BlobStore>>,
    llm: Option<Arc<dyn LlmProvider>>,
}

impl HarvesterBuilder {
    /// Use this configuration instead of loading `harvest.toml` and the environment
    pub fn config(mut self, config: HarvestConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the model vendor
    ///
    /// # Example
    /// ```
    /// use recipe_harvest::{Harvester, LlmBackend};
    ///
    /// let builder = Harvester::builder()
    ///     .provider(LlmBackend::Anthropic);
    /// ```
    pub fn provider(mut self, provider: LlmBackend) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the API key for the model vendor
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the model name for the model vendor
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the timeout for page fetches and model calls
    ///
    /// # Example
    /// ```
    /// use recipe_harvest::Harvester;
    /// use std::time::Duration;
    ///
    /// let builder = Harvester::builder()
    ///     .timeout(Duration::from_secs(30));
    /// ```
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Retries after the first attempt for transient failures
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn job_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn page_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.page_fetcher = Some(fetcher);
        self
    }

    /// Replace the configured media provider chain
    pub fn resolvers(mut self, resolvers: Vec<Arc<dyn MediaResolver>>) -> Self {
        self.resolvers = Some(resolvers);
        self
    }

    pub fn downloader(mut self, downloader: Arc<dyn MediaDownloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn MediaDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn blob_store(mut self, blob_store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(blob_store);
        self
    }

    /// Use this model provider instead of building one from configuration
    pub fn llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Assemble the pipeline and start the worker pool.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns `HarvestError` if:
    /// - The configuration cannot be loaded
    /// - No model provider can be created
    /// - An HTTP client cannot be built
    pub fn build(self) -> Result<Orchestrator, HarvestError> {
        let mut config = match self.config {
            Some(config) => config,
            None => HarvestConfig::load()?,
        };

        if let Some(timeout) = self.timeout {
            config.fetch.timeout_secs = timeout.as_secs().max(1);
            config.llm.timeout = timeout.as_secs().max(1);
        }
        if let Some(workers) = self.workers {
            config.jobs.workers = workers;
        }
        if let Some(max_retries) = self.max_retries {
            config.jobs.max_retries = max_retries;
        }

        let llm = match self.llm {
            Some(llm) => llm,
            None => build_llm(&config, self.provider, self.api_key, self.model)?,
        };

        let page_fetcher: Arc<dyn PageFetcher> = match self.page_fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpPageFetcher::new(&config.fetch)?),
        };

        let resolvers = match self.resolvers {
            Some(resolvers) => resolvers,
            None => build_resolvers(&config)?,
        };
        if resolvers.is_empty() {
            warn!("No media providers configured; video URLs will fail as unsupported");
        }

        let downloader: Arc<dyn MediaDownloader> = match self.downloader {
            Some(downloader) => downloader,
            None => Arc::new(HttpMediaDownloader::new(&config.video)?),
        };

        let decoder: Arc<dyn MediaDecoder> = self.decoder.unwrap_or_else(|| {
            Arc::new(FfmpegDecoder::new(&config.video, config.sampler.frame_width))
        });

        let transcriber = match self.transcriber {
            Some(transcriber) => Some(transcriber),
            None if config.transcription.enabled => {
                match GoogleSpeechTranscriber::new(&config.transcription) {
                    Ok(transcriber) => Some(Arc::new(transcriber) as Arc<dyn Transcriber>),
                    Err(e) => {
                        warn!("Transcription disabled: {}", e);
                        None
                    }
                }
            }
            None => None,
        };

        let blob_store: Arc<dyn BlobStore> = self
            .blob_store
            .unwrap_or_else(|| Arc::new(LocalBlobStore::new(config.storage.cover_dir.clone())));

        let store: Arc<dyn JobStore> = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryJobStore::new()));

        let chain = ResolverChain::new(
            resolvers,
            downloader,
            config.jobs.retry.with_max_attempts(config.video.provider_attempts),
        );
        let acquirer = Acquirer::new(
            WebsiteFetcher::new(page_fetcher),
            VideoFetcher::new(chain, Arc::clone(&decoder)),
        );
        let sampler = MediaSampler::new(decoder, transcriber, blob_store, &config.sampler);
        info!("Harvester ready (model provider: {})", llm.provider_name());
        let extractor = StructuredExtractor::new(llm);

        Ok(Orchestrator::start(
            store,
            Pipeline::new(acquirer, sampler, extractor),
            &config.jobs,
        ))
    }
}

fn build_llm(
    config: &HarvestConfig,
    provider: Option<LlmBackend>,
    api_key: Option<String>,
    model: Option<String>,
) -> Result<Arc<dyn LlmProvider>, HarvestError> {
    let to_builder_error = |e: crate::providers::ProviderError| HarvestError::BuilderError(e.to_string());

    // Without any configured provider, fall back to OpenAI with its env key
    let provider = provider.or_else(|| config.llm.providers.is_empty().then_some(LlmBackend::OpenAI));

    if provider.is_none() && api_key.is_none() && model.is_none() {
        return Ok(Arc::new(FallbackProvider::new(&config.llm).map_err(to_builder_error)?));
    }

    let name = provider
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| config.llm.default_provider.clone());
    let mut provider_config = config
        .llm
        .providers
        .get(&name)
        .cloned()
        .unwrap_or_else(|| ProviderConfig {
            enabled: true,
            model: provider
                .map(|p| p.default_model())
                .unwrap_or_default()
                .to_string(),
            temperature: 0.2,
            max_tokens: 4000,
            api_key: None,
            base_url: None,
        });
    provider_config.enabled = true;
    if let Some(api_key) = api_key {
        provider_config.api_key = Some(api_key);
    }
    if let Some(model) = model {
        provider_config.model = model;
    }

    ProviderFactory::create(&name, &provider_config, Duration::from_secs(config.llm.timeout))
        .map_err(to_builder_error)
}

fn build_resolvers(config: &HarvestConfig) -> Result<Vec<Arc<dyn MediaResolver>>, HarvestError> {
    let timeout = Duration::from_secs(config.video.provider_timeout_secs);
    let mut resolvers: Vec<Arc<dyn MediaResolver>> = Vec::new();

    for provider in &config.video.providers {
        resolvers.push(Arc::new(LookupApiResolver::new(provider.clone(), timeout)?));
    }
    if config.video.instagram_embed {
        resolvers.push(Arc::new(InstagramEmbedResolver::new(timeout)?));
    }
    Ok(resolvers)
}

/// Main entry point for the builder API
pub struct Harvester;

impl Harvester {
    /// Creates a new builder
    ///
    /// # Example
    /// ```
    /// use recipe_harvest::Harvester;
    ///
    /// let builder = Harvester::builder();
    /// ```
    pub fn builder() -> HarvesterBuilder {
        HarvesterBuilder::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VideoProviderConfig;
    use crate::model::PlatformKind;

    #[test]
    fn test_backend_names_match_factory() {
        for backend in [
            LlmBackend::OpenAI,
            LlmBackend::Anthropic,
            LlmBackend::Google,
            LlmBackend::Ollama,
        ] {
            assert!(ProviderFactory::available_providers().contains(&backend.as_str()));
        }
    }

    #[test]
    fn test_build_llm_with_overrides() {
        let llm = build_llm(
            &HarvestConfig::default(),
            Some(LlmBackend::Anthropic),
            Some("key".to_string()),
            Some("claude-haiku-4-5".to_string()),
        )
        .unwrap();
        assert_eq!(llm.provider_name(), "anthropic");
    }

    #[test]
    fn test_build_llm_from_configured_fallback() {
        let mut config = HarvestConfig::default();
        config.llm.providers.insert(
            "ollama".to_string(),
            ProviderConfig {
                enabled: true,
                model: "llama3.2".to_string(),
                temperature: 0.2,
                max_tokens: 2000,
                api_key: None,
                base_url: None,
            },
        );
        config.llm.default_provider = "ollama".to_string();

        let llm = build_llm(&config, None, None, None).unwrap();
        assert_eq!(llm.provider_name(), "fallback");
    }

    #[test]
    fn test_build_resolvers_from_config() {
        let mut config = HarvestConfig::default();
        config.video.providers.push(VideoProviderConfig {
            name: "lookup".to_string(),
            platforms: vec![PlatformKind::Tiktok],
            base_url: "https://lookup.example.com".to_string(),
            path: "/?url={url}".to_string(),
            api_key: None,
            api_key_header: "x-api-key".to_string(),
            headers: Default::default(),
            media_url_pointer: "/video_url".to_string(),
            duration_pointer: None,
            caption_pointer: None,
        });

        let resolvers = build_resolvers(&config).unwrap();
        assert_eq!(resolvers.len(), 2);
        assert_eq!(resolvers[0].name(), "lookup");
        assert_eq!(resolvers[1].name(), "instagram_embed");

        config.video.instagram_embed = false;
        config.video.providers.clear();
        assert!(build_resolvers(&config).unwrap().is_empty());
    }
}
