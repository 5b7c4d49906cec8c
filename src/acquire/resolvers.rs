use async_trait::async_trait;
use html_escape::decode_html_entities;
use log::{debug, info, warn};
use regex::Regex;
use reqwest::header::{HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use super::video::{MediaDownloader, MediaLocation, MediaResolver, VideoTarget};
use super::TempMedia;
use crate::config::VideoProviderConfig;
use crate::error::HarvestError;
use crate::model::PlatformKind;
use crate::retry::RetryPolicy;

const BROWSER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Ordered provider chain.
///
/// Each provider gets the full retry budget for resolve + download before the
/// chain moves on to the next one.
pub struct ResolverChain {
    resolvers: Vec<Arc<dyn MediaResolver>>,
    downloader: Arc<dyn MediaDownloader>,
    policy: RetryPolicy,
}

impl ResolverChain {
    pub fn new(
        resolvers: Vec<Arc<dyn MediaResolver>>,
        downloader: Arc<dyn MediaDownloader>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            resolvers,
            downloader,
            policy,
        }
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Resolve and download through the first provider that succeeds.
    ///
    /// When every provider fails, a transient failure wins over permanent
    /// ones so the job can be retried later.
    pub async fn fetch(
        &self,
        target: &VideoTarget,
    ) -> Result<(TempMedia, MediaLocation), HarvestError> {
        let mut last_transient = None;
        let mut last_permanent = None;

        for resolver in self.resolvers.iter().filter(|r| r.supports(target.kind)) {
            let label = format!("{} lookup for {} {}", resolver.name(), target.kind, target.id);
            let outcome = self
                .policy
                .run(&label, |_| {
                    let resolver = Arc::clone(resolver);
                    let downloader = Arc::clone(&self.downloader);
                    async move {
                        let location = resolver.resolve(target).await?;
                        debug!("{} resolved {} {}", resolver.name(), target.kind, target.id);
                        let media = downloader.download(&location).await?;
                        Ok((media, location))
                    }
                })
                .await;

            match outcome {
                Ok(found) => {
                    info!("Media for {} {} provided by {}", target.kind, target.id, resolver.name());
                    return Ok(found);
                }
                Err(e) => {
                    warn!("Provider {} failed for {} {}: {}", resolver.name(), target.kind, target.id, e);
                    if e.is_transient() {
                        last_transient = Some(e);
                    } else {
                        last_permanent = Some(e);
                    }
                }
            }
        }

        Err(last_transient.or(last_permanent).unwrap_or_else(|| {
            HarvestError::UnsupportedContent(format!("no media provider available for {}", target.kind))
        }))
    }
}

/// Map a provider's HTTP status onto the error taxonomy
fn status_error(status: StatusCode) -> HarvestError {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE | StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            HarvestError::UnsupportedContent("no media found for this post".to_string())
        }
        _ => HarvestError::Acquisition(format!("media provider returned HTTP {}", status.as_u16())),
    }
}

/// Configurable JSON lookup service (RapidAPI-style downloaders and the like)
pub struct LookupApiResolver {
    client: Client,
    config: VideoProviderConfig,
}

impl LookupApiResolver {
    pub fn new(config: VideoProviderConfig, timeout: Duration) -> Result<Self, HarvestError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HarvestError::BuilderError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn request_url(&self, target: &VideoTarget) -> String {
        let encoded_url: String =
            url::form_urlencoded::byte_serialize(target.url.as_bytes()).collect();
        let path = self
            .config
            .path
            .replace("{url}", &encoded_url)
            .replace("{id}", &target.id)
            .replace("{platform}", target.kind.as_str());
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn read_location(&self, body: &Value) -> Result<MediaLocation, HarvestError> {
        let media_url = body
            .pointer(&self.config.media_url_pointer)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                HarvestError::UnsupportedContent(
                    "media provider returned no media information".to_string(),
                )
            })?;

        let duration_seconds = self
            .config
            .duration_pointer
            .as_deref()
            .and_then(|pointer| body.pointer(pointer))
            .and_then(|value| match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .filter(|d: &f64| d.is_finite() && *d >= 0.0);

        let caption = self
            .config
            .caption_pointer
            .as_deref()
            .and_then(|pointer| body.pointer(pointer))
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(MediaLocation {
            media_url: media_url.to_string(),
            duration_seconds,
            caption,
        })
    }
}

#[async_trait]
impl MediaResolver for LookupApiResolver {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn supports(&self, kind: PlatformKind) -> bool {
        kind.is_video() && (self.config.platforms.is_empty() || self.config.platforms.contains(&kind))
    }

    async fn resolve(&self, target: &VideoTarget) -> Result<MediaLocation, HarvestError> {
        let mut request = self.client.get(self.request_url(target));

        if let Some(api_key) = &self.config.api_key {
            request = request.header(self.config.api_key_header.as_str(), api_key);
        }
        for (name, value) in &self.config.headers {
            match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
                (Ok(name), Ok(value)) => request = request.header(name, value),
                _ => warn!("Skipping invalid header '{}' for provider {}", name, self.config.name),
            }
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        let body: Value = response.json().await.map_err(|e| {
            HarvestError::Acquisition(format!("unreadable media provider response: {}", e.without_url()))
        })?;
        debug!("{} response: {:?}", self.config.name, body);

        self.read_location(&body)
    }
}

static EMBED_VIDEO_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\\?"video_url\\?"\s*:\s*\\?"((?:[^"\\]|\\[^"])*)\\?""#)
        .expect("static video_url pattern")
});

/// Reads the video URL from Instagram's public embed page
pub struct InstagramEmbedResolver {
    client: Client,
    base_url: String,
}

impl InstagramEmbedResolver {
    pub fn new(timeout: Duration) -> Result<Self, HarvestError> {
        Self::with_base_url("https://www.instagram.com".to_string(), timeout)
    }

    #[doc(hidden)]
    pub fn with_base_url(base_url: String, timeout: Duration) -> Result<Self, HarvestError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HarvestError::BuilderError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, base_url })
    }
}

/// Undo the JSON (and sometimes double JSON) escaping of embedded page data
fn unescape_embedded(raw: &str) -> String {
    let mut value = decode_html_entities(raw).into_owned();
    for _ in 0..2 {
        if !value.contains('\\') {
            break;
        }
        match serde_json::from_str::<String>(&format!("\"{}\"", value)) {
            Ok(decoded) => value = decoded,
            Err(_) => break,
        }
    }
    value
}

fn embed_caption(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("div.Caption").expect("static CSS selector");
    document
        .select(&selector)
        .next()
        .map(|caption| {
            caption
                .text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|text| !text.is_empty())
}

#[async_trait]
impl MediaResolver for InstagramEmbedResolver {
    fn name(&self) -> &str {
        "instagram_embed"
    }

    fn supports(&self, kind: PlatformKind) -> bool {
        kind == PlatformKind::Instagram
    }

    async fn resolve(&self, target: &VideoTarget) -> Result<MediaLocation, HarvestError> {
        let url = format!(
            "{}/p/{}/embed/captioned/",
            self.base_url.trim_end_matches('/'),
            target.id
        );
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, BROWSER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }
        let html = response.text().await?;

        let raw = EMBED_VIDEO_URL
            .captures(&html)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| HarvestError::UnsupportedContent("post has no video".to_string()))?;

        Ok(MediaLocation {
            media_url: unescape_embedded(raw),
            duration_seconds: None,
            caption: embed_caption(&html),
        })
    }
}
