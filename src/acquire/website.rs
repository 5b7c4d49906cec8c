use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::USER_AGENT;
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html, Selector};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::WebPage;
use crate::classify::parse_lenient;
use crate::config::FetchConfig;
use crate::error::HarvestError;
use crate::retry::RetryPolicy;

const TEXT_TAGS: &str =
    "p, div, li, h1, h2, h3, h4, h5, h6, td, th, dt, dd, blockquote, figcaption, label, span, a";
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "h1", "h2", "h3", "h4", "h5", "h6", "td", "th", "dt", "dd", "blockquote",
    "figcaption", "label",
];
const INLINE_TAGS: &[&str] = &["span", "a"];
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];
const UNTITLED: &str = "Untitled Recipe";

/// Retrieves the raw HTML of a page
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, HarvestError>;
}

/// Plain HTTP fetcher with a rotating User-Agent pool.
///
/// Rate-limit and blocking responses are retried with a randomized delay;
/// every other failure is returned straight away.
pub struct HttpPageFetcher {
    client: Client,
    user_agents: Vec<String>,
    next_agent: AtomicUsize,
    rate_limit: RetryPolicy,
}

/// Why a single GET did not produce a page
enum FetchFailure {
    Blocked(StatusCode),
    Fatal(HarvestError),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Blocked(status) => write!(f, "blocked with HTTP {}", status.as_u16()),
            FetchFailure::Fatal(e) => write!(f, "{}", e),
        }
    }
}

impl HttpPageFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, HarvestError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HarvestError::BuilderError(format!("Failed to create HTTP client: {}", e)))?;

        let user_agents = if config.user_agents.is_empty() {
            vec!["Mozilla/5.0 (compatible; RecipeHarvest/1.0)".to_string()]
        } else {
            config.user_agents.clone()
        };

        Ok(Self {
            client,
            user_agents,
            next_agent: AtomicUsize::new(0),
            rate_limit: config.rate_limit.clone(),
        })
    }

    fn next_user_agent(&self) -> &str {
        let index = self.next_agent.fetch_add(1, Ordering::Relaxed) % self.user_agents.len();
        &self.user_agents[index]
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchFailure> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.next_user_agent())
            .send()
            .await
            .map_err(|e| FetchFailure::Fatal(e.into()))?;

        let status = response.status();
        if is_blocking_status(status) {
            return Err(FetchFailure::Blocked(status));
        }
        if status.is_server_error() {
            return Err(FetchFailure::Fatal(HarvestError::Acquisition(format!(
                "page returned HTTP {}",
                status.as_u16()
            ))));
        }
        if !status.is_success() {
            return Err(FetchFailure::Fatal(HarvestError::UnsupportedContent(format!(
                "page returned HTTP {}",
                status.as_u16()
            ))));
        }

        response
            .text()
            .await
            .map_err(|e| FetchFailure::Fatal(e.into()))
    }
}

fn is_blocking_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::FORBIDDEN | StatusCode::SERVICE_UNAVAILABLE
    )
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, HarvestError> {
        let result = self
            .rate_limit
            .run_if(
                "page fetch",
                |failure: &FetchFailure| matches!(failure, FetchFailure::Blocked(_)),
                |_| self.fetch_once(url),
            )
            .await;

        match result {
            Ok(html) => Ok(html),
            Err(FetchFailure::Blocked(status)) => Err(HarvestError::Acquisition(format!(
                "site kept refusing requests (HTTP {})",
                status.as_u16()
            ))),
            Err(FetchFailure::Fatal(e)) => Err(e),
        }
    }
}

/// Website strategy: fetch a page and pull out its text, title and image
pub struct WebsiteFetcher {
    fetcher: Arc<dyn PageFetcher>,
}

impl WebsiteFetcher {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn acquire(&self, url: &str) -> Result<WebPage, HarvestError> {
        let url = normalize_page_url(url)?;
        let html = self.fetcher.fetch(url.as_str()).await?;
        let page = parse_page(&html, url.as_str());

        if page.text.trim().is_empty() {
            return Err(HarvestError::UnsupportedContent(
                "page has no readable text".to_string(),
            ));
        }

        info!(
            "Fetched page '{}' ({} chars of text, image: {})",
            page.title,
            page.text.len(),
            page.image_url.is_some()
        );
        Ok(page)
    }
}

/// Accept scheme-less input; anything that is not an http(s) URL is unsupported
fn normalize_page_url(raw: &str) -> Result<Url, HarvestError> {
    match parse_lenient(raw) {
        Some(url) if matches!(url.scheme(), "http" | "https") => Ok(url),
        _ => Err(HarvestError::UnsupportedContent(
            "not a valid web address".to_string(),
        )),
    }
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static CSS selector")
}

/// Extract visible text, title and primary image from an HTML document
pub fn parse_page(html: &str, page_url: &str) -> WebPage {
    let document = Html::parse_document(html);

    WebPage {
        title: extract_title(&document),
        text: extract_text(&document),
        image_url: extract_image(&document, page_url),
    }
}

/// One line per content-bearing element.
///
/// Block tags contribute their inline content, including formatting children
/// such as `<strong>` or `<em>`, but not nested blocks, which get lines of
/// their own. Links and spans only get a line when no listed tag encloses them.
fn extract_text(document: &Html) -> String {
    document
        .select(&selector(TEXT_TAGS))
        .filter_map(|element| {
            let enclosed = element
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|ancestor| is_listed(ancestor.value().name()));
            if !is_block(element.value().name()) && enclosed {
                return None;
            }

            let mut raw = String::new();
            inline_text(element, &mut raw);
            let line = raw.split_whitespace().collect::<Vec<_>>().join(" ");
            (!line.is_empty()).then_some(line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_block(tag: &str) -> bool {
    BLOCK_TAGS.contains(&tag)
}

fn is_listed(tag: &str) -> bool {
    is_block(tag) || INLINE_TAGS.contains(&tag)
}

fn inline_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(child) {
            let tag = child.value().name();
            if !is_block(tag) && !SKIPPED_TAGS.contains(&tag) {
                inline_text(child, out);
            }
        }
    }
}

fn element_text(element: ElementRef) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_title(document: &Html) -> String {
    ["title", "h1"]
        .into_iter()
        .filter_map(|css| document.select(&selector(css)).next())
        .map(element_text)
        .find(|title| !title.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string())
}

fn extract_image(document: &Html, page_url: &str) -> Option<String> {
    let meta_image = [
        r#"meta[property="og:image"]"#,
        r#"meta[property="og:image:url"]"#,
        r#"meta[name="twitter:image"]"#,
    ]
    .into_iter()
    .filter_map(|css| document.select(&selector(css)).next())
    .filter_map(|meta| meta.value().attr("content"))
    .map(str::trim)
    .find(|content| !content.is_empty());

    let raw = match meta_image {
        Some(src) => src,
        None => document
            .select(&selector("img[src]"))
            .filter_map(|img| img.value().attr("src"))
            .map(str::trim)
            .find(|src| !src.is_empty() && !src.starts_with("data:"))?,
    };

    debug!("Primary image candidate: {}", raw);
    resolve_url(page_url, raw)
}

fn resolve_url(page_url: &str, raw: &str) -> Option<String> {
    match Url::parse(page_url) {
        Ok(base) => base.join(raw).ok().map(String::from),
        Err(_) => Url::parse(raw).ok().map(String::from),
    }
}
