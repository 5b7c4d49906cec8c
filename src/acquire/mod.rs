mod download;
mod identifier;
mod resolvers;
mod video;
mod website;

pub use download::HttpMediaDownloader;
pub use identifier::extract_identifier;
pub use resolvers::{InstagramEmbedResolver, LookupApiResolver, ResolverChain};
pub use video::{MediaDownloader, MediaLocation, MediaResolver, VideoFetcher, VideoTarget};
pub use website::{parse_page, HttpPageFetcher, PageFetcher, WebsiteFetcher};

use log::debug;
use std::path::Path;
use tempfile::TempPath;

use crate::error::HarvestError;
use crate::model::PlatformKind;

/// What the acquirer produced for one URL
#[derive(Debug)]
pub enum AcquiredContent {
    WebPage(WebPage),
    VideoFile(VideoFile),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebPage {
    pub title: String,
    pub text: String,
    pub image_url: Option<String>,
}

/// A downloaded video, deleted from disk when dropped
#[derive(Debug)]
pub struct VideoFile {
    pub media: TempMedia,
    pub duration_seconds: f64,
    /// Post caption when the provider reports one
    pub caption: Option<String>,
}

impl VideoFile {
    pub fn local_path(&self) -> &Path {
        self.media.path()
    }
}

/// Worker-owned temporary media file.
///
/// The file is removed when this value is dropped, whichever way the job
/// ends.
#[derive(Debug)]
pub struct TempMedia {
    path: TempPath,
}

impl TempMedia {
    pub fn new(path: TempPath) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempMedia {
    fn drop(&mut self) {
        debug!("Removing temporary media {}", self.path.display());
    }
}

/// Fetches content for a URL using the strategy that matches its platform
pub struct Acquirer {
    website: WebsiteFetcher,
    video: VideoFetcher,
}

impl Acquirer {
    pub fn new(website: WebsiteFetcher, video: VideoFetcher) -> Self {
        Self { website, video }
    }

    pub async fn acquire(
        &self,
        url: &str,
        kind: PlatformKind,
    ) -> Result<AcquiredContent, HarvestError> {
        match kind {
            PlatformKind::Website => self.website.acquire(url).await.map(AcquiredContent::WebPage),
            _ => self
                .video
                .acquire(url, kind)
                .await
                .map(AcquiredContent::VideoFile),
        }
    }
}
