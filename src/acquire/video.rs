use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;

use super::{extract_identifier, ResolverChain, TempMedia, VideoFile};
use crate::error::HarvestError;
use crate::media::MediaDecoder;
use crate::model::PlatformKind;

/// A video post identified on its platform
#[derive(Debug, Clone, PartialEq)]
pub struct VideoTarget {
    pub url: String,
    pub kind: PlatformKind,
    pub id: String,
}

/// A directly downloadable media file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaLocation {
    pub media_url: String,
    pub duration_seconds: Option<f64>,
    pub caption: Option<String>,
}

/// Turns a video post into a playable media URL
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Name used in logs only
    fn name(&self) -> &str;

    fn supports(&self, kind: PlatformKind) -> bool;

    async fn resolve(&self, target: &VideoTarget) -> Result<MediaLocation, HarvestError>;
}

/// Saves a resolved media URL into a worker-owned temporary file
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    async fn download(&self, location: &MediaLocation) -> Result<TempMedia, HarvestError>;
}

/// Video strategy: identifier extraction, provider chain, download and probe
pub struct VideoFetcher {
    chain: ResolverChain,
    decoder: Arc<dyn MediaDecoder>,
}

impl VideoFetcher {
    pub fn new(chain: ResolverChain, decoder: Arc<dyn MediaDecoder>) -> Self {
        Self { chain, decoder }
    }

    pub async fn acquire(&self, url: &str, kind: PlatformKind) -> Result<VideoFile, HarvestError> {
        let id = extract_identifier(url, kind)?;
        let target = VideoTarget {
            url: url.to_string(),
            kind,
            id,
        };

        let (media, location) = self.chain.fetch(&target).await?;

        let duration_seconds = match self.decoder.probe_duration(media.path()).await {
            Ok(duration) => duration,
            Err(e) => match location.duration_seconds {
                Some(reported) => {
                    warn!(
                        "Could not probe {} video {}, using reported duration {}s: {}",
                        kind, target.id, reported, e
                    );
                    reported
                }
                None => return Err(e),
            },
        };

        info!(
            "Downloaded {} video {} ({:.1}s)",
            kind, target.id, duration_seconds
        );

        Ok(VideoFile {
            media,
            duration_seconds,
            caption: location.caption,
        })
    }
}
