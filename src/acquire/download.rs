use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::USER_AGENT;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use super::video::{MediaDownloader, MediaLocation};
use super::TempMedia;
use crate::config::VideoConfig;
use crate::error::HarvestError;

const DOWNLOAD_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Streams media over HTTP into a temporary file
pub struct HttpMediaDownloader {
    client: Client,
    max_bytes: u64,
}

impl HttpMediaDownloader {
    pub fn new(config: &VideoConfig) -> Result<Self, HarvestError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()
            .map_err(|e| HarvestError::BuilderError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_bytes: config.max_download_bytes,
        })
    }

    fn too_large(&self) -> HarvestError {
        HarvestError::UnsupportedContent(format!(
            "media is larger than {} bytes",
            self.max_bytes
        ))
    }
}

fn io_error(e: std::io::Error) -> HarvestError {
    HarvestError::Internal(format!("failed to write temporary media: {}", e))
}

#[async_trait]
impl MediaDownloader for HttpMediaDownloader {
    async fn download(&self, location: &MediaLocation) -> Result<TempMedia, HarvestError> {
        let mut response = self
            .client
            .get(&location.media_url)
            .header(USER_AGENT, DOWNLOAD_AGENT)
            .send()
            .await?;

        let status = response.status();
        match status {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                return Err(HarvestError::UnsupportedContent(format!(
                    "media no longer available (HTTP {})",
                    status.as_u16()
                )))
            }
            _ => {
                return Err(HarvestError::Acquisition(format!(
                    "media download returned HTTP {}",
                    status.as_u16()
                )))
            }
        }

        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(self.too_large());
        }

        let (file, path) = tempfile::Builder::new()
            .prefix("harvest-")
            .suffix(".mp4")
            .tempfile()
            .map_err(io_error)?
            .into_parts();
        // Owned from here on so the file is removed on every early return
        let media = TempMedia::new(path);
        let mut file = tokio::fs::File::from_std(file);

        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(self.too_large());
            }
            file.write_all(&chunk).await.map_err(io_error)?;
        }
        file.flush().await.map_err(io_error)?;

        if written == 0 {
            return Err(HarvestError::MediaDecode("downloaded media is empty".to_string()));
        }

        debug!("Media written to {}", media.path().display());
        info!("Downloaded {} bytes of media", written);
        Ok(media)
    }
}
