use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::acquire::{AcquiredContent, Acquirer, VideoFile, WebPage};
use crate::classify::classify;
use crate::error::HarvestError;
use crate::extract::StructuredExtractor;
use crate::media::{MediaSampler, NO_TRANSCRIPT};
use crate::model::{ExtractionRequest, RecipeDraft};

const UNTITLED: &str = "Untitled Recipe";

/// One attempt at turning a URL into a recipe: classify, acquire, sample, extract
pub struct Pipeline {
    acquirer: Acquirer,
    sampler: MediaSampler,
    extractor: StructuredExtractor,
}

/// Stop at a stage boundary if the job has been cancelled
fn checkpoint(cancel: &CancellationToken) -> Result<(), HarvestError> {
    if cancel.is_cancelled() {
        Err(HarvestError::Cancelled)
    } else {
        Ok(())
    }
}

impl Pipeline {
    pub fn new(acquirer: Acquirer, sampler: MediaSampler, extractor: StructuredExtractor) -> Self {
        Self {
            acquirer,
            sampler,
            extractor,
        }
    }

    pub async fn run(
        &self,
        request: &ExtractionRequest,
        cancel: &CancellationToken,
    ) -> Result<RecipeDraft, HarvestError> {
        let kind = classify(&request.url);
        info!("Processing {} URL", kind);
        checkpoint(cancel)?;

        let content = self.acquirer.acquire(&request.url, kind).await?;
        checkpoint(cancel)?;

        match content {
            AcquiredContent::WebPage(page) => self.from_page(page).await,
            AcquiredContent::VideoFile(video) => self.from_video(video, cancel).await,
        }
    }

    async fn from_page(&self, page: WebPage) -> Result<RecipeDraft, HarvestError> {
        let mut draft = self.extractor.extract(&page.text, &page.title).await?;
        draft.image_ref = page.image_url;
        Ok(draft)
    }

    async fn from_video(
        &self,
        video: VideoFile,
        cancel: &CancellationToken,
    ) -> Result<RecipeDraft, HarvestError> {
        let sample = self.sampler.sample(&video).await;
        // The temporary file is not needed past sampling, whatever the outcome
        let caption = video.caption.clone();
        drop(video);
        let sample = sample?;
        debug!("{} frames kept for diagnostics", sample.frames.len());
        checkpoint(cancel)?;

        let title_hint = caption
            .as_deref()
            .and_then(|c| c.lines().map(str::trim).find(|line| !line.is_empty()))
            .unwrap_or(UNTITLED)
            .to_string();
        let content = video_content(caption.as_deref(), &sample.transcript);

        let mut draft = self.extractor.extract(&content, &title_hint).await?;
        draft.image_ref = sample.cover_image;
        Ok(draft)
    }
}

/// Text handed to the extractor for a video: caption first, then speech
fn video_content(caption: Option<&str>, transcript: &str) -> String {
    let mut content = String::new();
    if let Some(caption) = caption.map(str::trim).filter(|c| !c.is_empty()) {
        content.push_str("Caption:\n");
        content.push_str(caption);
        content.push_str("\n\n");
    }
    content.push_str("Transcript:\n");
    content.push_str(if transcript.trim().is_empty() {
        NO_TRANSCRIPT
    } else {
        transcript
    });
    content
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_content_with_caption() {
        assert_eq!(
            video_content(Some(" Crispy tofu \n"), "press the tofu"),
            "Caption:\nCrispy tofu\n\nTranscript:\npress the tofu"
        );
    }

    #[test]
    fn test_video_content_without_speech() {
        assert_eq!(video_content(None, NO_TRANSCRIPT), "Transcript:\nno transcript");
        assert_eq!(video_content(Some("   "), ""), "Transcript:\nno transcript");
    }

    #[test]
    fn test_checkpoint() {
        let token = CancellationToken::new();
        assert!(checkpoint(&token).is_ok());
        token.cancel();
        assert!(matches!(checkpoint(&token), Err(HarvestError::Cancelled)));
    }
}
