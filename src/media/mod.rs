//! Frame and audio sampling for downloaded videos.

mod decoder;
mod transcribe;

pub use decoder::{AudioClip, FfmpegDecoder, MediaDecoder};
pub use transcribe::{GoogleSpeechTranscriber, Transcriber};

use log::{debug, info, warn};
use std::sync::Arc;
use uuid::Uuid;

use crate::acquire::VideoFile;
use crate::config::{AudioConfig, SamplerConfig};
use crate::error::HarvestError;
use crate::storage::BlobStore;

/// Transcript placeholder used when a video has no usable speech
pub const NO_TRANSCRIPT: &str = "no transcript";

/// Seconds between sampled frames.
///
/// Short videos are sampled every second; longer ones are spread so that at
/// most `max_frames` frames are taken.
pub fn frame_step(duration_seconds: f64, max_frames: u32) -> u64 {
    let max_frames = max_frames.max(1) as f64;
    if duration_seconds < max_frames {
        1
    } else {
        (duration_seconds / max_frames).ceil() as u64
    }
}

/// Timestamps at `0, step, 2 * step, ...` strictly below the duration.
///
/// A video with no measurable (or a non-finite) duration still yields a single
/// frame at zero.
pub fn frame_timestamps(duration_seconds: f64, max_frames: u32) -> Vec<f64> {
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return vec![0.0];
    }
    let step = frame_step(duration_seconds, max_frames) as f64;
    (0u64..)
        .map(|i| i as f64 * step)
        .take_while(|t| *t < duration_seconds)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    pub timestamp: f64,
    /// JPEG bytes
    pub jpeg: Vec<u8>,
}

/// Sampled frames in timestamp order, consumed once
#[derive(Debug)]
pub struct Frames(std::vec::IntoIter<EncodedFrame>);

impl Iterator for Frames {
    type Item = EncodedFrame;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl ExactSizeIterator for Frames {}

#[derive(Debug)]
pub struct MediaSample {
    pub frames: Frames,
    /// Transcript text, or [`NO_TRANSCRIPT`]
    pub transcript: String,
    /// Reference to the persisted cover frame; `None` if persisting failed
    pub cover_image: Option<String>,
}

/// Turns a downloaded video into frames, a transcript and a cover image
pub struct MediaSampler {
    decoder: Arc<dyn MediaDecoder>,
    transcriber: Option<Arc<dyn Transcriber>>,
    blobs: Arc<dyn BlobStore>,
    max_frames: u32,
    audio: AudioConfig,
}

impl MediaSampler {
    pub fn new(
        decoder: Arc<dyn MediaDecoder>,
        transcriber: Option<Arc<dyn Transcriber>>,
        blobs: Arc<dyn BlobStore>,
        config: &SamplerConfig,
    ) -> Self {
        Self {
            decoder,
            transcriber,
            blobs,
            max_frames: config.max_frames,
            audio: config.audio.clone(),
        }
    }

    pub async fn sample(&self, video: &VideoFile) -> Result<MediaSample, HarvestError> {
        let transcript = self.transcript(video).await;
        let frames = self.frames(video).await?;

        let cover_image = match frames.last() {
            Some(cover) => self.persist_cover(cover).await,
            None => None,
        };

        info!(
            "Sampled {} frames from {:.1}s video (transcript: {})",
            frames.len(),
            video.duration_seconds,
            transcript != NO_TRANSCRIPT
        );

        Ok(MediaSample {
            frames: Frames(frames.into_iter()),
            transcript,
            cover_image,
        })
    }

    /// Never fails: every problem degrades to the placeholder transcript
    async fn transcript(&self, video: &VideoFile) -> String {
        let Some(transcriber) = &self.transcriber else {
            debug!("Transcription disabled");
            return NO_TRANSCRIPT.to_string();
        };

        let clip = match self.decoder.demux_audio(video.local_path(), &self.audio).await {
            Ok(Some(clip)) => clip,
            Ok(None) => {
                debug!("Video has no audio track");
                return NO_TRANSCRIPT.to_string();
            }
            Err(e) => {
                warn!("Audio extraction failed: {}", e);
                return NO_TRANSCRIPT.to_string();
            }
        };

        match transcriber.transcribe(&clip).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => NO_TRANSCRIPT.to_string(),
            Err(e) => {
                warn!("{}", e);
                NO_TRANSCRIPT.to_string()
            }
        }
    }

    async fn frames(&self, video: &VideoFile) -> Result<Vec<EncodedFrame>, HarvestError> {
        let timestamps = frame_timestamps(video.duration_seconds, self.max_frames);
        let wanted = timestamps.len();
        let mut frames = Vec::with_capacity(wanted);

        for timestamp in timestamps {
            match self.decoder.frame_at(video.local_path(), timestamp).await {
                Ok(jpeg) => frames.push(EncodedFrame { timestamp, jpeg }),
                Err(e @ HarvestError::Internal(_)) => return Err(e),
                Err(e) => debug!("Skipping frame at {:.1}s: {}", timestamp, e),
            }
        }

        if frames.is_empty() {
            return Err(HarvestError::MediaDecode(format!(
                "none of {} frames could be decoded",
                wanted
            )));
        }
        Ok(frames)
    }

    async fn persist_cover(&self, cover: &EncodedFrame) -> Option<String> {
        let key = format!("covers/{}.jpg", Uuid::new_v4());
        match self.blobs.put(&key, &cover.jpeg, "image/jpeg").await {
            Ok(reference) => Some(reference),
            Err(e) => {
                warn!("Could not persist cover image: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::TempMedia;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    #[test]
    fn test_frame_step() {
        assert_eq!(frame_step(30.0, 60), 1);
        assert_eq!(frame_step(60.0, 60), 1);
        assert_eq!(frame_step(600.0, 60), 10);
        assert_eq!(frame_step(601.0, 60), 11);
    }

    #[test]
    fn test_frame_timestamps() {
        assert_eq!(frame_timestamps(3.5, 60), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(frame_timestamps(600.0, 60).len(), 60);
        assert_eq!(frame_timestamps(0.0, 60), vec![0.0]);
        assert_eq!(frame_timestamps(-1.0, 60), vec![0.0]);
        assert_eq!(frame_timestamps(f64::INFINITY, 60), vec![0.0]);
        assert_eq!(frame_timestamps(f64::NAN, 60), vec![0.0]);
    }

    struct FakeDecoder {
        audio: bool,
        broken_frames: Vec<f64>,
    }

    #[async_trait]
    impl MediaDecoder for FakeDecoder {
        async fn probe_duration(&self, _path: &Path) -> Result<f64, HarvestError> {
            Ok(3.0)
        }

        async fn frame_at(&self, _path: &Path, timestamp: f64) -> Result<Vec<u8>, HarvestError> {
            if self.broken_frames.contains(&timestamp) {
                Err(HarvestError::MediaDecode("bad frame".into()))
            } else {
                Ok(format!("frame@{}", timestamp).into_bytes())
            }
        }

        async fn demux_audio(
            &self,
            _path: &Path,
            audio: &AudioConfig,
        ) -> Result<Option<AudioClip>, HarvestError> {
            Ok(self.audio.then(|| AudioClip {
                bytes: vec![1, 2, 3],
                sample_rate: audio.sample_rate,
                channels: audio.channels,
                duration_seconds: 3.0,
            }))
        }
    }

    struct FailingTranscriber;

    #[async_trait]
    impl Transcriber for FailingTranscriber {
        async fn transcribe(&self, _clip: &AudioClip) -> Result<String, HarvestError> {
            Err(HarvestError::Transcription("quota exceeded".into()))
        }
    }

    struct EchoTranscriber;

    #[async_trait]
    impl Transcriber for EchoTranscriber {
        async fn transcribe(&self, clip: &AudioClip) -> Result<String, HarvestError> {
            Ok(format!("{} Hz speech", clip.sample_rate))
        }
    }

    #[derive(Default)]
    struct MemoryBlobs {
        stored: Mutex<Vec<(String, Vec<u8>)>>,
        fail: bool,
    }

    #[async_trait]
    impl BlobStore for MemoryBlobs {
        async fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<String, HarvestError> {
            if self.fail {
                return Err(HarvestError::Internal("disk full".into()));
            }
            self.stored.lock().unwrap().push((key.to_string(), bytes.to_vec()));
            Ok(format!("mem://{}", key))
        }
    }

    fn video(duration_seconds: f64) -> VideoFile {
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        VideoFile {
            media: TempMedia::new(path),
            duration_seconds,
            caption: None,
        }
    }

    fn sampler(
        decoder: FakeDecoder,
        transcriber: Option<Arc<dyn Transcriber>>,
        blobs: Arc<MemoryBlobs>,
    ) -> MediaSampler {
        MediaSampler::new(Arc::new(decoder), transcriber, blobs, &SamplerConfig::default())
    }

    #[tokio::test]
    async fn test_sample_persists_last_frame_as_cover() {
        let blobs = Arc::new(MemoryBlobs::default());
        let decoder = FakeDecoder { audio: true, broken_frames: vec![] };
        let sample = sampler(decoder, Some(Arc::new(EchoTranscriber)), blobs.clone())
            .sample(&video(3.0))
            .await
            .unwrap();

        assert_eq!(sample.transcript, "16000 Hz speech");
        let cover = sample.cover_image.clone().unwrap();
        assert!(cover.starts_with("mem://covers/"));

        let stored = blobs.stored.lock().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].1, b"frame@2".to_vec());

        let timestamps: Vec<f64> = sample.frames.map(|f| f.timestamp).collect();
        assert_eq!(timestamps, vec![0.0, 1.0, 2.0]);
    }

    #[tokio::test]
    async fn test_missing_audio_and_failed_transcription_use_placeholder() {
        let decoder = FakeDecoder { audio: false, broken_frames: vec![] };
        let sample = sampler(decoder, Some(Arc::new(EchoTranscriber)), Arc::default())
            .sample(&video(2.0))
            .await
            .unwrap();
        assert_eq!(sample.transcript, NO_TRANSCRIPT);

        let decoder = FakeDecoder { audio: true, broken_frames: vec![] };
        let sample = sampler(decoder, Some(Arc::new(FailingTranscriber)), Arc::default())
            .sample(&video(2.0))
            .await
            .unwrap();
        assert_eq!(sample.transcript, NO_TRANSCRIPT);
    }

    #[tokio::test]
    async fn test_broken_frames_are_skipped_until_none_remain() {
        let decoder = FakeDecoder { audio: false, broken_frames: vec![1.0] };
        let sample = sampler(decoder, None, Arc::default()).sample(&video(3.0)).await.unwrap();
        assert_eq!(sample.frames.len(), 2);

        let decoder = FakeDecoder { audio: false, broken_frames: vec![0.0] };
        let err = sampler(decoder, None, Arc::default()).sample(&video(0.5)).await.unwrap_err();
        assert!(matches!(err, HarvestError::MediaDecode(_)));
    }

    #[tokio::test]
    async fn test_cover_failure_degrades() {
        let blobs = Arc::new(MemoryBlobs { fail: true, ..Default::default() });
        let decoder = FakeDecoder { audio: false, broken_frames: vec![] };
        let sample = sampler(decoder, None, blobs).sample(&video(1.0)).await.unwrap();
        assert!(sample.cover_image.is_none());
        assert_eq!(sample.transcript, NO_TRANSCRIPT);
    }
}
