use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::{AudioConfig, VideoConfig};
use crate::error::HarvestError;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const FRAME_TIMEOUT: Duration = Duration::from_secs(30);
const AUDIO_TIMEOUT: Duration = Duration::from_secs(300);

/// Downsampled speech track ready for transcription
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    /// Ogg/Opus bytes
    pub bytes: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u32,
    pub duration_seconds: f64,
}

/// Decoding operations the sampler needs from a media file
#[async_trait]
pub trait MediaDecoder: Send + Sync {
    /// Container duration in seconds
    async fn probe_duration(&self, path: &Path) -> Result<f64, HarvestError>;

    /// One JPEG-encoded frame at `timestamp` seconds
    async fn frame_at(&self, path: &Path, timestamp: f64) -> Result<Vec<u8>, HarvestError>;

    /// The audio track, downsampled per `audio`; `None` when the file has no audio
    async fn demux_audio(
        &self,
        path: &Path,
        audio: &AudioConfig,
    ) -> Result<Option<AudioClip>, HarvestError>;
}

/// Decoder backed by the ffmpeg and ffprobe executables
pub struct FfmpegDecoder {
    ffmpeg_path: String,
    ffprobe_path: String,
    frame_width: u32,
}

impl FfmpegDecoder {
    pub fn new(video: &VideoConfig, frame_width: u32) -> Self {
        Self {
            ffmpeg_path: video.ffmpeg_path.clone(),
            ffprobe_path: video.ffprobe_path.clone(),
            frame_width,
        }
    }

    async fn probe(&self, path: &Path, extra: &[&str]) -> Result<Value, HarvestError> {
        let mut command = Command::new(&self.ffprobe_path);
        command
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .args(extra)
            .arg(path);

        let output = run(command, PROBE_TIMEOUT, "ffprobe").await?;
        serde_json::from_slice(&output.stdout)
            .map_err(|e| HarvestError::MediaDecode(format!("unreadable ffprobe output: {}", e)))
    }
}

/// Run a media tool, killing it if the timeout elapses
async fn run(mut command: Command, limit: Duration, tool: &str) -> Result<Output, HarvestError> {
    command.kill_on_drop(true);

    let output = match timeout(limit, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            // A missing binary is a deployment problem, not bad media
            return Err(HarvestError::Internal(format!("failed to run {}: {}", tool, e)));
        }
        Err(_) => {
            return Err(HarvestError::MediaDecode(format!(
                "{} did not finish within {:?}",
                tool, limit
            )))
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("{} stderr: {}", tool, stderr.trim());
        return Err(HarvestError::MediaDecode(format!(
            "{} exited with {}",
            tool, output.status
        )));
    }
    Ok(output)
}

fn duration_of(probe: &Value) -> Option<f64> {
    probe["format"]["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

#[async_trait]
impl MediaDecoder for FfmpegDecoder {
    async fn probe_duration(&self, path: &Path) -> Result<f64, HarvestError> {
        let probe = self.probe(path, &[]).await?;
        if probe["streams"].as_array().is_none_or(|streams| streams.is_empty()) {
            return Err(HarvestError::MediaDecode("file has no media streams".to_string()));
        }
        duration_of(&probe)
            .ok_or_else(|| HarvestError::MediaDecode("could not read media duration".to_string()))
    }

    async fn frame_at(&self, path: &Path, timestamp: f64) -> Result<Vec<u8>, HarvestError> {
        let mut command = Command::new(&self.ffmpeg_path);
        command
            .args(["-v", "error", "-ss", &format!("{:.3}", timestamp), "-i"])
            .arg(path)
            .args([
                "-frames:v",
                "1",
                "-vf",
                &format!("scale={}:-2", self.frame_width),
                "-f",
                "image2pipe",
                "-vcodec",
                "mjpeg",
                "pipe:1",
            ]);

        let output = run(command, FRAME_TIMEOUT, "ffmpeg").await?;
        if output.stdout.is_empty() {
            return Err(HarvestError::MediaDecode(format!(
                "no frame at {:.1}s",
                timestamp
            )));
        }
        Ok(output.stdout)
    }

    async fn demux_audio(
        &self,
        path: &Path,
        audio: &AudioConfig,
    ) -> Result<Option<AudioClip>, HarvestError> {
        let probe = self.probe(path, &["-select_streams", "a"]).await?;
        if probe["streams"].as_array().is_none_or(|streams| streams.is_empty()) {
            debug!("{} has no audio track", path.display());
            return Ok(None);
        }

        let mut command = Command::new(&self.ffmpeg_path);
        command
            .args(["-v", "error", "-i"])
            .arg(path)
            .args([
                "-vn",
                "-ac",
                &audio.channels.to_string(),
                "-ar",
                &audio.sample_rate.to_string(),
                "-c:a",
                "libopus",
                "-b:a",
                &audio.bitrate,
                "-f",
                "ogg",
                "pipe:1",
            ]);

        let output = run(command, AUDIO_TIMEOUT, "ffmpeg").await?;
        if output.stdout.is_empty() {
            warn!("Audio track of {} decoded to nothing", path.display());
            return Ok(None);
        }

        Ok(Some(AudioClip {
            bytes: output.stdout,
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            duration_seconds: duration_of(&probe).unwrap_or_default(),
        }))
    }
}
