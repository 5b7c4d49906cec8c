use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, info};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::{sleep, Instant};

use super::AudioClip;
use crate::config::TranscriptionConfig;
use crate::error::HarvestError;

/// Longest clip the synchronous recognize endpoint accepts
const SYNC_LIMIT_SECONDS: f64 = 60.0;
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Speech-to-text over an audio clip
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Plain transcript text; empty when nothing was recognised
    async fn transcribe(&self, clip: &AudioClip) -> Result<String, HarvestError>;
}

/// Google Cloud Speech-to-Text over the REST API
pub struct GoogleSpeechTranscriber {
    client: Client,
    api_key: String,
    base_url: String,
    language_code: String,
    deadline: Duration,
    poll_interval: Duration,
}

fn transcription_error(e: reqwest::Error) -> HarvestError {
    // The API key travels in the query string
    HarvestError::Transcription(e.without_url().to_string())
}

impl GoogleSpeechTranscriber {
    /// Create a transcriber from configuration.
    ///
    /// The API key is read from the config first, then from `GOOGLE_API_KEY`.
    pub fn new(config: &TranscriptionConfig) -> Result<Self, HarvestError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .ok_or_else(|| {
                HarvestError::BuilderError(
                    "GOOGLE_API_KEY environment variable not set".to_string(),
                )
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HarvestError::BuilderError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            language_code: config.language_code.clone(),
            deadline: Duration::from_secs(config.timeout_secs),
            poll_interval: POLL_INTERVAL,
        })
    }

    #[doc(hidden)]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn request_body(&self, clip: &AudioClip) -> Value {
        json!({
            "config": {
                "encoding": "OGG_OPUS",
                "sampleRateHertz": clip.sample_rate,
                "audioChannelCount": clip.channels,
                "languageCode": self.language_code,
                "enableAutomaticPunctuation": true
            },
            "audio": {
                "content": STANDARD.encode(&clip.bytes)
            }
        })
    }

    async fn call(&self, method: &str, path: &str, body: Option<&Value>) -> Result<Value, HarvestError> {
        let url = format!("{}{}?key={}", self.base_url, path, self.api_key);
        let request = match body {
            Some(body) => self.client.post(&url).json(body),
            None => self.client.get(&url),
        };

        let response = request.send().await.map_err(transcription_error)?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            debug!("Speech API {} {} error body: {}", method, path, error_text);
            return Err(HarvestError::Transcription(format!(
                "speech API returned HTTP {}",
                status.as_u16()
            )));
        }

        response.json().await.map_err(transcription_error)
    }

    async fn wait_for_operation(&self, name: &str) -> Result<Value, HarvestError> {
        let started = Instant::now();
        loop {
            let operation = self.call("GET", &format!("/v1/operations/{}", name), None).await?;
            if operation["done"].as_bool().unwrap_or(false) {
                if let Some(message) = operation["error"]["message"].as_str() {
                    return Err(HarvestError::Transcription(message.to_string()));
                }
                return Ok(operation["response"].clone());
            }
            if started.elapsed() >= self.deadline {
                return Err(HarvestError::Transcription(
                    "recognition did not finish in time".to_string(),
                ));
            }
            sleep(self.poll_interval).await;
        }
    }
}

/// Concatenate the best alternative of every result
fn collect_transcript(response: &Value) -> String {
    response["results"]
        .as_array()
        .map(|results| {
            results
                .iter()
                .filter_map(|result| result["alternatives"][0]["transcript"].as_str())
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

#[async_trait]
impl Transcriber for GoogleSpeechTranscriber {
    async fn transcribe(&self, clip: &AudioClip) -> Result<String, HarvestError> {
        let body = self.request_body(clip);

        let response = if clip.duration_seconds <= SYNC_LIMIT_SECONDS {
            self.call("POST", "/v1/speech:recognize", Some(&body)).await?
        } else {
            let operation = self
                .call("POST", "/v1/speech:longrunningrecognize", Some(&body))
                .await?;
            let name = operation["name"].as_str().ok_or_else(|| {
                HarvestError::Transcription("speech API returned no operation name".to_string())
            })?;
            debug!("Waiting for recognition operation {}", name);
            self.wait_for_operation(name).await?
        };

        let transcript = collect_transcript(&response);
        info!("Transcribed {:.1}s of audio into {} characters", clip.duration_seconds, transcript.len());
        Ok(transcript)
    }
}
