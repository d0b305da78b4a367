//! Thin HTTP client for the Chatterbox voice-cloning API.
//!
//! Training and inference happen entirely on the provider side; this module
//! only shuttles audio and parameters across and interprets the two response
//! shapes the TTS endpoint can produce (inline audio, or an async job handle
//! that later resolves through the webhook receiver).

pub mod models;

use std::time::Duration;

use crate::error::AppError;
use crate::registry::GenerationParams;

pub use models::{ProviderJob, TtsOutcome, TtsPayload};

pub struct ChatterboxClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ChatterboxClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Upload reference audio and start a training job. Returns the
    /// provider-side job id that the completion webhook will reference.
    pub async fn start_training(
        &self,
        user_id: &str,
        voice_name: &str,
        file_name: &str,
        audio: Vec<u8>,
    ) -> Result<String, AppError> {
        let part = reqwest::multipart::Part::bytes(audio).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new()
            .text("user_id", user_id.to_string())
            .text("name", voice_name.to_string())
            .part("audio_file", part);

        let response = self
            .http
            .post(format!("{}/voices/upload", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to upload audio: {}", e)))?;

        if !response.status().is_success() {
            return Err(upstream_error("Failed to upload audio", response).await);
        }

        let job: ProviderJob = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Invalid training response: {}", e)))?;
        Ok(job.job_id)
    }

    /// Request speech generation. A 202 carries an async job handle; any
    /// other success carries the audio bytes inline.
    pub async fn generate(
        &self,
        voice_id: &str,
        text: &str,
        params: &GenerationParams,
    ) -> Result<TtsOutcome, AppError> {
        let payload = TtsPayload {
            voice_id,
            text,
            exaggeration: params.exaggeration,
            pace: params.pace,
            temperature: params.temperature,
            output_format: "wav",
        };

        let response = self
            .http
            .post(format!("{}/tts", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to generate speech: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::ACCEPTED {
            let job: ProviderJob = response
                .json()
                .await
                .map_err(|e| AppError::Upstream(format!("Invalid job handle: {}", e)))?;
            return Ok(TtsOutcome::Pending {
                provider_job_id: job.job_id,
            });
        }
        if !status.is_success() {
            return Err(upstream_error("Failed to generate speech", response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to read audio: {}", e)))?;
        Ok(TtsOutcome::Audio(bytes.to_vec()))
    }

    /// Drop the provider-side voice model.
    pub async fn delete_voice(&self, voice_id: &str) -> Result<(), AppError> {
        let response = self
            .http
            .delete(format!("{}/voices/{}", self.base_url, voice_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to delete voice: {}", e)))?;

        if !response.status().is_success() {
            return Err(upstream_error("Failed to delete voice", response).await);
        }
        Ok(())
    }

    /// Download generated audio referenced by a completion webhook.
    pub async fn fetch_audio(&self, url: &str) -> Result<Vec<u8>, AppError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to fetch audio: {}", e)))?;

        if !response.status().is_success() {
            return Err(upstream_error("Failed to fetch audio", response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to read audio: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

async fn upstream_error(context: &str, response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    AppError::Upstream(format!("{}: {} {}", context, status, snippet))
}
