//! Client for the speech-to-text service.
//!
//! The service exposes `POST /transcribe` taking `{audioUrl, language?}` and
//! answering `{text, language, duration, segments}`. Errors come back as
//! `{"error": "..."}` with a non-2xx status.

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::TranscriptionConfig;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TranscriptSegment {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Transcript {
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TranscribeRequest<'a> {
    audio_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

#[derive(Clone)]
pub struct TranscriptionClient {
    base_url: String,
    default_language: Option<String>,
    client: reqwest::Client,
}

impl TranscriptionClient {
    /// `None` when no transcription URL is configured.
    pub fn from_config(config: &TranscriptionConfig) -> Result<Option<Self>> {
        if !config.is_enabled() {
            return Ok(None);
        }
        let base_url = config
            .url
            .as_deref()
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .ok_or_else(|| anyhow!("transcription.url is required"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Some(Self {
            base_url,
            default_language: config.language.clone(),
            client,
        }))
    }

    /// Transcribe the media at `media_url`. `language` falls back to the
    /// configured hint; with neither, the service auto-detects.
    pub async fn transcribe(&self, media_url: &str, language: Option<&str>) -> Result<Transcript> {
        let request = TranscribeRequest {
            audio_url: media_url,
            language: language.or(self.default_language.as_deref()),
        };

        let response = self
            .client
            .post(format!("{}/transcribe", self.base_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            let message = body
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("no error message");
            bail!("Transcription service error {}: {}", status, message);
        }

        let transcript: Transcript = response.json().await?;
        Ok(transcript)
    }
}
