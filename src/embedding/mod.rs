//! Embedding provider client.
//!
//! Turns `(section, text)` pairs into vectors by calling an external
//! embedding service:
//!
//! - **local**: a model server at `embedding.local.base_url`, woken with a
//!   best-effort `GET /health` before each attempt, then
//!   `POST /embeddings` with `{model, input}`.
//! - **cloud**: `POST {base}/accounts/{id}/ai/run/{model}` with a bearer
//!   token and `{text}`; vectors come back in `result.data` by input index.
//!
//! # Retry Strategy
//!
//! Up to [`MAX_ATTEMPTS`] attempts. Before attempt `n > 1` the client sleeps
//! `1000ms × n` (2s, then 3s).
//! - Network errors, HTTP 429 and 5xx, malformed payloads → retry
//! - Other HTTP 4xx → fail immediately
//! - After the last attempt the last error is returned
//!
//! A response that decodes but lacks a usable vector for some input drops
//! that section with a warning. A response with no usable vector at all is
//! malformed.

pub mod decode;
pub mod transport;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::{EmbeddingConfig, ProviderKind};
use decode::VectorLookup;
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport, Sleeper, TokioSleeper};

pub const MAX_ATTEMPTS: u32 = 3;
pub const BACKOFF_STEP_MS: u64 = 1000;
pub const WAKE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding provider is disabled")]
    Disabled,
    #[error("embedding configuration error: {0}")]
    Config(String),
    #[error("embedding request failed: {message}")]
    Transport { message: String },
    #[error("embedding provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed embedding response: {0}")]
    Malformed(String),
}

impl EmbeddingError {
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::Transport { .. } | EmbeddingError::Malformed(_) => true,
            EmbeddingError::Status { status, .. } => *status == 429 || *status >= 500,
            EmbeddingError::Disabled | EmbeddingError::Config(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            EmbeddingError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Provider {
    Disabled,
    Local { base_url: String },
    Cloud { url: String, api_token: String },
}

impl Provider {
    fn name(&self) -> &'static str {
        match self {
            Provider::Disabled => "disabled",
            Provider::Local { .. } => "local",
            Provider::Cloud { .. } => "cloud",
        }
    }
}

/// Configured embedding client. Cheap to clone.
#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Provider,
    model: String,
    timeout: Duration,
    transport: Arc<dyn HttpTransport>,
    sleeper: Arc<dyn Sleeper>,
}

fn required(value: &Option<String>, name: &str) -> Result<String, EmbeddingError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| EmbeddingError::Config(format!("{} is required", name)))
}

impl EmbeddingClient {
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        Self::with_transport(
            config,
            Arc::new(ReqwestTransport::new()),
            Arc::new(TokioSleeper),
        )
    }

    /// Build a client over explicit transport and sleeper implementations.
    pub fn with_transport(
        config: &EmbeddingConfig,
        transport: Arc<dyn HttpTransport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, EmbeddingError> {
        let (provider, model) = match config.provider {
            ProviderKind::Disabled => (Provider::Disabled, String::new()),
            ProviderKind::Local => {
                let model = required(&config.model, "embedding.model")?;
                let base_url = required(&config.local.base_url, "embedding.local.base_url")?;
                (
                    Provider::Local {
                        base_url: base_url.trim_end_matches('/').to_string(),
                    },
                    model,
                )
            }
            ProviderKind::Cloud => {
                let model = required(&config.model, "embedding.model")?;
                let account_id =
                    required(&config.cloud.account_id, "embedding.cloud.account_id")?;
                let api_token = required(&config.cloud.api_token, "embedding.cloud.api_token")?;
                let url = format!(
                    "{}/accounts/{}/ai/run/{}",
                    config.cloud.base_url.trim_end_matches('/'),
                    account_id,
                    model
                );
                (Provider::Cloud { url, api_token }, model)
            }
        };

        Ok(Self {
            provider,
            model,
            timeout: Duration::from_secs(config.timeout_secs),
            transport,
            sleeper,
        })
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.provider, Provider::Disabled)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Embed each non-blank section, returning `section → vector`.
    ///
    /// All-blank input returns an empty map without touching the network.
    pub async fn embed_sections(
        &self,
        sections: &[(String, String)],
    ) -> Result<BTreeMap<String, Vec<f32>>, EmbeddingError> {
        let inputs: Vec<(&str, &str)> = sections
            .iter()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(label, text)| (label.as_str(), text.as_str()))
            .collect();

        if inputs.is_empty() {
            return Ok(BTreeMap::new());
        }
        if !self.is_enabled() {
            return Err(EmbeddingError::Disabled);
        }

        let provider = self.provider.name();
        let mut last_err = None;

        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                let delay = Duration::from_millis(BACKOFF_STEP_MS * u64::from(attempt));
                warn!(
                    attempt,
                    max_attempts = MAX_ATTEMPTS,
                    provider,
                    status = ?last_err.as_ref().and_then(EmbeddingError::status),
                    delay_ms = delay.as_millis() as u64,
                    "retrying embedding request"
                );
                self.sleeper.sleep(delay).await;
            }
            if let Provider::Local { base_url } = &self.provider {
                self.wake(base_url).await;
            }

            info!(
                attempt,
                max_attempts = MAX_ATTEMPTS,
                provider,
                model = %self.model,
                inputs = inputs.len(),
                "embedding request"
            );

            match self.attempt(&inputs).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if !e.is_retryable() => {
                    error!(
                        attempt,
                        max_attempts = MAX_ATTEMPTS,
                        provider,
                        status = ?e.status(),
                        error = %e,
                        "embedding request rejected"
                    );
                    return Err(e);
                }
                Err(e) => last_err = Some(e),
            }
        }

        let err = last_err.unwrap_or_else(|| {
            EmbeddingError::Malformed("embedding failed after retries".to_string())
        });
        error!(
            attempts = MAX_ATTEMPTS,
            max_attempts = MAX_ATTEMPTS,
            provider,
            status = ?err.status(),
            error = %err,
            "embedding failed"
        );
        Err(err)
    }

    async fn wake(&self, base_url: &str) {
        let url = format!("{}/health", base_url);
        if let Err(e) = self.transport.get(&url, WAKE_TIMEOUT).await {
            debug!(error = %e, "wake probe failed");
        }
    }

    async fn attempt(
        &self,
        inputs: &[(&str, &str)],
    ) -> Result<BTreeMap<String, Vec<f32>>, EmbeddingError> {
        let texts: Vec<&str> = inputs.iter().map(|(_, text)| *text).collect();

        let (url, bearer, body) = match &self.provider {
            Provider::Disabled => return Err(EmbeddingError::Disabled),
            Provider::Local { base_url } => (
                format!("{}/embeddings", base_url),
                None,
                serde_json::json!({ "model": self.model, "input": texts }),
            ),
            Provider::Cloud { url, api_token } => (
                url.clone(),
                Some(api_token.as_str()),
                serde_json::json!({ "text": texts }),
            ),
        };

        let response = self
            .transport
            .post_json(&url, bearer, &body, self.timeout)
            .await?;
        if !response.is_success() {
            return Err(EmbeddingError::Status {
                status: response.status,
                body: response.body,
            });
        }

        let json: serde_json::Value = serde_json::from_str(&response.body)
            .map_err(|e| EmbeddingError::Malformed(format!("invalid JSON: {}", e)))?;

        let lookups: Vec<VectorLookup> = match &self.provider {
            Provider::Cloud { .. } => {
                let items = decode::cloud_items(&json)?;
                (0..inputs.len())
                    .map(|i| decode::cloud_vector(items.get(i)))
                    .collect()
            }
            _ => {
                let items = decode::local_items(&json)?;
                (0..inputs.len())
                    .map(|i| decode::local_vector(items.get(i)))
                    .collect()
            }
        };

        let mut vectors = BTreeMap::new();
        for ((section, _), lookup) in inputs.iter().zip(lookups) {
            match lookup {
                VectorLookup::Found(v) => {
                    vectors.insert(section.to_string(), v);
                }
                VectorLookup::Missing => {
                    warn!(section = %section, "no vector returned for section; skipping")
                }
                VectorLookup::NotNumeric => {
                    warn!(section = %section, "vector for section is not numeric; skipping")
                }
            }
        }

        if vectors.is_empty() {
            return Err(EmbeddingError::Malformed(
                "response contained no usable vectors".to_string(),
            ));
        }
        Ok(vectors)
    }
}
