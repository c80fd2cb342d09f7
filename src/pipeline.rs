//! Approval pipeline and background task helpers.
//!
//! Approving a testimony runs three steps in order:
//!
//! ```text
//! transcribe (audio/video without transcript)
//!     → embed changed sections
//!         → discover connections
//! ```
//!
//! A failed transcription or embedding step is logged and the pipeline moves
//! on, so rule-based connections are still produced. Background runs are
//! detached tasks: at most once, never retried, errors only logged.

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use testimony_connections_core::models::TestimonyStatus;
use testimony_connections_core::rules::DiscoveryOptions;
use testimony_connections_core::store::ConnectionStore;

use crate::config::Config;
use crate::discover::{run_discovery, DiscoveryReport};
use crate::embed_cmd::embed_testimony;
use crate::embedding::EmbeddingClient;
use crate::transcription::TranscriptionClient;

/// Shared services needed by the post-approval steps.
#[derive(Clone)]
pub struct Pipeline {
    pub store: Arc<dyn ConnectionStore>,
    pub embedder: EmbeddingClient,
    pub transcriber: Option<TranscriptionClient>,
    pub options: DiscoveryOptions,
}

impl Pipeline {
    /// Build the clients from configuration. Fails on missing provider
    /// credentials before any network call.
    pub fn from_config(config: &Config, store: Arc<dyn ConnectionStore>) -> Result<Self> {
        Ok(Self {
            store,
            embedder: EmbeddingClient::from_config(&config.embedding)?,
            transcriber: TranscriptionClient::from_config(&config.transcription)?,
            options: config.discovery.options(),
        })
    }

    /// Mark a testimony approved. `false` if it does not exist.
    pub async fn approve(&self, id: &str) -> Result<bool> {
        self.store.set_status(id, TestimonyStatus::Approved).await
    }

    /// Transcribe if needed and store the transcript. Returns whether a
    /// transcript was written.
    pub async fn transcribe(&self, id: &str) -> Result<bool> {
        let Some(transcriber) = &self.transcriber else {
            return Ok(false);
        };
        let Some(testimony) = self.store.get_testimony(id).await? else {
            return Ok(false);
        };
        if !testimony.needs_transcript() {
            return Ok(false);
        }
        let Some(media_url) = testimony.media_url.as_deref() else {
            return Ok(false);
        };

        let transcript = transcriber.transcribe(media_url, None).await?;
        if transcript.text.trim().is_empty() {
            warn!(testimony_id = %id, "transcription returned empty text");
            return Ok(false);
        }
        self.store.set_transcript(id, &transcript.text).await
    }

    /// Post-approval steps for one testimony.
    pub async fn process(&self, id: &str) -> Result<DiscoveryReport> {
        if let Err(e) = self.transcribe(id).await {
            warn!(testimony_id = %id, error = %e, "transcription failed; continuing");
        }

        if self.embedder.is_enabled() {
            match self.store.get_testimony(id).await? {
                Some(testimony) => {
                    match embed_testimony(self.store.as_ref(), &self.embedder, &testimony).await {
                        Ok(report) => info!(
                            testimony_id = %id,
                            embedded = report.embedded,
                            unchanged = report.unchanged,
                            failed = report.failed,
                            "embedding complete"
                        ),
                        Err(e) => {
                            warn!(testimony_id = %id, error = %e, "embedding failed; continuing")
                        }
                    }
                }
                None => anyhow::bail!("Testimony not found: {}", id),
            }
        }

        run_discovery(self.store.as_ref(), id, &self.options).await
    }

    /// Run [`process`](Self::process) in a detached task.
    pub fn spawn_process(&self, id: String) -> JoinHandle<()> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline.process(&id).await {
                error!(testimony_id = %id, error = %e, "approval pipeline failed");
            }
        })
    }

    /// Run discovery alone in a detached task.
    pub fn spawn_discovery(&self, id: String) -> JoinHandle<()> {
        let store = self.store.clone();
        let options = self.options;
        tokio::spawn(async move {
            if let Err(e) = run_discovery(store.as_ref(), &id, &options).await {
                error!(testimony_id = %id, error = %e, "connection discovery failed");
            }
        })
    }
}
