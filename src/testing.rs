//! Test doubles shared by unit tests in this crate.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EmbeddingConfig, LocalProviderConfig, ProviderKind};
use crate::embedding::{EmbeddingClient, EmbeddingError, HttpResponse, HttpTransport, Sleeper};

/// Local-provider stand-in: every input text gets `[1.0, len(text)]`.
#[derive(Default)]
pub struct EchoTransport {
    pub posts: AtomicUsize,
    pub texts: AtomicUsize,
}

impl EchoTransport {
    pub fn posts(&self) -> usize {
        self.posts.load(Ordering::SeqCst)
    }

    pub fn texts(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for EchoTransport {
    async fn post_json(
        &self,
        _url: &str,
        _bearer: Option<&str>,
        body: &serde_json::Value,
        _timeout: Duration,
    ) -> Result<HttpResponse, EmbeddingError> {
        self.posts.fetch_add(1, Ordering::SeqCst);
        let inputs = body["input"].as_array().cloned().unwrap_or_default();
        self.texts.fetch_add(inputs.len(), Ordering::SeqCst);
        let vectors: Vec<serde_json::Value> = inputs
            .iter()
            .map(|t| {
                let len = t.as_str().map(|s| s.len()).unwrap_or(0);
                serde_json::json!({ "embedding": [1.0, len as f64] })
            })
            .collect();
        Ok(HttpResponse {
            status: 200,
            body: serde_json::Value::Array(vectors).to_string(),
        })
    }

    async fn get(&self, _url: &str, _timeout: Duration) -> Result<HttpResponse, EmbeddingError> {
        Ok(HttpResponse {
            status: 200,
            body: String::new(),
        })
    }
}

pub struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _duration: Duration) {}
}

pub fn local_embedding_config() -> EmbeddingConfig {
    EmbeddingConfig {
        provider: ProviderKind::Local,
        model: Some("test-model".into()),
        local: LocalProviderConfig {
            base_url: Some("http://embedder.test".into()),
        },
        ..Default::default()
    }
}

pub fn echo_client() -> (EmbeddingClient, Arc<EchoTransport>) {
    let transport = Arc::new(EchoTransport::default());
    let client = EmbeddingClient::with_transport(
        &local_embedding_config(),
        transport.clone(),
        Arc::new(NoSleep),
    )
    .unwrap();
    (client, transport)
}
