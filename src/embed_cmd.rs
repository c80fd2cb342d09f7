use anyhow::{bail, Result};
use tracing::warn;

use testimony_connections_core::models::{content_hash, Testimony, TestimonyEmbedding};
use testimony_connections_core::store::ConnectionStore;

use crate::config::Config;
use crate::db;
use crate::embedding::EmbeddingClient;
use crate::sqlite_store::SqliteStore;

/// Counts from one embedding pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmbedReport {
    pub embedded: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// Vectors dropped because their section is gone.
    pub removed: usize,
}

impl EmbedReport {
    fn absorb(&mut self, other: EmbedReport) {
        self.embedded += other.embedded;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
        self.removed += other.removed;
    }
}

/// Embed the sections of one testimony whose text changed since the last
/// embedding under the client's model.
///
/// Sections the provider returned no vector for count as failed; the rest
/// are stored.
pub async fn embed_testimony(
    store: &dyn ConnectionStore,
    client: &EmbeddingClient,
    testimony: &Testimony,
) -> Result<EmbedReport> {
    let existing = store.embeddings_for(&testimony.id).await?;
    let mut report = EmbedReport::default();
    let mut stale = Vec::new();

    let sections: Vec<_> = testimony
        .sections()
        .into_iter()
        .filter(|(_, text)| !text.trim().is_empty())
        .collect();

    // Vectors of sections the testimony no longer has.
    for gone in existing.iter().filter(|e| {
        e.model == client.model() && !sections.iter().any(|(s, _)| s.as_str() == e.section)
    }) {
        store
            .delete_embedding(&testimony.id, &gone.section, &gone.model)
            .await?;
        report.removed += 1;
    }

    for (section, text) in sections {
        let hash = content_hash(&text);
        let up_to_date = existing.iter().any(|e| {
            e.section == section.as_str() && e.model == client.model() && e.content_hash == hash
        });
        if up_to_date {
            report.unchanged += 1;
        } else {
            stale.push((section.as_str().to_string(), text, hash));
        }
    }

    if stale.is_empty() {
        return Ok(report);
    }

    let inputs: Vec<(String, String)> = stale
        .iter()
        .map(|(section, text, _)| (section.clone(), text.clone()))
        .collect();
    let vectors = client.embed_sections(&inputs).await?;
    let now = chrono::Utc::now().timestamp();

    for (section, _, hash) in stale {
        match vectors.get(&section) {
            Some(vector) => {
                store
                    .upsert_embedding(&TestimonyEmbedding {
                        testimony_id: testimony.id.clone(),
                        section,
                        model: client.model().to_string(),
                        vector: vector.clone(),
                        content_hash: hash,
                        created_at: now,
                    })
                    .await?;
                report.embedded += 1;
            }
            None => report.failed += 1,
        }
    }

    Ok(report)
}

/// Embed every approved testimony with missing or stale sections.
///
/// A testimony whose request fails is logged and counted; the pass goes on.
pub async fn embed_pending(
    store: &dyn ConnectionStore,
    client: &EmbeddingClient,
) -> Result<EmbedReport> {
    let mut total = EmbedReport::default();

    for testimony in store.approved_testimonies().await? {
        match embed_testimony(store, client, &testimony).await {
            Ok(report) => total.absorb(report),
            Err(e) => {
                warn!(testimony_id = %testimony.id, error = %e, "embedding failed");
                total.failed += testimony
                    .sections()
                    .iter()
                    .filter(|(_, text)| !text.trim().is_empty())
                    .count();
            }
        }
    }

    Ok(total)
}

fn enabled_client(config: &Config) -> Result<EmbeddingClient> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    Ok(EmbeddingClient::from_config(&config.embedding)?)
}

/// `tconn embed pending`.
pub async fn run_embed_pending(config: &Config) -> Result<()> {
    let client = enabled_client(config)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let report = embed_pending(&store, &client).await?;

    println!("embed pending");
    println!("  embedded: {}", report.embedded);
    println!("  unchanged: {}", report.unchanged);
    println!("  failed: {}", report.failed);
    println!("  removed: {}", report.removed);

    pool.close().await;
    Ok(())
}

/// `tconn embed testimony <id>`.
pub async fn run_embed_testimony(config: &Config, id: &str) -> Result<()> {
    let client = enabled_client(config)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let testimony = match store.get_testimony(id).await? {
        Some(t) => t,
        None => bail!("Testimony not found: {}", id),
    };
    let report = embed_testimony(&store, &client, &testimony).await?;

    println!("embed testimony {}", id);
    println!("  embedded: {}", report.embedded);
    println!("  unchanged: {}", report.unchanged);
    println!("  failed: {}", report.failed);
    println!("  removed: {}", report.removed);

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::echo_client;
    use testimony_connections_core::models::TestimonyStatus;
    use testimony_connections_core::store::memory::InMemoryStore;

    fn testimony(id: &str, content: Option<&str>) -> Testimony {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "title": format!("Title {}", id),
            "content": content,
            "fullName": "Witness",
            "status": "approved"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_unchanged_sections_are_skipped() {
        let store = InMemoryStore::new();
        let (client, transport) = echo_client();
        let mut t = testimony("t1", Some("We walked for days."));
        store.upsert_testimony(&t).await.unwrap();

        let first = embed_testimony(&store, &client, &t).await.unwrap();
        assert_eq!(first.embedded, 2);
        assert_eq!(transport.posts(), 1);

        let second = embed_testimony(&store, &client, &t).await.unwrap();
        assert_eq!(second.unchanged, 2);
        assert_eq!(transport.posts(), 1);

        t.content = Some("We walked for weeks.".into());
        let third = embed_testimony(&store, &client, &t).await.unwrap();
        assert_eq!(third.embedded, 1);
        assert_eq!(third.unchanged, 1);
        assert_eq!(transport.texts(), 3);

        let stored = store.embeddings_for("t1").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|e| e.model == "test-model"));
    }

    #[tokio::test]
    async fn test_vectors_of_removed_sections_are_deleted() {
        let store = InMemoryStore::new();
        let (client, _) = echo_client();
        let mut t = testimony("t1", Some("We walked for days."));
        store.upsert_testimony(&t).await.unwrap();
        embed_testimony(&store, &client, &t).await.unwrap();

        store
            .upsert_embedding(&TestimonyEmbedding {
                testimony_id: "t1".into(),
                section: "content".into(),
                model: "older-model".into(),
                vector: vec![1.0],
                content_hash: "h".into(),
                created_at: 0,
            })
            .await
            .unwrap();

        t.content = None;
        store.upsert_testimony(&t).await.unwrap();
        let report = embed_testimony(&store, &client, &t).await.unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.unchanged, 1);

        let mut left: Vec<(String, String)> = store
            .embeddings_for("t1")
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.section, e.model))
            .collect();
        left.sort();
        assert_eq!(
            left,
            vec![
                ("content".to_string(), "older-model".to_string()),
                ("title".to_string(), "test-model".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_embed_pending_only_touches_approved() {
        let store = InMemoryStore::new();
        let (client, _) = echo_client();
        store
            .upsert_testimony(&testimony("a", Some("content")))
            .await
            .unwrap();
        let mut pending = testimony("b", None);
        pending.status = TestimonyStatus::Pending;
        store.upsert_testimony(&pending).await.unwrap();

        let report = embed_pending(&store, &client).await.unwrap();
        assert_eq!(report.embedded, 2);
        assert!(store.embeddings_for("b").await.unwrap().is_empty());
    }
}
