//! Discovery runner: the read-compute-write cycle around the engine.
//!
//! Loads the subject testimony, every other approved testimony and their
//! stored vectors, runs [`discover_connections`], upserts the resulting
//! edges `subject → candidate`, and prunes edges from the subject that the
//! run no longer produces. Re-running is idempotent.

use anyhow::{bail, Result};
use tracing::info;

use testimony_connections_core::discovery::{discover_connections, Candidate};
use testimony_connections_core::models::{EdgeType, TestimonyEmbedding};
use testimony_connections_core::rules::DiscoveryOptions;
use testimony_connections_core::store::ConnectionStore;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Outcome of one discovery run.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryReport {
    pub testimony_id: String,
    pub candidates: usize,
    pub edges_written: usize,
    pub edges_pruned: u64,
}

pub async fn run_discovery(
    store: &dyn ConnectionStore,
    testimony_id: &str,
    opts: &DiscoveryOptions,
) -> Result<DiscoveryReport> {
    let subject = match store.get_testimony(testimony_id).await? {
        Some(t) => t,
        None => bail!("Testimony not found: {}", testimony_id),
    };
    let subject_vectors = store.embeddings_for(&subject.id).await?;

    let others: Vec<_> = store
        .approved_testimonies()
        .await?
        .into_iter()
        .filter(|t| t.id != subject.id)
        .collect();

    let mut vectors: Vec<Vec<TestimonyEmbedding>> = Vec::with_capacity(others.len());
    for other in &others {
        vectors.push(store.embeddings_for(&other.id).await?);
    }

    let candidates: Vec<Candidate<'_>> = others
        .iter()
        .zip(&vectors)
        .map(|(testimony, vectors)| Candidate {
            testimony,
            vectors: vectors.as_slice(),
        })
        .collect();

    let matches = discover_connections(&subject, &subject_vectors, &candidates, opts);

    let now = chrono::Utc::now().timestamp();
    let keep: Vec<(String, EdgeType)> = matches
        .iter()
        .map(|m| (m.to_id.clone(), m.edge_type))
        .collect();
    let edges_written = matches.len();

    for m in matches {
        store.upsert_edge(&m.into_edge(&subject.id, now)).await?;
    }
    let edges_pruned = store.prune_edges(&subject.id, &keep).await?;

    info!(
        testimony_id = %subject.id,
        candidates = candidates.len(),
        edges_written,
        edges_pruned,
        "discovery complete"
    );

    Ok(DiscoveryReport {
        testimony_id: subject.id,
        candidates: candidates.len(),
        edges_written,
        edges_pruned,
    })
}

/// Run discovery for every approved testimony.
pub async fn run_discovery_all(
    store: &dyn ConnectionStore,
    opts: &DiscoveryOptions,
) -> Result<Vec<DiscoveryReport>> {
    let ids: Vec<String> = store
        .approved_testimonies()
        .await?
        .into_iter()
        .map(|t| t.id)
        .collect();

    let mut reports = Vec::with_capacity(ids.len());
    for id in ids {
        reports.push(run_discovery(store, &id, opts).await?);
    }
    Ok(reports)
}

/// `tconn discover <id>` / `tconn discover --all`.
pub async fn run_discover(config: &Config, id: Option<&str>, all: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let opts = config.discovery.options();

    let reports = match (id, all) {
        (Some(id), false) => vec![run_discovery(&store, id, &opts).await?],
        (None, true) => run_discovery_all(&store, &opts).await?,
        _ => bail!("Specify a testimony id or --all"),
    };

    println!("discover");
    for r in &reports {
        println!(
            "  {}: {} candidates, {} edges, {} pruned",
            r.testimony_id, r.candidates, r.edges_written, r.edges_pruned
        );
    }
    println!("  testimonies processed: {}", reports.len());

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use testimony_connections_core::models::{Testimony, TestimonyStatus};
    use testimony_connections_core::store::memory::InMemoryStore;

    fn testimony(id: &str, event: &str, date: &str) -> Testimony {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "title": id,
            "fullName": "Witness",
            "event": event,
            "dateOfEvent": date,
            "status": "approved"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_edges() {
        let store = InMemoryStore::new();
        store
            .upsert_testimony(&testimony("t1", "Genocide", "1994-04-07"))
            .await
            .unwrap();
        store
            .upsert_testimony(&testimony("t2", "Genocide", "1994-04-09"))
            .await
            .unwrap();

        let report = run_discovery(&store, "t1", &DiscoveryOptions::default())
            .await
            .unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(report.edges_written, 2);

        let edges = store.edges_for("t1", 10).await.unwrap();
        let types: Vec<_> = edges.iter().map(|e| e.edge_type).collect();
        assert_eq!(types, vec![EdgeType::SameEvent, EdgeType::NearbyDates]);
        assert!((edges[0].score - 0.90).abs() < 1e-9);
        assert!((edges[1].score - (0.70 - 0.20 * 2.0 / 30.0)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rerun_updates_without_duplicates_and_prunes() {
        let store = InMemoryStore::new();
        store
            .upsert_testimony(&testimony("t1", "Genocide", "1994-04-07"))
            .await
            .unwrap();
        store
            .upsert_testimony(&testimony("t2", "Genocide", "1994-04-09"))
            .await
            .unwrap();
        let opts = DiscoveryOptions::default();

        run_discovery(&store, "t1", &opts).await.unwrap();
        run_discovery(&store, "t1", &opts).await.unwrap();
        assert_eq!(store.edge_count(), 2);

        store
            .upsert_testimony(&testimony("t2", "Liberation", "1994-04-09"))
            .await
            .unwrap();
        let report = run_discovery(&store, "t1", &opts).await.unwrap();
        assert_eq!(report.edges_pruned, 1);
        let edges = store.edges_for("t1", 10).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].edge_type, EdgeType::NearbyDates);
    }

    #[tokio::test]
    async fn test_unapproved_candidates_are_ignored() {
        let store = InMemoryStore::new();
        store
            .upsert_testimony(&testimony("t1", "Genocide", "1994-04-07"))
            .await
            .unwrap();
        let mut pending = testimony("t2", "Genocide", "1994-04-07");
        pending.status = TestimonyStatus::Pending;
        store.upsert_testimony(&pending).await.unwrap();

        let report = run_discovery(&store, "t1", &DiscoveryOptions::default())
            .await
            .unwrap();
        assert_eq!(report.candidates, 0);
        assert_eq!(store.edge_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_subject_errors() {
        let store = InMemoryStore::new();
        let err = run_discovery(&store, "nope", &DiscoveryOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
