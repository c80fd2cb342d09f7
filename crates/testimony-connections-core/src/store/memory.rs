//! In-memory [`ConnectionStore`] implementation for tests.
//!
//! Uses `BTreeMap`s behind `std::sync::RwLock`. Ordering guarantees match
//! the SQLite store: testimonies by id, edges by score descending.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{EdgeType, Testimony, TestimonyEdge, TestimonyEmbedding, TestimonyStatus};

use super::ConnectionStore;

type EdgeKey = (String, String, EdgeType);
type EmbeddingKey = (String, String, String);

/// In-memory store for tests and embedding-free tooling.
pub struct InMemoryStore {
    testimonies: RwLock<BTreeMap<String, Testimony>>,
    embeddings: RwLock<BTreeMap<EmbeddingKey, TestimonyEmbedding>>,
    edges: RwLock<BTreeMap<EdgeKey, TestimonyEdge>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            testimonies: RwLock::new(BTreeMap::new()),
            embeddings: RwLock::new(BTreeMap::new()),
            edges: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored edges, for assertions in tests.
    pub fn edge_count(&self) -> usize {
        self.edges.read().unwrap().len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_edges(edges: &mut [TestimonyEdge]) {
    edges.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.from_id.cmp(&b.from_id))
            .then_with(|| a.to_id.cmp(&b.to_id))
            .then_with(|| a.edge_type.cmp(&b.edge_type))
    });
}

#[async_trait]
impl ConnectionStore for InMemoryStore {
    async fn upsert_testimony(&self, testimony: &Testimony) -> Result<String> {
        let mut t = testimony.clone();
        if t.id.trim().is_empty() {
            t.id = uuid::Uuid::new_v4().to_string();
        }
        let now = chrono::Utc::now().timestamp();
        let mut testimonies = self.testimonies.write().unwrap();
        t.created_at = testimonies
            .get(&t.id)
            .map(|existing| existing.created_at)
            .unwrap_or(now);
        t.updated_at = now;
        let id = t.id.clone();
        testimonies.insert(id.clone(), t);
        Ok(id)
    }

    async fn get_testimony(&self, id: &str) -> Result<Option<Testimony>> {
        Ok(self.testimonies.read().unwrap().get(id).cloned())
    }

    async fn set_status(&self, id: &str, status: TestimonyStatus) -> Result<bool> {
        let mut testimonies = self.testimonies.write().unwrap();
        Ok(match testimonies.get_mut(id) {
            Some(t) => {
                t.status = status;
                t.updated_at = chrono::Utc::now().timestamp();
                true
            }
            None => false,
        })
    }

    async fn set_transcript(&self, id: &str, transcript: &str) -> Result<bool> {
        let mut testimonies = self.testimonies.write().unwrap();
        Ok(match testimonies.get_mut(id) {
            Some(t) => {
                t.transcript = Some(transcript.to_string());
                t.updated_at = chrono::Utc::now().timestamp();
                true
            }
            None => false,
        })
    }

    async fn delete_testimony(&self, id: &str) -> Result<bool> {
        let existed = self.testimonies.write().unwrap().remove(id).is_some();
        self.embeddings
            .write()
            .unwrap()
            .retain(|(tid, _, _), _| tid != id);
        self.edges
            .write()
            .unwrap()
            .retain(|(from, to, _), _| from != id && to != id);
        Ok(existed)
    }

    async fn approved_testimonies(&self) -> Result<Vec<Testimony>> {
        Ok(self
            .testimonies
            .read()
            .unwrap()
            .values()
            .filter(|t| t.status == TestimonyStatus::Approved)
            .cloned()
            .collect())
    }

    async fn embeddings_for(&self, testimony_id: &str) -> Result<Vec<TestimonyEmbedding>> {
        Ok(self
            .embeddings
            .read()
            .unwrap()
            .values()
            .filter(|e| e.testimony_id == testimony_id)
            .cloned()
            .collect())
    }

    async fn upsert_embedding(&self, embedding: &TestimonyEmbedding) -> Result<()> {
        let key = (
            embedding.testimony_id.clone(),
            embedding.section.clone(),
            embedding.model.clone(),
        );
        self.embeddings
            .write()
            .unwrap()
            .insert(key, embedding.clone());
        Ok(())
    }

    async fn delete_embedding(
        &self,
        testimony_id: &str,
        section: &str,
        model: &str,
    ) -> Result<bool> {
        let key = (
            testimony_id.to_string(),
            section.to_string(),
            model.to_string(),
        );
        Ok(self.embeddings.write().unwrap().remove(&key).is_some())
    }

    async fn upsert_edge(&self, edge: &TestimonyEdge) -> Result<()> {
        let key = (edge.from_id.clone(), edge.to_id.clone(), edge.edge_type);
        let mut edges = self.edges.write().unwrap();
        match edges.get_mut(&key) {
            Some(existing) => {
                existing.score = edge.score;
                existing.source = edge.source;
                existing.reason = edge.reason.clone();
                existing.updated_at = edge.updated_at;
            }
            None => {
                edges.insert(key, edge.clone());
            }
        }
        Ok(())
    }

    async fn prune_edges(&self, from_id: &str, keep: &[(String, EdgeType)]) -> Result<u64> {
        let mut edges = self.edges.write().unwrap();
        let before = edges.len();
        edges.retain(|(from, to, edge_type), _| {
            from != from_id || keep.iter().any(|(k_to, k_type)| k_to == to && k_type == edge_type)
        });
        Ok((before - edges.len()) as u64)
    }

    async fn edges_for(&self, id: &str, limit: usize) -> Result<Vec<TestimonyEdge>> {
        let mut out: Vec<TestimonyEdge> = self
            .edges
            .read()
            .unwrap()
            .values()
            .filter(|e| e.from_id == id || e.to_id == id)
            .cloned()
            .collect();
        sort_edges(&mut out);
        out.truncate(limit);
        Ok(out)
    }

    async fn top_edges(&self, limit: usize) -> Result<Vec<TestimonyEdge>> {
        let mut out: Vec<TestimonyEdge> = self.edges.read().unwrap().values().cloned().collect();
        sort_edges(&mut out);
        out.truncate(limit);
        Ok(out)
    }

    async fn rate_edge(
        &self,
        from_id: &str,
        to_id: &str,
        edge_type: EdgeType,
        rating: i64,
    ) -> Result<bool> {
        let key = (from_id.to_string(), to_id.to_string(), edge_type);
        let mut edges = self.edges.write().unwrap();
        Ok(match edges.get_mut(&key) {
            Some(edge) => {
                edge.user_rating = Some(rating);
                true
            }
            None => false,
        })
    }
}
