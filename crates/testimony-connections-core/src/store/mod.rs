//! Storage abstraction for Testimony Connections.
//!
//! The [`ConnectionStore`] trait covers everything the embedding pipeline,
//! the discovery runner and the read API need, so backends are pluggable
//! (SQLite in the application crate, in-memory here for tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{EdgeType, Testimony, TestimonyEdge, TestimonyEmbedding, TestimonyStatus};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_testimony`](ConnectionStore::upsert_testimony) | Insert or replace a testimony |
/// | [`delete_testimony`](ConnectionStore::delete_testimony) | Remove a testimony with its vectors and edges |
/// | [`upsert_embedding`](ConnectionStore::upsert_embedding) | Store a vector keyed by (testimony, section, model) |
/// | [`upsert_edge`](ConnectionStore::upsert_edge) | Store an edge keyed by (from, to, type) |
/// | [`prune_edges`](ConnectionStore::prune_edges) | Drop discovered edges a run no longer produces |
/// | [`edges_for`](ConnectionStore::edges_for) | Edges touching one testimony, best first |
/// | [`top_edges`](ConnectionStore::top_edges) | Best edges overall |
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Insert or replace a testimony; generates an id when it is empty.
    ///
    /// Returns the testimony id.
    async fn upsert_testimony(&self, testimony: &Testimony) -> Result<String>;

    async fn get_testimony(&self, id: &str) -> Result<Option<Testimony>>;

    /// Returns `false` when the testimony does not exist.
    async fn set_status(&self, id: &str, status: TestimonyStatus) -> Result<bool>;

    async fn set_transcript(&self, id: &str, transcript: &str) -> Result<bool>;

    /// Delete a testimony together with its embeddings and every edge
    /// touching it. Returns `false` when it did not exist.
    async fn delete_testimony(&self, id: &str) -> Result<bool>;

    /// All approved testimonies, ordered by id.
    async fn approved_testimonies(&self) -> Result<Vec<Testimony>>;

    async fn embeddings_for(&self, testimony_id: &str) -> Result<Vec<TestimonyEmbedding>>;

    async fn upsert_embedding(&self, embedding: &TestimonyEmbedding) -> Result<()>;

    /// Remove one `(testimony, section, model)` vector. Returns `false` when
    /// there was none.
    async fn delete_embedding(&self, testimony_id: &str, section: &str, model: &str)
        -> Result<bool>;

    /// Insert or update by `(from_id, to_id, type)`.
    ///
    /// On update, score, source, reason and `updated_at` are overwritten;
    /// `created_at` and `user_rating` are kept.
    async fn upsert_edge(&self, edge: &TestimonyEdge) -> Result<()>;

    /// Delete edges from `from_id` whose `(to_id, type)` is not in `keep`.
    ///
    /// Returns the number of rows removed.
    async fn prune_edges(&self, from_id: &str, keep: &[(String, EdgeType)]) -> Result<u64>;

    /// Edges where `id` is either endpoint, score descending.
    async fn edges_for(&self, id: &str, limit: usize) -> Result<Vec<TestimonyEdge>>;

    /// All edges, score descending.
    async fn top_edges(&self, limit: usize) -> Result<Vec<TestimonyEdge>>;

    /// Set the admin rating on an edge. Returns `false` when no such edge.
    async fn rate_edge(
        &self,
        from_id: &str,
        to_id: &str,
        edge_type: EdgeType,
        rating: i64,
    ) -> Result<bool>;
}
