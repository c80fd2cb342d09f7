//! Connection read API.
//!
//! Turns stored edges into [`ConnectionView`]s by joining the testimony on
//! the far side of each edge. Used by both the CLI and the HTTP server.

use std::collections::HashMap;

use anyhow::Result;

use crate::models::{EdgeType, Testimony, TestimonyStatus};
use crate::store::ConnectionStore;
use crate::view::ConnectionView;

pub const DEFAULT_CONNECTIONS_LIMIT: usize = 10;
pub const MAX_CONNECTIONS_LIMIT: usize = 50;

/// Clamp a caller-supplied limit to `[1, 50]`, defaulting to 10.
pub fn clamp_limit(requested: Option<i64>) -> usize {
    match requested {
        None => DEFAULT_CONNECTIONS_LIMIT,
        Some(n) if n < 1 => 1,
        Some(n) => (n as usize).min(MAX_CONNECTIONS_LIMIT),
    }
}

/// Connections of one testimony, best first.
///
/// Edges in both directions are considered. When both `a → b` and `b → a`
/// exist under the same type, only the higher-scored one is returned.
/// Edges whose far side no longer exists or is not approved are skipped.
pub async fn connections_for(
    store: &dyn ConnectionStore,
    id: &str,
    limit: usize,
) -> Result<Vec<ConnectionView>> {
    // Mirrored edges can take up to half the rows, so over-fetch.
    let edges = store.edges_for(id, limit.saturating_mul(2)).await?;

    let mut seen: Vec<(String, EdgeType)> = Vec::new();
    let mut cache: HashMap<String, Option<Testimony>> = HashMap::new();
    let mut out = Vec::new();

    for edge in edges {
        let other_id = if edge.from_id == id {
            edge.to_id.clone()
        } else {
            edge.from_id.clone()
        };
        let key = (other_id.clone(), edge.edge_type);
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);

        if let Some(other) = fetch_approved(store, &mut cache, &other_id).await? {
            out.push(ConnectionView::new(&edge, &other));
        }
        if out.len() >= limit {
            break;
        }
    }

    Ok(out)
}

/// Best connections across the whole archive.
///
/// Only edges with an approved testimony on both ends are returned.
pub async fn top_connections(
    store: &dyn ConnectionStore,
    limit: usize,
) -> Result<Vec<ConnectionView>> {
    let edges = store.top_edges(limit.saturating_mul(2)).await?;
    let mut cache: HashMap<String, Option<Testimony>> = HashMap::new();
    let mut out = Vec::with_capacity(limit.min(edges.len()));

    for edge in edges {
        if fetch_approved(store, &mut cache, &edge.from_id).await?.is_none() {
            continue;
        }
        if let Some(target) = fetch_approved(store, &mut cache, &edge.to_id).await? {
            out.push(ConnectionView::new(&edge, &target));
        }
        if out.len() >= limit {
            break;
        }
    }

    Ok(out)
}

async fn fetch_approved(
    store: &dyn ConnectionStore,
    cache: &mut HashMap<String, Option<Testimony>>,
    id: &str,
) -> Result<Option<Testimony>> {
    Ok(fetch_cached(store, cache, id)
        .await?
        .filter(|t| t.status == TestimonyStatus::Approved))
}

async fn fetch_cached(
    store: &dyn ConnectionStore,
    cache: &mut HashMap<String, Option<Testimony>>,
    id: &str,
) -> Result<Option<Testimony>> {
    if let Some(hit) = cache.get(id) {
        return Ok(hit.clone());
    }
    let fetched = store.get_testimony(id).await?;
    cache.insert(id.to_string(), fetched.clone());
    Ok(fetched)
}
