//! Testimony CLI commands: import, approve, transcribe, connections.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use testimony_connections_core::connections::{clamp_limit, connections_for, top_connections};
use testimony_connections_core::models::Testimony;
use testimony_connections_core::store::ConnectionStore;
use testimony_connections_core::view::ConnectionView;

use crate::config::Config;
use crate::db;
use crate::pipeline::Pipeline;
use crate::sqlite_store::SqliteStore;

/// Parse a file holding one testimony object or an array of them.
pub fn parse_testimonies(content: &str) -> Result<Vec<Testimony>> {
    let value: serde_json::Value =
        serde_json::from_str(content).with_context(|| "Invalid testimony JSON")?;
    let testimonies = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(testimonies)
}

/// Store every testimony, returning their ids in input order.
pub async fn import_testimonies(
    store: &dyn ConnectionStore,
    testimonies: &[Testimony],
) -> Result<Vec<String>> {
    let mut ids = Vec::with_capacity(testimonies.len());
    for t in testimonies {
        if t.title.trim().is_empty() {
            bail!("Testimony is missing a title");
        }
        ids.push(store.upsert_testimony(t).await?);
    }
    Ok(ids)
}

/// `tconn import <file>`.
pub async fn run_import(config: &Config, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let testimonies = parse_testimonies(&content)?;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let ids = import_testimonies(&store, &testimonies).await?;

    println!("import {}", path.display());
    for id in &ids {
        println!("  {}", id);
    }
    println!("  imported: {}", ids.len());

    pool.close().await;
    Ok(())
}

/// `tconn approve <id>`: approve, then run the pipeline in the foreground.
pub async fn run_approve(config: &Config, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let pipeline = Pipeline::from_config(config, Arc::new(SqliteStore::new(pool.clone())))?;

    if !pipeline.approve(id).await? {
        pool.close().await;
        bail!("Testimony not found: {}", id);
    }
    let report = pipeline.process(id).await?;

    println!("approve {}", id);
    println!("  candidates: {}", report.candidates);
    println!("  edges: {}", report.edges_written);
    println!("  pruned: {}", report.edges_pruned);

    pool.close().await;
    Ok(())
}

/// `tconn transcribe <id>`.
pub async fn run_transcribe(config: &Config, id: &str) -> Result<()> {
    if !config.transcription.is_enabled() {
        bail!("Transcription is disabled. Set [transcription] url in config.");
    }
    let pool = db::connect(config).await?;
    let pipeline = Pipeline::from_config(config, Arc::new(SqliteStore::new(pool.clone())))?;

    let written = pipeline.transcribe(id).await?;
    if written {
        println!("transcribe {}: transcript stored", id);
    } else {
        println!("transcribe {}: nothing to transcribe", id);
    }

    pool.close().await;
    Ok(())
}

/// `tconn connections <id>` / `tconn connections --all`.
pub async fn run_connections(
    config: &Config,
    id: Option<&str>,
    all: bool,
    limit: Option<i64>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let limit = clamp_limit(limit);

    let connections = match (id, all) {
        (Some(id), false) => connections_for(&store, id, limit).await?,
        (None, true) => top_connections(&store, limit).await?,
        _ => {
            pool.close().await;
            bail!("Specify a testimony id or --all");
        }
    };

    print_connections(&connections);
    pool.close().await;
    Ok(())
}

fn print_connections(connections: &[ConnectionView]) {
    if connections.is_empty() {
        println!("No connections.");
        return;
    }

    for (i, c) in connections.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} / {}",
            i + 1,
            c.score,
            c.edge_type,
            c.testimony.title
        );
        println!("    {} -> {}", c.from_id, c.to_id);
        println!("    reason: {}", c.reason);
        if let Some(rating) = c.user_rating {
            println!("    rating: {}", rating);
        }
        println!();
    }
}
