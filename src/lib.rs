//! # Testimony Connections
//!
//! Embedding and connection-discovery backend for a testimony archive.
//!
//! Approved testimonies are transcribed when they carry audio or video,
//! embedded section by section through an external embedding service, and
//! linked to each other by scored "connection" edges. Edges come from
//! metadata rules (same event, place, date, mentioned person) and from
//! cosine similarity of the stored vectors.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Approval  │──▶│ Transcribe  │──▶│    Embed     │──▶│ Discover │
//! │ CLI / HTTP │   │ (optional)  │   │ local/cloud  │   │  rules   │
//! └────────────┘   └─────────────┘   └──────────────┘   └────┬─────┘
//!                                                            ▼
//!                                    ┌──────────┐      ┌──────────┐
//!                                    │ HTTP API │◀─────│  SQLite  │
//!                                    └──────────┘      └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! tconn init
//! tconn import testimonies.json
//! tconn approve <id>
//! tconn connections <id>
//! tconn serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and env overrides |
//! | [`db`] / [`migrate`] | SQLite pool and schema |
//! | [`sqlite_store`] | SQLite `ConnectionStore` |
//! | [`embedding`] | Embedding provider client with retry |
//! | [`transcription`] | Speech-to-text client |
//! | [`embed_cmd`] | Embedding backfill |
//! | [`discover`] | Discovery runner |
//! | [`pipeline`] | Approval pipeline and background tasks |
//! | [`testimonies`] | Import, approve and connections commands |
//! | [`server`] | HTTP API |
//!
//! Scoring rules, the discovery engine and the redacted views live in the
//! `testimony-connections-core` crate.

pub mod config;
pub mod db;
pub mod discover;
pub mod embed_cmd;
pub mod embedding;
pub mod logging;
pub mod migrate;
pub mod pipeline;
pub mod server;
pub mod sqlite_store;
pub mod testimonies;
pub mod transcription;

#[cfg(test)]
mod testing;
