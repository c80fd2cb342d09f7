//! # Testimony Connections Core
//!
//! Runtime-agnostic logic for Testimony Connections: testimony models,
//! date handling, scoring rules, the discovery engine, redacted views, and
//! the store abstraction.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.

pub mod connections;
pub mod dates;
pub mod discovery;
pub mod embedding;
pub mod models;
pub mod rules;
pub mod store;
pub mod view;

#[cfg(test)]
mod testing;
