use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the schema. Idempotent.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS testimonies (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT,
            transcript TEXT,
            kind TEXT NOT NULL DEFAULT 'written',
            media_url TEXT,
            full_name TEXT NOT NULL,
            email TEXT,
            phone TEXT,
            location TEXT,
            event TEXT,
            date_of_event TEXT,
            date_range_start TEXT,
            date_range_end TEXT,
            relation_to_event TEXT,
            identity_preference TEXT NOT NULL DEFAULT 'public',
            status TEXT NOT NULL DEFAULT 'pending',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS testimony_relatives (
            testimony_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            relationship_type TEXT,
            PRIMARY KEY (testimony_id, position),
            FOREIGN KEY (testimony_id) REFERENCES testimonies(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS testimony_embeddings (
            testimony_id TEXT NOT NULL,
            section TEXT NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            vector BLOB NOT NULL,
            content_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (testimony_id, section, model),
            FOREIGN KEY (testimony_id) REFERENCES testimonies(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Edges are keyed by (from, to, type) so discovery can upsert.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS testimony_edges (
            from_id TEXT NOT NULL,
            to_id TEXT NOT NULL,
            type TEXT NOT NULL,
            score REAL NOT NULL,
            source TEXT NOT NULL,
            reason TEXT NOT NULL DEFAULT '',
            user_rating INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (from_id, to_id, type),
            FOREIGN KEY (from_id) REFERENCES testimonies(id) ON DELETE CASCADE,
            FOREIGN KEY (to_id) REFERENCES testimonies(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_testimonies_status ON testimonies(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_edges_to_id ON testimony_edges(to_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_edges_score ON testimony_edges(score DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
