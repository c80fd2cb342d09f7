//! SQLite-backed [`ConnectionStore`] implementation.
//!
//! Testimonies live in `testimonies` plus `testimony_relatives`; vectors in
//! `testimony_embeddings` as little-endian f32 BLOBs; edges in
//! `testimony_edges`, keyed by `(from_id, to_id, type)`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use testimony_connections_core::dates::{DateRange, EventDate};
use testimony_connections_core::embedding::{blob_to_vec, vec_to_blob};
use testimony_connections_core::models::{
    EdgeType, MentionedRelative, Testimony, TestimonyEdge, TestimonyEmbedding, TestimonyStatus,
};
use testimony_connections_core::store::ConnectionStore;

const TESTIMONY_COLUMNS: &str = "id, title, content, transcript, kind, media_url, full_name, \
    email, phone, location, event, date_of_event, date_range_start, date_range_end, \
    relation_to_event, identity_preference, status, created_at, updated_at";

const EDGE_COLUMNS: &str =
    "from_id, to_id, type, score, source, reason, user_rating, created_at, updated_at";

/// SQLite implementation of the [`ConnectionStore`] trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn relatives_for(&self, id: &str) -> Result<Vec<MentionedRelative>> {
        let rows = sqlx::query(
            "SELECT name, relationship_type FROM testimony_relatives \
             WHERE testimony_id = ? ORDER BY position ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| MentionedRelative {
                name: row.get("name"),
                relationship_type: row.get("relationship_type"),
            })
            .collect())
    }
}

fn row_to_testimony(row: &SqliteRow) -> Result<Testimony> {
    let id: String = row.get("id");
    let parse_opt = |col: &str| -> Result<Option<String>> { Ok(row.try_get(col)?) };

    let date_of_event = parse_opt("date_of_event")?
        .map(|s| s.parse::<EventDate>())
        .transpose()
        .with_context(|| format!("bad date_of_event on testimony {}", id))?;

    let date_range = match (
        parse_opt("date_range_start")?,
        parse_opt("date_range_end")?,
    ) {
        (Some(start), Some(end)) => Some(DateRange {
            start: start.parse()?,
            end: end.parse()?,
        }),
        _ => None,
    };

    let kind: String = row.get("kind");
    let identity: String = row.get("identity_preference");
    let status: String = row.get("status");

    Ok(Testimony {
        title: row.get("title"),
        content: row.get("content"),
        transcript: row.get("transcript"),
        kind: kind.parse()?,
        media_url: row.get("media_url"),
        full_name: row.get("full_name"),
        email: row.get("email"),
        phone: row.get("phone"),
        location: row.get("location"),
        event: row.get("event"),
        date_of_event,
        date_range,
        relation_to_event: row.get("relation_to_event"),
        identity_preference: identity.parse()?,
        status: status.parse()?,
        relatives: Vec::new(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        id,
    })
}

fn row_to_edge(row: &SqliteRow) -> Result<TestimonyEdge> {
    let edge_type: String = row.get("type");
    let source: String = row.get("source");
    Ok(TestimonyEdge {
        from_id: row.get("from_id"),
        to_id: row.get("to_id"),
        edge_type: edge_type.parse()?,
        score: row.get("score"),
        source: source.parse()?,
        reason: row.get("reason"),
        user_rating: row.get("user_rating"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl ConnectionStore for SqliteStore {
    async fn upsert_testimony(&self, testimony: &Testimony) -> Result<String> {
        let id = if testimony.id.trim().is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            testimony.id.clone()
        };
        let now = chrono::Utc::now().timestamp();
        let (range_start, range_end) = match testimony.date_range {
            Some(r) => (Some(r.start.to_string()), Some(r.end.to_string())),
            None => (None, None),
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO testimonies (id, title, content, transcript, kind, media_url,
                                     full_name, email, phone, location, event,
                                     date_of_event, date_range_start, date_range_end,
                                     relation_to_event, identity_preference, status,
                                     created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                transcript = excluded.transcript,
                kind = excluded.kind,
                media_url = excluded.media_url,
                full_name = excluded.full_name,
                email = excluded.email,
                phone = excluded.phone,
                location = excluded.location,
                event = excluded.event,
                date_of_event = excluded.date_of_event,
                date_range_start = excluded.date_range_start,
                date_range_end = excluded.date_range_end,
                relation_to_event = excluded.relation_to_event,
                identity_preference = excluded.identity_preference,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&id)
        .bind(&testimony.title)
        .bind(&testimony.content)
        .bind(&testimony.transcript)
        .bind(testimony.kind.as_str())
        .bind(&testimony.media_url)
        .bind(&testimony.full_name)
        .bind(&testimony.email)
        .bind(&testimony.phone)
        .bind(&testimony.location)
        .bind(&testimony.event)
        .bind(testimony.date_of_event.map(|d| d.to_string()))
        .bind(range_start)
        .bind(range_end)
        .bind(&testimony.relation_to_event)
        .bind(testimony.identity_preference.as_str())
        .bind(testimony.status.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM testimony_relatives WHERE testimony_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        for (position, relative) in testimony.relatives.iter().enumerate() {
            sqlx::query(
                "INSERT INTO testimony_relatives (testimony_id, position, name, relationship_type) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(position as i64)
            .bind(&relative.name)
            .bind(&relative.relationship_type)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    async fn get_testimony(&self, id: &str) -> Result<Option<Testimony>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM testimonies WHERE id = ?",
            TESTIMONY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut t = row_to_testimony(&row)?;
                t.relatives = self.relatives_for(id).await?;
                Ok(Some(t))
            }
            None => Ok(None),
        }
    }

    async fn set_status(&self, id: &str, status: TestimonyStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE testimonies SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(chrono::Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_transcript(&self, id: &str, transcript: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE testimonies SET transcript = ?, updated_at = ? WHERE id = ?")
                .bind(transcript)
                .bind(chrono::Utc::now().timestamp())
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_testimony(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM testimony_edges WHERE from_id = ? OR to_id = ?")
            .bind(id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM testimony_embeddings WHERE testimony_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM testimony_relatives WHERE testimony_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM testimonies WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn approved_testimonies(&self) -> Result<Vec<Testimony>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM testimonies WHERE status = 'approved' ORDER BY id ASC",
            TESTIMONY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut t = row_to_testimony(row)?;
            t.relatives = self.relatives_for(&t.id).await?;
            out.push(t);
        }
        Ok(out)
    }

    async fn embeddings_for(&self, testimony_id: &str) -> Result<Vec<TestimonyEmbedding>> {
        let rows = sqlx::query(
            "SELECT testimony_id, section, model, vector, content_hash, created_at \
             FROM testimony_embeddings WHERE testimony_id = ? ORDER BY section, model",
        )
        .bind(testimony_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("vector");
                TestimonyEmbedding {
                    testimony_id: row.get("testimony_id"),
                    section: row.get("section"),
                    model: row.get("model"),
                    vector: blob_to_vec(&blob),
                    content_hash: row.get("content_hash"),
                    created_at: row.get("created_at"),
                }
            })
            .collect())
    }

    async fn upsert_embedding(&self, embedding: &TestimonyEmbedding) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO testimony_embeddings (testimony_id, section, model, dims, vector,
                                              content_hash, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(testimony_id, section, model) DO UPDATE SET
                dims = excluded.dims,
                vector = excluded.vector,
                content_hash = excluded.content_hash,
                created_at = excluded.created_at
            "#,
        )
        .bind(&embedding.testimony_id)
        .bind(&embedding.section)
        .bind(&embedding.model)
        .bind(embedding.dims() as i64)
        .bind(vec_to_blob(&embedding.vector))
        .bind(&embedding.content_hash)
        .bind(embedding.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_embedding(
        &self,
        testimony_id: &str,
        section: &str,
        model: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM testimony_embeddings WHERE testimony_id = ? AND section = ? AND model = ?",
        )
        .bind(testimony_id)
        .bind(section)
        .bind(model)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_edge(&self, edge: &TestimonyEdge) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO testimony_edges (from_id, to_id, type, score, source, reason,
                                         user_rating, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(from_id, to_id, type) DO UPDATE SET
                score = excluded.score,
                source = excluded.source,
                reason = excluded.reason,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&edge.from_id)
        .bind(&edge.to_id)
        .bind(edge.edge_type.as_str())
        .bind(edge.score)
        .bind(edge.source.as_str())
        .bind(&edge.reason)
        .bind(edge.user_rating)
        .bind(edge.created_at)
        .bind(edge.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn prune_edges(&self, from_id: &str, keep: &[(String, EdgeType)]) -> Result<u64> {
        let rows = sqlx::query("SELECT to_id, type FROM testimony_edges WHERE from_id = ?")
            .bind(from_id)
            .fetch_all(&self.pool)
            .await?;

        let mut removed = 0u64;
        for row in &rows {
            let to_id: String = row.get("to_id");
            let type_label: String = row.get("type");
            let still_found = keep
                .iter()
                .any(|(k_to, k_type)| *k_to == to_id && k_type.as_str() == type_label);
            if still_found {
                continue;
            }
            let result =
                sqlx::query("DELETE FROM testimony_edges WHERE from_id = ? AND to_id = ? AND type = ?")
                    .bind(from_id)
                    .bind(&to_id)
                    .bind(&type_label)
                    .execute(&self.pool)
                    .await?;
            removed += result.rows_affected();
        }
        Ok(removed)
    }

    async fn edges_for(&self, id: &str, limit: usize) -> Result<Vec<TestimonyEdge>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM testimony_edges WHERE from_id = ? OR to_id = ? \
             ORDER BY score DESC, from_id ASC, to_id ASC, type ASC LIMIT ?",
            EDGE_COLUMNS
        ))
        .bind(id)
        .bind(id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_edge).collect()
    }

    async fn top_edges(&self, limit: usize) -> Result<Vec<TestimonyEdge>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM testimony_edges \
             ORDER BY score DESC, from_id ASC, to_id ASC, type ASC LIMIT ?",
            EDGE_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_edge).collect()
    }

    async fn rate_edge(
        &self,
        from_id: &str,
        to_id: &str,
        edge_type: EdgeType,
        rating: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE testimony_edges SET user_rating = ? WHERE from_id = ? AND to_id = ? AND type = ?",
        )
        .bind(rating)
        .bind(from_id)
        .bind(to_id)
        .bind(edge_type.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::migrate_pool;
    use sqlx::sqlite::SqlitePoolOptions;
    use testimony_connections_core::models::{EdgeSource, IdentityPreference};

    async fn memory_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate_pool(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn sample(id: &str) -> Testimony {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "title": format!("Testimony {}", id),
            "fullName": "Jane Doe",
            "event": "Genocide",
            "dateOfEvent": "1994-04",
            "dateRange": { "start": "1994-04-07", "end": "1994-07-04" },
            "identityPreference": "anonymous",
            "status": "approved",
            "relatives": [
                { "name": "Jean", "relationshipType": "brother" },
                { "name": "Marie" }
            ]
        }))
        .unwrap()
    }

    fn edge(from: &str, to: &str, edge_type: EdgeType, score: f64) -> TestimonyEdge {
        TestimonyEdge {
            from_id: from.into(),
            to_id: to.into(),
            edge_type,
            score,
            source: edge_type.source(),
            reason: "r".into(),
            user_rating: None,
            created_at: 10,
            updated_at: 10,
        }
    }

    #[tokio::test]
    async fn test_testimony_roundtrip_with_relatives() {
        let store = memory_store().await;
        let id = store.upsert_testimony(&sample("t1")).await.unwrap();
        assert_eq!(id, "t1");

        let loaded = store.get_testimony("t1").await.unwrap().unwrap();
        assert_eq!(loaded.identity_preference, IdentityPreference::Anonymous);
        assert_eq!(loaded.date_of_event.unwrap().to_string(), "1994-04");
        assert_eq!(loaded.date_range.unwrap().end.to_string(), "1994-07-04");
        assert_eq!(loaded.relatives.len(), 2);
        assert_eq!(loaded.relatives[1].relationship_type, None);
        assert!(loaded.created_at > 0);
    }

    #[tokio::test]
    async fn test_edge_upsert_is_idempotent() {
        let store = memory_store().await;
        store.upsert_testimony(&sample("a")).await.unwrap();
        store.upsert_testimony(&sample("b")).await.unwrap();

        store
            .upsert_edge(&edge("a", "b", EdgeType::SameEvent, 0.5))
            .await
            .unwrap();
        store
            .rate_edge("a", "b", EdgeType::SameEvent, 5)
            .await
            .unwrap();
        let mut again = edge("a", "b", EdgeType::SameEvent, 0.9);
        again.updated_at = 20;
        store.upsert_edge(&again).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM testimony_edges")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);

        let edges = store.edges_for("b", 10).await.unwrap();
        assert!((edges[0].score - 0.9).abs() < 1e-9);
        assert_eq!(edges[0].user_rating, Some(5));
        assert_eq!(edges[0].created_at, 10);
        assert_eq!(edges[0].updated_at, 20);
        assert_eq!(edges[0].source, EdgeSource::Rule);
    }

    #[tokio::test]
    async fn test_embedding_upsert_replaces_vector() {
        let store = memory_store().await;
        store.upsert_testimony(&sample("a")).await.unwrap();
        let mut e = TestimonyEmbedding {
            testimony_id: "a".into(),
            section: "title".into(),
            model: "m".into(),
            vector: vec![1.0, 2.0],
            content_hash: "h1".into(),
            created_at: 1,
        };
        store.upsert_embedding(&e).await.unwrap();
        e.vector = vec![3.0, 4.0, 5.0];
        e.content_hash = "h2".into();
        store.upsert_embedding(&e).await.unwrap();

        let stored = store.embeddings_for("a").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].vector, vec![3.0, 4.0, 5.0]);
        assert_eq!(stored[0].content_hash, "h2");
    }

    #[tokio::test]
    async fn test_delete_embedding_by_section_and_model() {
        let store = memory_store().await;
        store.upsert_testimony(&sample("a")).await.unwrap();
        for (section, model) in [("title", "m"), ("content", "m"), ("content", "other")] {
            store
                .upsert_embedding(&TestimonyEmbedding {
                    testimony_id: "a".into(),
                    section: section.into(),
                    model: model.into(),
                    vector: vec![1.0],
                    content_hash: "h".into(),
                    created_at: 1,
                })
                .await
                .unwrap();
        }

        assert!(store.delete_embedding("a", "content", "m").await.unwrap());
        assert!(!store.delete_embedding("a", "content", "m").await.unwrap());

        let left: Vec<(String, String)> = store
            .embeddings_for("a")
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.section, e.model))
            .collect();
        assert_eq!(
            left,
            vec![
                ("content".to_string(), "other".to_string()),
                ("title".to_string(), "m".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_cascades_and_prune() {
        let store = memory_store().await;
        for id in ["a", "b", "c"] {
            store.upsert_testimony(&sample(id)).await.unwrap();
        }
        store
            .upsert_edge(&edge("a", "b", EdgeType::SameEvent, 0.9))
            .await
            .unwrap();
        store
            .upsert_edge(&edge("a", "c", EdgeType::SameEvent, 0.9))
            .await
            .unwrap();
        store
            .upsert_edge(&edge("c", "b", EdgeType::SameYear, 0.7))
            .await
            .unwrap();

        let removed = store
            .prune_edges("a", &[("b".to_string(), EdgeType::SameEvent)])
            .await
            .unwrap();
        assert_eq!(removed, 1);

        assert!(store.delete_testimony("b").await.unwrap());
        assert!(store.top_edges(50).await.unwrap().is_empty());
        assert!(store.get_testimony("b").await.unwrap().is_none());
        assert_eq!(store.approved_testimonies().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_set_status_and_transcript() {
        let store = memory_store().await;
        store.upsert_testimony(&sample("a")).await.unwrap();
        assert!(store
            .set_status("a", TestimonyStatus::Rejected)
            .await
            .unwrap());
        assert!(store.set_transcript("a", "spoken words").await.unwrap());
        assert!(!store
            .set_status("missing", TestimonyStatus::Approved)
            .await
            .unwrap());

        let t = store.get_testimony("a").await.unwrap().unwrap();
        assert_eq!(t.status, TestimonyStatus::Rejected);
        assert_eq!(t.transcript.as_deref(), Some("spoken words"));
        assert!(store.approved_testimonies().await.unwrap().is_empty());
    }
}
