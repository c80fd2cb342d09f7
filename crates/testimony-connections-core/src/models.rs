//! Core data models used throughout Testimony Connections.
//!
//! These types represent the testimonies, embedding vectors, and scored
//! connection edges that flow between the embedding pipeline, the discovery
//! engine, and the read API.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::dates::{DateRange, EventDate};

/// Medium the testimony was submitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestimonyKind {
    #[default]
    Written,
    Audio,
    Video,
}

impl TestimonyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestimonyKind::Written => "written",
            TestimonyKind::Audio => "audio",
            TestimonyKind::Video => "video",
        }
    }

    pub fn has_media(&self) -> bool {
        matches!(self, TestimonyKind::Audio | TestimonyKind::Video)
    }
}

impl FromStr for TestimonyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "written" => Ok(TestimonyKind::Written),
            "audio" => Ok(TestimonyKind::Audio),
            "video" => Ok(TestimonyKind::Video),
            other => bail!("unknown testimony kind: '{}'", other),
        }
    }
}

/// Whether the author agreed to be publicly identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityPreference {
    #[default]
    Public,
    Anonymous,
}

impl IdentityPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityPreference::Public => "public",
            IdentityPreference::Anonymous => "anonymous",
        }
    }
}

impl FromStr for IdentityPreference {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "public" => Ok(IdentityPreference::Public),
            "anonymous" => Ok(IdentityPreference::Anonymous),
            other => bail!("unknown identity preference: '{}'", other),
        }
    }
}

/// Review state of a testimony.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestimonyStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl TestimonyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestimonyStatus::Pending => "pending",
            TestimonyStatus::Approved => "approved",
            TestimonyStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for TestimonyStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TestimonyStatus::Pending),
            "approved" => Ok(TestimonyStatus::Approved),
            "rejected" => Ok(TestimonyStatus::Rejected),
            other => bail!("unknown testimony status: '{}'", other),
        }
    }
}

/// A person named in a testimony, e.g. a relative who was lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentionedRelative {
    pub name: String,
    #[serde(default)]
    pub relationship_type: Option<String>,
}

/// A testimony and the metadata the matching rules consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Testimony {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub kind: TestimonyKind,
    #[serde(default)]
    pub media_url: Option<String>,
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub date_of_event: Option<EventDate>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub relation_to_event: Option<String>,
    #[serde(default)]
    pub identity_preference: IdentityPreference,
    #[serde(default)]
    pub status: TestimonyStatus,
    #[serde(default)]
    pub relatives: Vec<MentionedRelative>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl Testimony {
    pub fn is_anonymous(&self) -> bool {
        self.identity_preference == IdentityPreference::Anonymous
    }

    /// Named text excerpts that are embedded independently.
    ///
    /// Blank sections are included; the embedding client drops them.
    pub fn sections(&self) -> Vec<(Section, String)> {
        let mut out = vec![(Section::Title, self.title.clone())];
        if let Some(ref content) = self.content {
            out.push((Section::Content, content.clone()));
        }
        if let Some(ref transcript) = self.transcript {
            out.push((Section::Transcript, transcript.clone()));
        }
        out
    }

    pub fn needs_transcript(&self) -> bool {
        self.kind.has_media()
            && self.media_url.is_some()
            && self
                .transcript
                .as_deref()
                .map(|t| t.trim().is_empty())
                .unwrap_or(true)
    }
}

/// A named part of a testimony that gets its own embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Section {
    Title,
    Content,
    Transcript,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Title => "title",
            Section::Content => "content",
            Section::Transcript => "transcript",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored embedding vector, keyed by (testimony, section, model).
#[derive(Debug, Clone, PartialEq)]
pub struct TestimonyEmbedding {
    pub testimony_id: String,
    pub section: String,
    pub model: String,
    pub vector: Vec<f32>,
    /// SHA-256 of the embedded text; used to skip unchanged sections.
    pub content_hash: String,
    pub created_at: i64,
}

impl TestimonyEmbedding {
    pub fn dims(&self) -> usize {
        self.vector.len()
    }
}

/// Hex SHA-256 of a section's text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// The rule that produced an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    SameEvent,
    SameLocation,
    SamePerson,
    SameRelationToEvent,
    SameDate,
    SameMonth,
    SameYear,
    OverlappingDates,
    NearbyDates,
    SemanticSimilarity,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::SameEvent => "same_event",
            EdgeType::SameLocation => "same_location",
            EdgeType::SamePerson => "same_person",
            EdgeType::SameRelationToEvent => "same_relation_to_event",
            EdgeType::SameDate => "same_date",
            EdgeType::SameMonth => "same_month",
            EdgeType::SameYear => "same_year",
            EdgeType::OverlappingDates => "overlapping_dates",
            EdgeType::NearbyDates => "nearby_dates",
            EdgeType::SemanticSimilarity => "semantic_similarity",
        }
    }

    /// Where edges of this type come from.
    pub fn source(&self) -> EdgeSource {
        match self {
            EdgeType::SemanticSimilarity => EdgeSource::Embedding,
            _ => EdgeSource::Rule,
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let t = match s {
            "same_event" => EdgeType::SameEvent,
            "same_location" => EdgeType::SameLocation,
            "same_person" => EdgeType::SamePerson,
            "same_relation_to_event" => EdgeType::SameRelationToEvent,
            "same_date" => EdgeType::SameDate,
            "same_month" => EdgeType::SameMonth,
            "same_year" => EdgeType::SameYear,
            "overlapping_dates" => EdgeType::OverlappingDates,
            "nearby_dates" => EdgeType::NearbyDates,
            "semantic_similarity" => EdgeType::SemanticSimilarity,
            other => bail!("unknown edge type: '{}'", other),
        };
        Ok(t)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeSource {
    Rule,
    Embedding,
}

impl EdgeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeSource::Rule => "rule",
            EdgeSource::Embedding => "embedding",
        }
    }
}

impl FromStr for EdgeSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rule" => Ok(EdgeSource::Rule),
            "embedding" => Ok(EdgeSource::Embedding),
            other => bail!("unknown edge source: '{}'", other),
        }
    }
}

/// A persisted connection between two testimonies.
#[derive(Debug, Clone, PartialEq)]
pub struct TestimonyEdge {
    pub from_id: String,
    pub to_id: String,
    pub edge_type: EdgeType,
    pub score: f64,
    pub source: EdgeSource,
    pub reason: String,
    /// Admin rating 1..=5; survives re-discovery.
    pub user_rating: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One scored match produced by the discovery engine for a subject testimony.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionMatch {
    pub to_id: String,
    pub edge_type: EdgeType,
    pub score: f64,
    pub reason: String,
}

impl ConnectionMatch {
    pub fn into_edge(self, from_id: &str, now: i64) -> TestimonyEdge {
        TestimonyEdge {
            from_id: from_id.to_string(),
            to_id: self.to_id,
            source: self.edge_type.source(),
            edge_type: self.edge_type,
            score: self.score,
            reason: self.reason,
            user_rating: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Lowercase, trim, and collapse whitespace; `None` for blank input.
pub fn normalize_label(value: &str) -> Option<String> {
    let joined = value
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("  Kigali   City "), Some("kigali city".into()));
        assert_eq!(normalize_label("   "), None);
    }

    #[test]
    fn test_edge_type_labels_roundtrip_through_from_str() {
        for t in [
            EdgeType::SameEvent,
            EdgeType::SamePerson,
            EdgeType::NearbyDates,
            EdgeType::SemanticSimilarity,
        ] {
            assert_eq!(t.as_str().parse::<EdgeType>().unwrap(), t);
        }
        assert!("nearby dates".parse::<EdgeType>().is_err());
    }

    #[test]
    fn test_testimony_deserializes_camel_case() {
        let json = serde_json::json!({
            "title": "Hiding in the marsh",
            "fullName": "Jane Doe",
            "dateOfEvent": "1994-04",
            "identityPreference": "anonymous",
            "relationToEvent": "Survivor",
            "relatives": [{ "name": "John", "relationshipType": "brother" }]
        });
        let t: Testimony = serde_json::from_value(json).unwrap();
        assert!(t.is_anonymous());
        assert_eq!(t.status, TestimonyStatus::Pending);
        assert_eq!(t.date_of_event.unwrap().to_string(), "1994-04");
        assert_eq!(t.relatives[0].relationship_type.as_deref(), Some("brother"));
    }

    #[test]
    fn test_sections_skip_missing_fields() {
        let t: Testimony = serde_json::from_value(serde_json::json!({
            "title": "T",
            "fullName": "A",
            "content": "body"
        }))
        .unwrap();
        let labels: Vec<&str> = t.sections().iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(labels, vec!["title", "content"]);
    }

    #[test]
    fn test_needs_transcript_only_for_media() {
        let mut t: Testimony = serde_json::from_value(serde_json::json!({
            "title": "T",
            "fullName": "A",
            "kind": "audio",
            "mediaUrl": "https://cdn.example.org/a.mp3"
        }))
        .unwrap();
        assert!(t.needs_transcript());
        t.transcript = Some("words".into());
        assert!(!t.needs_transcript());
        t.transcript = None;
        t.kind = TestimonyKind::Written;
        assert!(!t.needs_transcript());
    }
}
