//! Public, redacted representations of testimonies and edges.
//!
//! Everything served over the read API goes through these types. When the
//! author chose an anonymous identity, the name, contact fields and location
//! are dropped here, regardless of which edge or endpoint is involved.

use serde::Serialize;

use crate::dates::{DateRange, EventDate};
use crate::models::{
    EdgeSource, EdgeType, IdentityPreference, MentionedRelative, Testimony, TestimonyEdge,
    TestimonyKind, TestimonyStatus,
};

/// Display attributes of a connected testimony.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestimonySummary {
    pub id: String,
    pub title: String,
    pub kind: TestimonyKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub event: Option<String>,
    pub date_of_event: Option<EventDate>,
    pub relation_to_event: Option<String>,
    pub identity_preference: IdentityPreference,
}

impl From<&Testimony> for TestimonySummary {
    fn from(t: &Testimony) -> Self {
        let anonymous = t.is_anonymous();
        Self {
            id: t.id.clone(),
            title: t.title.clone(),
            kind: t.kind,
            full_name: (!anonymous).then(|| t.full_name.clone()),
            location: if anonymous { None } else { t.location.clone() },
            event: t.event.clone(),
            date_of_event: t.date_of_event,
            relation_to_event: t.relation_to_event.clone(),
            identity_preference: t.identity_preference,
        }
    }
}

/// Full testimony as returned by `GET /testimonies/{id}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestimonyView {
    pub id: String,
    pub title: String,
    pub content: Option<String>,
    pub transcript: Option<String>,
    pub kind: TestimonyKind,
    pub media_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub event: Option<String>,
    pub date_of_event: Option<EventDate>,
    pub date_range: Option<DateRange>,
    pub relation_to_event: Option<String>,
    pub identity_preference: IdentityPreference,
    pub status: TestimonyStatus,
    pub relatives: Vec<MentionedRelative>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Testimony> for TestimonyView {
    fn from(t: &Testimony) -> Self {
        let public = !t.is_anonymous();
        Self {
            id: t.id.clone(),
            title: t.title.clone(),
            content: t.content.clone(),
            transcript: t.transcript.clone(),
            kind: t.kind,
            media_url: t.media_url.clone(),
            full_name: public.then(|| t.full_name.clone()),
            email: t.email.clone().filter(|_| public),
            phone: t.phone.clone().filter(|_| public),
            location: t.location.clone().filter(|_| public),
            event: t.event.clone(),
            date_of_event: t.date_of_event,
            date_range: t.date_range,
            relation_to_event: t.relation_to_event.clone(),
            identity_preference: t.identity_preference,
            status: t.status,
            relatives: t.relatives.clone(),
            created_at: format_ts_iso(t.created_at),
            updated_at: format_ts_iso(t.updated_at),
        }
    }
}

/// One connection with the testimony on its far side.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionView {
    pub from_id: String,
    pub to_id: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    pub score: f64,
    pub source: EdgeSource,
    pub reason: String,
    pub user_rating: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    /// The connected testimony (the far side relative to the viewer).
    pub testimony: TestimonySummary,
}

impl ConnectionView {
    pub fn new(edge: &TestimonyEdge, other: &Testimony) -> Self {
        Self {
            from_id: edge.from_id.clone(),
            to_id: edge.to_id.clone(),
            edge_type: edge.edge_type,
            score: edge.score,
            source: edge.source,
            reason: edge.reason.clone(),
            user_rating: edge.user_rating,
            created_at: format_ts_iso(edge.created_at),
            updated_at: format_ts_iso(edge.updated_at),
            testimony: TestimonySummary::from(other),
        }
    }
}

pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::testimony;

    fn anonymous() -> Testimony {
        let mut t = testimony("anon");
        t.full_name = "Secret Name".into();
        t.email = Some("secret@example.org".into());
        t.phone = Some("+250 000".into());
        t.location = Some("Secret Hill".into());
        t.identity_preference = IdentityPreference::Anonymous;
        t
    }

    #[test]
    fn test_summary_redacts_anonymous() {
        let s = TestimonySummary::from(&anonymous());
        assert!(s.full_name.is_none());
        assert!(s.location.is_none());
        let json = serde_json::to_string(&s).unwrap();
        assert!(!json.contains("Secret"));
        assert!(!json.contains("fullName"));
    }

    #[test]
    fn test_view_redacts_contact_fields() {
        let json = serde_json::to_value(TestimonyView::from(&anonymous())).unwrap();
        for field in ["fullName", "email", "phone", "location"] {
            assert!(json.get(field).is_none(), "{} leaked", field);
        }
    }

    #[test]
    fn test_public_summary_keeps_name() {
        let mut t = testimony("pub");
        t.full_name = "Alice".into();
        t.location = Some("Kigali".into());
        let s = TestimonySummary::from(&t);
        assert_eq!(s.full_name.as_deref(), Some("Alice"));
        assert_eq!(s.location.as_deref(), Some("Kigali"));
    }

    #[test]
    fn test_connection_view_serializes_type_field() {
        let edge = TestimonyEdge {
            from_id: "a".into(),
            to_id: "anon".into(),
            edge_type: EdgeType::SameEvent,
            score: 0.9,
            source: EdgeSource::Rule,
            reason: "r".into(),
            user_rating: None,
            created_at: 0,
            updated_at: 0,
        };
        let json = serde_json::to_value(ConnectionView::new(&edge, &anonymous())).unwrap();
        assert_eq!(json["type"], "same_event");
        assert_eq!(json["fromId"], "a");
        assert!(json["testimony"].get("fullName").is_none());
    }
}
