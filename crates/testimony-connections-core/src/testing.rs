use crate::models::{IdentityPreference, Testimony, TestimonyKind, TestimonyStatus};

/// Bare approved testimony with no matching metadata.
pub fn testimony(id: &str) -> Testimony {
    Testimony {
        id: id.to_string(),
        title: format!("Testimony {}", id),
        content: None,
        transcript: None,
        kind: TestimonyKind::Written,
        media_url: None,
        full_name: format!("Author {}", id),
        email: None,
        phone: None,
        location: None,
        event: None,
        date_of_event: None,
        date_range: None,
        relation_to_event: None,
        identity_preference: IdentityPreference::Public,
        status: TestimonyStatus::Approved,
        relatives: Vec::new(),
        created_at: 0,
        updated_at: 0,
    }
}
