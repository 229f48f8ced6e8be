use crate::bucket::BucketKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PostId = Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[default]
    Normal,
    SafetyCheck,
    DamageReport,
    AidRequest,
}

/// Marker styling flag. Mirrors whether the post was made in emergency mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Normal,
    Emergency,
}

impl Mode {
    /// Category actually stored for a submission in this mode.
    /// Outside emergency mode everything collapses to `Normal`.
    pub fn effective_category(self, requested: Option<Category>) -> Category {
        match self {
            Mode::Normal => Category::Normal,
            Mode::Emergency => requested.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub text: String,
    pub lat: f64,
    pub lng: f64,
    pub bucket: BucketKey,
    pub category: Category,
    pub mode: Mode,
    pub created_at: DateTime<Utc>,
}

/// Fields of a post before the collection assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub text: String,
    pub lat: f64,
    pub lng: f64,
    pub bucket: BucketKey,
    pub category: Category,
    pub mode: Mode,
}

impl NewPost {
    pub fn into_post(self, id: PostId, created_at: DateTime<Utc>) -> Post {
        Post {
            id,
            text: self.text,
            lat: self.lat,
            lng: self.lng,
            bucket: self.bucket,
            category: self.category,
            mode: self.mode,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_collapses_outside_emergency_mode() {
        assert_eq!(
            Mode::Normal.effective_category(Some(Category::AidRequest)),
            Category::Normal
        );
        assert_eq!(
            Mode::Emergency.effective_category(Some(Category::AidRequest)),
            Category::AidRequest
        );
        assert_eq!(Mode::Emergency.effective_category(None), Category::Normal);
    }

    #[test]
    fn category_wire_names() {
        let json = serde_json::to_string(&Category::DamageReport).unwrap();
        assert_eq!(json, "\"damage_report\"");
    }
}
