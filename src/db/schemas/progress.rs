//! Progress record schema
//!
//! Per-user gamification state: experience points, streak, badges.
//! Experience points and the badge set only ever grow; the streak may reset.
//! Badges are a typed, deduplicated string vector rather than the loose JSON
//! array the web client historically stored.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for progress records
pub const PROGRESS_COLLECTION: &str = "progress";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ProgressDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Hex ObjectId of the owning user
    pub user_id: String,

    /// Lesson the most recent activity belonged to, when supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lesson_id: Option<String>,

    /// Cumulative experience points, never decreases
    pub xp: i64,

    /// Consecutive qualifying days
    pub streak: i64,

    /// Earned badge names, insertion order, no duplicates, never shrinks
    #[serde(default)]
    pub badges: Vec<String>,
}

impl IntoIndexes for ProgressDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            // Latest-record-per-user lookup
            doc! { "user_id": 1, "metadata.updated_at": -1 },
            Some(
                IndexOptions::builder()
                    .name("user_latest".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for ProgressDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
