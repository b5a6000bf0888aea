//! Lesson document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for lessons
pub const LESSON_COLLECTION: &str = "lessons";

/// A structured Kannada lesson
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct LessonDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// URL-safe identifier, unique across lessons
    pub slug: String,

    pub title: String,

    /// Difficulty level: beginner, intermediate, advanced
    pub level: String,

    /// Lesson body in Kannada script
    pub content_kn: String,

    /// Latin transliteration of the lesson body
    pub transliteration: String,

    /// Blob hash of the pronunciation audio, when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_hash: Option<String>,

    /// Position within the course sequence
    pub order_index: i64,

    /// Unpublished lessons are hidden from learners
    #[serde(default)]
    pub published: bool,
}

impl IntoIndexes for LessonDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "slug": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("slug_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "order_index": 1 },
                Some(
                    IndexOptions::builder()
                        .name("order_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for LessonDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
