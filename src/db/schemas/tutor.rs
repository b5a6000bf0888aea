//! Tutor profile document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for tutor profiles
pub const TUTOR_COLLECTION: &str = "tutors";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TutorDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Hex ObjectId of the user account behind this profile
    pub user_id: String,

    pub display_name: String,

    pub bio: String,

    /// Languages the tutor teaches in
    #[serde(default)]
    pub languages: Vec<String>,

    /// Hourly rate in minor currency units (paise)
    pub hourly_rate_minor: i64,

    /// Inactive tutors are hidden and cannot be booked
    #[serde(default)]
    pub active: bool,
}

impl IntoIndexes for TutorDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "user_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("user_id_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for TutorDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
