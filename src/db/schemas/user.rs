//! User document schema
//!
//! Stores learner credentials and the denormalized subscription tier
//! used for the paywall check.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::auth::PermissionLevel;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// User identifier (email or username)
    pub identifier: String,

    /// Argon2 password hash
    pub password_hash: String,

    /// Display name shown in chat and bookings
    pub display_name: String,

    /// Permission level (learner, tutor, admin)
    #[serde(default)]
    pub permission_level: PermissionLevel,

    /// Subscription tier, kept in sync by the payment webhook
    #[serde(default = "default_tier")]
    pub tier: String,

    /// Token version for invalidation (increment to invalidate all tokens)
    #[serde(default)]
    pub token_version: i32,

    /// Whether the user account is active
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_tier() -> String {
    "free".to_string()
}

fn default_true() -> bool {
    true
}

impl UserDoc {
    /// Create a new user document with a freshly hashed password
    pub fn new(identifier: String, password_hash: String, display_name: String) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            identifier,
            password_hash,
            display_name,
            permission_level: PermissionLevel::Learner,
            tier: default_tier(),
            token_version: 1,
            is_active: true,
        }
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Unique index on identifier
            (
                doc! { "identifier": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("identifier_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
