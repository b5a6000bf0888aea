//! Chat message document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for chat messages
pub const CHAT_MESSAGE_COLLECTION: &str = "chat_messages";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ChatMessageDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Room name the message was posted to
    pub room: String,

    /// Hex ObjectId of the sender
    pub sender_id: String,

    /// Sender display name at send time
    pub display_name: String,

    pub body: String,
}

impl IntoIndexes for ChatMessageDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "room": 1, "metadata.created_at": -1 },
            Some(
                IndexOptions::builder()
                    .name("room_recent".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for ChatMessageDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
