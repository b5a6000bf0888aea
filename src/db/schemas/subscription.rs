//! Subscription document schema
//!
//! Mirrors the payment provider's view of a learner's subscription. All
//! provider identifiers are opaque strings. Checkout records its reference
//! here; everything else is written by the webhook.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for subscriptions
pub const SUBSCRIPTION_COLLECTION: &str = "subscriptions";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SubscriptionDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Hex ObjectId of the subscribing user, one subscription per user
    pub user_id: String,

    /// "free" or "premium"
    pub tier: String,

    /// Provider customer id (opaque)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_customer_id: Option<String>,

    /// Provider subscription id (opaque)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_subscription_id: Option<String>,

    /// Reference minted when the user last started a hosted checkout,
    /// written before the provider URL is handed out
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_reference: Option<String>,

    /// End of the currently paid period
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<DateTime>,

    /// Provider-reported status: active, cancelled, past_due
    pub status: String,
}

impl IntoIndexes for SubscriptionDoc {
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

impl MutMetadata for SubscriptionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
