//! Payment provider webhook handling
//!
//! Events arrive authenticated by a shared secret in the
//! `X-Webhook-Secret` header. Applying an event is an upsert keyed on the
//! user, so redelivered events converge on the same state.

use bson::{doc, oid::ObjectId, Document};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::db::schemas::{SubscriptionDoc, UserDoc, SUBSCRIPTION_COLLECTION, USER_COLLECTION};
use crate::db::MongoClient;
use crate::types::{KalikeError, Result};

use super::{FREE_TIER, PREMIUM_TIER};

/// Webhook event kinds the provider delivers. Kinds this service does not
/// handle still parse, so they can be acknowledged instead of bounced back
/// into the provider's retry queue.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum WebhookEventKind {
    #[serde(rename = "subscription.activated")]
    Activated,
    #[serde(rename = "subscription.renewed")]
    Renewed,
    #[serde(rename = "subscription.cancelled")]
    Cancelled,
    #[serde(other)]
    Unhandled,
}

/// Webhook payload
#[derive(Deserialize, Clone, Debug)]
pub struct WebhookEvent {
    pub event: WebhookEventKind,

    /// Hex ObjectId of the subscribing user
    #[serde(rename = "userId")]
    pub user_id: String,

    #[serde(rename = "customerId")]
    pub customer_id: Option<String>,

    #[serde(rename = "subscriptionId")]
    pub subscription_id: Option<String>,

    /// End of the paid period, for activated/renewed events
    #[serde(rename = "currentPeriodEnd")]
    pub current_period_end: Option<DateTime<Utc>>,
}

impl WebhookEvent {
    /// Tier the user ends up with after this event; None for event kinds
    /// this service does not act on
    pub fn resulting_tier(&self) -> Option<&'static str> {
        match self.event {
            WebhookEventKind::Activated | WebhookEventKind::Renewed => Some(PREMIUM_TIER),
            WebhookEventKind::Cancelled => Some(FREE_TIER),
            WebhookEventKind::Unhandled => None,
        }
    }

    fn provider_status(&self) -> &'static str {
        match self.event {
            WebhookEventKind::Cancelled => "cancelled",
            _ => "active",
        }
    }
}

/// Compare the provided secret header against the configured secret.
///
/// Both sides are hashed before comparison so the check does not leak the
/// matching prefix length through timing.
pub fn verify_webhook_secret(expected: &str, provided: Option<&str>) -> bool {
    let Some(provided) = provided else {
        return false;
    };
    let expected_digest = Sha256::digest(expected.as_bytes());
    let provided_digest = Sha256::digest(provided.as_bytes());
    expected_digest == provided_digest
}

/// Build the subscription upsert for an event
fn subscription_update(event: &WebhookEvent, tier: &str) -> Document {
    let mut set = doc! {
        "user_id": &event.user_id,
        "tier": tier,
        "status": event.provider_status(),
        "metadata.is_deleted": false,
        "metadata.updated_at": bson::DateTime::now(),
    };
    if let Some(customer_id) = &event.customer_id {
        set.insert("provider_customer_id", customer_id);
    }
    if let Some(subscription_id) = &event.subscription_id {
        set.insert("provider_subscription_id", subscription_id);
    }
    if let Some(period_end) = event.current_period_end {
        set.insert("current_period_end", bson::DateTime::from_chrono(period_end));
    }

    doc! {
        "$set": set,
        "$setOnInsert": { "metadata.created_at": bson::DateTime::now() },
    }
}

/// Mirror a webhook event into the subscriptions collection and the user's
/// tier. Idempotent: replaying an event rewrites the same state.
pub async fn apply_webhook_event(mongo: &MongoClient, event: &WebhookEvent) -> Result<()> {
    let Some(tier) = event.resulting_tier() else {
        info!(user_id = %event.user_id, "Ignoring unhandled payment webhook event kind");
        return Ok(());
    };

    let user_oid = ObjectId::parse_str(&event.user_id)
        .map_err(|_| KalikeError::Validation(format!("Invalid user id: {}", event.user_id)))?;

    let subscriptions = mongo
        .collection::<SubscriptionDoc>(SUBSCRIPTION_COLLECTION)
        .await?;

    subscriptions
        .inner()
        .update_one(
            doc! { "user_id": &event.user_id },
            subscription_update(event, tier),
        )
        .upsert(true)
        .await
        .map_err(|e| KalikeError::Database(format!("Subscription upsert failed: {}", e)))?;

    let users = mongo.collection::<UserDoc>(USER_COLLECTION).await?;
    users
        .update_one(
            doc! { "_id": user_oid },
            doc! { "$set": {
                "tier": tier,
                "metadata.updated_at": bson::DateTime::now(),
            }},
        )
        .await?;

    info!(
        user_id = %event.user_id,
        event = ?event.event,
        tier = tier,
        "Applied payment webhook event"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_match() {
        assert!(verify_webhook_secret("topsecret", Some("topsecret")));
        assert!(!verify_webhook_secret("topsecret", Some("topsecreT")));
        assert!(!verify_webhook_secret("topsecret", None));
        assert!(!verify_webhook_secret("topsecret", Some("")));
    }

    #[test]
    fn test_event_parsing() {
        let json = r#"{
            "event": "subscription.activated",
            "userId": "665f1f77bcf86cd799439011",
            "customerId": "cus_123",
            "subscriptionId": "sub_456",
            "currentPeriodEnd": "2026-09-28T00:00:00Z"
        }"#;
        let event: WebhookEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event, WebhookEventKind::Activated);
        assert_eq!(event.resulting_tier(), Some(PREMIUM_TIER));
        assert!(event.current_period_end.is_some());
    }

    #[test]
    fn test_cancelled_downgrades() {
        let json = r#"{ "event": "subscription.cancelled", "userId": "665f1f77bcf86cd799439011" }"#;
        let event: WebhookEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.resulting_tier(), Some(FREE_TIER));
    }

    #[test]
    fn test_unknown_event_parses_but_is_ignored() {
        let json = r#"{ "event": "invoice.paid", "userId": "665f1f77bcf86cd799439011" }"#;
        let event: WebhookEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event, WebhookEventKind::Unhandled);
        assert_eq!(event.resulting_tier(), None);
    }

    #[test]
    fn test_update_doc_carries_period_end_only_when_present() {
        let event = WebhookEvent {
            event: WebhookEventKind::Cancelled,
            user_id: "665f1f77bcf86cd799439011".into(),
            customer_id: None,
            subscription_id: None,
            current_period_end: None,
        };
        let update = subscription_update(&event, FREE_TIER);
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("tier").unwrap(), FREE_TIER);
        assert_eq!(set.get_str("status").unwrap(), "cancelled");
        assert!(!set.contains_key("current_period_end"));
    }
}
