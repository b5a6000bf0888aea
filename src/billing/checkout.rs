//! Checkout session bootstrap
//!
//! The server never talks to the payment provider directly for checkout; it
//! mints an opaque reference, records it on the learner's subscription row,
//! embeds it in the provider's hosted checkout URL, and lets the webhook
//! report the outcome.

use bson::{doc, Document};
use rand::RngCore;

/// Generate an unguessable checkout reference (32 hex chars)
pub fn new_checkout_reference() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Subscription upsert recording a started checkout. The row is keyed on
/// the user (the filter carries `user_id`); a fresh row starts on the free
/// tier until the webhook reports payment.
pub fn checkout_intent_update(reference: &str) -> Document {
    doc! {
        "$set": {
            "checkout_reference": reference,
            "metadata.updated_at": bson::DateTime::now(),
        },
        "$setOnInsert": {
            "tier": super::FREE_TIER,
            "status": "none",
            "metadata.is_deleted": false,
            "metadata.created_at": bson::DateTime::now(),
        },
    }
}

/// Hosted checkout URL for a user and reference
pub fn build_checkout_url(base: &str, user_id: &str, reference: &str) -> String {
    format!(
        "{}?ref={}&user={}",
        base.trim_end_matches('/'),
        reference,
        user_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_is_hex_and_unique() {
        let a = new_checkout_reference();
        let b = new_checkout_reference();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_intent_update_records_reference_without_touching_tier() {
        let update = checkout_intent_update("abc123");
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("checkout_reference").unwrap(), "abc123");
        assert!(!set.contains_key("tier"));

        let on_insert = update.get_document("$setOnInsert").unwrap();
        assert_eq!(on_insert.get_str("tier").unwrap(), super::super::FREE_TIER);
        assert_eq!(on_insert.get_str("status").unwrap(), "none");
    }

    #[test]
    fn test_checkout_url_shape() {
        let url = build_checkout_url("https://pay.example.com/checkout/", "u1", "abc123");
        assert_eq!(url, "https://pay.example.com/checkout?ref=abc123&user=u1");
    }
}
