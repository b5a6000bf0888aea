//! Subscription billing
//!
//! The payment provider is the source of truth for subscriptions. Checkout
//! starts by handing the learner a provider URL; state changes arrive back
//! through the signed webhook and are mirrored into the `subscriptions`
//! collection and the user's tier.

pub mod checkout;
pub mod webhook;

pub use checkout::{build_checkout_url, checkout_intent_update, new_checkout_reference};
pub use webhook::{apply_webhook_event, verify_webhook_secret, WebhookEvent, WebhookEventKind};

/// Tier granted to active subscribers
pub const PREMIUM_TIER: &str = "premium";

/// Tier for everyone else
pub const FREE_TIER: &str = "free";
