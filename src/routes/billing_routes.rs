//! Billing routes
//!
//! - GET  /api/billing/subscription - caller's subscription state
//! - POST /api/billing/checkout     - start a hosted checkout
//! - POST /webhooks/payment         - provider event delivery
//!
//! The webhook is authenticated with the shared secret, never with a user
//! token; everything else requires a logged-in learner.

use bson::doc;
use chrono::{DateTime, Utc};
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::billing::{
    apply_webhook_event, build_checkout_url, checkout_intent_update, new_checkout_reference,
    verify_webhook_secret, WebhookEvent, FREE_TIER,
};
use crate::db::schemas::{SubscriptionDoc, SUBSCRIPTION_COLLECTION};
use crate::routes::helpers::{
    cors_preflight, error_response, json_response, parse_json_body, require_claims, BoxBody,
    ErrorResponse, SuccessResponse,
};
use crate::server::AppState;
use crate::types::KalikeError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub tier: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<DateTime<Utc>>,
}

impl SubscriptionResponse {
    fn free() -> Self {
        Self {
            tier: FREE_TIER.to_string(),
            status: "none".to_string(),
            current_period_end: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub reference: String,
}

/// GET /api/billing/subscription
async fn handle_subscription(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let claims = match require_claims(&state.args, &req) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let Some(mongo) = &state.mongo else {
        return json_response(StatusCode::OK, &SubscriptionResponse::free());
    };

    let subscriptions = match mongo
        .collection::<SubscriptionDoc>(SUBSCRIPTION_COLLECTION)
        .await
    {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match subscriptions.find_one(doc! { "user_id": &claims.sub }).await {
        Ok(Some(sub)) => json_response(
            StatusCode::OK,
            &SubscriptionResponse {
                tier: sub.tier,
                status: sub.status,
                current_period_end: sub.current_period_end.map(|d| d.to_chrono()),
            },
        ),
        Ok(None) => json_response(StatusCode::OK, &SubscriptionResponse::free()),
        Err(e) => error_response(&e),
    }
}

/// POST /api/billing/checkout
async fn handle_checkout(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let claims = match require_claims(&state.args, &req) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let reference = new_checkout_reference();
    let checkout_url = build_checkout_url(&state.args.checkout_url_base, &claims.sub, &reference);

    // Record the intent before handing out the URL, so the reference can be
    // correlated when the webhook reports the outcome
    if let Some(mongo) = &state.mongo {
        let subscriptions = match mongo
            .collection::<SubscriptionDoc>(SUBSCRIPTION_COLLECTION)
            .await
        {
            Ok(c) => c,
            Err(e) => return error_response(&e),
        };

        let upsert = subscriptions
            .inner()
            .update_one(
                doc! { "user_id": &claims.sub },
                checkout_intent_update(&reference),
            )
            .upsert(true)
            .await;
        if let Err(e) = upsert {
            return error_response(&KalikeError::Database(format!(
                "Failed to record checkout intent: {}",
                e
            )));
        }
    }

    info!(user_id = %claims.sub, reference = %reference, "Checkout started");

    json_response(
        StatusCode::OK,
        &CheckoutResponse {
            checkout_url,
            reference,
        },
    )
}

/// POST /webhooks/payment
async fn handle_webhook(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let Some(secret) = state.args.payment_webhook_secret.as_deref() else {
        // Dev mode without a configured secret: webhook disabled
        return json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &ErrorResponse {
                error: "Payment webhook is not configured".into(),
                code: Some("UNAVAILABLE".into()),
            },
        );
    };

    let provided = req
        .headers()
        .get("x-webhook-secret")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    if !verify_webhook_secret(secret, provided.as_deref()) {
        warn!("Payment webhook with bad or missing secret rejected");
        return error_response(&KalikeError::Auth("Invalid webhook secret".into()));
    }

    let event: WebhookEvent = match parse_json_body(req).await {
        Ok(e) => e,
        Err(e) => return error_response(&e),
    };

    let Some(mongo) = &state.mongo else {
        return error_response(&KalikeError::Database("Database unavailable".into()));
    };

    match apply_webhook_event(mongo, &event).await {
        Ok(()) => json_response(
            StatusCode::OK,
            &SuccessResponse {
                success: true,
                message: "Event applied".into(),
            },
        ),
        Err(e) => error_response(&e),
    }
}

/// Handle billing requests.
///
/// Returns Some(response) if the request was handled, None otherwise.
pub async fn handle_billing_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method();

    let is_billing_route = path == "/api/billing/subscription"
        || path == "/api/billing/checkout"
        || path == "/webhooks/payment";
    if !is_billing_route {
        return None;
    }

    if method == Method::OPTIONS {
        return Some(cors_preflight());
    }

    let path = path.to_string();
    let response = match (method, path.as_str()) {
        (&Method::GET, "/api/billing/subscription") => handle_subscription(req, state).await,
        (&Method::POST, "/api/billing/checkout") => handle_checkout(req, state).await,
        (&Method::POST, "/webhooks/payment") => handle_webhook(req, state).await,
        _ => json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            &ErrorResponse {
                error: "Method not allowed".into(),
                code: None,
            },
        ),
    };

    Some(response)
}
