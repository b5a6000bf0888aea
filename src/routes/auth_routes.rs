//! HTTP routes for authentication
//!
//! - POST /auth/register - Create a learner account
//! - POST /auth/login    - Authenticate and get a JWT
//! - POST /auth/refresh  - Exchange a near-expiry token for a fresh one
//! - GET  /auth/me       - Current user info from token

use bson::doc;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{hash_password, verify_password, TokenInput};
use crate::db::schemas::{UserDoc, USER_COLLECTION};
use crate::routes::helpers::{
    cors_preflight, error_response, json_response, jwt_validator, parse_json_body, require_claims,
    BoxBody, ErrorResponse,
};
use crate::server::AppState;
use crate::types::KalikeError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub identifier: String,
    pub password: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub user_id: String,
    pub identifier: String,
    pub display_name: String,
    pub permission_level: String,
    pub tier: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: String,
    pub identifier: String,
    pub display_name: String,
    pub permission_level: String,
}

const MIN_PASSWORD_CHARS: usize = 8;

/// POST /auth/register
///
/// 1. Validate identifier and password
/// 2. Reject duplicate identifiers
/// 3. Hash password with argon2
/// 4. Store the user and return a JWT
async fn handle_register(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: RegisterRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    if body.identifier.trim().is_empty() {
        return error_response(&KalikeError::Validation("Identifier is required".into()));
    }
    if body.password.chars().count() < MIN_PASSWORD_CHARS {
        return error_response(&KalikeError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_CHARS
        )));
    }

    let Some(mongo) = &state.mongo else {
        return database_unavailable();
    };

    let users = match mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let identifier = body.identifier.trim().to_lowercase();

    match users.find_one(doc! { "identifier": &identifier }).await {
        Ok(Some(_)) => {
            return error_response(&KalikeError::Conflict(
                "Identifier is already registered".into(),
            ));
        }
        Ok(None) => {}
        Err(e) => return error_response(&e),
    }

    let password_hash = match hash_password(&body.password) {
        Ok(h) => h,
        Err(e) => return error_response(&e),
    };

    let display_name = if body.display_name.trim().is_empty() {
        identifier
            .split('@')
            .next()
            .unwrap_or("Learner")
            .to_string()
    } else {
        body.display_name.trim().to_string()
    };

    let user = UserDoc::new(identifier.clone(), password_hash, display_name.clone());
    let permission_level = user.permission_level;
    let tier = user.tier.clone();

    let user_id = match users.insert_one(user).await {
        Ok(id) => id.to_hex(),
        Err(e) => return error_response(&e),
    };

    info!(identifier = %identifier, "Registered new learner");

    issue_token_response(
        &state,
        user_id,
        identifier,
        display_name,
        permission_level,
        tier,
    )
}

/// POST /auth/login
async fn handle_login(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: LoginRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    let Some(mongo) = &state.mongo else {
        return database_unavailable();
    };

    let users = match mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let identifier = body.identifier.trim().to_lowercase();

    let user = match users.find_one(doc! { "identifier": &identifier }).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            // Same error as a bad password so identifiers cannot be probed
            return error_response(&KalikeError::Auth("Invalid credentials".into()));
        }
        Err(e) => return error_response(&e),
    };

    if !user.is_active {
        warn!(identifier = %identifier, "Login attempt on deactivated account");
        return error_response(&KalikeError::Auth("Invalid credentials".into()));
    }

    match verify_password(&body.password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => return error_response(&KalikeError::Auth("Invalid credentials".into())),
        Err(e) => return error_response(&e),
    }

    let user_id = match &user._id {
        Some(id) => id.to_hex(),
        None => return error_response(&KalikeError::Database("User missing _id".into())),
    };

    info!(identifier = %identifier, "Learner logged in");

    issue_token_response(
        &state,
        user_id,
        user.identifier,
        user.display_name,
        user.permission_level,
        user.tier,
    )
}

/// POST /auth/refresh
///
/// Accepts any still-valid token and returns a fresh one with the same
/// identity. Tier is re-read from the user record so a mid-session
/// subscription change is reflected.
async fn handle_refresh(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let claims = match require_claims(&state.args, &req) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let tier = match current_tier(&state, &claims.sub).await {
        Ok(t) => t,
        Err(e) => return error_response(&e),
    };

    issue_token_response(
        &state,
        claims.sub,
        claims.identifier,
        claims.display_name,
        claims.permission_level,
        tier,
    )
}

/// GET /auth/me
async fn handle_me(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let claims = match require_claims(&state.args, &req) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    json_response(
        StatusCode::OK,
        &MeResponse {
            user_id: claims.sub,
            identifier: claims.identifier,
            display_name: claims.display_name,
            permission_level: claims.permission_level.to_string(),
        },
    )
}

async fn current_tier(state: &AppState, user_id: &str) -> Result<String, KalikeError> {
    let Some(mongo) = &state.mongo else {
        return Ok("free".to_string());
    };

    let users = mongo.collection::<UserDoc>(USER_COLLECTION).await?;
    let oid = bson::oid::ObjectId::parse_str(user_id)
        .map_err(|_| KalikeError::Auth("Invalid token subject".into()))?;

    let user = users
        .find_one(doc! { "_id": oid })
        .await?
        .ok_or_else(|| KalikeError::Auth("User no longer exists".into()))?;

    Ok(user.tier)
}

fn issue_token_response(
    state: &AppState,
    user_id: String,
    identifier: String,
    display_name: String,
    permission_level: crate::auth::PermissionLevel,
    tier: String,
) -> Response<BoxBody> {
    let Some(validator) = jwt_validator(&state.args) else {
        return error_response(&KalikeError::Config("JWT secret not configured".into()));
    };

    let token = match validator.generate_token(TokenInput {
        user_id: user_id.clone(),
        identifier: identifier.clone(),
        display_name: display_name.clone(),
        permission_level,
    }) {
        Ok(t) => t,
        Err(e) => return error_response(&e),
    };

    json_response(
        StatusCode::OK,
        &AuthResponse {
            token,
            user_id,
            identifier,
            display_name,
            permission_level: permission_level.to_string(),
            tier,
        },
    )
}

fn database_unavailable() -> Response<BoxBody> {
    json_response(
        StatusCode::SERVICE_UNAVAILABLE,
        &ErrorResponse {
            error: "Database unavailable".into(),
            code: Some("UNAVAILABLE".into()),
        },
    )
}

/// Handle auth-related HTTP requests.
///
/// Returns Some(response) if the request was handled, None if not an auth route.
pub async fn handle_auth_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method();

    if !path.starts_with("/auth") {
        return None;
    }

    if method == Method::OPTIONS {
        return Some(cors_preflight());
    }

    let path = path.split('?').next().unwrap_or(path).to_string();

    let response = match (method, path.as_str()) {
        (&Method::POST, "/auth/register") => handle_register(req, state).await,
        (&Method::POST, "/auth/login") => handle_login(req, state).await,
        (&Method::POST, "/auth/refresh") => handle_refresh(req, state).await,
        (&Method::GET, "/auth/me") => handle_me(req, state).await,

        (_, "/auth/register") | (_, "/auth/login") | (_, "/auth/refresh") | (_, "/auth/me") => {
            json_response(
                StatusCode::METHOD_NOT_ALLOWED,
                &ErrorResponse {
                    error: "Method not allowed".into(),
                    code: None,
                },
            )
        }

        _ => json_response(
            StatusCode::NOT_FOUND,
            &ErrorResponse {
                error: "Auth endpoint not found".into(),
                code: None,
            },
        ),
    };

    Some(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_parses_camel_case() {
        let json = r#"{"identifier":"asha@example.com","password":"kannadiga","displayName":"Asha"}"#;
        let req: RegisterRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.display_name, "Asha");
    }

    #[test]
    fn test_register_request_display_name_optional() {
        let json = r#"{"identifier":"asha@example.com","password":"kannadiga"}"#;
        let req: RegisterRequest = serde_json::from_str(json).unwrap();
        assert!(req.display_name.is_empty());
    }
}
