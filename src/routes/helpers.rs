//! Shared response and request helpers for route handlers

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::auth::{extract_token_from_header, get_required_permission, Claims, JwtValidator};
use crate::config::Args;
use crate::types::KalikeError;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Maximum accepted request body size
const MAX_BODY_BYTES: usize = 65536;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .body(full_body(json))
        .unwrap()
}

pub fn cors_preflight() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap()
}

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

/// Map a service error to an HTTP response with the matching status code
pub fn error_response(err: &KalikeError) -> Response<BoxBody> {
    let (status, code) = match err {
        KalikeError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
        KalikeError::Auth(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        KalikeError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        KalikeError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
        KalikeError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
    };

    json_response(
        status,
        &ErrorResponse {
            error: err.to_string(),
            code: Some(code.to_string()),
        },
    )
}

pub async fn parse_json_body<T: for<'de> Deserialize<'de>>(
    req: Request<hyper::body::Incoming>,
) -> Result<T, KalikeError> {
    let body = req
        .collect()
        .await
        .map_err(|e| KalikeError::Http(format!("Failed to read body: {}", e)))?;

    let bytes = body.to_bytes();
    if bytes.len() > MAX_BODY_BYTES {
        return Err(KalikeError::Validation("Request body too large".into()));
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| KalikeError::Validation(format!("Invalid JSON: {}", e)))
}

/// Value of a query-string parameter, if present
pub fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    let query = query?;
    for param in query.split('&') {
        if let Some((key, value)) = param.split_once('=') {
            if key == name {
                return Some(value.to_string());
            }
        }
    }
    None
}

pub fn get_auth_header(req: &Request<hyper::body::Incoming>) -> Option<&str> {
    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Build the JWT validator for the current configuration.
/// None only when production is missing its secret, which startup rejects.
pub fn jwt_validator(args: &Args) -> Option<JwtValidator> {
    if args.dev_mode {
        Some(JwtValidator::new_dev())
    } else {
        args.jwt_secret()
            .and_then(|s| JwtValidator::new(s, args.jwt_expiry_seconds).ok())
    }
}

/// Authenticate a request from its Authorization header
pub fn require_claims(
    args: &Args,
    req: &Request<hyper::body::Incoming>,
) -> Result<Claims, KalikeError> {
    let token = extract_token_from_header(get_auth_header(req))
        .ok_or_else(|| KalikeError::Auth("Missing bearer token".into()))?;

    let validator =
        jwt_validator(args).ok_or_else(|| KalikeError::Auth("Token validation unavailable".into()))?;

    validator.verify_token(token)
}

/// Authenticate and authorize a gated operation. The required level comes
/// from the operation table, so policy lives in one place; unknown
/// operations are denied.
pub fn require_permission(
    args: &Args,
    req: &Request<hyper::body::Incoming>,
    operation: &str,
) -> Result<Claims, KalikeError> {
    let claims = require_claims(args, req)?;
    let required = get_required_permission(operation)
        .ok_or_else(|| KalikeError::Auth(format!("Unknown operation: {}", operation)))?;

    if claims.permission_level >= required {
        Ok(claims)
    } else {
        Err(KalikeError::Auth(format!(
            "Requires {} permission",
            required
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_extraction() {
        assert_eq!(
            query_param(Some("token=abc&room=beginners"), "room"),
            Some("beginners".to_string())
        );
        assert_eq!(
            query_param(Some("token=abc&room=beginners"), "token"),
            Some("abc".to_string())
        );
        assert_eq!(query_param(Some("room=beginners"), "token"), None);
        assert_eq!(query_param(None, "token"), None);
    }

    #[test]
    fn test_error_response_status_mapping() {
        let cases = [
            (KalikeError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (KalikeError::Auth("no".into()), StatusCode::UNAUTHORIZED),
            (KalikeError::NotFound("gone".into()), StatusCode::NOT_FOUND),
            (KalikeError::Conflict("taken".into()), StatusCode::CONFLICT),
            (KalikeError::Upstream("down".into()), StatusCode::BAD_GATEWAY),
            (
                KalikeError::Database("oops".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(error_response(&err).status(), expected);
        }
    }
}
