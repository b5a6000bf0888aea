//! Progress routes
//!
//! - GET  /api/progress           - current xp, streak and badges
//! - POST /api/progress/activity  - record one completed activity
//!
//! Exercise submission records activity on its own; this endpoint covers
//! activities graded client-side, like finishing a lesson reading.

use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::progress::ProgressRecord;
use crate::routes::helpers::{
    cors_preflight, error_response, json_response, parse_json_body, require_claims, BoxBody,
    ErrorResponse,
};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRequest {
    #[serde(default)]
    pub lesson_id: Option<String>,
}

/// Progress as returned to clients; a learner with no recorded activity
/// gets the zero state rather than a 404.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub xp: i64,
    pub streak: i64,
    pub badges: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lesson_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ProgressView {
    fn zero() -> Self {
        Self {
            xp: 0,
            streak: 0,
            badges: Vec::new(),
            lesson_id: None,
            updated_at: None,
        }
    }
}

impl From<ProgressRecord> for ProgressView {
    fn from(record: ProgressRecord) -> Self {
        Self {
            xp: record.xp,
            streak: record.streak,
            badges: record.badges,
            lesson_id: record.lesson_id,
            updated_at: Some(record.updated_at),
        }
    }
}

/// GET /api/progress
async fn handle_get(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let claims = match require_claims(&state.args, &req) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match state.progress.current(&claims.sub).await {
        Ok(Some(record)) => json_response(StatusCode::OK, &ProgressView::from(record)),
        Ok(None) => json_response(StatusCode::OK, &ProgressView::zero()),
        Err(e) => error_response(&e),
    }
}

/// POST /api/progress/activity
async fn handle_activity(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let claims = match require_claims(&state.args, &req) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let body: ActivityRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    match state.progress.record_activity(&claims.sub, body.lesson_id).await {
        Ok(record) => json_response(StatusCode::OK, &ProgressView::from(record)),
        Err(e) => error_response(&e),
    }
}

/// Handle progress requests.
///
/// Returns Some(response) if the request was handled, None otherwise.
pub async fn handle_progress_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method();

    if path != "/api/progress" && path != "/api/progress/activity" {
        return None;
    }

    if method == Method::OPTIONS {
        return Some(cors_preflight());
    }

    let path = path.to_string();
    let response = match (method, path.as_str()) {
        (&Method::GET, "/api/progress") => handle_get(req, state).await,
        (&Method::POST, "/api/progress/activity") => handle_activity(req, state).await,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_view_shape() {
        let json = serde_json::to_value(ProgressView::zero()).unwrap();
        assert_eq!(json["xp"], 0);
        assert_eq!(json["streak"], 0);
        assert!(json["badges"].as_array().unwrap().is_empty());
        assert!(json.get("lessonId").is_none());
    }

    #[test]
    fn test_activity_request_lesson_optional() {
        let req: ActivityRequest = serde_json::from_str("{}").unwrap();
        assert!(req.lesson_id.is_none());

        let req: ActivityRequest =
            serde_json::from_str(r#"{"lessonId":"greetings"}"#).unwrap();
        assert_eq!(req.lesson_id.as_deref(), Some("greetings"));
    }
}
