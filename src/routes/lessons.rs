//! Lesson catalog routes
//!
//! Learner-facing:
//! - GET /api/lessons          - published lessons in course order
//! - GET /api/lessons/{slug}   - one published lesson
//!
//! Admin:
//! - POST   /admin/lessons         - create
//! - PUT    /admin/lessons/{slug}  - update
//! - DELETE /admin/lessons/{slug}  - soft delete

use bson::doc;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::db::schemas::{ExerciseDoc, LessonDoc, EXERCISE_COLLECTION, LESSON_COLLECTION};
use crate::routes::exercises::ExerciseResponse;
use crate::routes::helpers::{
    cors_preflight, error_response, json_response, parse_json_body, query_param,
    require_permission, BoxBody, ErrorResponse, SuccessResponse,
};
use crate::server::AppState;
use crate::types::KalikeError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonResponse {
    pub slug: String,
    pub title: String,
    pub level: String,
    pub content_kn: String,
    pub transliteration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_hash: Option<String>,
    pub order_index: i64,
    pub published: bool,
}

impl From<LessonDoc> for LessonResponse {
    fn from(doc: LessonDoc) -> Self {
        Self {
            slug: doc.slug,
            title: doc.title,
            level: doc.level,
            content_kn: doc.content_kn,
            transliteration: doc.transliteration,
            audio_hash: doc.audio_hash,
            order_index: doc.order_index,
            published: doc.published,
        }
    }
}

/// Lesson detail: the lesson plus its exercises, answers hidden
#[derive(Debug, Serialize)]
pub struct LessonDetailResponse {
    #[serde(flatten)]
    pub lesson: LessonResponse,
    pub exercises: Vec<ExerciseResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertLessonRequest {
    pub slug: String,
    pub title: String,
    #[serde(default = "default_level")]
    pub level: String,
    pub content_kn: String,
    #[serde(default)]
    pub transliteration: String,
    #[serde(default)]
    pub audio_hash: Option<String>,
    #[serde(default)]
    pub order_index: i64,
    #[serde(default)]
    pub published: bool,
}

fn default_level() -> String {
    "beginner".to_string()
}

fn validate_slug(slug: &str) -> Result<(), KalikeError> {
    if slug.is_empty()
        || !slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(KalikeError::Validation(
            "Slug must be lowercase letters, digits and hyphens".into(),
        ));
    }
    Ok(())
}

/// GET /api/lessons?level=<level>
async fn handle_list(state: Arc<AppState>, level: Option<String>) -> Response<BoxBody> {
    let Some(mongo) = &state.mongo else {
        return json_response(StatusCode::OK, &Vec::<LessonResponse>::new());
    };

    let lessons = match mongo.collection::<LessonDoc>(LESSON_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let mut filter = doc! { "published": true };
    if let Some(level) = level {
        filter.insert("level", level);
    }

    match lessons
        .find_many_sorted(filter, Some(doc! { "order_index": 1 }), None)
        .await
    {
        Ok(docs) => {
            let body: Vec<LessonResponse> = docs.into_iter().map(Into::into).collect();
            json_response(StatusCode::OK, &body)
        }
        Err(e) => error_response(&e),
    }
}

/// GET /api/lessons/{slug}
async fn handle_get(state: Arc<AppState>, slug: &str) -> Response<BoxBody> {
    let Some(mongo) = &state.mongo else {
        return error_response(&KalikeError::NotFound(format!("Lesson not found: {}", slug)));
    };

    let lessons = match mongo.collection::<LessonDoc>(LESSON_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let lesson = match lessons
        .find_one(doc! { "slug": slug, "published": true })
        .await
    {
        Ok(Some(doc)) => doc,
        Ok(None) => {
            return error_response(&KalikeError::NotFound(format!("Lesson not found: {}", slug)))
        }
        Err(e) => return error_response(&e),
    };

    let exercises = match mongo.collection::<ExerciseDoc>(EXERCISE_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };
    let exercises = match exercises.find_many(doc! { "lesson_slug": slug }).await {
        Ok(docs) => docs
            .into_iter()
            .filter_map(|d| {
                Some(ExerciseResponse {
                    id: d._id?.to_hex(),
                    lesson_slug: d.lesson_slug,
                    kind: d.kind,
                    prompt: d.prompt,
                    choices: d.choices,
                })
            })
            .collect(),
        Err(e) => return error_response(&e),
    };

    json_response(
        StatusCode::OK,
        &LessonDetailResponse {
            lesson: LessonResponse::from(lesson),
            exercises,
        },
    )
}

/// POST /admin/lessons
async fn handle_create(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    if let Err(e) = require_permission(&state.args, &req, "create_lesson") {
        return error_response(&e);
    }

    let body: UpsertLessonRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    if let Err(e) = validate_slug(&body.slug) {
        return error_response(&e);
    }
    if body.title.trim().is_empty() || body.content_kn.trim().is_empty() {
        return error_response(&KalikeError::Validation(
            "Title and contentKn are required".into(),
        ));
    }

    let Some(mongo) = &state.mongo else {
        return error_response(&KalikeError::Database("Database unavailable".into()));
    };

    let lessons = match mongo.collection::<LessonDoc>(LESSON_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match lessons.find_one(doc! { "slug": &body.slug }).await {
        Ok(Some(_)) => {
            return error_response(&KalikeError::Conflict(format!(
                "Lesson slug already exists: {}",
                body.slug
            )));
        }
        Ok(None) => {}
        Err(e) => return error_response(&e),
    }

    let lesson = LessonDoc {
        _id: None,
        metadata: Default::default(),
        slug: body.slug.clone(),
        title: body.title.trim().to_string(),
        level: body.level,
        content_kn: body.content_kn,
        transliteration: body.transliteration,
        audio_hash: body.audio_hash,
        order_index: body.order_index,
        published: body.published,
    };

    match lessons.insert_one(lesson).await {
        Ok(_) => {
            info!(slug = %body.slug, "Lesson created");
            json_response(
                StatusCode::CREATED,
                &SuccessResponse {
                    success: true,
                    message: format!("Lesson created: {}", body.slug),
                },
            )
        }
        Err(e) => error_response(&e),
    }
}

/// PUT /admin/lessons/{slug}
async fn handle_update(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    slug: String,
) -> Response<BoxBody> {
    if let Err(e) = require_permission(&state.args, &req, "update_lesson") {
        return error_response(&e);
    }

    let body: UpsertLessonRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    let Some(mongo) = &state.mongo else {
        return error_response(&KalikeError::Database("Database unavailable".into()));
    };

    let lessons = match mongo.collection::<LessonDoc>(LESSON_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let mut set = doc! {
        "title": body.title.trim(),
        "level": &body.level,
        "content_kn": &body.content_kn,
        "transliteration": &body.transliteration,
        "order_index": body.order_index,
        "published": body.published,
        "metadata.updated_at": bson::DateTime::now(),
    };
    if let Some(audio_hash) = &body.audio_hash {
        set.insert("audio_hash", audio_hash);
    }

    match lessons
        .find_one_and_update(doc! { "slug": &slug }, doc! { "$set": set })
        .await
    {
        Ok(Some(doc)) => json_response(StatusCode::OK, &LessonResponse::from(doc)),
        Ok(None) => error_response(&KalikeError::NotFound(format!("Lesson not found: {}", slug))),
        Err(e) => error_response(&e),
    }
}

/// DELETE /admin/lessons/{slug}
async fn handle_delete(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    slug: String,
) -> Response<BoxBody> {
    if let Err(e) = require_permission(&state.args, &req, "delete_lesson") {
        return error_response(&e);
    }

    let Some(mongo) = &state.mongo else {
        return error_response(&KalikeError::Database("Database unavailable".into()));
    };

    let lessons = match mongo.collection::<LessonDoc>(LESSON_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match lessons.soft_delete(doc! { "slug": &slug }).await {
        Ok(result) if result.matched_count > 0 => {
            info!(slug = %slug, "Lesson deleted");
            json_response(
                StatusCode::OK,
                &SuccessResponse {
                    success: true,
                    message: format!("Lesson deleted: {}", slug),
                },
            )
        }
        Ok(_) => error_response(&KalikeError::NotFound(format!("Lesson not found: {}", slug))),
        Err(e) => error_response(&e),
    }
}

/// Handle lesson catalog requests.
///
/// Returns Some(response) if the request was handled, None otherwise.
pub async fn handle_lesson_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method();

    // Deeper paths like /api/lessons/{slug}/exercises belong to other handlers
    let bare_slug = |p: &str, prefix: &str| {
        p.strip_prefix(prefix)
            .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
    };
    let is_lesson_route = path == "/api/lessons"
        || bare_slug(path, "/api/lessons/")
        || path == "/admin/lessons"
        || bare_slug(path, "/admin/lessons/");
    if !is_lesson_route {
        return None;
    }

    if method == Method::OPTIONS {
        return Some(cors_preflight());
    }

    let level = query_param(req.uri().query(), "level").filter(|v| !v.is_empty());

    let path = path.to_string();

    let response = match (method, path.as_str()) {
        (&Method::GET, "/api/lessons") => handle_list(state, level).await,
        (&Method::GET, p) if p.starts_with("/api/lessons/") => {
            let slug = p.trim_start_matches("/api/lessons/").to_string();
            handle_get(state, &slug).await
        }
        (&Method::POST, "/admin/lessons") => handle_create(req, state).await,
        (&Method::PUT, p) if p.starts_with("/admin/lessons/") => {
            let slug = p.trim_start_matches("/admin/lessons/").to_string();
            handle_update(req, state, slug).await
        }
        (&Method::DELETE, p) if p.starts_with("/admin/lessons/") => {
            let slug = p.trim_start_matches("/admin/lessons/").to_string();
            handle_delete(req, state, slug).await
        }
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
    fn test_slug_validation() {
        assert!(validate_slug("greetings-1").is_ok());
        assert!(validate_slug("").is_err());
        assert!(validate_slug("Greetings").is_err());
        assert!(validate_slug("greetings one").is_err());
        assert!(validate_slug("ನಮಸ್ಕಾರ").is_err());
    }

    #[test]
    fn test_upsert_defaults() {
        let json = r#"{"slug":"greetings","title":"Greetings","contentKn":"ನಮಸ್ಕಾರ"}"#;
        let req: UpsertLessonRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.level, "beginner");
        assert!(!req.published);
        assert_eq!(req.order_index, 0);
    }
}
