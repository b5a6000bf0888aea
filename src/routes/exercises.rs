//! Exercise routes
//!
//! - GET  /api/lessons/{slug}/exercises  - exercises for a lesson (answers hidden)
//! - POST /api/exercises/{id}/submit     - submit an attempt
//! - POST /admin/exercises               - create an exercise
//!
//! Submission grading depends on the exercise kind: quiz answers are matched
//! against the stored answer, writing and speaking go to the grading model.
//! When no model is configured, or the model is unreachable, those
//! submissions are accepted ungraded so the grading service never blocks
//! learners.
//!
//! An accepted submission counts as a qualifying activity and the response
//! carries the learner's updated progress.

use bson::{doc, oid::ObjectId};
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::schemas::{
    ExerciseDoc, ExerciseKind, LessonDoc, SubmissionDoc, EXERCISE_COLLECTION, LESSON_COLLECTION,
    SUBMISSION_COLLECTION,
};
use crate::progress::ProgressRecord;
use crate::routes::helpers::{
    cors_preflight, error_response, json_response, parse_json_body, require_claims,
    require_permission, BoxBody, ErrorResponse,
};
use crate::server::AppState;
use crate::types::KalikeError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseResponse {
    pub id: String,
    pub lesson_slug: String,
    pub kind: ExerciseKind,
    pub prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExerciseRequest {
    pub lesson_slug: String,
    #[serde(default)]
    pub kind: ExerciseKind,
    pub prompt: String,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub rubric: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// Answer text, or speech transcript for speaking exercises
    pub payload: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graded_by: Option<String>,
    /// Updated progress when the submission was accepted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressRecord>,
}

/// Outcome of grading one attempt
struct GradeOutcome {
    accepted: bool,
    score: Option<i64>,
    feedback: Option<String>,
    graded_by: Option<&'static str>,
}

impl GradeOutcome {
    /// Accepted without a score, used whenever the grading model is
    /// missing or unreachable
    fn accepted_ungraded() -> Self {
        Self {
            accepted: true,
            score: None,
            feedback: None,
            graded_by: None,
        }
    }
}

/// A model outage never blocks learners: upstream failures become an
/// accepted, ungraded submission. Every other error still surfaces.
fn degrade_model_outage(
    result: Result<GradeOutcome, KalikeError>,
) -> Result<GradeOutcome, KalikeError> {
    match result {
        Err(KalikeError::Upstream(reason)) => {
            warn!(error = %reason, "Grading model unavailable, accepting ungraded");
            Ok(GradeOutcome::accepted_ungraded())
        }
        other => other,
    }
}

/// Quiz answers match ignoring case and surrounding whitespace
fn quiz_matches(expected: &str, given: &str) -> bool {
    expected.trim().to_lowercase() == given.trim().to_lowercase()
}

async fn grade_submission(
    state: &AppState,
    exercise: &ExerciseDoc,
    payload: &str,
) -> Result<GradeOutcome, KalikeError> {
    match exercise.kind {
        ExerciseKind::Quiz => {
            let answer = exercise.answer.as_deref().ok_or_else(|| {
                KalikeError::Database("Quiz exercise has no stored answer".into())
            })?;
            let correct = quiz_matches(answer, payload);
            Ok(GradeOutcome {
                accepted: correct,
                score: Some(if correct { 100 } else { 0 }),
                feedback: None,
                graded_by: Some("rule"),
            })
        }
        ExerciseKind::Writing | ExerciseKind::Speaking => {
            let Some(model) = &state.model else {
                // No grading model configured: accept ungraded
                return Ok(GradeOutcome::accepted_ungraded());
            };

            let rubric = exercise.rubric.as_deref().unwrap_or("Grade for clarity and correct Kannada usage.");
            let grade = match exercise.kind {
                ExerciseKind::Writing => {
                    model.grade_writing(&exercise.prompt, rubric, payload).await?
                }
                _ => model.grade_speaking(&exercise.prompt, rubric, payload).await?,
            };

            Ok(GradeOutcome {
                accepted: grade.is_passing(),
                score: Some(grade.score),
                feedback: Some(grade.feedback),
                graded_by: Some("model"),
            })
        }
    }
}

/// GET /api/lessons/{slug}/exercises
async fn handle_list_for_lesson(state: Arc<AppState>, slug: &str) -> Response<BoxBody> {
    let Some(mongo) = &state.mongo else {
        return json_response(StatusCode::OK, &Vec::<ExerciseResponse>::new());
    };

    let exercises = match mongo.collection::<ExerciseDoc>(EXERCISE_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match exercises.find_many(doc! { "lesson_slug": slug }).await {
        Ok(docs) => {
            let body: Vec<ExerciseResponse> = docs
                .into_iter()
                .filter_map(|d| {
                    let id = d._id?.to_hex();
                    Some(ExerciseResponse {
                        id,
                        lesson_slug: d.lesson_slug,
                        kind: d.kind,
                        prompt: d.prompt,
                        choices: d.choices,
                    })
                })
                .collect();
            json_response(StatusCode::OK, &body)
        }
        Err(e) => error_response(&e),
    }
}

/// POST /api/exercises/{id}/submit
async fn handle_submit(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    exercise_id: String,
) -> Response<BoxBody> {
    let claims = match require_claims(&state.args, &req) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let body: SubmitRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    if body.payload.trim().is_empty() {
        return error_response(&KalikeError::Validation("Payload is required".into()));
    }

    let oid = match ObjectId::parse_str(&exercise_id) {
        Ok(o) => o,
        Err(_) => {
            return error_response(&KalikeError::Validation(format!(
                "Invalid exercise id: {}",
                exercise_id
            )))
        }
    };

    let Some(mongo) = &state.mongo else {
        return error_response(&KalikeError::Database("Database unavailable".into()));
    };

    let exercises = match mongo.collection::<ExerciseDoc>(EXERCISE_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let exercise = match exercises.find_one(doc! { "_id": oid }).await {
        Ok(Some(e)) => e,
        Ok(None) => {
            return error_response(&KalikeError::NotFound(format!(
                "Exercise not found: {}",
                exercise_id
            )))
        }
        Err(e) => return error_response(&e),
    };

    let graded = degrade_model_outage(grade_submission(&state, &exercise, &body.payload).await);
    let outcome = match graded {
        Ok(o) => o,
        Err(e) => {
            warn!(exercise_id = %exercise_id, error = %e, "Grading failed");
            return error_response(&e);
        }
    };

    let submission = SubmissionDoc {
        _id: None,
        metadata: Default::default(),
        user_id: claims.sub.clone(),
        exercise_id: exercise_id.clone(),
        payload: body.payload,
        correct: Some(outcome.accepted),
        score: outcome.score.map(|s| s as i32),
        feedback: outcome.feedback.clone(),
        graded_by: outcome.graded_by.map(|g| g.to_string()),
    };

    let submissions = match mongo.collection::<SubmissionDoc>(SUBMISSION_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };
    if let Err(e) = submissions.insert_one(submission).await {
        return error_response(&e);
    }

    // An accepted submission is a qualifying activity
    let progress = if outcome.accepted {
        match state
            .progress
            .record_activity(&claims.sub, Some(exercise.lesson_slug.clone()))
            .await
        {
            Ok(record) => Some(record),
            Err(e) => return error_response(&e),
        }
    } else {
        None
    };

    info!(
        user_id = %claims.sub,
        exercise_id = %exercise_id,
        accepted = outcome.accepted,
        "Submission graded"
    );

    json_response(
        StatusCode::OK,
        &SubmitResponse {
            accepted: outcome.accepted,
            score: outcome.score,
            feedback: outcome.feedback,
            graded_by: outcome.graded_by.map(|g| g.to_string()),
            progress,
        },
    )
}

/// POST /admin/exercises
async fn handle_create(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    if let Err(e) = require_permission(&state.args, &req, "create_exercise") {
        return error_response(&e);
    }

    let body: CreateExerciseRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    if body.prompt.trim().is_empty() {
        return error_response(&KalikeError::Validation("Prompt is required".into()));
    }
    if body.kind == ExerciseKind::Quiz && body.answer.as_deref().map_or(true, |a| a.trim().is_empty())
    {
        return error_response(&KalikeError::Validation(
            "Quiz exercises require an answer".into(),
        ));
    }

    let Some(mongo) = &state.mongo else {
        return error_response(&KalikeError::Database("Database unavailable".into()));
    };

    // Exercises must attach to an existing lesson
    let lessons = match mongo.collection::<LessonDoc>(LESSON_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };
    match lessons.find_one(doc! { "slug": &body.lesson_slug }).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(&KalikeError::NotFound(format!(
                "Lesson not found: {}",
                body.lesson_slug
            )))
        }
        Err(e) => return error_response(&e),
    }

    let exercises = match mongo.collection::<ExerciseDoc>(EXERCISE_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let exercise = ExerciseDoc {
        _id: None,
        metadata: Default::default(),
        lesson_slug: body.lesson_slug.clone(),
        kind: body.kind,
        prompt: body.prompt.trim().to_string(),
        choices: body.choices,
        answer: body.answer,
        rubric: body.rubric,
    };

    match exercises.insert_one(exercise).await {
        Ok(id) => {
            info!(lesson_slug = %body.lesson_slug, exercise_id = %id.to_hex(), "Exercise created");
            json_response(
                StatusCode::CREATED,
                &serde_json::json!({ "success": true, "id": id.to_hex() }),
            )
        }
        Err(e) => error_response(&e),
    }
}

/// Handle exercise requests.
///
/// Returns Some(response) if the request was handled, None otherwise.
pub async fn handle_exercise_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method();

    let lesson_exercises = path
        .strip_prefix("/api/lessons/")
        .and_then(|rest| rest.strip_suffix("/exercises"))
        .filter(|slug| !slug.is_empty() && !slug.contains('/'))
        .map(|slug| slug.to_string());

    let submit_target = path
        .strip_prefix("/api/exercises/")
        .and_then(|rest| rest.strip_suffix("/submit"))
        .filter(|id| !id.is_empty() && !id.contains('/'))
        .map(|id| id.to_string());

    let is_exercise_route =
        lesson_exercises.is_some() || submit_target.is_some() || path == "/admin/exercises";
    if !is_exercise_route {
        return None;
    }

    if method == Method::OPTIONS {
        return Some(cors_preflight());
    }

    let response = match method {
        &Method::GET if lesson_exercises.is_some() => {
            let slug = lesson_exercises.unwrap();
            handle_list_for_lesson(state, &slug).await
        }
        &Method::POST if submit_target.is_some() => {
            let id = submit_target.unwrap();
            handle_submit(req, state, id).await
        }
        &Method::POST if path == "/admin/exercises" => handle_create(req, state).await,
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
    fn test_quiz_match_is_case_and_space_insensitive() {
        assert!(quiz_matches("Namaskara", " namaskara "));
        assert!(quiz_matches("ನಮಸ್ಕಾರ", "ನಮಸ್ಕಾರ"));
        assert!(!quiz_matches("namaskara", "namaskaara"));
    }

    #[test]
    fn test_model_outage_accepts_ungraded() {
        let outage: Result<GradeOutcome, KalikeError> =
            Err(KalikeError::Upstream("connection refused".into()));
        let outcome = degrade_model_outage(outage).unwrap();
        assert!(outcome.accepted);
        assert!(outcome.score.is_none());
        assert!(outcome.graded_by.is_none());
    }

    #[test]
    fn test_non_upstream_grading_errors_still_surface() {
        let failure: Result<GradeOutcome, KalikeError> =
            Err(KalikeError::Database("insert failed".into()));
        assert!(matches!(
            degrade_model_outage(failure),
            Err(KalikeError::Database(_))
        ));
    }

    #[test]
    fn test_create_request_defaults_to_quiz() {
        let json = r#"{"lessonSlug":"greetings","prompt":"Say hello","answer":"namaskara"}"#;
        let req: CreateExerciseRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.kind, ExerciseKind::Quiz);
        assert!(req.choices.is_empty());
    }
}
