//! Tutor marketplace routes
//!
//! - GET  /api/tutors                  - active tutor profiles
//! - POST /admin/tutors                - create a tutor profile
//! - GET  /api/bookings                - caller's bookings (as learner or tutor)
//! - POST /api/bookings                - book a session (premium only)
//! - POST /api/bookings/{id}/cancel    - learner cancels their booking
//! - POST /api/bookings/{id}/confirm   - tutor confirms a pending booking
//!
//! Booking a tutor is the one premium-gated feature: free-tier learners get
//! 402 with a checkout pointer rather than a plain 403.

use bson::{doc, oid::ObjectId};
use chrono::{DateTime, Duration, Utc};
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::auth::{Claims, PermissionLevel};
use crate::billing::PREMIUM_TIER;
use crate::db::schemas::{
    BookingDoc, BookingStatus, TutorDoc, UserDoc, BOOKING_COLLECTION, TUTOR_COLLECTION,
    USER_COLLECTION,
};
use crate::db::MongoClient;
use crate::routes::helpers::{
    cors_preflight, error_response, json_response, parse_json_body, require_claims,
    require_permission, BoxBody, ErrorResponse, SuccessResponse,
};
use crate::server::AppState;
use crate::types::KalikeError;

const MIN_SESSION_MINUTES: i64 = 15;
const MAX_SESSION_MINUTES: i64 = 180;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorResponse {
    pub id: String,
    pub display_name: String,
    pub bio: String,
    pub languages: Vec<String>,
    pub hourly_rate_minor: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTutorRequest {
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub languages: Vec<String>,
    pub hourly_rate_minor: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub tutor_id: String,
    pub scheduled_start: DateTime<Utc>,
    pub duration_minutes: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub id: String,
    pub tutor_id: String,
    pub learner_id: String,
    pub scheduled_start: DateTime<Utc>,
    pub duration_minutes: i64,
    pub status: String,
    pub price_minor: i64,
}

impl BookingResponse {
    fn from_doc(doc: BookingDoc) -> Option<Self> {
        Some(Self {
            id: doc._id?.to_hex(),
            tutor_id: doc.tutor_id,
            learner_id: doc.learner_id,
            scheduled_start: doc.scheduled_start.to_chrono(),
            duration_minutes: doc.duration_minutes,
            status: doc.status.to_string(),
            price_minor: doc.price_minor,
        })
    }
}

/// Two sessions on the same tutor overlap when their time ranges intersect
fn overlaps(
    a_start: DateTime<Utc>,
    a_minutes: i64,
    b_start: DateTime<Utc>,
    b_minutes: i64,
) -> bool {
    let a_end = a_start + Duration::minutes(a_minutes);
    let b_end = b_start + Duration::minutes(b_minutes);
    a_start < b_end && b_start < a_end
}

fn session_price_minor(hourly_rate_minor: i64, minutes: i64) -> i64 {
    hourly_rate_minor * minutes / 60
}

async fn caller_tier(mongo: &MongoClient, user_id: &str) -> Result<String, KalikeError> {
    let oid = ObjectId::parse_str(user_id)
        .map_err(|_| KalikeError::Auth("Invalid token subject".into()))?;
    let users = mongo.collection::<UserDoc>(USER_COLLECTION).await?;
    let user = users
        .find_one(doc! { "_id": oid })
        .await?
        .ok_or_else(|| KalikeError::Auth("User no longer exists".into()))?;
    Ok(user.tier)
}

fn payment_required() -> Response<BoxBody> {
    json_response(
        StatusCode::PAYMENT_REQUIRED,
        &ErrorResponse {
            error: "Tutor booking requires a premium subscription".into(),
            code: Some("PAYMENT_REQUIRED".into()),
        },
    )
}

/// GET /api/tutors
async fn handle_list_tutors(state: Arc<AppState>) -> Response<BoxBody> {
    let Some(mongo) = &state.mongo else {
        return json_response(StatusCode::OK, &Vec::<TutorResponse>::new());
    };

    let tutors = match mongo.collection::<TutorDoc>(TUTOR_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match tutors.find_many(doc! { "active": true }).await {
        Ok(docs) => {
            let body: Vec<TutorResponse> = docs
                .into_iter()
                .filter_map(|d| {
                    Some(TutorResponse {
                        id: d._id?.to_hex(),
                        display_name: d.display_name,
                        bio: d.bio,
                        languages: d.languages,
                        hourly_rate_minor: d.hourly_rate_minor,
                    })
                })
                .collect();
            json_response(StatusCode::OK, &body)
        }
        Err(e) => error_response(&e),
    }
}

/// POST /admin/tutors
///
/// Creates the profile and grants the backing account tutor permission.
async fn handle_create_tutor(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    if let Err(e) = require_permission(&state.args, &req, "create_tutor") {
        return error_response(&e);
    }

    let body: CreateTutorRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    if body.display_name.trim().is_empty() {
        return error_response(&KalikeError::Validation("Display name is required".into()));
    }
    if body.hourly_rate_minor <= 0 {
        return error_response(&KalikeError::Validation(
            "Hourly rate must be positive".into(),
        ));
    }

    let user_oid = match ObjectId::parse_str(&body.user_id) {
        Ok(o) => o,
        Err(_) => {
            return error_response(&KalikeError::Validation(format!(
                "Invalid user id: {}",
                body.user_id
            )))
        }
    };

    let Some(mongo) = &state.mongo else {
        return error_response(&KalikeError::Database("Database unavailable".into()));
    };

    let users = match mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };
    match users.find_one(doc! { "_id": user_oid }).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(&KalikeError::NotFound(format!(
                "User not found: {}",
                body.user_id
            )))
        }
        Err(e) => return error_response(&e),
    }

    let tutors = match mongo.collection::<TutorDoc>(TUTOR_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };
    match tutors.find_one(doc! { "user_id": &body.user_id }).await {
        Ok(Some(_)) => {
            return error_response(&KalikeError::Conflict(
                "User already has a tutor profile".into(),
            ));
        }
        Ok(None) => {}
        Err(e) => return error_response(&e),
    }

    let tutor = TutorDoc {
        _id: None,
        metadata: Default::default(),
        user_id: body.user_id.clone(),
        display_name: body.display_name.trim().to_string(),
        bio: body.bio,
        languages: body.languages,
        hourly_rate_minor: body.hourly_rate_minor,
        active: true,
    };

    let tutor_id = match tutors.insert_one(tutor).await {
        Ok(id) => id.to_hex(),
        Err(e) => return error_response(&e),
    };

    // Grant booking management on their own profile
    if let Err(e) = users
        .update_one(
            doc! { "_id": user_oid, "permission_level": "LEARNER" },
            doc! { "$set": {
                "permission_level": "TUTOR",
                "metadata.updated_at": bson::DateTime::now(),
            }},
        )
        .await
    {
        return error_response(&e);
    }

    info!(user_id = %body.user_id, tutor_id = %tutor_id, "Tutor profile created");

    json_response(
        StatusCode::CREATED,
        &serde_json::json!({ "success": true, "id": tutor_id }),
    )
}

/// GET /api/bookings
async fn handle_list_bookings(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let claims = match require_claims(&state.args, &req) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let Some(mongo) = &state.mongo else {
        return json_response(StatusCode::OK, &Vec::<BookingResponse>::new());
    };

    let bookings = match mongo.collection::<BookingDoc>(BOOKING_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    // Tutors see bookings against their profile as well as their own
    let filter = match tutor_profile_id(mongo, &claims.sub).await {
        Ok(Some(tutor_id)) => doc! { "$or": [
            { "learner_id": &claims.sub },
            { "tutor_id": tutor_id },
        ]},
        Ok(None) => doc! { "learner_id": &claims.sub },
        Err(e) => return error_response(&e),
    };

    match bookings
        .find_many_sorted(filter, Some(doc! { "scheduled_start": 1 }), None)
        .await
    {
        Ok(docs) => {
            let body: Vec<BookingResponse> =
                docs.into_iter().filter_map(BookingResponse::from_doc).collect();
            json_response(StatusCode::OK, &body)
        }
        Err(e) => error_response(&e),
    }
}

async fn tutor_profile_id(
    mongo: &MongoClient,
    user_id: &str,
) -> Result<Option<String>, KalikeError> {
    let tutors = mongo.collection::<TutorDoc>(TUTOR_COLLECTION).await?;
    let profile = tutors.find_one(doc! { "user_id": user_id }).await?;
    Ok(profile.and_then(|t| t._id.map(|id| id.to_hex())))
}

/// POST /api/bookings
async fn handle_create_booking(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let claims = match require_claims(&state.args, &req) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let body: CreateBookingRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    if !(MIN_SESSION_MINUTES..=MAX_SESSION_MINUTES).contains(&body.duration_minutes) {
        return error_response(&KalikeError::Validation(format!(
            "Duration must be between {} and {} minutes",
            MIN_SESSION_MINUTES, MAX_SESSION_MINUTES
        )));
    }
    if body.scheduled_start <= Utc::now() {
        return error_response(&KalikeError::Validation(
            "Scheduled start must be in the future".into(),
        ));
    }

    let Some(mongo) = &state.mongo else {
        return error_response(&KalikeError::Database("Database unavailable".into()));
    };

    match caller_tier(mongo, &claims.sub).await {
        Ok(tier) if tier == PREMIUM_TIER => {}
        Ok(_) => return payment_required(),
        Err(e) => return error_response(&e),
    }

    let tutor_oid = match ObjectId::parse_str(&body.tutor_id) {
        Ok(o) => o,
        Err(_) => {
            return error_response(&KalikeError::Validation(format!(
                "Invalid tutor id: {}",
                body.tutor_id
            )))
        }
    };

    let tutors = match mongo.collection::<TutorDoc>(TUTOR_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };
    let tutor = match tutors.find_one(doc! { "_id": tutor_oid, "active": true }).await {
        Ok(Some(t)) => t,
        Ok(None) => {
            return error_response(&KalikeError::NotFound(format!(
                "Tutor not found: {}",
                body.tutor_id
            )))
        }
        Err(e) => return error_response(&e),
    };

    if tutor.user_id == claims.sub {
        return error_response(&KalikeError::Validation(
            "Tutors cannot book themselves".into(),
        ));
    }

    let bookings = match mongo.collection::<BookingDoc>(BOOKING_COLLECTION).await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    // Slot conflict check against the tutor's live bookings
    let existing = match bookings.find_many(doc! { "tutor_id": &body.tutor_id }).await {
        Ok(docs) => docs,
        Err(e) => return error_response(&e),
    };
    let conflict = existing.iter().any(|b| {
        b.occupies_slot()
            && overlaps(
                b.scheduled_start.to_chrono(),
                b.duration_minutes,
                body.scheduled_start,
                body.duration_minutes,
            )
    });
    if conflict {
        return error_response(&KalikeError::Conflict(
            "Tutor is already booked for that time".into(),
        ));
    }

    let booking = BookingDoc {
        _id: None,
        metadata: Default::default(),
        learner_id: claims.sub.clone(),
        tutor_id: body.tutor_id.clone(),
        scheduled_start: bson::DateTime::from_chrono(body.scheduled_start),
        duration_minutes: body.duration_minutes,
        status: BookingStatus::Pending,
        price_minor: session_price_minor(tutor.hourly_rate_minor, body.duration_minutes),
    };
    let price_minor = booking.price_minor;

    match bookings.insert_one(booking).await {
        Ok(id) => {
            info!(
                learner_id = %claims.sub,
                tutor_id = %body.tutor_id,
                booking_id = %id.to_hex(),
                "Booking created"
            );
            json_response(
                StatusCode::CREATED,
                &BookingResponse {
                    id: id.to_hex(),
                    tutor_id: body.tutor_id,
                    learner_id: claims.sub,
                    scheduled_start: body.scheduled_start,
                    duration_minutes: body.duration_minutes,
                    status: BookingStatus::Pending.to_string(),
                    price_minor,
                },
            )
        }
        Err(e) => error_response(&e),
    }
}

/// Shared lookup for cancel/confirm
async fn load_booking(
    mongo: &MongoClient,
    booking_id: &str,
) -> Result<(ObjectId, BookingDoc), KalikeError> {
    let oid = ObjectId::parse_str(booking_id)
        .map_err(|_| KalikeError::Validation(format!("Invalid booking id: {}", booking_id)))?;

    let bookings = mongo.collection::<BookingDoc>(BOOKING_COLLECTION).await?;
    let booking = bookings
        .find_one(doc! { "_id": oid })
        .await?
        .ok_or_else(|| KalikeError::NotFound(format!("Booking not found: {}", booking_id)))?;

    Ok((oid, booking))
}

async fn transition_booking(
    mongo: &MongoClient,
    oid: ObjectId,
    status: BookingStatus,
) -> Result<Option<BookingDoc>, KalikeError> {
    let bookings = mongo.collection::<BookingDoc>(BOOKING_COLLECTION).await?;
    bookings
        .find_one_and_update(
            doc! { "_id": oid },
            doc! { "$set": {
                "status": status.to_string(),
                "metadata.updated_at": bson::DateTime::now(),
            }},
        )
        .await
}

/// POST /api/bookings/{id}/cancel
async fn handle_cancel_booking(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    booking_id: String,
) -> Response<BoxBody> {
    let claims = match require_claims(&state.args, &req) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let Some(mongo) = &state.mongo else {
        return error_response(&KalikeError::Database("Database unavailable".into()));
    };

    let (oid, booking) = match load_booking(mongo, &booking_id).await {
        Ok(v) => v,
        Err(e) => return error_response(&e),
    };

    if let Err(e) = authorize_booking_change(mongo, &claims, &booking).await {
        return error_response(&e);
    }

    if !booking.occupies_slot() {
        return error_response(&KalikeError::Conflict(format!(
            "Booking is already {}",
            booking.status
        )));
    }

    match transition_booking(mongo, oid, BookingStatus::Cancelled).await {
        Ok(Some(_)) => {
            info!(booking_id = %booking_id, "Booking cancelled");
            json_response(
                StatusCode::OK,
                &SuccessResponse {
                    success: true,
                    message: "Booking cancelled".into(),
                },
            )
        }
        Ok(None) => error_response(&KalikeError::NotFound(format!(
            "Booking not found: {}",
            booking_id
        ))),
        Err(e) => error_response(&e),
    }
}

/// POST /api/bookings/{id}/confirm
async fn handle_confirm_booking(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    booking_id: String,
) -> Response<BoxBody> {
    let claims = match require_permission(&state.args, &req, "confirm_booking") {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    let Some(mongo) = &state.mongo else {
        return error_response(&KalikeError::Database("Database unavailable".into()));
    };

    let (oid, booking) = match load_booking(mongo, &booking_id).await {
        Ok(v) => v,
        Err(e) => return error_response(&e),
    };

    // Tutors may only confirm bookings against their own profile
    if claims.permission_level < PermissionLevel::Admin {
        match tutor_profile_id(mongo, &claims.sub).await {
            Ok(Some(id)) if id == booking.tutor_id => {}
            Ok(_) => {
                return error_response(&KalikeError::Auth(
                    "Booking belongs to another tutor".into(),
                ))
            }
            Err(e) => return error_response(&e),
        }
    }

    if booking.status != BookingStatus::Pending {
        return error_response(&KalikeError::Conflict(format!(
            "Only pending bookings can be confirmed, this one is {}",
            booking.status
        )));
    }

    match transition_booking(mongo, oid, BookingStatus::Confirmed).await {
        Ok(Some(updated)) => match BookingResponse::from_doc(updated) {
            Some(body) => {
                info!(booking_id = %booking_id, "Booking confirmed");
                json_response(StatusCode::OK, &body)
            }
            None => error_response(&KalikeError::Database("Booking missing _id".into())),
        },
        Ok(None) => error_response(&KalikeError::NotFound(format!(
            "Booking not found: {}",
            booking_id
        ))),
        Err(e) => error_response(&e),
    }
}

/// Learner who made the booking, the booked tutor, or an admin
async fn authorize_booking_change(
    mongo: &MongoClient,
    claims: &Claims,
    booking: &BookingDoc,
) -> Result<(), KalikeError> {
    if booking.learner_id == claims.sub || claims.permission_level >= PermissionLevel::Admin {
        return Ok(());
    }
    if let Some(tutor_id) = tutor_profile_id(mongo, &claims.sub).await? {
        if tutor_id == booking.tutor_id {
            return Ok(());
        }
    }
    Err(KalikeError::Auth("Not your booking".into()))
}

/// Handle tutor and booking requests.
///
/// Returns Some(response) if the request was handled, None otherwise.
pub async fn handle_tutor_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method();

    let booking_action = path
        .strip_prefix("/api/bookings/")
        .and_then(|rest| rest.split_once('/'))
        .filter(|(id, action)| {
            !id.is_empty() && matches!(*action, "cancel" | "confirm")
        })
        .map(|(id, action)| (id.to_string(), action.to_string()));

    let is_tutor_route = path == "/api/tutors"
        || path == "/admin/tutors"
        || path == "/api/bookings"
        || booking_action.is_some();
    if !is_tutor_route {
        return None;
    }

    if method == Method::OPTIONS {
        return Some(cors_preflight());
    }

    let response = match method {
        &Method::GET if path == "/api/tutors" => handle_list_tutors(state).await,
        &Method::POST if path == "/admin/tutors" => handle_create_tutor(req, state).await,
        &Method::GET if path == "/api/bookings" => handle_list_bookings(req, state).await,
        &Method::POST if path == "/api/bookings" => handle_create_booking(req, state).await,
        &Method::POST if booking_action.is_some() => {
            let (id, action) = booking_action.unwrap();
            if action == "cancel" {
                handle_cancel_booking(req, state, id).await
            } else {
                handle_confirm_booking(req, state, id).await
            }
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

    fn t(hour: u32) -> DateTime<Utc> {
        use chrono::TimeZone;
        Utc.with_ymd_and_hms(2026, 9, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_overlap_detection() {
        // Same slot
        assert!(overlaps(t(10), 60, t(10), 60));
        // Partial overlap
        assert!(overlaps(t(10), 60, t(10) + Duration::minutes(30), 60));
        // Back to back is allowed
        assert!(!overlaps(t(10), 60, t(11), 60));
        // Disjoint
        assert!(!overlaps(t(10), 60, t(14), 60));
        // Contained
        assert!(overlaps(t(10), 120, t(10) + Duration::minutes(30), 30));
    }

    #[test]
    fn test_session_price() {
        assert_eq!(session_price_minor(60000, 60), 60000);
        assert_eq!(session_price_minor(60000, 30), 30000);
        assert_eq!(session_price_minor(50000, 45), 37500);
    }
}
