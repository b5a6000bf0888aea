//! Chat history route
//!
//! - GET /api/chat/history?room=<room>&limit=<n>
//!
//! The live stream is the WebSocket at /api/chat/ws; this endpoint backfills
//! recent messages when a client joins.

use bson::doc;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::chat::DEFAULT_ROOM;
use crate::db::schemas::{ChatMessageDoc, CHAT_MESSAGE_COLLECTION};
use crate::routes::helpers::{
    cors_preflight, error_response, json_response, query_param, require_claims, BoxBody,
    ErrorResponse,
};
use crate::server::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryMessage {
    pub room: String,
    pub sender_id: String,
    pub display_name: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// GET /api/chat/history
async fn handle_history(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    if let Err(e) = require_claims(&state.args, &req) {
        return error_response(&e);
    }

    let query = req.uri().query();
    let room = query_param(query, "room").unwrap_or_else(|| DEFAULT_ROOM.to_string());
    let limit = query_param(query, "limit")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(DEFAULT_LIMIT)
        .clamp(1, MAX_LIMIT);

    let Some(mongo) = &state.mongo else {
        return json_response(StatusCode::OK, &Vec::<ChatHistoryMessage>::new());
    };

    let messages = match mongo
        .collection::<ChatMessageDoc>(CHAT_MESSAGE_COLLECTION)
        .await
    {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match messages
        .find_many_sorted(
            doc! { "room": &room },
            Some(doc! { "metadata.created_at": -1 }),
            Some(limit),
        )
        .await
    {
        Ok(docs) => {
            // Fetched newest-first, returned oldest-first
            let mut body: Vec<ChatHistoryMessage> = docs
                .into_iter()
                .map(|d| ChatHistoryMessage {
                    room: d.room,
                    sender_id: d.sender_id,
                    display_name: d.display_name,
                    body: d.body,
                    sent_at: d.metadata.created_at.map(|t| t.to_chrono()),
                })
                .collect();
            body.reverse();
            json_response(StatusCode::OK, &body)
        }
        Err(e) => error_response(&e),
    }
}

/// Handle chat HTTP requests (the WebSocket upgrade is handled separately).
///
/// Returns Some(response) if the request was handled, None otherwise.
pub async fn handle_chat_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method();

    if path != "/api/chat/history" {
        return None;
    }

    if method == Method::OPTIONS {
        return Some(cors_preflight());
    }

    let response = match method {
        &Method::GET => handle_history(req, state).await,
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
