//! Chat WebSocket upgrade and session handling
//!
//! Auth comes from a `token` query parameter since browsers cannot set
//! headers on WebSocket requests. The optional `room` parameter selects the
//! chat room, defaulting to the general room.

use bytes::Bytes;
use futures_util::StreamExt;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::Claims;
use crate::chat::{sanitize_body, ChatEvent, DEFAULT_ROOM};
use crate::db::schemas::{ChatMessageDoc, CHAT_MESSAGE_COLLECTION};
use crate::routes::helpers::{jwt_validator, query_param, BoxBody};
use crate::server::http::AppState;

fn reject(status: StatusCode, message: &str) -> Response<BoxBody> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(
            Full::new(Bytes::from(format!(r#"{{"error":"{message}"}}"#)))
                .map_err(|never| match never {})
                .boxed(),
        )
        .unwrap()
}

/// Handle WebSocket upgrade for the chat endpoint
pub async fn handle_chat_upgrade(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Response<BoxBody> {
    let query = req.uri().query().map(|q| q.to_string());
    let room = query_param(query.as_deref(), "room").unwrap_or_else(|| DEFAULT_ROOM.to_string());

    let claims = match authenticate(&state, query.as_deref()) {
        Some(c) => c,
        None => {
            warn!("Chat WebSocket auth failed");
            return reject(StatusCode::UNAUTHORIZED, "Authentication required");
        }
    };

    if state.chat.is_at_capacity() {
        warn!("Chat WebSocket rejected: at capacity");
        return reject(StatusCode::SERVICE_UNAVAILABLE, "Chat is at capacity");
    }

    info!(
        user_id = %claims.sub,
        room = %room,
        "Chat WebSocket upgrade request"
    );

    match hyper_tungstenite::upgrade(req, None) {
        Ok((response, websocket)) => {
            let session_state = Arc::clone(&state);
            tokio::spawn(async move {
                match websocket.await {
                    Ok(ws) => {
                        run_session(session_state, ws, claims, room).await;
                    }
                    Err(e) => {
                        error!("WebSocket upgrade failed: {:?}", e);
                    }
                }
            });

            let (parts, _) = response.into_parts();
            Response::from_parts(
                parts,
                Full::new(Bytes::new())
                    .map_err(|never| match never {})
                    .boxed(),
            )
        }
        Err(e) => {
            error!("WebSocket upgrade error: {:?}", e);
            reject(StatusCode::BAD_REQUEST, "WebSocket upgrade failed")
        }
    }
}

fn authenticate(state: &AppState, query: Option<&str>) -> Option<Claims> {
    let token = query_param(query, "token")?;
    let validator = jwt_validator(&state.args)?;
    validator.verify_token(&token).ok()
}

async fn run_session(
    state: Arc<AppState>,
    ws: hyper_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>,
    claims: Claims,
    room: String,
) {
    let (write, mut read) = ws.split();
    let write = Arc::new(Mutex::new(write));
    let conn_id = Uuid::new_v4().to_string();

    state.chat.join(
        conn_id.clone(),
        room.clone(),
        claims.display_name.clone(),
        write,
    );

    announce(
        &state,
        &room,
        &ChatEvent::Joined {
            room: room.clone(),
            display_name: claims.display_name.clone(),
        },
    )
    .await;

    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_inbound(&state, &claims, &room, text.as_ref()).await;
            }
            Ok(Message::Close(_)) => {
                debug!(conn_id = %conn_id, "Chat client sent close");
                break;
            }
            Ok(_) => {
                // Binary, ping and pong frames are ignored
            }
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "Chat read error");
                break;
            }
        }
    }

    if state.chat.leave(&conn_id).is_some() {
        announce(
            &state,
            &room,
            &ChatEvent::Left {
                room: room.clone(),
                display_name: claims.display_name.clone(),
            },
        )
        .await;
    }

    info!(user_id = %claims.sub, room = %room, "Chat session ended");
}

async fn handle_inbound(state: &AppState, claims: &Claims, room: &str, text: &str) {
    // Clients send either a message event or a bare body string
    let body = match serde_json::from_str::<ChatEvent>(text) {
        Ok(ChatEvent::Message { body, .. }) => body,
        Ok(_) => return, // membership notices are server-emitted only
        Err(_) => text.to_string(),
    };

    let Some(body) = sanitize_body(&body) else {
        return;
    };

    let event = ChatEvent::Message {
        room: room.to_string(),
        sender_id: claims.sub.clone(),
        display_name: claims.display_name.clone(),
        body: body.clone(),
        sent_at: chrono::Utc::now(),
    };

    persist_message(state, claims, room, &body).await;
    announce(state, room, &event).await;
}

async fn persist_message(state: &AppState, claims: &Claims, room: &str, body: &str) {
    let Some(mongo) = &state.mongo else {
        return;
    };

    let doc = ChatMessageDoc {
        _id: None,
        metadata: Default::default(),
        room: room.to_string(),
        sender_id: claims.sub.clone(),
        display_name: claims.display_name.clone(),
        body: body.to_string(),
    };

    match mongo
        .collection::<ChatMessageDoc>(CHAT_MESSAGE_COLLECTION)
        .await
    {
        Ok(messages) => {
            if let Err(e) = messages.insert_one(doc).await {
                warn!(error = %e, "Failed to persist chat message");
            }
        }
        Err(e) => warn!(error = %e, "Failed to open chat collection"),
    }
}

async fn announce(state: &AppState, room: &str, event: &ChatEvent) {
    match serde_json::to_string(event) {
        Ok(text) => state.chat.broadcast(room, text).await,
        Err(e) => warn!(error = %e, "Failed to serialize chat event"),
    }
}
