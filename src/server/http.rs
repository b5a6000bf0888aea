//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one spawned task per connection. Route
//! dispatch is by path shape; handlers own the request so the dispatcher
//! picks exactly one.

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::chat::ChatRoomStore;
use crate::config::Args;
use crate::db::MongoClient;
use crate::llm::{ModelClient, ModelClientConfig};
use crate::progress::{MemoryProgressStore, MongoProgressStore, ProgressService, ProgressStore};
use crate::routes;
use crate::routes::helpers::{cors_preflight, json_response, BoxBody, ErrorResponse};
use crate::server::websocket;
use crate::types::{KalikeError, Result};

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub mongo: Option<MongoClient>,
    /// Progress unit of work, backed by MongoDB or memory (dev mode)
    pub progress: Arc<ProgressService>,
    /// Active chat connections
    pub chat: Arc<ChatRoomStore>,
    /// Grading model client, None when no API key is configured
    pub model: Option<Arc<ModelClient>>,
}

impl AppState {
    pub async fn new(args: Args, mongo: Option<MongoClient>) -> Result<Self> {
        let store: Arc<dyn ProgressStore> = match &mongo {
            Some(client) => Arc::new(MongoProgressStore::new(client).await?),
            None => {
                if !args.dev_mode {
                    return Err(KalikeError::Config(
                        "MongoDB is required outside dev mode".into(),
                    ));
                }
                Arc::new(MemoryProgressStore::new())
            }
        };

        let model = args.model_api_key.as_ref().map(|key| {
            Arc::new(ModelClient::new(ModelClientConfig {
                api_url: args.model_api_url.clone(),
                api_key: Some(key.clone()),
                model: args.model_name.clone(),
                timeout: Duration::from_millis(args.model_timeout_ms),
            }))
        });

        let chat = Arc::new(ChatRoomStore::new(args.chat_max_clients));

        Ok(Self {
            args,
            mongo,
            progress: Arc::new(ProgressService::new(store)),
            chat,
            model,
        })
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Kalike listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - relaxed authentication, optional MongoDB");
    }
    if state.model.is_none() {
        warn!("No grading model configured - writing and speaking submissions are accepted ungraded");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .with_upgrades()
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    // Probes and version, no body to consume
    match (&method, path.as_str()) {
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => {
            return Ok(routes::health_check(state));
        }
        (&Method::GET, "/ready") | (&Method::GET, "/readyz") => {
            return Ok(routes::readiness_check(state));
        }
        (&Method::GET, "/version") => {
            return Ok(routes::version_info());
        }
        _ => {}
    }

    // Chat WebSocket upgrade
    if path == "/api/chat/ws" {
        if method == Method::GET && hyper_tungstenite::is_upgrade_request(&req) {
            return Ok(websocket::handle_chat_upgrade(state, req).await);
        }
        return Ok(json_response(
            StatusCode::BAD_REQUEST,
            &ErrorResponse {
                error: "Chat endpoint requires a WebSocket upgrade".into(),
                code: None,
            },
        ));
    }

    if method == Method::OPTIONS {
        return Ok(cors_preflight());
    }

    // Body-consuming handlers, selected by path shape
    let response = if path.starts_with("/auth") {
        routes::handle_auth_request(req, state).await
    } else if is_exercise_path(&path) {
        routes::handle_exercise_request(req, state).await
    } else if path == "/api/lessons"
        || path.starts_with("/api/lessons/")
        || path == "/admin/lessons"
        || path.starts_with("/admin/lessons/")
    {
        routes::handle_lesson_request(req, state).await
    } else if path.starts_with("/api/progress") {
        routes::handle_progress_request(req, state).await
    } else if path == "/api/chat/history" {
        routes::handle_chat_request(req, state).await
    } else if path == "/api/tutors"
        || path == "/admin/tutors"
        || path == "/api/bookings"
        || path.starts_with("/api/bookings/")
    {
        routes::handle_tutor_request(req, state).await
    } else if path.starts_with("/api/billing") || path == "/webhooks/payment" {
        routes::handle_billing_request(req, state).await
    } else {
        None
    };

    match response {
        Some(response) => Ok(response),
        None => Ok(json_response(
            StatusCode::NOT_FOUND,
            &ErrorResponse {
                error: format!("Not found: {}", path),
                code: Some("NOT_FOUND".into()),
            },
        )),
    }
}

fn is_exercise_path(path: &str) -> bool {
    path == "/admin/exercises"
        || path.starts_with("/api/exercises/")
        || (path.starts_with("/api/lessons/") && path.ends_with("/exercises"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exercise_path_shapes() {
        assert!(is_exercise_path("/admin/exercises"));
        assert!(is_exercise_path("/api/exercises/abc/submit"));
        assert!(is_exercise_path("/api/lessons/greetings/exercises"));
        assert!(!is_exercise_path("/api/lessons/greetings"));
        assert!(!is_exercise_path("/api/lessons"));
    }
}
