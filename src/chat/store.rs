//! Chat connection store
//!
//! Manages active WebSocket connections indexed by connection id, grouped by
//! room. Provides thread-safe fan-out for room broadcasts.

use dashmap::DashMap;
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use hyper_tungstenite::WebSocketStream;
use hyper_util::rt::TokioIo;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// Type alias for the WebSocket write half
pub type WsSink =
    Arc<Mutex<SplitSink<WebSocketStream<TokioIo<hyper::upgrade::Upgraded>>, Message>>>;

/// Connection entry in the store
struct ClientEntry {
    write: WsSink,
    /// Room this client joined
    room: String,
    /// Display name shown in membership notices
    display_name: String,
}

/// Room-aware chat connection store
pub struct ChatRoomStore {
    /// Active connections indexed by connection id
    clients: DashMap<String, ClientEntry>,
    /// Current connection count
    count: AtomicUsize,
    /// Maximum allowed connections
    max_clients: usize,
}

impl ChatRoomStore {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: DashMap::with_capacity(max_clients),
            count: AtomicUsize::new(0),
            max_clients,
        }
    }

    pub fn is_at_capacity(&self) -> bool {
        self.count.load(Ordering::Relaxed) >= self.max_clients
    }

    pub fn client_count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Register a connection. A reconnect with the same id replaces the
    /// previous entry without inflating the count.
    pub fn join(&self, conn_id: String, room: String, display_name: String, write: WsSink) {
        let entry = ClientEntry {
            write,
            room: room.clone(),
            display_name,
        };

        let was_present = self.clients.insert(conn_id.clone(), entry).is_some();
        if !was_present {
            self.count.fetch_add(1, Ordering::Relaxed);
        }

        debug!(
            conn_id = %conn_id,
            room = %room,
            count = self.count.load(Ordering::Relaxed),
            "Chat store: client joined"
        );
    }

    /// Remove a connection, returning its display name when it was present
    pub fn leave(&self, conn_id: &str) -> Option<(String, String)> {
        let removed = self.clients.remove(conn_id);
        if let Some((_, entry)) = removed {
            self.count.fetch_sub(1, Ordering::Relaxed);
            debug!(
                conn_id = %conn_id,
                count = self.count.load(Ordering::Relaxed),
                "Chat store: client left"
            );
            Some((entry.room, entry.display_name))
        } else {
            None
        }
    }

    pub fn contains(&self, conn_id: &str) -> bool {
        self.clients.contains_key(conn_id)
    }

    /// Send a text frame to every connection in the room.
    ///
    /// Sinks are collected before any await so map shards are never held
    /// across a send. Clients whose sink errors are dropped from the store.
    pub async fn broadcast(&self, room: &str, text: String) {
        let targets: Vec<(String, WsSink)> = self
            .clients
            .iter()
            .filter(|entry| entry.value().room == room)
            .map(|entry| (entry.key().clone(), Arc::clone(&entry.value().write)))
            .collect();

        for (conn_id, sink) in targets {
            let mut write = sink.lock().await;
            if let Err(e) = write.send(Message::text(text.clone())).await {
                warn!(conn_id = %conn_id, error = %e, "Chat broadcast send failed, dropping client");
                drop(write);
                self.leave(&conn_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_capacity() {
        let store = ChatRoomStore::new(2);

        assert!(!store.is_at_capacity());
        assert_eq!(store.client_count(), 0);
    }

    #[test]
    fn test_store_contains() {
        let store = ChatRoomStore::new(10);

        assert!(!store.contains("c1"));
        assert!(store.leave("c1").is_none());
    }
}
