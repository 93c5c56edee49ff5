//! HMR websocket transport.
//!
//! Clients connect to `/__hmr`; the server pushes JSON messages and never
//! expects anything back (pings are handled by the transport). The
//! broadcaster tracks connected clients and prunes the ones whose channel
//! has gone away.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use rustc_hash::FxHashMap;

use crate::context::ServerContext;
use crate::hmr::HmrMessage;
use crate::server::AppState;

/// Fan-out of HMR messages to connected browser clients.
#[derive(Default)]
pub struct HmrBroadcaster {
    clients: Mutex<FxHashMap<usize, mpsc::UnboundedSender<String>>>,
    next_id: AtomicUsize,
}

impl HmrBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client; returns its id and the message stream.
    pub fn register(&self) -> (usize, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.lock().insert(id, tx);
        (id, rx)
    }

    pub fn unregister(&self, id: usize) {
        self.clients.lock().remove(&id);
    }

    /// Serialize and send a message to every connected client. Clients
    /// whose channel is closed are dropped from the registry.
    pub fn send(&self, message: &HmrMessage) {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(err) => {
                tracing::error!("failed to serialize HMR message: {err}");
                return;
            }
        };

        let mut clients = self.clients.lock();
        let mut dead: Vec<usize> = Vec::new();
        for (id, tx) in clients.iter() {
            if tx.send(json.clone()).is_err() {
                dead.push(*id);
            }
        }
        for id in dead {
            clients.remove(&id);
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }
}

/// Upgrade handler for the HMR endpoint.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State((ctx, _)): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, ctx))
}

async fn client_session(mut socket: WebSocket, ctx: Arc<ServerContext>) {
    let (id, mut rx) = ctx.hmr.register();
    tracing::debug!("hmr client {id} connected");

    let hello = serde_json::to_string(&HmrMessage::Connected).unwrap_or_default();
    if socket.send(Message::Text(hello.into())).await.is_err() {
        ctx.hmr.unregister(id);
        return;
    }

    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                match outgoing {
                    Some(json) => {
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Browsers send nothing we act on; pings are answered
                    // by the transport.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    ctx.hmr.unregister(id);
    tracing::debug!("hmr client {id} disconnected");
}
