use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info};

use crate::error::WebSocketError;
use crate::signaling::{ConnectionHandle, ServerMessage};

pub type Outbox = mpsc::UnboundedSender<Message>;

/// Outbound side of every live connection, keyed by handle.
///
/// Owned by the signaling hub's event loop; sending only enqueues onto the
/// connection's writer task and never waits on the socket.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    connections: HashMap<ConnectionHandle, Outbox>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, handle: ConnectionHandle, sender: Outbox) {
        self.connections.insert(handle, sender);
        info!("Added connection {} to pool", handle);
    }

    pub fn remove(&mut self, handle: &ConnectionHandle) -> bool {
        let removed = self.connections.remove(handle).is_some();
        if removed {
            info!("Removed connection {} from pool", handle);
        }
        removed
    }

    pub fn send_to(&self, handle: &ConnectionHandle, msg: &ServerMessage) -> Result<(), WebSocketError> {
        let sender = self
            .connections
            .get(handle)
            .ok_or_else(|| WebSocketError::SendError(format!("Connection {} not found", handle)))?;
        let text = serde_json::to_string(msg)?;
        sender
            .send(Message::Text(text))
            .map_err(|e| WebSocketError::SendError(format!("Failed to send message: {}", e)))
    }

    /// Best effort: recipients that are gone are logged and skipped.
    pub fn send_to_many(&self, handles: &[ConnectionHandle], msg: &ServerMessage) {
        let text = match serde_json::to_string(msg) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize server message: {}", e);
                return;
            }
        };

        for handle in handles {
            match self.connections.get(handle) {
                Some(sender) => {
                    if let Err(e) = sender.send(Message::Text(text.clone())) {
                        error!("Failed to send to connection {}: {}", handle, e);
                    }
                }
                None => debug!("Skipping unknown connection {}", handle),
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
