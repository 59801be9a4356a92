use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::pool::Outbox;
use crate::error::WebSocketError;
use crate::signaling::{ClientMessage, ConnectionHandle, HubHandle, ServerMessage};

/// Inbound side of one WebSocket connection.
///
/// Decodes frames into `ClientMessage`s for the hub and keeps the heartbeat
/// clock. Malformed frames are answered here and never reach the hub.
pub struct Connection {
    handle: ConnectionHandle,
    hub: HubHandle,
    tx: Outbox,
    last_heartbeat: Arc<RwLock<Instant>>,
}

impl Connection {
    pub fn new(tx: Outbox, hub: HubHandle) -> Self {
        Self {
            handle: ConnectionHandle::new(),
            hub,
            tx,
            last_heartbeat: Arc::new(RwLock::new(Instant::now())),
        }
    }

    /// Announces the connection to the hub, which greets it with its handle.
    pub fn attach(&self) -> Result<(), WebSocketError> {
        self.hub.connect(self.handle, self.tx.clone())
    }

    pub async fn handle_message(&mut self, msg: Message) -> Result<(), WebSocketError> {
        *self.last_heartbeat.write().await = Instant::now();

        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    debug!("Connection {} sent {:?}", self.handle, client_msg);
                    self.hub.dispatch(self.handle, client_msg)?;
                }
                Err(e) => {
                    warn!("Rejected malformed message on connection {}: {}", self.handle, e);
                    self.send_error(&format!("Invalid message format: {}", e))?;
                }
            },
            Message::Binary(bin) => {
                warn!("Received binary message on connection {} of {} bytes", self.handle, bin.len());
                self.send_error("Binary messages are not supported")?;
            }
            Message::Close(reason) => {
                info!("Client initiated close for connection {}: {:?}", self.handle, reason);
                return Err(WebSocketError::ConnectionError("Connection closed by client".to_string()));
            }
            // Pings are answered by tungstenite itself; pongs only refresh the clock.
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
        Ok(())
    }

    fn send_error(&self, message: &str) -> Result<(), WebSocketError> {
        let text = serde_json::to_string(&ServerMessage::Error { message: message.to_string() })?;
        self.tx
            .send(Message::Text(text))
            .map_err(|e| WebSocketError::SendError(format!("Failed to send message: {}", e)))
    }

    /// Pings every `interval`; the returned task finishes once the peer has
    /// been silent for longer than `timeout` or the writer is gone.
    pub fn start_heartbeat(&self, interval: Duration, timeout: Duration) -> JoinHandle<()> {
        let last_heartbeat = self.last_heartbeat.clone();
        let tx = self.tx.clone();
        let handle = self.handle;

        tokio::spawn(async move {
            loop {
                sleep(interval).await;

                let elapsed = Instant::now().duration_since(*last_heartbeat.read().await);
                if elapsed > timeout {
                    warn!("Heartbeat timeout for connection {}", handle);
                    break;
                }

                if let Err(e) = tx.send(Message::Ping(Vec::new())) {
                    error!("Failed to send heartbeat for connection {}: {}", handle, e);
                    break;
                }
            }
        })
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }
}
