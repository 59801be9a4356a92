use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use crate::config::{CorsConfig, Settings, WebSocketConfig};
use crate::error::WebSocketError;
use crate::signaling::HubHandle;
use crate::websocket::Connection;

/// How long a closing connection may spend flushing its queued frames.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

pub struct WebSocketServer {
    hub: HubHandle,
    websocket: WebSocketConfig,
    cors: CorsConfig,
}

impl WebSocketServer {
    pub fn new(hub: HubHandle, settings: &Settings) -> Self {
        Self {
            hub,
            websocket: settings.websocket.clone(),
            cors: settings.cors.clone(),
        }
    }

    /// Accept loop; every connection is served on its own task.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        match listener.local_addr() {
            Ok(addr) => info!("Signaling server accepting connections at ws://{}", addr),
            Err(e) => warn!("Signaling listener has no local address: {}", e),
        }

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let server = self.clone();
                    tokio::spawn(async move {
                        server.handle_connection(stream, addr).await;
                    });
                }
                Err(e) => error!("Failed to accept connection: {}", e),
            }
        }
    }

    pub async fn handle_connection(self: Arc<Self>, raw_stream: TcpStream, addr: SocketAddr) {
        info!("New WebSocket connection from: {}", addr);

        let cors = &self.cors;
        let check_origin = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let origin = req.headers().get("origin").and_then(|v| v.to_str().ok());
            if cors.allows_origin(origin) {
                Ok(response)
            } else {
                warn!("Rejected WebSocket upgrade from {} with origin {:?}", addr, origin);
                let mut rejection = ErrorResponse::new(Some("Origin not allowed".to_string()));
                *rejection.status_mut() = StatusCode::FORBIDDEN;
                Err(rejection)
            }
        };

        let ws_stream = match tokio_tungstenite::accept_hdr_async(raw_stream, check_origin).await {
            Ok(ws) => ws,
            Err(e) => {
                error!("Error during WebSocket handshake: {}", e);
                return;
            }
        };

        let (ws_sink, ws_stream) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut connection = Connection::new(tx, self.hub.clone());
        let handle = connection.handle();
        if let Err(e) = connection.attach() {
            error!("Could not register connection {}: {}", handle, e);
            return;
        }

        let mut heartbeat = connection.start_heartbeat(
            self.websocket.heartbeat_interval(),
            self.websocket.heartbeat_timeout(),
        );

        // Forward messages from rx to WebSocket
        let mut send_task = tokio::spawn(async move {
            if let Err(e) = write_frames(ws_sink, rx).await {
                debug!("Writer for connection {} stopped: {}", handle, e);
            }
        });

        let mut receive_task = tokio::spawn(async move {
            let mut ws_stream = ws_stream;

            while let Some(message) = ws_stream.next().await {
                match message {
                    Ok(msg) => {
                        if let Err(e) = connection.handle_message(msg).await {
                            info!("Stopped reading connection {}: {}", handle, e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error receiving WebSocket message: {}", e);
                        break;
                    }
                }
            }
        });

        let writer_done = tokio::select! {
            _ = &mut send_task => {
                info!("Send task completed for connection {}", handle);
                true
            }
            _ = &mut receive_task => {
                info!("Receive task completed for connection {}", handle);
                false
            }
            _ = &mut heartbeat => {
                info!("Heartbeat ended for connection {}", handle);
                false
            }
        };

        receive_task.abort();
        heartbeat.abort();

        if let Err(e) = self.hub.disconnect(handle) {
            error!("Failed to report disconnect of {}: {}", handle, e);
        }

        // With the hub's outbox released the writer drains what is queued,
        // including the reply to a client close, then closes the sink.
        if !writer_done && timeout(CLOSE_GRACE, &mut send_task).await.is_err() {
            warn!("Writer for connection {} did not finish in time", handle);
            send_task.abort();
        }
        info!("Connection {} closed", handle);
    }
}

/// Writes queued frames until every sender is gone, then closes the sink.
async fn write_frames(
    mut ws_sink: WsSink,
    mut rx: mpsc::UnboundedReceiver<Message>,
) -> Result<(), WebSocketError> {
    while let Some(message) = rx.recv().await {
        ws_sink.send(message).await?;
    }
    ws_sink.close().await?;
    Ok(())
}
