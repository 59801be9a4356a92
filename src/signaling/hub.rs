use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::protocol::ClientMessage;
use super::registry::{ConnectionHandle, SessionRegistry};
use super::router::SignalRouter;
use crate::error::WebSocketError;
use crate::websocket::Outbox;

#[derive(Debug)]
pub enum HubEvent {
    Connect { handle: ConnectionHandle, outbox: Outbox },
    Inbound { handle: ConnectionHandle, message: ClientMessage },
    Disconnect { handle: ConnectionHandle },
    Stats { reply: oneshot::Sender<HubStats> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub connections: usize,
    pub sessions: usize,
    pub ready_sessions: usize,
}

/// Cloneable sender side used by connection tasks and HTTP handlers.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubEvent>,
}

impl HubHandle {
    pub fn connect(&self, handle: ConnectionHandle, outbox: Outbox) -> Result<(), WebSocketError> {
        self.submit(HubEvent::Connect { handle, outbox })
    }

    pub fn dispatch(&self, handle: ConnectionHandle, message: ClientMessage) -> Result<(), WebSocketError> {
        self.submit(HubEvent::Inbound { handle, message })
    }

    pub fn disconnect(&self, handle: ConnectionHandle) -> Result<(), WebSocketError> {
        self.submit(HubEvent::Disconnect { handle })
    }

    pub async fn stats(&self) -> Result<HubStats, WebSocketError> {
        let (reply, rx) = oneshot::channel();
        self.submit(HubEvent::Stats { reply })?;
        rx.await.map_err(|_| WebSocketError::HubUnavailable)
    }

    fn submit(&self, event: HubEvent) -> Result<(), WebSocketError> {
        self.tx.send(event).map_err(|_| WebSocketError::HubUnavailable)
    }
}

/// Single consumer of every signaling event.
///
/// Events from all connections funnel through one channel and are applied
/// one after another, so the router and registry are never shared.
pub struct SignalingHub {
    router: SignalRouter,
    rx: mpsc::UnboundedReceiver<HubEvent>,
}

impl SignalingHub {
    pub fn new(registry: SessionRegistry) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = Self {
            router: SignalRouter::new(registry),
            rx,
        };
        (hub, HubHandle { tx })
    }

    pub fn spawn(registry: SessionRegistry) -> (HubHandle, JoinHandle<()>) {
        let (hub, handle) = Self::new(registry);
        let task = tokio::spawn(hub.run());
        (handle, task)
    }

    /// Runs until every `HubHandle` has been dropped.
    pub async fn run(mut self) {
        info!("Signaling hub started");
        while let Some(event) = self.rx.recv().await {
            self.handle_event(event);
        }
        info!("Signaling hub stopped");
    }

    fn handle_event(&mut self, event: HubEvent) {
        match event {
            HubEvent::Connect { handle, outbox } => self.router.connect(handle, outbox),
            HubEvent::Inbound { handle, message } => self.router.dispatch(handle, message),
            HubEvent::Disconnect { handle } => self.router.disconnect(handle),
            HubEvent::Stats { reply } => {
                let stats = HubStats {
                    connections: self.router.connection_count(),
                    sessions: self.router.registry().session_count(),
                    ready_sessions: self.router.registry().ready_count(),
                };
                if reply.send(stats).is_err() {
                    debug!("Stats requester went away");
                }
            }
        }
    }
}
