use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::protocol::{ClientMessage, MemberRole, ServerMessage};
use super::registry::{ConnectionHandle, Role, SessionId, SessionRegistry};
use crate::websocket::{ConnectionPool, Outbox};

/// Where a live connection currently stands. A closed connection has no
/// state at all: its handle is purged from the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Unjoined,
    Joined { session_id: SessionId, role: Role },
    Observing { session_id: SessionId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    fn message(self, sender_handle: ConnectionHandle, payload: Value) -> ServerMessage {
        match self {
            SignalKind::Offer => ServerMessage::Offer { sender_handle, sdp: payload },
            SignalKind::Answer => ServerMessage::Answer { sender_handle, sdp: payload },
            SignalKind::IceCandidate => ServerMessage::IceCandidate { sender_handle, candidate: payload },
        }
    }
}

/// Turns inbound events into registry updates and outbound messages.
///
/// Every method runs to completion synchronously; the caller guarantees
/// events are fed one at a time.
#[derive(Debug)]
pub struct SignalRouter {
    registry: SessionRegistry,
    pool: ConnectionPool,
    connections: HashMap<ConnectionHandle, ConnectionState>,
}

impl SignalRouter {
    pub fn new(registry: SessionRegistry) -> Self {
        Self {
            registry,
            pool: ConnectionPool::new(),
            connections: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn state(&self, handle: &ConnectionHandle) -> Option<&ConnectionState> {
        self.connections.get(handle)
    }

    /// Live connections, counted by the outboxes still registered.
    pub fn connection_count(&self) -> usize {
        self.pool.connection_count()
    }

    pub fn connect(&mut self, handle: ConnectionHandle, outbox: Outbox) {
        self.pool.add(handle, outbox);
        self.connections.insert(handle, ConnectionState::Unjoined);
        self.send(handle, ServerMessage::Connected { handle });
    }

    pub fn dispatch(&mut self, from: ConnectionHandle, msg: ClientMessage) {
        if !self.connections.contains_key(&from) {
            warn!("Dropping event from closed connection {}", from);
            return;
        }

        match msg {
            ClientMessage::JoinSession { session_id, role } => self.join(from, session_id, role),
            ClientMessage::ObserveSession { session_id } => self.observe(from, session_id),
            ClientMessage::LeaveSession => self.detach(from),
            ClientMessage::StartSession { session_id } => self.session_start(from, &session_id),
            ClientMessage::EndSession { session_id } => self.session_end(from, &session_id),
            ClientMessage::Offer { target_handle, sdp } => {
                self.relay(from, SignalKind::Offer, target_handle, sdp)
            }
            ClientMessage::Answer { target_handle, sdp } => {
                self.relay(from, SignalKind::Answer, target_handle, sdp)
            }
            ClientMessage::IceCandidate { target_handle, candidate } => {
                self.relay(from, SignalKind::IceCandidate, target_handle, candidate)
            }
            ClientMessage::Ping => self.send(from, ServerMessage::Pong),
        }
    }

    /// Purges the connection. Calling it twice is harmless.
    pub fn disconnect(&mut self, handle: ConnectionHandle) {
        if !self.connections.contains_key(&handle) {
            debug!("Connection {} already closed", handle);
            return;
        }
        self.detach(handle);
        self.connections.remove(&handle);
        self.pool.remove(&handle);
        info!("Connection {} disconnected", handle);
    }

    fn join(&mut self, from: ConnectionHandle, session_id: SessionId, role: Role) {
        let repeated = matches!(
            self.connections.get(&from),
            Some(ConnectionState::Joined { session_id: joined, role: held })
                if *joined == session_id && *held == role
        );
        if repeated {
            debug!("Connection {} repeated its join of session {} as {}", from, session_id, role);
            self.announce_ready(from, &session_id, role);
            return;
        }

        self.detach(from);

        if let Some(prior) = self.registry.register(&session_id, role, from) {
            info!(
                "Connection {} took over {} slot in session {} from {}",
                from, role, session_id, prior
            );
            if let Some(state) = self.connections.get_mut(&prior) {
                *state = ConnectionState::Unjoined;
            }
            self.send(prior, ServerMessage::Superseded { session_id: session_id.clone(), role });
        }

        self.connections.insert(
            from,
            ConnectionState::Joined { session_id: session_id.clone(), role },
        );
        info!("Connection {} joined session {} as {}", from, session_id, role);

        self.announce_ready(from, &session_id, role);

        // The other slot is empty on any join that does not complete the
        // pair, so observers are the only members left to tell.
        let observers = self.registry.observers_of(&session_id);
        self.pool.send_to_many(
            &observers,
            &ServerMessage::PeerJoined { peer_handle: from, role: role.into() },
        );
    }

    fn announce_ready(&self, from: ConnectionHandle, session_id: &str, role: Role) {
        if !self.registry.both_present(session_id) {
            return;
        }
        if let Some(peer) = self.registry.peer_of(session_id, role) {
            self.send(from, ServerMessage::Ready { peer_handle: peer });
            self.send(peer, ServerMessage::Ready { peer_handle: from });
            info!("Both participants ready in session {}", session_id);
        }
    }

    fn observe(&mut self, from: ConnectionHandle, session_id: SessionId) {
        self.detach(from);

        if !self.registry.add_observer(&session_id, from) {
            warn!("Connection {} cannot observe unknown session {}", from, session_id);
            return;
        }
        self.connections
            .insert(from, ConnectionState::Observing { session_id: session_id.clone() });
        info!("Connection {} observing session {}", from, session_id);

        let occupants: Vec<_> = [Role::Company, Role::Freelancer]
            .into_iter()
            .filter_map(|role| self.registry.occupant(&session_id, role))
            .collect();
        self.pool.send_to_many(
            &occupants,
            &ServerMessage::PeerJoined { peer_handle: from, role: MemberRole::Observer },
        );
    }

    /// Drops whatever membership the connection holds and leaves it Unjoined.
    fn detach(&mut self, from: ConnectionHandle) {
        let previous = match self.connections.get_mut(&from) {
            Some(state) => std::mem::replace(state, ConnectionState::Unjoined),
            None => return,
        };

        match previous {
            ConnectionState::Unjoined => {}
            ConnectionState::Joined { session_id, role } => self.vacate(from, &session_id, role),
            ConnectionState::Observing { session_id } => {
                self.registry.remove_observer(&session_id, from);
                debug!("Connection {} stopped observing session {}", from, session_id);
            }
        }
    }

    fn vacate(&mut self, from: ConnectionHandle, session_id: &str, role: Role) {
        // A superseded connection no longer owns the slot it once held.
        if self.registry.occupant(session_id, role) != Some(from) {
            debug!("Connection {} no longer holds {} in session {}", from, role, session_id);
            return;
        }

        let departure = ServerMessage::PeerLeft { peer_handle: from, role };
        if let Some(peer) = self.registry.peer_of(session_id, role) {
            self.send(peer, departure.clone());
            info!("Notified {} that {} ({}) left session {}", peer, from, role, session_id);
        }
        let observers = self.registry.observers_of(session_id);
        self.pool.send_to_many(&observers, &departure);

        if self.registry.unregister(session_id, role).is_some() {
            // Observers cannot outlive the last occupant.
            self.pool.send_to_many(&observers, &ServerMessage::SessionEnded);
            for observer in observers {
                self.reset_if_in(observer, session_id);
            }
            info!("Session {} cleaned up", session_id);
        }
    }

    fn relay(&self, from: ConnectionHandle, kind: SignalKind, target: ConnectionHandle, payload: Value) {
        if !matches!(self.connections.get(&from), Some(ConnectionState::Joined { .. })) {
            warn!("Dropping {:?} from connection {} that has not joined a session", kind, from);
            return;
        }

        debug!("{:?} from {} to {}", kind, from, target);
        if let Err(e) = self.pool.send_to(&target, &kind.message(from, payload)) {
            debug!("Dropped {:?} from {} to {}: {}", kind, from, target, e);
        }
    }

    fn session_start(&self, from: ConnectionHandle, session_id: &str) {
        if !self.is_participant(from, session_id) {
            warn!("Connection {} cannot start session {} it has not joined", from, session_id);
            return;
        }

        let members = self.registry.members(session_id);
        self.pool.send_to_many(&members, &ServerMessage::SessionStarted);
        info!("Session {} started", session_id);
    }

    fn session_end(&mut self, from: ConnectionHandle, session_id: &str) {
        if !self.is_participant(from, session_id) {
            warn!("Connection {} cannot end session {} it has not joined", from, session_id);
            return;
        }

        let members = self.registry.members(session_id);
        self.pool.send_to_many(&members, &ServerMessage::SessionEnded);

        self.registry.unregister(session_id, Role::Company);
        self.registry.unregister(session_id, Role::Freelancer);
        for member in members {
            self.reset_if_in(member, session_id);
        }
        info!("Session {} ended", session_id);
    }

    fn is_participant(&self, handle: ConnectionHandle, session_id: &str) -> bool {
        matches!(
            self.connections.get(&handle),
            Some(ConnectionState::Joined { session_id: joined, .. }) if joined == session_id
        )
    }

    fn reset_if_in(&mut self, handle: ConnectionHandle, session_id: &str) {
        if let Some(state) = self.connections.get_mut(&handle) {
            let in_session = match state {
                ConnectionState::Joined { session_id: s, .. } => s == session_id,
                ConnectionState::Observing { session_id: s } => s == session_id,
                ConnectionState::Unjoined => false,
            };
            if in_session {
                *state = ConnectionState::Unjoined;
            }
        }
    }

    fn send(&self, to: ConnectionHandle, msg: ServerMessage) {
        if let Err(e) = self.pool.send_to(&to, &msg) {
            debug!("Dropped message for {}: {}", to, e);
        }
    }
}
