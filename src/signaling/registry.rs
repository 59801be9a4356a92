use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type SessionId = String;

/// Transport-assigned identifier of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionHandle(Uuid);

impl ConnectionHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ConnectionHandle {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Company,
    Freelancer,
}

impl Role {
    pub fn other(self) -> Role {
        match self {
            Role::Company => Role::Freelancer,
            Role::Freelancer => Role::Company,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Company => f.write_str("company"),
            Role::Freelancer => f.write_str("freelancer"),
        }
    }
}

/// Live occupancy of one interview session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Session {
    company: Option<ConnectionHandle>,
    freelancer: Option<ConnectionHandle>,
    observers: HashSet<ConnectionHandle>,
}

impl Session {
    fn slot(&self, role: Role) -> Option<ConnectionHandle> {
        match role {
            Role::Company => self.company,
            Role::Freelancer => self.freelancer,
        }
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<ConnectionHandle> {
        match role {
            Role::Company => &mut self.company,
            Role::Freelancer => &mut self.freelancer,
        }
    }

    fn is_vacant(&self) -> bool {
        self.company.is_none() && self.freelancer.is_none()
    }

    pub fn observers(&self) -> impl Iterator<Item = ConnectionHandle> + '_ {
        self.observers.iter().copied()
    }

    /// Occupants first (company, freelancer), then observers.
    pub fn members(&self) -> Vec<ConnectionHandle> {
        self.company
            .into_iter()
            .chain(self.freelancer)
            .chain(self.observers.iter().copied())
            .collect()
    }
}

/// Which connection holds which role in which session.
///
/// Owned by a single event loop, so there is no interior locking. A session
/// entry only exists while at least one of its two role slots is occupied.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts `handle` into the `role` slot of `session_id`, creating the
    /// session on demand. Returns the previous occupant when it was a
    /// different connection.
    pub fn register(
        &mut self,
        session_id: &str,
        role: Role,
        handle: ConnectionHandle,
    ) -> Option<ConnectionHandle> {
        let session = self.sessions.entry(session_id.to_string()).or_default();
        session.observers.remove(&handle);
        let prior = session.slot_mut(role).replace(handle);
        prior.filter(|prior| *prior != handle)
    }

    /// Clears the `role` slot. When that leaves both slots empty the session
    /// is dropped and its last state is returned so callers can detach any
    /// remaining observers. Unregistering an empty slot is a no-op.
    pub fn unregister(&mut self, session_id: &str, role: Role) -> Option<Session> {
        let session = self.sessions.get_mut(session_id)?;
        session.slot_mut(role).take();
        if session.is_vacant() {
            self.sessions.remove(session_id)
        } else {
            None
        }
    }

    pub fn occupant(&self, session_id: &str, role: Role) -> Option<ConnectionHandle> {
        self.sessions.get(session_id).and_then(|s| s.slot(role))
    }

    pub fn peer_of(&self, session_id: &str, role: Role) -> Option<ConnectionHandle> {
        self.occupant(session_id, role.other())
    }

    pub fn both_present(&self, session_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .map(|s| s.company.is_some() && s.freelancer.is_some())
            .unwrap_or(false)
    }

    /// Adds a passive member. Observers cannot create a session.
    pub fn add_observer(&mut self, session_id: &str, handle: ConnectionHandle) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(session) => {
                session.observers.insert(handle);
                true
            }
            None => false,
        }
    }

    pub fn remove_observer(&mut self, session_id: &str, handle: ConnectionHandle) -> bool {
        self.sessions
            .get_mut(session_id)
            .map(|s| s.observers.remove(&handle))
            .unwrap_or(false)
    }

    pub fn observers_of(&self, session_id: &str) -> Vec<ConnectionHandle> {
        self.sessions
            .get(session_id)
            .map(|s| s.observers().collect())
            .unwrap_or_default()
    }

    pub fn members(&self, session_id: &str) -> Vec<ConnectionHandle> {
        self.sessions
            .get(session_id)
            .map(Session::members)
            .unwrap_or_default()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Sessions with both roles filled.
    pub fn ready_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|s| s.company.is_some() && s.freelancer.is_some())
            .count()
    }
}
