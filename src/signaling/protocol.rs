//! Wire format of the signaling channel.
//!
//! Every frame is a JSON text message of the form
//! `{"type": "<event>", "payload": {...}}`. Payload fields are camelCase.
//! SDP and ICE payloads are carried as arbitrary JSON and never inspected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::registry::{ConnectionHandle, Role, SessionId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    #[serde(rename = "join-session", rename_all = "camelCase")]
    JoinSession { session_id: SessionId, role: Role },
    #[serde(rename = "observe-session", rename_all = "camelCase")]
    ObserveSession { session_id: SessionId },
    #[serde(rename = "leave-session")]
    LeaveSession,
    #[serde(rename = "start-session", rename_all = "camelCase")]
    StartSession { session_id: SessionId },
    #[serde(rename = "end-session", rename_all = "camelCase")]
    EndSession { session_id: SessionId },
    #[serde(rename = "signal-offer", rename_all = "camelCase")]
    Offer { target_handle: ConnectionHandle, sdp: Value },
    #[serde(rename = "signal-answer", rename_all = "camelCase")]
    Answer { target_handle: ConnectionHandle, sdp: Value },
    #[serde(rename = "signal-ice", rename_all = "camelCase")]
    IceCandidate { target_handle: ConnectionHandle, candidate: Value },
    #[serde(rename = "ping")]
    Ping,
}

/// Role as announced to other members; observers hold no slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Company,
    Freelancer,
    Observer,
}

impl From<Role> for MemberRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Company => MemberRole::Company,
            Role::Freelancer => MemberRole::Freelancer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    #[serde(rename = "connected")]
    Connected { handle: ConnectionHandle },
    #[serde(rename = "ready", rename_all = "camelCase")]
    Ready { peer_handle: ConnectionHandle },
    #[serde(rename = "peer-joined", rename_all = "camelCase")]
    PeerJoined { peer_handle: ConnectionHandle, role: MemberRole },
    #[serde(rename = "peer-left", rename_all = "camelCase")]
    PeerLeft { peer_handle: ConnectionHandle, role: Role },
    #[serde(rename = "superseded", rename_all = "camelCase")]
    Superseded { session_id: SessionId, role: Role },
    #[serde(rename = "session-started")]
    SessionStarted,
    #[serde(rename = "session-ended")]
    SessionEnded,
    #[serde(rename = "signal-offer", rename_all = "camelCase")]
    Offer { sender_handle: ConnectionHandle, sdp: Value },
    #[serde(rename = "signal-answer", rename_all = "camelCase")]
    Answer { sender_handle: ConnectionHandle, sdp: Value },
    #[serde(rename = "signal-ice", rename_all = "camelCase")]
    IceCandidate { sender_handle: ConnectionHandle, candidate: Value },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "error")]
    Error { message: String },
}
