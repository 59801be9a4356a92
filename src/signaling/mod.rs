//! Interview signaling core
//!
//! Pairs the company and freelancer of each interview session and relays
//! WebRTC offer/answer/ICE messages between them. All state lives in a
//! single hub task; connections talk to it through a `HubHandle`.

mod hub;
mod protocol;
mod registry;
mod router;

pub use hub::{HubEvent, HubHandle, HubStats, SignalingHub};
pub use protocol::{ClientMessage, MemberRole, ServerMessage};
pub use registry::{ConnectionHandle, Role, Session, SessionId, SessionRegistry};
pub use router::{ConnectionState, SignalKind, SignalRouter};
