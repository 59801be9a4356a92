//! WebSocket transport for the signaling server
//!
//! Accepts connections, assigns each a handle, decodes frames for the
//! signaling hub and writes the hub's replies back out.

mod connection;
mod pool;
mod server;

pub use connection::Connection;
pub use pool::{ConnectionPool, Outbox};
pub use server::WebSocketServer;
