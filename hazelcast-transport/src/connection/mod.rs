//! Connections to cluster members.

mod connection;

pub use connection::{Connection, ConnectionId, TcpConnection};
