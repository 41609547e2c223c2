//! Data models for phoenix-link.
//!
//! The wire message, reply decoding, socket options and connection state.

pub mod connection_state;
pub mod message;
pub mod reply;
pub mod socket_options;


pub use connection_state::ConnectionState;
pub use message::{events, Message, PHOENIX_TOPIC};
pub use reply::{Reply, DEFAULT_JOIN_FAILURE, STATUS_ERROR, STATUS_OK};
pub use socket_options::SocketOptions;
