//! WebSocket Connection Relay
//!
//! Bridges many downstream viewers to one upstream snapshot source, with one
//! upstream connection per downstream socket.
//!
//! - `RelayLink`: upstream connection with an explicit lifecycle
//! - `RelayRegistry`: instance-owned table of active pairs
//! - `ConnectionRelay`: accepts downstream sockets and forwards frames

mod link;
mod registry;
mod server;

pub use link::{LinkError, LinkEvent, LinkState, RelayLink};
pub use registry::{PairHandle, RelayRegistry, RelayStats, TeardownReason};
pub use server::{
    CLOSE_INTERNAL_ERROR, ConnectionRelay, RelayServer, RelayServerError, serve,
};
