//! Consumer-Side Client
//!
//! - `ReconnectingClient`: one logical connection with bounded fixed-delay retry
//! - `WsConnector`: the WebSocket transport it runs on

mod reconnecting;
mod websocket;

pub use reconnecting::{ClientHandle, ClientStopped, DEFAULT_EVENT_CAPACITY, ReconnectingClient};
pub use websocket::{
    CLOSE_GOING_AWAY, CLOSE_NORMAL, DEFAULT_CONNECT_TIMEOUT, WsConnector, WsFrameStream,
    classify_close, is_normal_close,
};
