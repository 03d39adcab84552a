//! tether runtime - control channel transport and request correlation.
//!
//! This crate owns the bidirectional channel to a remote-debuggable process:
//!
//! - **Transport**: WebSocket framing over a dialed control-channel URL
//! - **Connection**: request id allocation, response correlation, event fan-out
//! - **ControlChannel**: the object-safe seam the orchestrator talks to
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  tether-rs   │  Orchestrator (discovery, manager, dispatch)
//! └──────┬───────┘
//!        │ Arc<dyn ControlChannel>
//! ┌──────▼───────┐
//! │tether-runtime│  This crate
//! │  ┌────────┐  │
//! │  │ Conn   │  │  id correlation, events
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Trans  │  │  WebSocket
//! │  └────────┘  │
//! └──────────────┘
//! ```

pub mod channel;
pub mod connection;
pub mod error;
pub mod transport;

pub use channel::{ChannelFuture, ControlChannel};
pub use connection::CdpConnection;
pub use error::{Error, Result};
pub use transport::{WebSocketReceiver, WebSocketSender, WebSocketTransport};
