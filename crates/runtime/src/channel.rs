//! ControlChannel - the object-safe view of an established control channel.
//!
//! The orchestrator never depends on the concrete WebSocket connection. It
//! holds an `Arc<dyn ControlChannel>`, which keeps it testable with in-memory
//! channels and keeps the transport swappable.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::error::Result;

/// Boxed future returned by [`ControlChannel`] methods.
pub type ChannelFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Interface the orchestrator needs from an established control channel.
pub trait ControlChannel: Send + Sync {
	/// Sends a pre-formed command and awaits its result.
	///
	/// `session_id` addresses a flat-mode target session; `None` talks to the
	/// browser endpoint itself.
	fn send_command<'a>(&'a self, method: &'a str, params: Value, session_id: Option<&'a str>) -> ChannelFuture<'a, Value>;

	/// Closes the channel. Pending commands fail with [`Error::ChannelClosed`](crate::Error::ChannelClosed).
	fn close(&self) -> ChannelFuture<'_, ()>;

	/// Returns true once the channel can no longer carry commands.
	fn is_closed(&self) -> bool;

	/// Address the channel was dialed at.
	fn url(&self) -> &str;
}
