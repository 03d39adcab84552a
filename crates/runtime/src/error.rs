//! Error types for the control channel.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur on the control channel.
#[derive(Debug, Error)]
pub enum Error {
	/// The WebSocket handshake or TCP dial failed.
	#[error("Failed to connect to {url}: {reason}")]
	ConnectionFailed { url: String, reason: String },

	/// Transport-level error after the channel was established.
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Message that could not be understood.
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// Error object returned by the remote process for a command.
	#[error("{message} (code {code}){}", data.as_ref().map(|d| format!(": {d}")).unwrap_or_default())]
	Remote { code: i64, message: String, data: Option<String> },

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// Timeout waiting for an operation.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// The channel closed before a response arrived.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// Invalid argument provided to a method.
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
}

impl Error {
	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout(_))
	}

	/// Returns true if the channel is gone and retrying on it is pointless.
	pub fn is_channel_closed(&self) -> bool {
		matches!(self, Error::ChannelClosed | Error::TransportError(_))
	}
}
