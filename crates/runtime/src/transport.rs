//! WebSocket transport for the control channel.
//!
//! Messages are JSON text frames. Binary frames are accepted when they hold
//! UTF-8; ping/pong is answered by tungstenite itself.


use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An established WebSocket, not yet split into halves.
pub struct WebSocketTransport {
	url: String,
	stream: WsStream,
}

impl WebSocketTransport {
	/// Dials `url` and completes the WebSocket handshake within `timeout`.
	pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
		tracing::debug!(%url, timeout_ms = timeout.as_millis() as u64, "dialing control channel");

		let (stream, _response) = tokio::time::timeout(timeout, connect_async(url))
			.await
			.map_err(|_| Error::Timeout(format!("WebSocket handshake with {url} after {}ms", timeout.as_millis())))?
			.map_err(|e| Error::ConnectionFailed {
				url: url.to_string(),
				reason: e.to_string(),
			})?;

		Ok(Self { url: url.to_string(), stream })
	}

	/// Returns the dialed URL.
	pub fn url(&self) -> &str {
		&self.url
	}

	/// Splits the transport into independently owned halves.
	pub fn into_parts(self) -> (WebSocketSender, WebSocketReceiver) {
		let (sink, stream) = self.stream.split();
		(WebSocketSender { sink }, WebSocketReceiver { stream })
	}
}

/// Writing half of the transport.
pub struct WebSocketSender {
	sink: SplitSink<WsStream, WsMessage>,
}

impl WebSocketSender {
	/// Sends one JSON text frame.
	pub async fn send(&mut self, text: String) -> Result<()> {
		self.sink.send(WsMessage::Text(text)).await.map_err(|e| Error::TransportError(e.to_string()))
	}

	/// Sends a close frame and flushes.
	pub async fn close(&mut self) -> Result<()> {
		self.sink.close().await.map_err(|e| Error::TransportError(e.to_string()))
	}
}

/// Reading half of the transport.
pub struct WebSocketReceiver {
	stream: SplitStream<WsStream>,
}

impl WebSocketReceiver {
	/// Returns the next text payload, `None` once the peer closed the channel.
	pub async fn recv(&mut self) -> Option<Result<String>> {
		loop {
			let frame = match self.stream.next().await? {
				Ok(frame) => frame,
				Err(e) => return Some(Err(Error::TransportError(e.to_string()))),
			};

			match frame {
				WsMessage::Text(text) => return Some(Ok(text)),
				WsMessage::Binary(bytes) => match String::from_utf8(bytes) {
					Ok(text) => return Some(Ok(text)),
					Err(_) => tracing::debug!("dropping non-UTF-8 binary frame"),
				},
				WsMessage::Close(frame) => {
					tracing::debug!(?frame, "peer closed control channel");
					return None;
				}
				WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
			}
		}
	}
}
