//! Request/response correlation on top of the WebSocket transport.
//!
//! # Message Flow
//!
//! 1. Caller invokes [`CdpConnection::send`] with a method, params and optional session
//! 2. The connection allocates an id and parks a oneshot sender under it
//! 3. The serialized request is queued for the driver task
//! 4. The driver writes it to the socket and keeps reading inbound frames
//! 5. A response is matched by id and completes the parked oneshot
//! 6. Events are fanned out to [`subscribe`](CdpConnection::subscribe)rs
//!
//! When the socket ends, every parked request fails with
//! [`Error::ChannelClosed`] and the connection reports itself closed.


use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tether_protocol::{Event, Message, Request};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::channel::{ChannelFuture, ControlChannel};
use crate::error::{Error, Result};
use crate::transport::WebSocketTransport;

/// Capacity of the event fan-out buffer. Slow subscribers lag, they never block the reader.
const EVENT_BUFFER: usize = 256;

/// Upper bound for [`ControlChannel::close`] waiting on the driver to stop.
const CLOSE_WAIT: Duration = Duration::from_secs(1);

/// Pending request callbacks keyed by request id.
type CallbackMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;

enum Outbound {
	Text(String),
	Close,
}

/// RAII guard removing a parked callback when the request future is dropped early.
struct CancelGuard {
	id: u64,
	callbacks: CallbackMap,
	completed: bool,
}

impl CancelGuard {
	fn new(id: u64, callbacks: CallbackMap) -> Self {
		Self {
			id,
			callbacks,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}
		if self.callbacks.lock().remove(&self.id).is_some() {
			tracing::debug!(id = self.id, "CancelGuard: removed orphaned callback");
		}
	}
}

/// Future returned by [`CdpConnection::send`] with automatic cancellation cleanup.
struct ResponseFuture {
	rx: oneshot::Receiver<Result<Value>>,
	guard: CancelGuard,
}

impl Future for ResponseFuture {
	type Output = Result<Value>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(result) => {
				self.guard.complete();
				Poll::Ready(result.map_err(|_| Error::ChannelClosed).and_then(|r| r))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

/// State shared between the connection handle and its driver task.
///
/// The driver never holds the [`CdpConnection`] itself, so dropping the last
/// handle ends the driver.
#[derive(Clone)]
struct Shared {
	callbacks: CallbackMap,
	events: broadcast::Sender<Event>,
	closed: Arc<watch::Sender<bool>>,
}

impl Shared {
	fn dispatch(&self, text: &str) {
		let message = match serde_json::from_str::<Message>(text) {
			Ok(message) => message,
			Err(e) => {
				tracing::debug!(error = %e, "failed to parse inbound message");
				return;
			}
		};

		match message {
			Message::Response(response) => {
				let Some(callback) = self.callbacks.lock().remove(&response.id) else {
					tracing::debug!(id = response.id, "response for unknown request (ignored)");
					return;
				};
				let result = match response.error {
					Some(err) => Err(Error::Remote {
						code: err.code,
						message: err.message,
						data: err.data,
					}),
					None => Ok(response.result.unwrap_or(Value::Null)),
				};
				let _ = callback.send(result);
			}
			Message::Event(event) => {
				tracing::trace!(method = %event.method, session = ?event.session_id, "event");
				let _ = self.events.send(event);
			}
			Message::Unknown(value) => {
				tracing::debug!(%value, "unrecognized inbound message");
			}
		}
	}

	fn shut_down(&self) {
		self.closed.send_replace(true);
		let pending: Vec<_> = self.callbacks.lock().drain().collect();
		if !pending.is_empty() {
			tracing::debug!(count = pending.len(), "failing requests pending on closed channel");
		}
		for (_, callback) in pending {
			let _ = callback.send(Err(Error::ChannelClosed));
		}
	}
}

/// DevTools control channel over a WebSocket.
///
/// Uses sequential request ids and oneshot channels for correlation. Cheap to
/// share behind an `Arc`; all methods take `&self`.
pub struct CdpConnection {
	url: String,
	last_id: AtomicU64,
	outbound_tx: mpsc::UnboundedSender<Outbound>,
	shared: Shared,
}

impl CdpConnection {
	/// Dials `url` and starts the driver task.
	pub async fn connect(url: &str, timeout: Duration) -> Result<Arc<Self>> {
		let transport = WebSocketTransport::connect(url, timeout).await?;
		Ok(Self::start(transport))
	}

	/// Wraps an established transport and starts the driver task.
	pub fn start(transport: WebSocketTransport) -> Arc<Self> {
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let (events, _) = broadcast::channel(EVENT_BUFFER);
		let shared = Shared {
			callbacks: Arc::new(Mutex::new(HashMap::new())),
			events,
			closed: Arc::new(watch::channel(false).0),
		};

		let connection = Arc::new(Self {
			url: transport.url().to_string(),
			last_id: AtomicU64::new(1),
			outbound_tx,
			shared: shared.clone(),
		});

		tokio::spawn(drive(transport, outbound_rx, shared));
		connection
	}

	/// Sends a command and awaits its result.
	pub async fn send(&self, method: &str, params: Value, session_id: Option<&str>) -> Result<Value> {
		if self.is_closed() {
			return Err(Error::ChannelClosed);
		}

		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		let request = Request {
			id,
			method: method.to_string(),
			params: if params.is_null() { Value::Object(Default::default()) } else { params },
			session_id: session_id.map(str::to_string),
		};
		let text = serde_json::to_string(&request)?;

		tracing::debug!(id, %method, session = ?session_id, "sending command");

		let (tx, rx) = oneshot::channel();
		self.shared.callbacks.lock().insert(id, tx);
		let guard = CancelGuard::new(id, Arc::clone(&self.shared.callbacks));

		if self.outbound_tx.send(Outbound::Text(text)).is_err() {
			tracing::debug!(id, "outbound queue closed");
			return Err(Error::ChannelClosed);
		}

		ResponseFuture { rx, guard }.await
	}

	/// Subscribes to events pushed by the remote process.
	pub fn subscribe(&self) -> broadcast::Receiver<Event> {
		self.shared.events.subscribe()
	}

	/// Returns true once the driver has stopped.
	pub fn is_closed(&self) -> bool {
		*self.shared.closed.borrow()
	}

	/// Resolves once the driver has stopped.
	pub async fn closed(&self) {
		let mut rx = self.shared.closed.subscribe();
		let _ = rx.wait_for(|closed| *closed).await;
	}

	/// Requests a graceful close. Idempotent.
	pub fn request_close(&self) {
		let _ = self.outbound_tx.send(Outbound::Close);
	}

	/// Dialed URL.
	pub fn url(&self) -> &str {
		&self.url
	}

	#[cfg(test)]
	fn pending_requests(&self) -> usize {
		self.shared.callbacks.lock().len()
	}
}

impl Drop for CdpConnection {
	fn drop(&mut self) {
		self.request_close();
	}
}

impl ControlChannel for CdpConnection {
	fn send_command<'a>(&'a self, method: &'a str, params: Value, session_id: Option<&'a str>) -> ChannelFuture<'a, Value> {
		Box::pin(self.send(method, params, session_id))
	}

	fn close(&self) -> ChannelFuture<'_, ()> {
		Box::pin(async move {
			self.request_close();
			tokio::time::timeout(CLOSE_WAIT, self.closed())
				.await
				.map_err(|_| Error::Timeout(format!("closing {}", self.url)))
		})
	}

	fn is_closed(&self) -> bool {
		CdpConnection::is_closed(self)
	}

	fn url(&self) -> &str {
		&self.url
	}
}

/// Driver loop: writes queued requests, reads and dispatches inbound frames.
async fn drive(transport: WebSocketTransport, mut outbound_rx: mpsc::UnboundedReceiver<Outbound>, shared: Shared) {
	let url = transport.url().to_string();
	let (mut sender, mut receiver) = transport.into_parts();

	loop {
		tokio::select! {
			outbound = outbound_rx.recv() => match outbound {
				Some(Outbound::Text(text)) => {
					if let Err(e) = sender.send(text).await {
						tracing::debug!(%url, error = %e, "control channel write failed");
						break;
					}
				}
				Some(Outbound::Close) | None => {
					let _ = sender.close().await;
					break;
				}
			},
			inbound = receiver.recv() => match inbound {
				Some(Ok(text)) => shared.dispatch(&text),
				Some(Err(e)) => {
					tracing::debug!(%url, error = %e, "control channel read failed");
					break;
				}
				None => break,
			},
		}
	}

	// Refuse new requests before failing the parked ones, so none slips in between.
	outbound_rx.close();
	shared.shut_down();
	tracing::debug!(%url, "control channel closed");
}
