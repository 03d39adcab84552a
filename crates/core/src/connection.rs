//! The established control channel plus the contexts it exposes.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};
use tether_protocol::{AttachToTargetResult, GetTargetsResult, TargetInfo};
use tether_runtime::ControlChannel;

use crate::endpoint::ReachableEndpoint;
use crate::error::{Error, Result};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to an established control channel.
///
/// Cloning is cheap and every clone talks to the same channel. Only the
/// connection manager creates and retires these.
#[derive(Clone)]
pub struct Connection {
	inner: Arc<Inner>,
}

struct Inner {
	id: u64,
	channel: Arc<dyn ControlChannel>,
	endpoint: ReachableEndpoint,
}

impl Connection {
	pub fn new(channel: Arc<dyn ControlChannel>, endpoint: ReachableEndpoint) -> Self {
		Self {
			inner: Arc::new(Inner {
				id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
				channel,
				endpoint,
			}),
		}
	}

	/// Process-unique identity of this channel.
	pub fn id(&self) -> u64 {
		self.inner.id
	}

	pub fn endpoint(&self) -> &ReachableEndpoint {
		&self.inner.endpoint
	}

	/// Whether the channel can still carry commands.
	pub fn is_alive(&self) -> bool {
		!self.inner.channel.is_closed()
	}

	/// Forwards a pre-formed command.
	pub async fn send(&self, method: &str, params: Value, session_id: Option<&str>) -> Result<Value> {
		self.inner
			.channel
			.send_command(method, params, session_id)
			.await
			.map_err(|e| Error::command(method, e))
	}

	/// Lists the top-level contexts the remote currently exposes.
	pub async fn refresh_contexts(&self) -> Result<Vec<TargetInfo>> {
		let value = self.send("Target.getTargets", json!({}), None).await?;
		let result: GetTargetsResult =
			serde_json::from_value(value).map_err(|e| Error::command("Target.getTargets", tether_runtime::Error::Json(e)))?;
		Ok(result.target_infos)
	}

	/// Attaches to a target in flat mode and returns its session id.
	pub async fn attach(&self, target_id: &str) -> Result<String> {
		let value = self
			.send("Target.attachToTarget", json!({ "targetId": target_id, "flatten": true }), None)
			.await?;
		let result: AttachToTargetResult =
			serde_json::from_value(value).map_err(|e| Error::command("Target.attachToTarget", tether_runtime::Error::Json(e)))?;
		Ok(result.session_id)
	}

	/// Closes the channel. Pending commands fail.
	pub async fn close(&self) -> Result<()> {
		self.inner
			.channel
			.close()
			.await
			.map_err(|e| Error::command("close", e))
	}
}

impl fmt::Debug for Connection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Connection")
			.field("id", &self.inner.id)
			.field("endpoint", &self.inner.endpoint.as_str())
			.field("alive", &self.is_alive())
			.finish()
	}
}
