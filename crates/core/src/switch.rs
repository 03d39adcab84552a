//! Instance Switch Protocol.

use serde::Serialize;
use tracing::info;

use crate::endpoint::TargetSpec;
use crate::error::Result;
use crate::manager::ConnectionManager;
use crate::session::InstanceSource;

/// What a successful switch reports back.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchConfirmation {
	pub endpoint: String,
	pub browser: Option<String>,
	pub generation: u64,
	/// Endpoint of the connection that was replaced, if any.
	pub previous: Option<String>,
	pub rewritten: bool,
	pub contexts: usize,
}

impl ConnectionManager {
	/// Replaces the active connection with one to `spec`.
	///
	/// The old connection is dropped first, best-effort. If the new one cannot
	/// be established the manager is left disconnected rather than bound to
	/// the old instance.
	pub async fn switch_to(&mut self, spec: &TargetSpec) -> Result<SwitchConfirmation> {
		let previous = self.disconnect().await.map(|s| s.endpoint().to_string());

		self.mark_connecting();
		let connection = match self.establish(spec).await {
			Ok(connection) => connection,
			Err(e) => {
				self.mark_failed();
				return Err(e);
			}
		};

		let session = self.bind(connection, InstanceSource::Switched).await;
		let endpoint = session.endpoint();
		info!(
			target = "tether.switch",
			target_spec = %spec,
			endpoint = %endpoint,
			previous = ?previous,
			generation = session.generation(),
			"switched instance"
		);

		Ok(SwitchConfirmation {
			endpoint: endpoint.to_string(),
			browser: endpoint.browser.clone(),
			generation: session.generation(),
			previous,
			rewritten: endpoint.rewritten,
			contexts: session.contexts().len(),
		})
	}
}
