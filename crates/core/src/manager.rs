//! Connection Manager: the single owner of the active connection.
//!
//! The manager is reachable only through the dispatch guard, so plain
//! `&mut self` methods are enough; there is no shared cell to lock.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tether_protocol::TargetInfo;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::config::{BridgeConfig, LaunchOptions};
use crate::connection::Connection;
use crate::dialer::Dialer;
use crate::endpoint::TargetSpec;
use crate::error::{Error, Result};
use crate::launcher::{Launcher, LocalInstance};
use crate::prober::{CandidateProber, ProbeHint};
use crate::session::{InstanceSource, SessionContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
	Unconnected,
	Connecting,
	Connected,
	Disconnected,
}

/// Where to connect, decided once per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryHint {
	/// `ws(s)://` endpoint or `http(s)://` origin.
	Address(TargetSpec),
	/// Host name or literal plus optional port, probed as a single hint.
	Symbolic { host: String, port: Option<u16> },
	/// Auto-discovery over the built-in hint set.
	None,
}

impl DiscoveryHint {
	pub fn is_explicit(&self) -> bool {
		!matches!(self, DiscoveryHint::None)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
	pub hint: DiscoveryHint,
	/// Launch fallback for the auto-discovery path. Explicit hints never launch.
	pub allow_launch: bool,
	pub launch: LaunchOptions,
}

pub struct ConnectionManager {
	config: Arc<BridgeConfig>,
	dialer: Arc<dyn Dialer>,
	launcher: Arc<dyn Launcher>,
	state: ConnectionState,
	active: Option<Arc<SessionContext>>,
	local: Option<LocalInstance>,
	generation: u64,
}

impl ConnectionManager {
	pub fn new(config: Arc<BridgeConfig>, dialer: Arc<dyn Dialer>, launcher: Arc<dyn Launcher>) -> Self {
		Self {
			config,
			dialer,
			launcher,
			state: ConnectionState::Unconnected,
			active: None,
			local: None,
			generation: 0,
		}
	}

	pub fn state(&self) -> ConnectionState {
		self.state
	}

	pub fn config(&self) -> &BridgeConfig {
		&self.config
	}

	/// Current session, live or not.
	pub fn current(&self) -> Option<Arc<SessionContext>> {
		self.active.clone()
	}

	/// Current session if its connection still works.
	pub fn live_session(&self) -> Option<Arc<SessionContext>> {
		self.active.as_ref().filter(|s| s.is_current()).cloned()
	}

	pub fn local_instance(&self) -> Option<&LocalInstance> {
		self.local.as_ref()
	}

	/// Returns the live session, or establishes one according to `options`.
	///
	/// The explicit-versus-discovery decision is made here, once. An explicit
	/// hint that fails is reported as-is; only the discovery path may fall
	/// back to launching.
	pub async fn ensure_connected(&mut self, options: &ConnectOptions) -> Result<Arc<SessionContext>> {
		if let Some(session) = self.live_session() {
			return Ok(session);
		}
		self.drop_dead_session().await;

		self.state = ConnectionState::Connecting;
		let result = match &options.hint {
			DiscoveryHint::Address(spec) => self.establish(spec).await.map(|c| (c, InstanceSource::Explicit)),
			DiscoveryHint::Symbolic { host, port } => {
				let spec = TargetSpec::Name {
					host: host.clone(),
					port: *port,
				};
				self.establish(&spec).await.map(|c| (c, InstanceSource::Explicit))
			}
			DiscoveryHint::None => match self.discover().await {
				Ok(connection) => Ok((connection, InstanceSource::Discovered)),
				Err(e) if options.allow_launch => {
					info!(target = "tether.manager", error = %e, "discovery found nothing; launching a local browser");
					self.launch_connection(&options.launch).await.map(|c| (c, InstanceSource::Launched))
				}
				Err(e) => Err(e),
			},
		};

		match result {
			Ok((connection, source)) => Ok(self.bind(connection, source).await),
			Err(e) => {
				self.mark_failed();
				Err(e)
			}
		}
	}

	/// Returns a live launched session, or launches a new local instance.
	pub async fn ensure_launched(&mut self, options: &LaunchOptions) -> Result<Arc<SessionContext>> {
		if let Some(session) = self.live_session().filter(|s| s.source() == InstanceSource::Launched) {
			return Ok(session);
		}
		self.disconnect().await;

		self.state = ConnectionState::Connecting;
		match self.launch_connection(options).await {
			Ok(connection) => Ok(self.bind(connection, InstanceSource::Launched).await),
			Err(e) => {
				self.mark_failed();
				Err(e)
			}
		}
	}

	/// Closes the active connection best-effort and returns the retired session.
	pub async fn disconnect(&mut self) -> Option<Arc<SessionContext>> {
		let previous = self.active.take()?;
		previous.retire();
		if let Err(e) = previous.connection().close().await {
			debug!(target = "tether.manager", error = %e, generation = previous.generation(), "close failed; continuing");
		}
		self.state = ConnectionState::Disconnected;
		info!(target = "tether.manager", generation = previous.generation(), endpoint = %previous.endpoint(), "disconnected");
		Some(previous)
	}

	/// Disconnects and stops an isolated local instance.
	pub async fn shutdown(&mut self) -> Result<()> {
		self.disconnect().await;
		if let Some(instance) = self.local.take() {
			instance.shutdown().await?;
		}
		Ok(())
	}

	/// Connects to `spec` under the outer connect timeout.
	///
	/// Endpoints are dialed directly; origins and names go through the prober.
	pub(crate) async fn establish(&self, spec: &TargetSpec) -> Result<Connection> {
		let bound = self.config.timeouts.connect();
		debug!(target = "tether.manager", target_spec = %spec, timeout_ms = bound.as_millis() as u64, "establishing connection");

		let work = async {
			match spec {
				TargetSpec::Endpoint(endpoint) => self.dialer.connect(endpoint, self.config.timeouts.dial()).await,
				TargetSpec::Origin(origin) => self.probe(&[ProbeHint::from_origin(origin)]).await,
				TargetSpec::Name { host, port } => self.probe(&[ProbeHint::new(host.clone(), *port)]).await,
			}
		};
		tokio::time::timeout(bound, work).await.map_err(|_| Error::ConnectTimeout {
			target: spec.to_string(),
			timeout_ms: bound.as_millis() as u64,
		})?
	}

	/// Installs a fresh session for `connection`, retiring any previous one.
	pub(crate) async fn bind(&mut self, connection: Connection, source: InstanceSource) -> Arc<SessionContext> {
		let (contexts, page_session) = self.warm_up(&connection).await;

		if let Some(previous) = self.active.take() {
			previous.retire();
			if previous.connection().id() != connection.id() {
				if let Err(e) = previous.connection().close().await {
					debug!(target = "tether.manager", error = %e, "closing superseded connection failed");
				}
			}
		}

		self.generation += 1;
		let session = Arc::new(SessionContext::new(self.generation, connection, source, contexts, page_session));
		self.active = Some(Arc::clone(&session));
		self.state = ConnectionState::Connected;
		info!(
			target = "tether.manager",
			generation = self.generation,
			endpoint = %session.endpoint(),
			source = ?source,
			"connection active"
		);
		session
	}

	pub(crate) fn mark_connecting(&mut self) {
		self.state = ConnectionState::Connecting;
	}

	pub(crate) fn mark_failed(&mut self) {
		self.state = if self.generation == 0 {
			ConnectionState::Unconnected
		} else {
			ConnectionState::Disconnected
		};
	}

	async fn drop_dead_session(&mut self) {
		if self.active.is_some() {
			warn!(target = "tether.manager", "active connection is gone; replacing it");
			self.disconnect().await;
		}
	}

	async fn discover(&self) -> Result<Connection> {
		let hints = self.config.discovery_hints();
		let bound = self.config.timeouts.connect();
		let label = hints.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
		tokio::time::timeout(bound, self.probe(&hints)).await.map_err(|_| Error::ConnectTimeout {
			target: format!("discovery hints [{label}]"),
			timeout_ms: bound.as_millis() as u64,
		})?
	}

	async fn probe(&self, hints: &[ProbeHint]) -> Result<Connection> {
		let prober = CandidateProber::new(self.dialer.as_ref(), self.config.port_plan(), &self.config.timeouts);
		let (connection, _) = prober.probe(hints).await?;
		Ok(connection)
	}

	async fn launch_connection(&mut self, options: &LaunchOptions) -> Result<Connection> {
		let timeouts = &self.config.timeouts;
		let instance = self.launcher.launch(options, timeouts.launch()).await?;
		let connection = self.dialer.connect(instance.endpoint(), timeouts.dial()).await?;
		if let Some(previous) = self.local.replace(instance) {
			if let Err(e) = previous.shutdown().await {
				debug!(target = "tether.manager", error = %e, "stopping previous local instance failed");
			}
		}
		Ok(connection)
	}

	/// Lists targets and enables a couple of cheap domains on the first page.
	///
	/// Every step shares one warm-up deadline. Failures and timeouts are
	/// logged and dropped; whatever was learned before them is kept.
	async fn warm_up(&self, connection: &Connection) -> (Vec<TargetInfo>, Option<String>) {
		let bound = self.config.timeouts.warm_up();
		let deadline = Instant::now() + bound;
		let timeout_ms = bound.as_millis() as u64;

		let contexts = match timeout_at(deadline, connection.refresh_contexts()).await {
			Ok(Ok(contexts)) => contexts,
			Ok(Err(e)) => {
				debug!(target = "tether.warmup", error = %e, "listing targets failed");
				return (Vec::new(), None);
			}
			Err(_) => {
				debug!(target = "tether.warmup", timeout_ms, "listing targets timed out");
				return (Vec::new(), None);
			}
		};

		let Some(page) = contexts.iter().find(|t| t.is_page()) else {
			debug!(target = "tether.warmup", "no page target to warm up");
			return (contexts, None);
		};
		let session_id = match timeout_at(deadline, connection.attach(&page.target_id)).await {
			Ok(Ok(id)) => id,
			Ok(Err(e)) => {
				debug!(target = "tether.warmup", error = %e, target_id = %page.target_id, "attach failed");
				return (contexts, None);
			}
			Err(_) => {
				debug!(target = "tether.warmup", timeout_ms, target_id = %page.target_id, "attach timed out");
				return (contexts, None);
			}
		};

		let enable = async {
			for method in ["Page.enable", "Runtime.enable"] {
				if let Err(e) = connection.send(method, json!({}), Some(&session_id)).await {
					debug!(target = "tether.warmup", error = %e, method, "warm-up command failed");
				}
			}
		};
		if timeout_at(deadline, enable).await.is_err() {
			debug!(target = "tether.warmup", timeout_ms, "enabling page domains timed out");
		}
		(contexts, Some(session_id))
	}
}
