//! Configuration: JSON file, then `TETHER_*` environment overrides, then
//! whatever the embedding program sets on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::endpoint::TargetSpec;
use crate::error::{Error, Result};
use crate::manager::{ConnectOptions, DiscoveryHint};
use crate::prober::{PortPlan, ProbeHint};

pub const DEFAULT_FORWARDING_PORT: u16 = 9999;
pub const DEFAULT_DEBUG_PORT: u16 = 9222;
pub const DEFAULT_CHANNEL: &str = "stable";

pub const ENV_ENDPOINT: &str = "TETHER_ENDPOINT";
pub const ENV_HOST: &str = "TETHER_HOST";
pub const ENV_PORT: &str = "TETHER_PORT";
pub const ENV_NO_LAUNCH: &str = "TETHER_NO_LAUNCH";
pub const ENV_CHANNEL: &str = "TETHER_CHANNEL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
	/// Explicit address: `ws(s)://` endpoint or `http(s)://` discovery origin.
	pub endpoint: Option<String>,
	/// Explicit symbolic endpoint host. Ignored when `endpoint` is set.
	pub host: Option<String>,
	/// Port paired with `host`.
	pub port: Option<u16>,
	/// Hosts probed when nothing explicit is configured.
	pub discovery_hosts: Vec<String>,
	pub forwarding_port: u16,
	pub default_port: u16,
	/// Start a local browser when auto-discovery finds nothing.
	pub allow_launch: bool,
	pub launch: LaunchOptions,
	pub timeouts: Timeouts,
}

impl Default for BridgeConfig {
	fn default() -> Self {
		Self {
			endpoint: None,
			host: None,
			port: None,
			discovery_hosts: vec!["127.0.0.1".into(), "host.docker.internal".into()],
			forwarding_port: DEFAULT_FORWARDING_PORT,
			default_port: DEFAULT_DEBUG_PORT,
			allow_launch: true,
			launch: LaunchOptions::default(),
			timeouts: Timeouts::default(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LaunchOptions {
	pub headless: bool,
	/// Use a disposable profile directory instead of the persistent one.
	pub isolated: bool,
	/// Extra browser arguments, appended last.
	pub args: Vec<String>,
	pub accept_insecure_certs: bool,
	/// Release channel; namespaces the persistent profile and steers executable lookup.
	pub channel: String,
	pub executable: Option<PathBuf>,
}

impl Default for LaunchOptions {
	fn default() -> Self {
		Self {
			headless: true,
			isolated: false,
			args: Vec::new(),
			accept_insecure_certs: false,
			channel: DEFAULT_CHANNEL.into(),
			executable: None,
		}
	}
}

/// Independent bounds for each network-facing step. None of them accumulate
/// across retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timeouts {
	/// One `/json/version` fetch, and one host-name lookup.
	pub discovery_ms: u64,
	/// One candidate: discovery plus dial.
	pub candidate_ms: u64,
	/// One WebSocket handshake.
	pub dial_ms: u64,
	/// The whole connect attempt, across all candidates.
	pub connect_ms: u64,
	pub warm_up_ms: u64,
	/// Spawn until the browser reports its endpoint.
	pub launch_ms: u64,
}

impl Default for Timeouts {
	fn default() -> Self {
		Self {
			discovery_ms: 1500,
			candidate_ms: 4000,
			dial_ms: 3000,
			connect_ms: 20_000,
			warm_up_ms: 2000,
			launch_ms: 20_000,
		}
	}
}

impl Timeouts {
	pub fn discovery(&self) -> Duration {
		Duration::from_millis(self.discovery_ms)
	}

	pub fn candidate(&self) -> Duration {
		Duration::from_millis(self.candidate_ms)
	}

	pub fn dial(&self) -> Duration {
		Duration::from_millis(self.dial_ms)
	}

	pub fn connect(&self) -> Duration {
		Duration::from_millis(self.connect_ms)
	}

	pub fn warm_up(&self) -> Duration {
		Duration::from_millis(self.warm_up_ms)
	}

	pub fn launch(&self) -> Duration {
		Duration::from_millis(self.launch_ms)
	}
}

impl BridgeConfig {
	/// Loads a JSON config file. Missing fields take their defaults.
	pub fn load(path: &Path) -> Result<Self> {
		let raw = std::fs::read_to_string(path).map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
		serde_json::from_str(&raw).map_err(|e| Error::Config(format!("invalid config {}: {e}", path.display())))
	}

	/// Applies `TETHER_*` overrides from the process environment.
	pub fn apply_env(&mut self) -> Result<()> {
		self.apply_vars(|key| std::env::var(key).ok())
	}

	/// Applies overrides from an arbitrary variable source.
	pub fn apply_vars(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<()> {
		let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

		if let Some(endpoint) = var(ENV_ENDPOINT) {
			self.endpoint = Some(endpoint);
		}
		if let Some(host) = var(ENV_HOST) {
			self.host = Some(host);
		}
		if let Some(port) = var(ENV_PORT) {
			let port = port
				.parse::<u16>()
				.map_err(|_| Error::Config(format!("{ENV_PORT}={port} is not a port number")))?;
			self.port = Some(port);
		}
		if let Some(flag) = var(ENV_NO_LAUNCH) {
			self.allow_launch = !parse_flag(&flag).ok_or_else(|| Error::Config(format!("{ENV_NO_LAUNCH}={flag} is not a boolean")))?;
		}
		if let Some(channel) = var(ENV_CHANNEL) {
			self.launch.channel = channel;
		}
		Ok(())
	}

	pub fn port_plan(&self) -> PortPlan {
		PortPlan {
			forwarding: self.forwarding_port,
			default: self.default_port,
		}
	}

	/// Built-in discovery hint set, in probe order. A configured port is
	/// tried first on every host.
	pub fn discovery_hints(&self) -> Vec<ProbeHint> {
		self.discovery_hosts.iter().map(|host| ProbeHint::new(host.clone(), self.port)).collect()
	}

	/// Settles the connect policy for this configuration.
	///
	/// An explicit endpoint beats an explicit host, which beats discovery.
	pub fn connect_options(&self) -> Result<ConnectOptions> {
		let hint = if let Some(endpoint) = &self.endpoint {
			match endpoint.parse::<TargetSpec>()? {
				spec @ (TargetSpec::Endpoint(_) | TargetSpec::Origin(_)) => DiscoveryHint::Address(spec),
				TargetSpec::Name { .. } => {
					return Err(Error::Config(format!(
						"endpoint `{endpoint}` must be a ws://, wss://, http:// or https:// URL; use host/port for names"
					)));
				}
			}
		} else if let Some(host) = &self.host {
			match host.parse::<TargetSpec>()? {
				TargetSpec::Name { host, port } => DiscoveryHint::Symbolic {
					host,
					port: port.or(self.port),
				},
				_ => return Err(Error::Config(format!("host `{host}` must be a host name or address, not a URL"))),
			}
		} else {
			DiscoveryHint::None
		};

		Ok(ConnectOptions {
			hint,
			allow_launch: self.allow_launch,
			launch: self.launch.clone(),
		})
	}
}

fn parse_flag(value: &str) -> Option<bool> {
	match value.to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}
