//! Network seam: name lookup, discovery and control-channel dialing.
//!
//! The prober and the manager only talk to a [`Dialer`], so tests can script
//! per-candidate outcomes without opening sockets.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tether_runtime::{CdpConnection, ControlChannel};
use tracing::debug;

use crate::connection::Connection;
use crate::endpoint::{Origin, ReachableEndpoint};
use crate::error::{Error, Result};
use crate::resolver::EndpointResolver;

#[async_trait]
pub trait Dialer: Send + Sync {
	/// Resolves a host to one literal address. Literals come back unchanged.
	async fn lookup(&self, host: &str, timeout: Duration) -> Result<IpAddr>;

	/// Runs the endpoint resolver against `origin`.
	async fn resolve(&self, origin: &Origin, timeout: Duration) -> Result<ReachableEndpoint>;

	/// Opens the control channel at `endpoint`.
	async fn connect(&self, endpoint: &ReachableEndpoint, timeout: Duration) -> Result<Connection>;
}

/// Real network implementation.
#[derive(Debug, Clone)]
pub struct NetworkDialer {
	resolver: EndpointResolver,
}

impl NetworkDialer {
	pub fn new() -> Result<Self> {
		Ok(Self {
			resolver: EndpointResolver::new()?,
		})
	}
}

#[async_trait]
impl Dialer for NetworkDialer {
	async fn lookup(&self, host: &str, timeout: Duration) -> Result<IpAddr> {
		if let Ok(ip) = host.parse::<IpAddr>() {
			return Ok(ip);
		}

		let unresolvable = |reason: String| Error::SymbolicNameUnresolvable {
			name: host.to_string(),
			reason,
		};
		let addrs: Vec<IpAddr> = tokio::time::timeout(timeout, tokio::net::lookup_host((host, 0)))
			.await
			.map_err(|_| unresolvable(format!("lookup timed out after {}ms", timeout.as_millis())))?
			.map_err(|e| unresolvable(e.to_string()))?
			.map(|addr| addr.ip())
			.collect();

		let chosen = prefer_ipv4(&addrs).ok_or_else(|| unresolvable("no addresses returned".into()))?;
		debug!(target = "tether.resolve", host, address = %chosen, candidates = addrs.len(), "resolved host name");
		Ok(chosen)
	}

	async fn resolve(&self, origin: &Origin, timeout: Duration) -> Result<ReachableEndpoint> {
		self.resolver.resolve(origin, timeout).await
	}

	async fn connect(&self, endpoint: &ReachableEndpoint, timeout: Duration) -> Result<Connection> {
		let target = endpoint.to_string();
		debug!(target = "tether.connect", endpoint = %target, timeout_ms = timeout.as_millis() as u64, "dialing control channel");
		let channel = CdpConnection::connect(endpoint.as_str(), timeout).await.map_err(|e| match e {
			tether_runtime::Error::Timeout(_) => Error::ConnectTimeout {
				target: target.clone(),
				timeout_ms: timeout.as_millis() as u64,
			},
			other => Error::ConnectRefused {
				target: target.clone(),
				reason: other.to_string(),
			},
		})?;
		let channel: Arc<dyn ControlChannel> = channel;
		Ok(Connection::new(channel, endpoint.clone()))
	}
}

/// First IPv4 address if any, otherwise the first address.
pub(crate) fn prefer_ipv4(addrs: &[IpAddr]) -> Option<IpAddr> {
	addrs.iter().copied().find(IpAddr::is_ipv4).or_else(|| addrs.first().copied())
}
