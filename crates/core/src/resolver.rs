//! Endpoint Resolver: fetch `/json/version` from an origin and correct the
//! advertised control-channel address.

use std::time::Duration;

use tether_protocol::VersionInfo;
use tracing::debug;

use crate::endpoint::{Origin, ReachableEndpoint};
use crate::error::{Error, Result};

/// Fetches discovery metadata. Holds only an HTTP client, so it is cheap to
/// clone and safe to reuse across attempts; nothing fetched is cached.
#[derive(Debug, Clone)]
pub struct EndpointResolver {
	client: reqwest::Client,
}

impl EndpointResolver {
	pub fn new() -> Result<Self> {
		let client = reqwest::Client::builder()
			.no_proxy()
			.build()
			.map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;
		Ok(Self { client })
	}

	/// Fetches the descriptor from `origin` and returns the endpoint to dial.
	///
	/// `origin.host` should already be a literal address; a symbolic host is
	/// passed through to the HTTP client as-is.
	pub async fn resolve(&self, origin: &Origin, timeout: Duration) -> Result<ReachableEndpoint> {
		let info = self.fetch(origin, timeout).await?;
		let endpoint = ReachableEndpoint::from_descriptor(origin, &info)?;
		debug!(
			target = "tether.resolve",
			%origin,
			advertised = ?info.web_socket_debugger_url,
			endpoint = %endpoint,
			rewritten = endpoint.rewritten,
			"resolved endpoint"
		);
		Ok(endpoint)
	}

	/// Fetches the raw descriptor.
	pub async fn fetch(&self, origin: &Origin, timeout: Duration) -> Result<VersionInfo> {
		let url = origin.discovery_url();
		let timeout_ms = timeout.as_millis() as u64;
		debug!(target = "tether.resolve", %url, timeout_ms, "fetching discovery document");

		let transport = |e: reqwest::Error| {
			if e.is_timeout() {
				Error::DiscoveryTimeout {
					origin: origin.to_string(),
					timeout_ms,
				}
			} else {
				Error::DiscoveryUnreachable {
					origin: origin.to_string(),
					reason: error_chain(&e),
				}
			}
		};

		let work = async {
			let response = self.client.get(&url).timeout(timeout).send().await.map_err(transport)?;
			let status = response.status();
			if !status.is_success() {
				return Err(Error::DiscoveryUnreachable {
					origin: origin.to_string(),
					reason: format!("unexpected status {status}"),
				});
			}
			let body = response.bytes().await.map_err(transport)?;
			serde_json::from_slice::<VersionInfo>(&body).map_err(|e| Error::DiscoveryMalformed {
				origin: origin.to_string(),
				reason: format!("invalid JSON: {e}"),
			})
		};

		// Bound the whole exchange, body included.
		tokio::time::timeout(timeout, work).await.map_err(|_| Error::DiscoveryTimeout {
			origin: origin.to_string(),
			timeout_ms,
		})?
	}
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
	let mut message = err.to_string();
	let mut source = err.source();
	while let Some(cause) = source {
		message.push_str(": ");
		message.push_str(&cause.to_string());
		source = cause.source();
	}
	message
}
