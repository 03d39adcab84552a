//! Addresses: discovery origins, dialable endpoints and the rewrite rule
//! that turns an advertised control-channel address into a reachable one.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::Serialize;
use tether_protocol::VersionInfo;
use url::{Host, Url};

use crate::error::{Error, Result};

/// Discovery endpoint location: scheme, host and port.
///
/// The host is stored without IPv6 brackets and may be symbolic, in which
/// case it has to be resolved before dialing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Origin {
	pub scheme: String,
	pub host: String,
	pub port: u16,
}

impl Origin {
	/// Plain-HTTP origin for a host and port.
	pub fn http(host: impl Into<String>, port: u16) -> Self {
		Self {
			scheme: "http".into(),
			host: strip_brackets(&host.into()).to_string(),
			port,
		}
	}

	/// Parses an `http://` or `https://` URL. Path, query and fragment are ignored.
	pub fn parse(input: &str) -> Result<Self> {
		let url = Url::parse(input).map_err(|e| Error::invalid_target(input, e.to_string()))?;
		if !matches!(url.scheme(), "http" | "https") {
			return Err(Error::invalid_target(input, "discovery origins must use http or https"));
		}
		let host = match url.host() {
			Some(Host::Domain(d)) => d.to_string(),
			Some(Host::Ipv4(ip)) => ip.to_string(),
			Some(Host::Ipv6(ip)) => ip.to_string(),
			None => return Err(Error::invalid_target(input, "missing host")),
		};
		let port = url
			.port_or_known_default()
			.ok_or_else(|| Error::invalid_target(input, "missing port"))?;
		Ok(Self {
			scheme: url.scheme().to_string(),
			host,
			port,
		})
	}

	/// True when the host is a name rather than a literal address.
	pub fn is_symbolic(&self) -> bool {
		self.host.parse::<IpAddr>().is_err()
	}

	/// Same origin with the host replaced by a literal address.
	pub fn with_host(&self, address: IpAddr) -> Self {
		Self {
			scheme: self.scheme.clone(),
			host: address.to_string(),
			port: self.port,
		}
	}

	/// `host:port`, bracketing IPv6 literals.
	pub fn authority(&self) -> String {
		format!("{}:{}", bracketed(&self.host), self.port)
	}

	pub fn discovery_url(&self) -> String {
		format!("{}://{}{}", self.scheme, self.authority(), tether_protocol::VERSION_PATH)
	}
}

impl fmt::Display for Origin {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}://{}", self.scheme, self.authority())
	}
}

/// The control-channel address actually dialed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReachableEndpoint {
	pub url: Url,
	/// Origin the endpoint was discovered through; `None` when dialed directly.
	pub origin: Option<Origin>,
	/// Whether the advertised address was rewritten to the origin's host/port.
	pub rewritten: bool,
	/// Version string reported by the discovery document.
	pub browser: Option<String>,
}

impl ReachableEndpoint {
	/// Endpoint supplied by the caller, dialed without discovery.
	pub fn direct(url: Url) -> Result<Self> {
		if !matches!(url.scheme(), "ws" | "wss") {
			return Err(Error::invalid_target(url.as_str(), "control-channel endpoints must use ws or wss"));
		}
		if url.host().is_none() {
			return Err(Error::invalid_target(url.as_str(), "missing host"));
		}
		Ok(Self {
			url,
			origin: None,
			rewritten: false,
			browser: None,
		})
	}

	/// Builds the endpoint from a freshly fetched discovery document.
	pub fn from_descriptor(origin: &Origin, info: &VersionInfo) -> Result<Self> {
		let malformed = |reason: String| Error::DiscoveryMalformed {
			origin: origin.to_string(),
			reason,
		};

		let advertised = info
			.web_socket_debugger_url
			.as_deref()
			.filter(|s| !s.trim().is_empty())
			.ok_or_else(|| malformed("webSocketDebuggerUrl is missing".into()))?;
		let advertised = Url::parse(advertised).map_err(|e| malformed(format!("webSocketDebuggerUrl `{advertised}` is not a URL: {e}")))?;
		if !matches!(advertised.scheme(), "ws" | "wss") {
			return Err(malformed(format!("webSocketDebuggerUrl has unsupported scheme `{}`", advertised.scheme())));
		}

		let (url, rewritten) = correct_endpoint(origin, &advertised).map_err(malformed)?;
		Ok(Self {
			url,
			origin: Some(origin.clone()),
			rewritten,
			browser: info.browser.clone(),
		})
	}

	pub fn as_str(&self) -> &str {
		self.url.as_str()
	}
}

impl fmt::Display for ReachableEndpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.url.as_str())
	}
}

/// Applies the reachability rewrite.
///
/// The origin's host and port replace the advertised ones when the advertised
/// host is loopback or unspecified, or when the ports differ. An address that
/// is already reachable comes back untouched.
pub fn correct_endpoint(origin: &Origin, advertised: &Url) -> std::result::Result<(Url, bool), String> {
	let host_unreachable = match advertised.host() {
		Some(Host::Domain(d)) => d.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => ip.is_loopback() || ip.is_unspecified(),
		Some(Host::Ipv6(ip)) => ip.is_loopback() || ip.is_unspecified(),
		None => true,
	};
	let port_mismatch = advertised.port_or_known_default() != Some(origin.port);

	if !host_unreachable && !port_mismatch {
		return Ok((advertised.clone(), false));
	}

	let mut url = advertised.clone();
	url.set_host(Some(&bracketed(&origin.host)))
		.map_err(|e| format!("cannot substitute host `{}`: {e}", origin.host))?;
	url.set_port(Some(origin.port))
		.map_err(|()| format!("cannot substitute port {}", origin.port))?;
	Ok((url, true))
}

/// What an instance switch (or an explicit connect) points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
	/// Control-channel URL dialed directly.
	Endpoint(ReachableEndpoint),
	/// Discovery origin, resolved then dialed.
	Origin(Origin),
	/// Host name or literal with an optional port, expanded through the prober.
	Name { host: String, port: Option<u16> },
}

impl FromStr for TargetSpec {
	type Err = Error;

	fn from_str(input: &str) -> Result<Self> {
		let s = input.trim();
		if s.is_empty() {
			return Err(Error::invalid_target(input, "empty target"));
		}

		let lower = s.to_ascii_lowercase();
		if lower.starts_with("ws://") || lower.starts_with("wss://") {
			let url = Url::parse(s).map_err(|e| Error::invalid_target(input, e.to_string()))?;
			return ReachableEndpoint::direct(url).map(TargetSpec::Endpoint);
		}
		if lower.starts_with("http://") || lower.starts_with("https://") {
			return Origin::parse(s).map(TargetSpec::Origin);
		}
		if s.contains("://") {
			return Err(Error::invalid_target(input, "unsupported scheme"));
		}

		let (host, port) = split_host_port(s).map_err(|reason| Error::invalid_target(input, reason))?;
		Ok(TargetSpec::Name { host, port })
	}
}

impl fmt::Display for TargetSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TargetSpec::Endpoint(endpoint) => endpoint.fmt(f),
			TargetSpec::Origin(origin) => origin.fmt(f),
			TargetSpec::Name { host, port: Some(port) } => write!(f, "{}:{port}", bracketed(host)),
			TargetSpec::Name { host, port: None } => f.write_str(host),
		}
	}
}

fn split_host_port(s: &str) -> std::result::Result<(String, Option<u16>), String> {
	// Bare IPv6 literal.
	if s.parse::<std::net::Ipv6Addr>().is_ok() {
		return Ok((s.to_string(), None));
	}

	let (host, port) = if let Some(rest) = s.strip_prefix('[') {
		let (host, tail) = rest.split_once(']').ok_or("unterminated `[`")?;
		match tail {
			"" => (host, None),
			t => (host, Some(t.strip_prefix(':').ok_or("expected `:` after `]`")?)),
		}
	} else {
		match s.rsplit_once(':') {
			Some((host, port)) => (host, Some(port)),
			None => (s, None),
		}
	};

	if host.is_empty() {
		return Err("missing host".into());
	}
	if host.contains('/') || host.chars().any(char::is_whitespace) {
		return Err(format!("`{host}` is not a host name"));
	}
	let port = port
		.map(|p| p.parse::<u16>().map_err(|_| format!("`{p}` is not a port number")))
		.transpose()?;
	if port == Some(0) {
		return Err("port 0 is not dialable".into());
	}
	Ok((host.to_string(), port))
}

fn strip_brackets(host: &str) -> &str {
	host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host)
}

fn bracketed(host: &str) -> String {
	if host.contains(':') { format!("[{host}]") } else { host.to_string() }
}
