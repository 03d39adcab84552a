//! In-memory stand-ins for the network and the browser process.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tether_protocol::VersionInfo;
use tether_runtime::{ChannelFuture, ControlChannel};
use url::Url;

use crate::config::LaunchOptions;
use crate::connection::Connection;
use crate::dialer::Dialer;
use crate::endpoint::{Origin, ReachableEndpoint};
use crate::error::{Error, Result};
use crate::launcher::{Launcher, LocalInstance, ProfileDir};

pub(crate) fn endpoint(url: &str) -> ReachableEndpoint {
	ReachableEndpoint::direct(Url::parse(url).unwrap()).unwrap()
}

pub(crate) type Call = (String, Value, Option<String>);

/// Control channel that answers `Target.*` like a browser with one page.
pub(crate) struct FakeChannel {
	calls: Mutex<Vec<Call>>,
	failing: HashSet<String>,
	hanging: HashSet<String>,
	closed: AtomicBool,
}

impl FakeChannel {
	pub(crate) fn new() -> Arc<Self> {
		Self::failing(&[])
	}

	/// Channel whose listed methods return a remote error.
	pub(crate) fn failing(methods: &[&str]) -> Arc<Self> {
		Self::scripted(methods, &[])
	}

	/// Channel whose `failing` methods error and whose `hanging` methods
	/// never answer.
	pub(crate) fn scripted(failing: &[&str], hanging: &[&str]) -> Arc<Self> {
		Arc::new(Self {
			calls: Mutex::new(Vec::new()),
			failing: failing.iter().map(|m| m.to_string()).collect(),
			hanging: hanging.iter().map(|m| m.to_string()).collect(),
			closed: AtomicBool::new(false),
		})
	}

	pub(crate) fn calls(&self) -> Vec<Call> {
		self.calls.lock().clone()
	}

	pub(crate) fn methods(&self) -> Vec<String> {
		self.calls.lock().iter().map(|c| c.0.clone()).collect()
	}

	/// Simulates the peer going away.
	pub(crate) fn kill(&self) {
		self.closed.store(true, Ordering::SeqCst);
	}

	fn answer(&self, method: &str, params: &Value) -> tether_runtime::Result<Value> {
		if self.failing.contains(method) {
			return Err(tether_runtime::Error::Remote {
				code: -32000,
				message: format!("{method} refused"),
				data: None,
			});
		}
		Ok(match method {
			"Target.getTargets" => json!({
				"targetInfos": [
					{ "targetId": "page-1", "type": "page", "title": "Blank", "url": "about:blank", "attached": false },
					{ "targetId": "sw-1", "type": "service_worker", "title": "", "url": "chrome://sw", "attached": false }
				]
			}),
			"Target.attachToTarget" => json!({
				"sessionId": format!("session-{}", params["targetId"].as_str().unwrap_or_default())
			}),
			_ => json!({ "echo": method }),
		})
	}
}

impl ControlChannel for FakeChannel {
	fn send_command<'a>(&'a self, method: &'a str, params: Value, session_id: Option<&'a str>) -> ChannelFuture<'a, Value> {
		Box::pin(async move {
			if self.closed.load(Ordering::SeqCst) {
				return Err(tether_runtime::Error::ChannelClosed);
			}
			let result = self.answer(method, &params);
			self.calls.lock().push((method.to_string(), params, session_id.map(str::to_string)));
			if self.hanging.contains(method) {
				std::future::pending::<()>().await;
			}
			result
		})
	}

	fn close(&self) -> ChannelFuture<'_, ()> {
		Box::pin(async move {
			self.closed.store(true, Ordering::SeqCst);
			Ok(())
		})
	}

	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	fn url(&self) -> &str {
		"ws://fake"
	}
}

/// Scripted behaviour for one `ip:port` authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
	/// Discovery answers with a loopback advertisement; dial succeeds.
	Succeed,
	/// Discovery is unreachable. The default for unscripted authorities.
	Refuse,
	/// Discovery answers without a control-channel field.
	Malformed,
	/// Discovery succeeds; the dial is refused.
	ConnectFail,
	/// Discovery never answers.
	Hang,
}

/// Dialer driven by a table of outcomes. Records every discovery attempt.
#[derive(Default)]
pub(crate) struct FakeDialer {
	names: HashMap<String, IpAddr>,
	outcomes: HashMap<String, Outcome>,
	warm_up_failures: Vec<&'static str>,
	warm_up_hanging: Vec<&'static str>,
	attempts: Mutex<Vec<String>>,
	connects: Mutex<Vec<String>>,
	channels: Mutex<Vec<Arc<FakeChannel>>>,
}

impl FakeDialer {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	pub(crate) fn name(mut self, host: &str, ip: [u8; 4]) -> Self {
		self.names.insert(host.to_string(), IpAddr::V4(Ipv4Addr::from(ip)));
		self
	}

	pub(crate) fn outcome(mut self, authority: &str, outcome: Outcome) -> Self {
		self.outcomes.insert(authority.to_string(), outcome);
		self
	}

	/// Channels opened by this dialer fail these methods.
	pub(crate) fn warm_up_failing(mut self, methods: &[&'static str]) -> Self {
		self.warm_up_failures = methods.to_vec();
		self
	}

	/// Channels opened by this dialer never answer these methods.
	pub(crate) fn warm_up_hanging(mut self, methods: &[&'static str]) -> Self {
		self.warm_up_hanging = methods.to_vec();
		self
	}

	/// Discovery attempts, as `ip:port`, in order.
	pub(crate) fn attempts(&self) -> Vec<String> {
		self.attempts.lock().clone()
	}

	/// Dialed endpoint URLs, in order.
	pub(crate) fn connects(&self) -> Vec<String> {
		self.connects.lock().clone()
	}

	pub(crate) fn channels(&self) -> Vec<Arc<FakeChannel>> {
		self.channels.lock().clone()
	}

	fn outcome_for(&self, authority: &str) -> Outcome {
		self.outcomes.get(authority).copied().unwrap_or(Outcome::Refuse)
	}
}

#[async_trait]
impl Dialer for FakeDialer {
	async fn lookup(&self, host: &str, _timeout: Duration) -> Result<IpAddr> {
		if let Ok(ip) = host.parse() {
			return Ok(ip);
		}
		self.names.get(host).copied().ok_or_else(|| Error::SymbolicNameUnresolvable {
			name: host.to_string(),
			reason: "no such host".into(),
		})
	}

	async fn resolve(&self, origin: &Origin, _timeout: Duration) -> Result<ReachableEndpoint> {
		let authority = origin.authority();
		self.attempts.lock().push(authority.clone());
		match self.outcome_for(&authority) {
			Outcome::Succeed | Outcome::ConnectFail => {
				let info = VersionInfo {
					browser: Some("FakeChrome/1.0".into()),
					web_socket_debugger_url: Some("ws://127.0.0.1:9222/devtools/browser/fake".into()),
					..Default::default()
				};
				ReachableEndpoint::from_descriptor(origin, &info)
			}
			Outcome::Refuse => Err(Error::DiscoveryUnreachable {
				origin: origin.to_string(),
				reason: "connection refused".into(),
			}),
			Outcome::Malformed => Err(Error::DiscoveryMalformed {
				origin: origin.to_string(),
				reason: "webSocketDebuggerUrl is missing".into(),
			}),
			Outcome::Hang => {
				tokio::time::sleep(Duration::from_secs(3600)).await;
				Err(Error::Aborted("hang elapsed".into()))
			}
		}
	}

	async fn connect(&self, endpoint: &ReachableEndpoint, _timeout: Duration) -> Result<Connection> {
		self.connects.lock().push(endpoint.to_string());
		let authority = format!(
			"{}:{}",
			endpoint.url.host_str().unwrap_or_default(),
			endpoint.url.port_or_known_default().unwrap_or_default()
		);
		if self.outcome_for(&authority) == Outcome::ConnectFail {
			return Err(Error::ConnectRefused {
				target: endpoint.to_string(),
				reason: "connection refused".into(),
			});
		}
		let channel = FakeChannel::scripted(&self.warm_up_failures, &self.warm_up_hanging);
		self.channels.lock().push(Arc::clone(&channel));
		Ok(Connection::new(channel, endpoint.clone()))
	}
}

/// Launcher that hands back a fixed endpoint and counts launches.
pub(crate) struct FakeLauncher {
	launches: AtomicUsize,
	endpoint: &'static str,
	fail: bool,
}

impl FakeLauncher {
	pub(crate) fn new() -> Self {
		Self {
			launches: AtomicUsize::new(0),
			endpoint: "ws://127.0.0.1:9555/devtools/browser/launched",
			fail: false,
		}
	}

	pub(crate) fn failing() -> Self {
		Self { fail: true, ..Self::new() }
	}

	pub(crate) fn launches(&self) -> usize {
		self.launches.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl Launcher for FakeLauncher {
	async fn launch(&self, options: &LaunchOptions, _timeout: Duration) -> Result<LocalInstance> {
		self.launches.fetch_add(1, Ordering::SeqCst);
		if self.fail {
			return Err(Error::LaunchFailed("no browser installed".into()));
		}
		let profile = ProfileDir::Persistent(PathBuf::from(format!("/tmp/tether-fake/{}", options.channel)));
		Ok(LocalInstance::new(endpoint(self.endpoint), profile, None))
	}
}
