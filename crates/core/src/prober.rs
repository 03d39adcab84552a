//! Candidate Prober: hints to ordered candidates, then resolve + connect on
//! each until one works.
//!
//! Probing is sequential. When several candidates would succeed, the first
//! declared one wins, and on total failure every candidate's reason is kept.

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::Timeouts;
use crate::connection::Connection;
use crate::dialer::Dialer;
use crate::endpoint::{Origin, ReachableEndpoint};
use crate::error::{CandidateFailure, Error, Result};

/// Where to look: a host (literal or symbolic) and an optional explicit port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeHint {
	pub scheme: String,
	pub host: String,
	pub port: Option<u16>,
}

impl ProbeHint {
	pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
		Self {
			scheme: "http".into(),
			host: host.into(),
			port,
		}
	}

	/// Hint for an explicit discovery origin; its port is the explicit one.
	pub fn from_origin(origin: &Origin) -> Self {
		Self {
			scheme: origin.scheme.clone(),
			host: origin.host.clone(),
			port: Some(origin.port),
		}
	}
}

impl fmt::Display for ProbeHint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let host = if self.host.contains(':') { format!("[{}]", self.host) } else { self.host.clone() };
		match self.port {
			Some(port) => write!(f, "{host}:{port}"),
			None => f.write_str(&host),
		}
	}
}

/// One (literal address, port) pair to try.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
	pub address: IpAddr,
	pub port: u16,
	pub scheme: String,
	/// The hint this candidate was expanded from.
	pub label: String,
}

impl Candidate {
	pub fn origin(&self) -> Origin {
		Origin {
			scheme: self.scheme.clone(),
			host: self.address.to_string(),
			port: self.port,
		}
	}
}

impl fmt::Display for Candidate {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.address {
			IpAddr::V4(ip) => write!(f, "{ip}:{}", self.port),
			IpAddr::V6(ip) => write!(f, "[{ip}]:{}", self.port),
		}
	}
}

/// Well-known ports appended after any explicit one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPlan {
	pub forwarding: u16,
	pub default: u16,
}

impl PortPlan {
	/// `[explicit, forwarding, default]`, duplicates removed, order kept.
	pub fn candidate_ports(&self, explicit: Option<u16>) -> Vec<u16> {
		let mut ports = Vec::with_capacity(3);
		for port in explicit.into_iter().chain([self.forwarding, self.default]) {
			if !ports.contains(&port) {
				ports.push(port);
			}
		}
		ports
	}
}

/// Drops later duplicates by (address, port), keeping first-declared order.
pub fn dedupe(candidates: Vec<Candidate>) -> Vec<Candidate> {
	let mut seen = HashSet::new();
	candidates.into_iter().filter(|c| seen.insert((c.address, c.port))).collect()
}

pub struct CandidateProber<'a> {
	dialer: &'a dyn Dialer,
	ports: PortPlan,
	timeouts: &'a Timeouts,
}

impl<'a> CandidateProber<'a> {
	pub fn new(dialer: &'a dyn Dialer, ports: PortPlan, timeouts: &'a Timeouts) -> Self {
		Self { dialer, ports, timeouts }
	}

	/// Expands hints and probes the result.
	pub async fn probe(&self, hints: &[ProbeHint]) -> Result<(Connection, ReachableEndpoint)> {
		let candidates = self.expand(hints).await?;
		self.probe_candidates(&candidates).await
	}

	/// Resolves every hint to a literal address and generates its ports.
	///
	/// A hint whose name does not resolve is dropped while others remain.
	/// When none resolve, a lone hint reports its own lookup error and several
	/// hints report every lookup failure.
	pub async fn expand(&self, hints: &[ProbeHint]) -> Result<Vec<Candidate>> {
		let mut candidates = Vec::new();
		let mut unresolved = Vec::new();

		for hint in hints {
			let address = match self.dialer.lookup(&hint.host, self.timeouts.discovery()).await {
				Ok(address) => address,
				Err(error) => {
					debug!(target = "tether.probe", hint = %hint, error = %error, "dropping unresolvable hint");
					unresolved.push(CandidateFailure {
						target: hint.to_string(),
						error,
					});
					continue;
				}
			};
			for port in self.ports.candidate_ports(hint.port) {
				candidates.push(Candidate {
					address,
					port,
					scheme: hint.scheme.clone(),
					label: hint.to_string(),
				});
			}
		}

		if candidates.is_empty() {
			if hints.len() == 1 && unresolved.len() == 1 {
				return Err(unresolved.remove(0).error);
			}
			return Err(Error::NoCandidatesSucceeded { failures: unresolved });
		}

		let candidates = dedupe(candidates);
		debug!(
			target = "tether.probe",
			candidates = %candidates.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
			"expanded hints"
		);
		Ok(candidates)
	}

	/// Tries each candidate in order, returning the first success.
	pub async fn probe_candidates(&self, candidates: &[Candidate]) -> Result<(Connection, ReachableEndpoint)> {
		let mut failures = Vec::with_capacity(candidates.len());

		for candidate in candidates {
			match self.attempt(candidate).await {
				Ok((connection, endpoint)) => {
					info!(
						target = "tether.probe",
						candidate = %candidate,
						endpoint = %endpoint,
						rewritten = endpoint.rewritten,
						failed_before = failures.len(),
						"candidate connected"
					);
					return Ok((connection, endpoint));
				}
				Err(error) => {
					debug!(target = "tether.probe", candidate = %candidate, error = %error, "candidate failed");
					failures.push(CandidateFailure {
						target: candidate.to_string(),
						error,
					});
				}
			}
		}

		Err(Error::NoCandidatesSucceeded { failures })
	}

	async fn attempt(&self, candidate: &Candidate) -> Result<(Connection, ReachableEndpoint)> {
		let bound = self.timeouts.candidate();
		let work = async {
			let endpoint = self.dialer.resolve(&candidate.origin(), self.timeouts.discovery()).await?;
			let connection = self.dialer.connect(&endpoint, self.timeouts.dial()).await?;
			Ok((connection, endpoint))
		};
		tokio::time::timeout(bound, work).await.map_err(|_| Error::ConnectTimeout {
			target: candidate.to_string(),
			timeout_ms: bound.as_millis() as u64,
		})?
	}
}

#[cfg(test)]
mod tests {
	use std::net::Ipv4Addr;
	use std::time::Duration;

	use super::*;
	use crate::testing::{FakeDialer, Outcome};

	const PLAN: PortPlan = PortPlan {
		forwarding: 9999,
		default: 9222,
	};

	fn candidate(ip: [u8; 4], port: u16) -> Candidate {
		Candidate {
			address: IpAddr::V4(Ipv4Addr::from(ip)),
			port,
			scheme: "http".into(),
			label: "test".into(),
		}
	}

	fn fast() -> Timeouts {
		Timeouts {
			discovery_ms: 200,
			candidate_ms: 300,
			dial_ms: 200,
			..Timeouts::default()
		}
	}

	#[test]
	fn duplicate_candidates_collapse_in_order() {
		let deduped = dedupe(vec![candidate([10, 0, 0, 5], 9222), candidate([10, 0, 0, 5], 9999), candidate([10, 0, 0, 5], 9222)]);
		let shown: Vec<String> = deduped.iter().map(ToString::to_string).collect();
		assert_eq!(shown, vec!["10.0.0.5:9222", "10.0.0.5:9999"]);
	}

	#[test]
	fn port_order_is_explicit_forwarding_default() {
		assert_eq!(PLAN.candidate_ports(Some(9333)), vec![9333, 9999, 9222]);
		assert_eq!(PLAN.candidate_ports(Some(9222)), vec![9222, 9999]);
		assert_eq!(PLAN.candidate_ports(None), vec![9999, 9222]);
	}

	#[tokio::test]
	async fn first_success_wins_after_failures() {
		let dialer = FakeDialer::new()
			.outcome("10.0.0.1:9222", Outcome::Refuse)
			.outcome("10.0.0.2:9222", Outcome::Malformed)
			.outcome("10.0.0.3:9222", Outcome::Succeed)
			.outcome("10.0.0.4:9222", Outcome::Succeed);
		let timeouts = fast();
		let prober = CandidateProber::new(&dialer, PLAN, &timeouts);

		let (connection, endpoint) = prober
			.probe_candidates(&[
				candidate([10, 0, 0, 1], 9222),
				candidate([10, 0, 0, 2], 9222),
				candidate([10, 0, 0, 3], 9222),
				candidate([10, 0, 0, 4], 9222),
			])
			.await
			.unwrap();
		assert!(endpoint.as_str().starts_with("ws://10.0.0.3:9222/"));
		assert_eq!(connection.endpoint(), &endpoint);
		assert_eq!(dialer.attempts(), vec!["10.0.0.1:9222", "10.0.0.2:9222", "10.0.0.3:9222"]);
	}

	#[tokio::test]
	async fn total_failure_lists_every_reason_in_order() {
		let dialer = FakeDialer::new()
			.outcome("10.0.0.1:9222", Outcome::Refuse)
			.outcome("10.0.0.2:9222", Outcome::Malformed)
			.outcome("10.0.0.3:9222", Outcome::ConnectFail);
		let timeouts = fast();
		let prober = CandidateProber::new(&dialer, PLAN, &timeouts);

		let err = prober
			.probe_candidates(&[candidate([10, 0, 0, 1], 9222), candidate([10, 0, 0, 2], 9222), candidate([10, 0, 0, 3], 9222)])
			.await
			.unwrap_err();
		let Error::NoCandidatesSucceeded { failures } = err else {
			panic!("expected aggregate error, got {err:?}");
		};
		let targets: Vec<&str> = failures.iter().map(|f| f.target.as_str()).collect();
		assert_eq!(targets, vec!["10.0.0.1:9222", "10.0.0.2:9222", "10.0.0.3:9222"]);
		assert!(matches!(failures[0].error, Error::DiscoveryUnreachable { .. }));
		assert!(matches!(failures[1].error, Error::DiscoveryMalformed { .. }));
		assert!(matches!(failures[2].error, Error::ConnectRefused { .. }));
	}

	#[tokio::test]
	async fn hung_candidate_does_not_starve_the_next() {
		let dialer = FakeDialer::new()
			.outcome("10.0.0.1:9222", Outcome::Hang)
			.outcome("10.0.0.2:9222", Outcome::Succeed);
		let timeouts = fast();
		let prober = CandidateProber::new(&dialer, PLAN, &timeouts);

		let started = std::time::Instant::now();
		let (_, endpoint) = prober
			.probe_candidates(&[candidate([10, 0, 0, 1], 9222), candidate([10, 0, 0, 2], 9222)])
			.await
			.unwrap();
		assert!(endpoint.as_str().starts_with("ws://10.0.0.2:9222/"));
		assert!(started.elapsed() < Duration::from_secs(2));
	}

	#[tokio::test]
	async fn unresolvable_hint_is_dropped_when_others_remain() {
		let dialer = FakeDialer::new()
			.name("browser.lan", [10, 0, 0, 5])
			.outcome("10.0.0.5:9222", Outcome::Succeed);
		let timeouts = fast();
		let prober = CandidateProber::new(&dialer, PLAN, &timeouts);

		let (_, endpoint) = prober
			.probe(&[ProbeHint::new("ghost.lan", None), ProbeHint::new("browser.lan", None)])
			.await
			.unwrap();
		assert!(endpoint.as_str().starts_with("ws://10.0.0.5:9222/"));
		assert_eq!(dialer.attempts(), vec!["10.0.0.5:9999", "10.0.0.5:9222"]);
	}

	#[tokio::test]
	async fn lone_unresolvable_hint_fails_clearly() {
		let dialer = FakeDialer::new();
		let timeouts = fast();
		let prober = CandidateProber::new(&dialer, PLAN, &timeouts);

		let err = prober.probe(&[ProbeHint::new("ghost.lan", Some(9222))]).await.unwrap_err();
		assert!(matches!(err, Error::SymbolicNameUnresolvable { ref name, .. } if name == "ghost.lan"), "{err:?}");
		assert!(dialer.attempts().is_empty());
	}

	#[tokio::test]
	async fn all_hints_unresolvable_lists_each() {
		let dialer = FakeDialer::new();
		let timeouts = fast();
		let prober = CandidateProber::new(&dialer, PLAN, &timeouts);

		let err = prober
			.probe(&[ProbeHint::new("ghost.lan", None), ProbeHint::new("phantom.lan", None)])
			.await
			.unwrap_err();
		let Error::NoCandidatesSucceeded { failures } = err else {
			panic!("expected aggregate error, got {err:?}");
		};
		assert_eq!(failures.len(), 2);
		assert!(failures.iter().all(|f| matches!(f.error, Error::SymbolicNameUnresolvable { .. })));
	}

	#[tokio::test]
	async fn expansion_dedupes_across_hints() {
		let dialer = FakeDialer::new().name("browser.lan", [10, 0, 0, 5]);
		let timeouts = fast();
		let prober = CandidateProber::new(&dialer, PLAN, &timeouts);

		let candidates = prober
			.expand(&[ProbeHint::new("10.0.0.5", Some(9222)), ProbeHint::new("browser.lan", None)])
			.await
			.unwrap();
		let shown: Vec<String> = candidates.iter().map(ToString::to_string).collect();
		assert_eq!(shown, vec!["10.0.0.5:9222", "10.0.0.5:9999"]);
		assert_eq!(candidates[0].label, "10.0.0.5:9222");
	}
}
