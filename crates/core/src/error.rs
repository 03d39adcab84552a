//! Error taxonomy for the orchestrator.
//!
//! Every network-facing failure is converted into a variant carrying the
//! attempted target and the cause before it leaves the component that saw it.

use std::path::PathBuf;

use serde_json::{Value, json};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// One candidate's reason for failing, kept for aggregate reporting.
#[derive(Debug)]
pub struct CandidateFailure {
	/// Human-readable candidate, e.g. `"10.0.0.5:9222"`.
	pub target: String,
	pub error: Error,
}

#[derive(Debug, Error)]
pub enum Error {
	#[error("discovery at {origin} timed out after {timeout_ms}ms")]
	DiscoveryTimeout { origin: String, timeout_ms: u64 },

	#[error("discovery at {origin} returned malformed metadata: {reason}")]
	DiscoveryMalformed { origin: String, reason: String },

	#[error("discovery at {origin} unreachable: {reason}")]
	DiscoveryUnreachable { origin: String, reason: String },

	#[error("connecting to {target} timed out after {timeout_ms}ms")]
	ConnectTimeout { target: String, timeout_ms: u64 },

	#[error("could not connect to {target}: {reason}")]
	ConnectRefused { target: String, reason: String },

	#[error("no candidate succeeded ({} tried){}", failures.len(), format_failures(failures))]
	NoCandidatesSucceeded { failures: Vec<CandidateFailure> },

	#[error("a browser is already running with profile {}{}", profile_dir.display(), pid.map(|p| format!(" (pid {p})")).unwrap_or_default())]
	AlreadyRunning { profile_dir: PathBuf, pid: Option<u32> },

	#[error("could not resolve host name `{name}`: {reason}")]
	SymbolicNameUnresolvable { name: String, reason: String },

	#[error("exclusive dispatch invariant violated")]
	ExclusivityViolation,

	#[error("browser launch failed: {0}")]
	LaunchFailed(String),

	#[error("session generation {generation} is stale: its connection was closed or replaced")]
	StaleSession { generation: u64 },

	#[error("invalid target `{input}`: {reason}")]
	InvalidTarget { input: String, reason: String },

	#[error("command {method} failed: {source}")]
	Command {
		method: String,
		#[source]
		source: tether_runtime::Error,
	},

	#[error("configuration error: {0}")]
	Config(String),

	#[error("operation aborted: {0}")]
	Aborted(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

fn format_failures(failures: &[CandidateFailure]) -> String {
	failures.iter().map(|f| format!("; {}: {}", f.target, f.error)).collect()
}

impl Error {
	/// Stable machine-readable code for structured failure payloads.
	pub fn code(&self) -> &'static str {
		match self {
			Error::DiscoveryTimeout { .. } => "DISCOVERY_TIMEOUT",
			Error::DiscoveryMalformed { .. } => "DISCOVERY_MALFORMED",
			Error::DiscoveryUnreachable { .. } => "DISCOVERY_UNREACHABLE",
			Error::ConnectTimeout { .. } => "CONNECT_TIMEOUT",
			Error::ConnectRefused { .. } => "CONNECT_REFUSED",
			Error::NoCandidatesSucceeded { .. } => "NO_CANDIDATES_SUCCEEDED",
			Error::AlreadyRunning { .. } => "ALREADY_RUNNING",
			Error::SymbolicNameUnresolvable { .. } => "NAME_UNRESOLVABLE",
			Error::ExclusivityViolation => "INTERNAL_ERROR",
			Error::LaunchFailed(_) => "LAUNCH_FAILED",
			Error::StaleSession { .. } => "STALE_SESSION",
			Error::InvalidTarget { .. } => "INVALID_TARGET",
			Error::Command { .. } => "COMMAND_FAILED",
			Error::Config(_) => "CONFIG_ERROR",
			Error::Aborted(_) => "ABORTED",
			Error::Io(_) => "IO_ERROR",
		}
	}

	/// Structured details for the failure payload, when the variant has any.
	pub fn details(&self) -> Option<Value> {
		match self {
			Error::DiscoveryTimeout { origin, timeout_ms } => Some(json!({ "origin": origin, "timeoutMs": timeout_ms })),
			Error::DiscoveryMalformed { origin, .. } | Error::DiscoveryUnreachable { origin, .. } => Some(json!({ "origin": origin })),
			Error::ConnectTimeout { target, timeout_ms } => Some(json!({ "target": target, "timeoutMs": timeout_ms })),
			Error::ConnectRefused { target, .. } => Some(json!({ "target": target })),
			Error::NoCandidatesSucceeded { failures } => Some(json!({
				"candidates": failures
					.iter()
					.map(|f| json!({ "target": f.target, "code": f.error.code(), "message": f.error.to_string() }))
					.collect::<Vec<_>>()
			})),
			Error::AlreadyRunning { profile_dir, pid } => Some(json!({ "profileDir": profile_dir, "pid": pid })),
			Error::SymbolicNameUnresolvable { name, .. } => Some(json!({ "name": name })),
			Error::StaleSession { generation } => Some(json!({ "generation": generation })),
			Error::InvalidTarget { input, .. } => Some(json!({ "input": input })),
			Error::Command { method, source } => Some(match source {
				tether_runtime::Error::Remote { code, .. } => json!({ "method": method, "remoteCode": code }),
				_ => json!({ "method": method }),
			}),
			_ => None,
		}
	}

	/// Returns true for any timeout along the connect path.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::DiscoveryTimeout { .. } | Error::ConnectTimeout { .. })
	}

	pub(crate) fn command(method: &str, source: tether_runtime::Error) -> Self {
		Error::Command {
			method: method.to_string(),
			source,
		}
	}

	pub(crate) fn invalid_target(input: &str, reason: impl Into<String>) -> Self {
		Error::InvalidTarget {
			input: input.to_string(),
			reason: reason.into(),
		}
	}
}
