//! Session Context: the capability view over one connection.
//!
//! A context is never mutated after construction. When the manager replaces
//! the connection it builds a new context and retires the old one, so a
//! caller still holding the old `Arc` gets [`Error::StaleSession`] instead of
//! talking to the wrong browser.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use serde_json::Value;
use tether_protocol::TargetInfo;

use crate::connection::Connection;
use crate::endpoint::{Origin, ReachableEndpoint};
use crate::error::{Error, Result};

/// How the current instance was acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceSource {
	Explicit,
	Discovered,
	Launched,
	Switched,
}

#[derive(Debug)]
pub struct SessionContext {
	generation: u64,
	connection: Connection,
	source: InstanceSource,
	contexts: Vec<TargetInfo>,
	page_session: Option<String>,
	retired: AtomicBool,
}

/// Inspection record for the current instance.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInfo {
	pub endpoint: String,
	pub origin: Option<Origin>,
	pub browser: Option<String>,
	pub generation: u64,
	pub source: InstanceSource,
	pub rewritten: bool,
	pub contexts: Vec<TargetInfo>,
	pub page_session: Option<String>,
}

impl SessionContext {
	pub(crate) fn new(generation: u64, connection: Connection, source: InstanceSource, contexts: Vec<TargetInfo>, page_session: Option<String>) -> Self {
		Self {
			generation,
			connection,
			source,
			contexts,
			page_session,
			retired: AtomicBool::new(false),
		}
	}

	pub fn generation(&self) -> u64 {
		self.generation
	}

	pub fn connection(&self) -> &Connection {
		&self.connection
	}

	pub fn endpoint(&self) -> &ReachableEndpoint {
		self.connection.endpoint()
	}

	pub fn source(&self) -> InstanceSource {
		self.source
	}

	/// Contexts observed when this session was built.
	pub fn contexts(&self) -> &[TargetInfo] {
		&self.contexts
	}

	/// Flat-mode session id of the page attached during warm-up.
	pub fn page_session(&self) -> Option<&str> {
		self.page_session.as_deref()
	}

	pub fn first_page(&self) -> Option<&TargetInfo> {
		self.contexts.iter().find(|t| t.is_page())
	}

	/// Whether this context still speaks for the active connection.
	pub fn is_current(&self) -> bool {
		!self.retired.load(Ordering::Acquire) && self.connection.is_alive()
	}

	/// Sends a browser-level command.
	pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
		self.send_to(None, method, params).await
	}

	/// Sends a command to the page attached during warm-up.
	pub async fn send_to_page(&self, method: &str, params: Value) -> Result<Value> {
		let session = self.page_session.as_deref().ok_or_else(|| Error::InvalidTarget {
			input: "page".into(),
			reason: "no page target was attached on this connection".into(),
		})?;
		self.send_to(Some(session), method, params).await
	}

	/// Sends a command to an explicit flat-mode session, or the browser when `None`.
	pub async fn send_to(&self, session_id: Option<&str>, method: &str, params: Value) -> Result<Value> {
		self.ensure_current()?;
		self.connection.send(method, params, session_id).await
	}

	/// Fetches the live target list.
	pub async fn targets(&self) -> Result<Vec<TargetInfo>> {
		self.ensure_current()?;
		self.connection.refresh_contexts().await
	}

	pub fn info(&self) -> InstanceInfo {
		let endpoint = self.connection.endpoint();
		InstanceInfo {
			endpoint: endpoint.to_string(),
			origin: endpoint.origin.clone(),
			browser: endpoint.browser.clone(),
			generation: self.generation,
			source: self.source,
			rewritten: endpoint.rewritten,
			contexts: self.contexts.clone(),
			page_session: self.page_session.clone(),
		}
	}

	pub(crate) fn retire(&self) {
		self.retired.store(true, Ordering::Release);
	}

	fn ensure_current(&self) -> Result<()> {
		if self.is_current() {
			Ok(())
		} else {
			Err(Error::StaleSession {
				generation: self.generation,
			})
		}
	}
}
