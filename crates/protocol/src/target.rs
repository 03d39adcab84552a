//! Top-level contexts exposed by the remote process.

use serde::{Deserialize, Serialize};

/// `Target.TargetInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
	pub target_id: String,
	/// `"page"`, `"iframe"`, `"service_worker"`, `"browser"`, ...
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub attached: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub browser_context_id: Option<String>,
}

impl TargetInfo {
	/// Returns true for top-level page targets.
	pub fn is_page(&self) -> bool {
		self.kind == "page"
	}
}

/// Result of `Target.getTargets`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTargetsResult {
	#[serde(default)]
	pub target_infos: Vec<TargetInfo>,
}

/// Result of `Target.attachToTarget`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachToTargetResult {
	pub session_id: String,
}
