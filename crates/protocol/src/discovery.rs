//! Discovery endpoint document.

use serde::{Deserialize, Serialize};

/// Well-known path of the discovery document, relative to an origin.
pub const VERSION_PATH: &str = "/json/version";

/// `/json/version` response from a remote-debuggable process.
///
/// Every field is optional on the wire. A document without
/// [`web_socket_debugger_url`](Self::web_socket_debugger_url) is malformed
/// from tether's point of view, but deserializes fine so the caller can say so.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
	/// Product and version, e.g. `"Chrome/126.0.6478.126"`.
	#[serde(rename = "Browser", default, skip_serializing_if = "Option::is_none")]
	pub browser: Option<String>,
	#[serde(rename = "Protocol-Version", default, skip_serializing_if = "Option::is_none")]
	pub protocol_version: Option<String>,
	#[serde(rename = "User-Agent", default, skip_serializing_if = "Option::is_none")]
	pub user_agent: Option<String>,
	#[serde(rename = "V8-Version", default, skip_serializing_if = "Option::is_none")]
	pub v8_version: Option<String>,
	/// Advertised control-channel address. Frequently names a loopback
	/// interface the caller cannot reach.
	#[serde(rename = "webSocketDebuggerUrl", default, skip_serializing_if = "Option::is_none")]
	pub web_socket_debugger_url: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_chrome_version_document() {
		let raw = r#"{
			"Browser": "Chrome/126.0.6478.126",
			"Protocol-Version": "1.3",
			"User-Agent": "Mozilla/5.0",
			"V8-Version": "12.6.228.21",
			"WebKit-Version": "537.36",
			"webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/abc"
		}"#;
		let info: VersionInfo = serde_json::from_str(raw).unwrap();
		assert_eq!(info.browser.as_deref(), Some("Chrome/126.0.6478.126"));
		assert_eq!(info.web_socket_debugger_url.as_deref(), Some("ws://127.0.0.1:9222/devtools/browser/abc"));
	}

	#[test]
	fn missing_debugger_url_still_parses() {
		let info: VersionInfo = serde_json::from_str(r#"{"Browser":"Chrome/1"}"#).unwrap();
		assert!(info.web_socket_debugger_url.is_none());
	}
}
