//! Control channel envelopes.
//!
//! Commands go out as [`Request`]; the remote answers with a [`Response`]
//! carrying the same id, and pushes [`Event`]s at any time.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Command sent to the remote process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
	/// Correlation id, unique per connection.
	pub id: u64,
	/// Domain-qualified method, e.g. `"Target.getTargets"`.
	pub method: String,
	#[serde(default)]
	pub params: Value,
	/// Flat-mode session the command is addressed to. Absent for browser-level commands.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

/// Error object returned in place of a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
	pub code: i64,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<String>,
}

/// Reply to a [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
	pub id: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<RemoteError>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

/// Unsolicited notification from the remote process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
	pub method: String,
	#[serde(default)]
	pub params: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

/// Discriminated union of inbound messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	/// Has an `id` field.
	Response(Response),
	/// Has a `method` field and no `id`.
	Event(Event),
	/// Forward-compatible catch-all.
	Unknown(Value),
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn request_omits_absent_session() {
		let request = Request {
			id: 7,
			method: "Page.enable".into(),
			params: json!({}),
			session_id: None,
		};
		let value = serde_json::to_value(&request).unwrap();
		assert_eq!(value, json!({"id": 7, "method": "Page.enable", "params": {}}));
	}

	#[test]
	fn inbound_messages_are_classified() {
		let response: Message = serde_json::from_value(json!({"id": 1, "result": {"ok": true}})).unwrap();
		assert!(matches!(response, Message::Response(Response { id: 1, .. })));

		let error: Message = serde_json::from_value(json!({"id": 2, "error": {"code": -32601, "message": "'Foo.bar' wasn't found"}})).unwrap();
		match error {
			Message::Response(Response { error: Some(err), .. }) => assert_eq!(err.code, -32601),
			other => panic!("expected error response, got {other:?}"),
		}

		let event: Message = serde_json::from_value(json!({"method": "Target.targetCreated", "params": {}, "sessionId": "S1"})).unwrap();
		match event {
			Message::Event(event) => assert_eq!(event.session_id.as_deref(), Some("S1")),
			other => panic!("expected event, got {other:?}"),
		}

		let unknown: Message = serde_json::from_value(json!(["not", "an", "object"])).unwrap();
		assert!(matches!(unknown, Message::Unknown(_)));
	}
}
