//! Result envelopes written to stdout.
//!
//! A success carries `data`; a failure carries a stable error code and the
//! structured details the core attached:
//!
//! ```json
//! {"schemaVersion":1,"ok":true,"command":"switch","data":{"endpoint":"ws://10.0.0.5:9999/devtools/browser/x","generation":2},"timings":{"durationMs":87}}
//! {"schemaVersion":1,"ok":false,"command":"connect","error":{"code":"NO_CANDIDATES_SUCCEEDED","message":"...","details":{"candidates":[...]}}}
//! ```


use std::io::{self, Write};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Bumped whenever an envelope field changes meaning.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
	#[default]
	Json,
	/// Compact, one envelope per line.
	Ndjson,
	/// `data` pretty-printed, or an `Error [CODE]` line.
	Text,
}

impl OutputFormat {
	const ALL: [OutputFormat; 3] = [OutputFormat::Json, OutputFormat::Ndjson, OutputFormat::Text];

	pub fn as_str(self) -> &'static str {
		match self {
			OutputFormat::Json => "json",
			OutputFormat::Ndjson => "ndjson",
			OutputFormat::Text => "text",
		}
	}
}

impl std::str::FromStr for OutputFormat {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|format| format.as_str().eq_ignore_ascii_case(s))
			.ok_or_else(|| format!("unknown output format `{s}` (expected json, ndjson or text)"))
	}
}

impl std::fmt::Display for OutputFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T: Serialize> {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub schema_version: Option<u32>,

	pub ok: bool,

	pub command: String,

	/// Caller-supplied request id, echoed back in batch mode.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<Value>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub timings: Option<Timings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
	/// Stable SCREAMING_SNAKE code, e.g. `CONNECT_TIMEOUT`
	pub code: String,

	pub message: String,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<Value>,
}

impl From<&tether::Error> for CommandError {
	fn from(err: &tether::Error) -> Self {
		Self {
			code: err.code().to_string(),
			message: err.to_string(),
			details: err.details(),
		}
	}
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
	pub duration_ms: u64,
}

impl From<Duration> for Timings {
	fn from(duration: Duration) -> Self {
		Timings {
			duration_ms: duration.as_millis() as u64,
		}
	}
}

/// Collects one command's outcome; `build` stamps the elapsed time.
pub struct ResultBuilder<T: Serialize> {
	command: String,
	id: Option<Value>,
	data: Option<T>,
	error: Option<CommandError>,
	start_time: Instant,
}

impl<T: Serialize> ResultBuilder<T> {
	pub fn new(command: impl Into<String>) -> Self {
		Self::started(command, Instant::now())
	}

	pub fn started(command: impl Into<String>, start_time: Instant) -> Self {
		Self {
			command: command.into(),
			id: None,
			data: None,
			error: None,
			start_time,
		}
	}

	pub fn id(mut self, id: Option<Value>) -> Self {
		self.id = id;
		self
	}

	pub fn data(mut self, data: T) -> Self {
		self.data = Some(data);
		self
	}

	pub fn error(mut self, error: CommandError) -> Self {
		self.error = Some(error);
		self
	}

	pub fn build(self) -> CommandResult<T> {
		CommandResult {
			schema_version: Some(SCHEMA_VERSION),
			ok: self.error.is_none() && self.data.is_some(),
			command: self.command,
			id: self.id,
			data: self.data,
			error: self.error,
			timings: Some(Timings::from(self.start_time.elapsed())),
		}
	}
}

pub fn print_result<T: Serialize>(result: &CommandResult<T>, format: OutputFormat) {
	if let Err(e) = write_result(&mut io::stdout().lock(), result, format) {
		tracing::debug!(target = "tether.cli", error = %e, "writing result failed");
	}
}

pub fn write_result<T: Serialize>(out: &mut impl Write, result: &CommandResult<T>, format: OutputFormat) -> io::Result<()> {
	match format {
		OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(result)?),
		OutputFormat::Ndjson => writeln!(out, "{}", serde_json::to_string(result)?),
		OutputFormat::Text => write_result_text(out, result),
	}
}

fn write_result_text<T: Serialize>(out: &mut impl Write, result: &CommandResult<T>) -> io::Result<()> {
	match (&result.data, &result.error) {
		(_, Some(error)) => {
			writeln!(out, "Error [{}]: {}", error.code, error.message)?;
			if let Some(details) = &error.details {
				writeln!(out, "{}", serde_json::to_string_pretty(details)?)?;
			}
		}
		(Some(data), None) => writeln!(out, "{}", serde_json::to_string_pretty(data)?)?,
		(None, None) => {}
	}
	match &result.timings {
		Some(timings) => writeln!(out, "{} in {}ms", result.command, timings.duration_ms),
		None => Ok(()),
	}
}

/// The one-line stderr form, `Error [CODE]: message`.
pub fn print_error_stderr(error: &CommandError) {
	eprintln!("Error [{}]: {}", error.code, error.message);
}
