//! NDJSON batch mode: many requests over one bridge and one connection.
//!
//! Each stdin line is `{"id"?, "command", "args"?}`; each produces exactly one
//! response line carrying the same `id`.
//!
//! | Command | Args |
//! |---------|------|
//! | `connect` | - |
//! | `status` | - |
//! | `switch` | `target` |
//! | `send` | `method`, `params?`, `page?` |
//! | `targets` | - |
//! | `ping` | - |
//! | `quit` | - |
//!
//! ```text
//! {"id":1,"command":"send","args":{"method":"Browser.getVersion"}}
//! {"schemaVersion":1,"ok":true,"command":"send","id":1,"data":{"product":"Chrome/126.0"},...}
//! ```

use std::io::Write;
use std::time::Instant;

use serde::Deserialize;
use serde_json::{Value, json};
use tether::Bridge;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::error;

use crate::error::{CliError, Result};
use crate::output::{CommandError, OutputFormat, ResultBuilder, write_result};

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
	#[serde(default)]
	pub id: Option<Value>,

	pub command: String,

	#[serde(default)]
	pub args: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SendRequestArgs {
	method: String,
	params: Option<Value>,
	page: bool,
}

/// Runs stdin requests in order. Returns whether every request succeeded.
pub async fn run<R: AsyncRead + Unpin>(bridge: &Bridge, input: R) -> Result<bool> {
	let mut stdout = std::io::stdout();
	run_with(bridge, input, &mut stdout).await
}

pub async fn run_with<R: AsyncRead + Unpin>(bridge: &Bridge, input: R, out: &mut impl Write) -> Result<bool> {
	let mut reader = BufReader::new(input);
	let mut line = String::new();
	let mut all_ok = true;

	loop {
		line.clear();
		match reader.read_line(&mut line).await {
			Ok(0) => break,
			Ok(_) => {}
			Err(e) => {
				error!(target = "tether.cli", error = %e, "stdin read failed");
				break;
			}
		}

		let trimmed = line.trim();
		if trimmed.is_empty() {
			continue;
		}
		let started = Instant::now();

		let request: BatchRequest = match serde_json::from_str(trimmed) {
			Ok(request) => request,
			Err(e) => {
				all_ok = false;
				let error = CommandError {
					code: "PARSE_ERROR".into(),
					message: e.to_string(),
					details: None,
				};
				let result = ResultBuilder::<Value>::started("unknown", started).error(error).build();
				write_result(out, &result, OutputFormat::Ndjson)?;
				continue;
			}
		};

		let quit = matches!(request.command.as_str(), "quit" | "exit");
		let builder = ResultBuilder::started(request.command.clone(), started).id(request.id.clone());
		let result = match execute_request(bridge, &request).await {
			Ok(data) => builder.data(data).build(),
			Err(err) => {
				all_ok = false;
				builder.error(err.to_command_error()).build()
			}
		};
		write_result(out, &result, OutputFormat::Ndjson)?;
		out.flush()?;

		if quit {
			break;
		}
	}

	Ok(all_ok)
}

async fn execute_request(bridge: &Bridge, request: &BatchRequest) -> Result<Value> {
	match request.command.as_str() {
		"ping" | "quit" | "exit" => Ok(json!({})),
		"connect" => Ok(serde_json::to_value(bridge.connect().await?)?),
		"status" => super::status(bridge).await,
		"targets" => super::targets(bridge).await,
		"switch" => {
			let target = request
				.args
				.get("target")
				.and_then(Value::as_str)
				.ok_or_else(|| CliError::InvalidInput("switch requires args.target".into()))?;
			super::switch(bridge, target).await
		}
		"send" => {
			let args: SendRequestArgs = serde_json::from_value(request.args.clone())
				.map_err(|e| CliError::InvalidInput(format!("invalid send args: {e}")))?;
			if args.method.is_empty() {
				return Err(CliError::InvalidInput("send requires args.method".into()));
			}
			let params = args.params.unwrap_or_else(|| json!({}));
			super::send_value(bridge, args.method, params, args.page).await
		}
		other => Err(CliError::InvalidInput(format!("unknown batch command `{other}`"))),
	}
}
