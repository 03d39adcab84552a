//! Command execution. Each invocation builds one [`Bridge`], runs a single
//! command (or a batch) through it, and shuts it down.

mod batch;

use std::time::Instant;

use serde_json::{Value, json};
use tether::{Bridge, BridgeConfig, TargetSpec};
use tracing::{debug, warn};

use crate::cli::{Cli, Commands, ConnectionArgs, SendArgs};
use crate::error::{CliError, Result};
use crate::output::{self, CommandResult, OutputFormat, ResultBuilder};

/// Runs the parsed command. `Ok(false)` means a failure envelope was printed.
pub async fn dispatch(cli: Cli) -> anyhow::Result<bool> {
	let command = cli.command.name();
	let started = Instant::now();

	let bridge = match build_config(&cli.connection, &cli.command).and_then(Bridge::new) {
		Ok(bridge) => bridge,
		Err(err) => {
			let err = CliError::from(err);
			return Ok(report(ResultBuilder::<Value>::started(command, started), Err(err), cli.format));
		}
	};

	let ok = match cli.command {
		Commands::Batch => batch::run(&bridge, tokio::io::stdin()).await?,
		other => {
			let result = execute(&bridge, other).await;
			report(ResultBuilder::started(command, started), result, cli.format)
		}
	};

	if let Err(err) = bridge.shutdown().await {
		warn!(target = "tether.cli", error = %err, "shutdown failed");
	}
	Ok(ok)
}

/// Config file, then `TETHER_*` environment, then flags.
pub fn build_config(args: &ConnectionArgs, command: &Commands) -> tether::Result<BridgeConfig> {
	let mut config = match &args.config {
		Some(path) => BridgeConfig::load(path)?,
		None => BridgeConfig::default(),
	};
	config.apply_env()?;
	apply_flags(&mut config, args);

	// status only reports; it never starts a browser.
	if matches!(command, Commands::Status) {
		config.allow_launch = false;
	}
	debug!(target = "tether.cli", ?config, "configuration resolved");
	Ok(config)
}

pub fn apply_flags(config: &mut BridgeConfig, args: &ConnectionArgs) {
	if let Some(endpoint) = &args.endpoint {
		config.endpoint = Some(endpoint.clone());
	}
	if let Some(host) = &args.host {
		config.host = Some(host.clone());
	}
	if args.port.is_some() {
		config.port = args.port;
	}
	if args.no_launch {
		config.allow_launch = false;
	}
	if args.headful {
		config.launch.headless = false;
	}
	if args.isolated {
		config.launch.isolated = true;
	}
	if args.accept_insecure_certs {
		config.launch.accept_insecure_certs = true;
	}
	config.launch.args.extend(args.browser_args.iter().cloned());
	if let Some(channel) = &args.channel {
		config.launch.channel = channel.clone();
	}
	if let Some(executable) = &args.executable {
		config.launch.executable = Some(executable.clone());
	}
}

async fn execute(bridge: &Bridge, command: Commands) -> Result<Value> {
	match command {
		Commands::Connect => Ok(serde_json::to_value(bridge.connect().await?)?),
		Commands::Launch => Ok(serde_json::to_value(bridge.launch().await?)?),
		Commands::Status => status(bridge).await,
		Commands::Switch(args) => switch(bridge, &args.target).await,
		Commands::Send(args) => send(bridge, args).await,
		Commands::Targets => targets(bridge).await,
		Commands::Batch => Err(CliError::InvalidInput("batch cannot be nested".into())),
	}
}

/// Never launches and never fails on an unreachable browser; reports it
/// instead.
pub(crate) async fn status(bridge: &Bridge) -> Result<Value> {
	let connected = bridge.connect_without_launch().await;
	let state = serde_json::to_value(bridge.state().await?)?;
	Ok(match connected {
		Ok(instance) => json!({ "connected": true, "state": state, "instance": instance }),
		Err(err) => json!({
			"connected": false,
			"state": state,
			"error": output::CommandError::from(&err),
		}),
	})
}

pub(crate) async fn switch(bridge: &Bridge, target: &str) -> Result<Value> {
	let spec: TargetSpec = target.parse()?;
	Ok(serde_json::to_value(bridge.switch_to(spec).await?)?)
}

pub(crate) async fn send(bridge: &Bridge, args: SendArgs) -> Result<Value> {
	let params = match args.params.as_deref() {
		Some(raw) => parse_params(raw)?,
		None => json!({}),
	};
	send_value(bridge, args.method, params, args.page).await
}

pub(crate) async fn send_value(bridge: &Bridge, method: String, params: Value, page: bool) -> Result<Value> {
	if !params.is_object() {
		return Err(CliError::InvalidInput(format!("params for {method} must be a JSON object")));
	}
	let value = bridge
		.execute(move |session| async move {
			if page {
				session.send_to_page(&method, params).await
			} else {
				session.send(&method, params).await
			}
		})
		.await?;
	Ok(value)
}

pub(crate) async fn targets(bridge: &Bridge) -> Result<Value> {
	let targets = bridge.execute(|session| async move { session.targets().await }).await?;
	Ok(serde_json::to_value(targets)?)
}

pub fn parse_params(raw: &str) -> Result<Value> {
	let value: Value = serde_json::from_str(raw).map_err(|e| CliError::InvalidInput(format!("--params is not valid JSON: {e}")))?;
	if !value.is_object() {
		return Err(CliError::InvalidInput("--params must be a JSON object".into()));
	}
	Ok(value)
}

/// Prints the envelope for `result`; returns whether it succeeded.
fn report(builder: ResultBuilder<Value>, result: Result<Value>, format: OutputFormat) -> bool {
	let envelope: CommandResult<Value> = match result {
		Ok(data) => builder.data(data).build(),
		Err(err) => {
			let error = err.to_command_error();
			if format != OutputFormat::Text {
				output::print_error_stderr(&error);
			}
			builder.error(error).build()
		}
	};
	output::print_result(&envelope, format);
	envelope.ok
}
