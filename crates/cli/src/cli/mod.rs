
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::output::OutputFormat;

/// Root CLI for tether.
#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(about = "Keep one working DevTools connection to a remote browser")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format: json (default), ndjson, or text
	#[arg(short = 'f', long, global = true, value_enum, default_value = "json")]
	pub format: OutputFormat,

	#[command(flatten)]
	pub connection: ConnectionArgs,

	#[command(subcommand)]
	pub command: Commands,
}

/// Flags layered over the config file and `TETHER_*` environment.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
	/// JSON config file
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Explicit ws:// endpoint or http:// discovery origin
	#[arg(long, global = true, value_name = "URL")]
	pub endpoint: Option<String>,

	/// Explicit host name or address to probe
	#[arg(long, global = true, value_name = "NAME")]
	pub host: Option<String>,

	/// Port tried first when probing
	#[arg(long, global = true, value_name = "PORT")]
	pub port: Option<u16>,

	/// Never start a local browser
	#[arg(long, global = true)]
	pub no_launch: bool,

	/// Launch with a visible window
	#[arg(long, global = true)]
	pub headful: bool,

	/// Launch with a disposable profile directory
	#[arg(long, global = true)]
	pub isolated: bool,

	/// Launch ignoring certificate errors
	#[arg(long, global = true)]
	pub accept_insecure_certs: bool,

	/// Extra browser argument (repeatable)
	#[arg(long = "browser-arg", global = true, value_name = "ARG", allow_hyphen_values = true)]
	pub browser_args: Vec<String>,

	/// Release channel for launches and the persistent profile
	#[arg(long, global = true, value_name = "NAME")]
	pub channel: Option<String>,

	/// Browser executable to launch
	#[arg(long, global = true, value_name = "PATH")]
	pub executable: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Connect (discovering or launching as configured) and report the instance.
	Connect,
	/// Launch a local browser and connect to it.
	Launch,
	/// Report whether a browser is reachable, without launching one.
	Status,
	/// Connect to a specific instance: ws:// endpoint, http:// origin, or host[:port].
	Switch(SwitchArgs),
	/// Send one raw protocol command.
	Send(SendArgs),
	/// List the browser's targets.
	Targets,
	/// Run NDJSON requests from stdin through one connection.
	Batch,
}

impl Commands {
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Connect => "connect",
			Commands::Launch => "launch",
			Commands::Status => "status",
			Commands::Switch(_) => "switch",
			Commands::Send(_) => "send",
			Commands::Targets => "targets",
			Commands::Batch => "batch",
		}
	}
}

#[derive(Args, Debug, Clone)]
pub struct SwitchArgs {
	#[arg(value_name = "TARGET")]
	pub target: String,
}

#[derive(Args, Debug, Clone)]
pub struct SendArgs {
	/// Protocol method, e.g. Browser.getVersion
	#[arg(value_name = "METHOD")]
	pub method: String,

	/// JSON object of command parameters
	#[arg(long, value_name = "JSON")]
	pub params: Option<String>,

	/// Address the page attached at connect time instead of the browser
	#[arg(long)]
	pub page: bool,
}
