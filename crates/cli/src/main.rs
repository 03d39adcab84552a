use std::process::ExitCode;

use clap::Parser;
use tether_cli::{cli::Cli, commands, logging};

#[tokio::main]
async fn main() -> ExitCode {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	match commands::dispatch(cli).await {
		Ok(true) => ExitCode::SUCCESS,
		// Failure envelope already printed.
		Ok(false) => ExitCode::FAILURE,
		Err(err) => {
			eprintln!("Error: {err:#}");
			ExitCode::FAILURE
		}
	}
}
