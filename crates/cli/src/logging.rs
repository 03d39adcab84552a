use tracing_subscriber::EnvFilter;

/// Default filter directives for a `-v` count.
///
/// Orchestrator events use `tether.*` targets. Third-party crates stay at
/// `warn` until `-vvv`.
pub fn default_directives(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "error",
		1 => "warn,tether=info",
		2 => "warn,tether=debug,tether_runtime=debug",
		_ => "debug,tether=trace,tether_runtime=trace",
	}
}

/// Installs the stderr subscriber. `RUST_LOG` overrides the verbosity flags.
pub fn init_logging(verbosity: u8) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(std::io::stderr)
		.with_target(true)
		.compact()
		.init();
}
