use thiserror::Error;

use crate::output::CommandError;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error(transparent)]
	Core(#[from] tether::Error),

	#[error("invalid input: {0}")]
	InvalidInput(String),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl CliError {
	pub fn to_command_error(&self) -> CommandError {
		match self {
			CliError::Core(err) => CommandError::from(err),
			CliError::InvalidInput(msg) => CommandError {
				code: "INVALID_INPUT".to_string(),
				message: msg.clone(),
				details: None,
			},
			CliError::Json(err) => CommandError {
				code: "INVALID_INPUT".to_string(),
				message: err.to_string(),
				details: None,
			},
			CliError::Io(err) => CommandError {
				code: "IO_ERROR".to_string(),
				message: err.to_string(),
				details: None,
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn core_errors_keep_their_code() {
		let err = CliError::from(tether::Error::StaleSession { generation: 3 });
		let command_error = err.to_command_error();
		assert_eq!(command_error.code, "STALE_SESSION");
	}

	#[test]
	fn invalid_input_code() {
		let err = CliError::InvalidInput("params must be a JSON object".into());
		assert_eq!(err.to_command_error().code, "INVALID_INPUT");
		assert_eq!(err.to_string(), "invalid input: params must be a JSON object");
	}
}
