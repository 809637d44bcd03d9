use gatehouse_types::error::Error as GatehouseError;
use std::fmt;

/// Internal error type for the memory discovery adapter
#[derive(Debug)]
pub enum Error {
	UnknownInstance(String),
	InvalidInstance(String),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::UnknownInstance(msg) => write!(f, "unknown instance: {}", msg),
			Error::InvalidInstance(msg) => write!(f, "invalid instance: {}", msg),
		}
	}
}

impl std::error::Error for Error {}

impl From<Error> for GatehouseError {
	fn from(e: Error) -> Self {
		GatehouseError::Discovery(e.to_string())
	}
}

// vim: ts=4
