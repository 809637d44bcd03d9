use gatehouse_types::error::Error as GatehouseError;
use std::fmt;

/// Internal error type for the filesystem config adapter
#[derive(Debug)]
pub enum Error {
	InvalidName(String),
	IoError(std::io::Error),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::InvalidName(name) => write!(f, "invalid config name: {:?}", name),
			Error::IoError(e) => write!(f, "io error: {}", e),
		}
	}
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
	fn from(e: std::io::Error) -> Self {
		Error::IoError(e)
	}
}

impl From<Error> for GatehouseError {
	fn from(e: Error) -> Self {
		match e {
			Error::IoError(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
				GatehouseError::NotFound
			}
			Error::IoError(io_err) => GatehouseError::Io(io_err),
			Error::InvalidName(_) => GatehouseError::ConfigStore(e.to_string()),
		}
	}
}

// vim: ts=4
