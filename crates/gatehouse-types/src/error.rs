//! Error type shared by the core crate and all adapters.

use axum::{Json, http::StatusCode, response::IntoResponse};

pub type ClResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	NotFound,
	/// A rule document could not be decoded
	ConfigDecode(String),
	/// A flow rule was rejected by the limiter engine
	InvalidRule(String),
	/// Discovery backend failure (register, deregister, subscribe)
	Discovery(String),
	/// Remote config store failure (get, watch)
	ConfigStore(String),
	Internal(String),

	// externals
	Io(std::io::Error),
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Self::Io(err)
	}
}

impl From<serde_yaml::Error> for Error {
	fn from(err: serde_yaml::Error) -> Self {
		Self::ConfigDecode(err.to_string())
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::ConfigDecode(err.to_string())
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Error::NotFound => write!(f, "not found"),
			Error::ConfigDecode(msg) => write!(f, "config decode error: {}", msg),
			Error::InvalidRule(msg) => write!(f, "invalid flow rule: {}", msg),
			Error::Discovery(msg) => write!(f, "discovery error: {}", msg),
			Error::ConfigStore(msg) => write!(f, "config store error: {}", msg),
			Error::Internal(msg) => write!(f, "internal error: {}", msg),
			Error::Io(err) => write!(f, "io error: {}", err),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(err) => Some(err),
			_ => None,
		}
	}
}

impl IntoResponse for Error {
	fn into_response(self) -> axum::response::Response {
		match self {
			Error::NotFound => (StatusCode::NOT_FOUND, "not found").into_response(),
			Error::ConfigDecode(msg) | Error::InvalidRule(msg) => {
				let body = serde_json::json!({ "err": msg });
				(StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
			}
			_ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
		}
	}
}


// vim: ts=4
