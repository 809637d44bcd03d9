//! Admission rejections

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Error code carried by throttling responses
pub const THROTTLED_CODE: u32 = 10222;
pub const THROTTLED_MESSAGE: &str = "too many request; the quota used up";

/// Why a request was turned away before reaching its handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionReject {
	/// Client address is blocked or not authorized for the resource
	Forbidden,
	/// Resource quota for the current window is used up
	Throttled,
}

impl AdmissionReject {
	pub fn status(self) -> StatusCode {
		match self {
			AdmissionReject::Forbidden => StatusCode::FORBIDDEN,
			AdmissionReject::Throttled => StatusCode::BAD_REQUEST,
		}
	}
}

impl std::fmt::Display for AdmissionReject {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			AdmissionReject::Forbidden => write!(f, "forbidden"),
			AdmissionReject::Throttled => write!(f, "{}", THROTTLED_MESSAGE),
		}
	}
}

impl IntoResponse for AdmissionReject {
	fn into_response(self) -> Response {
		match self {
			AdmissionReject::Forbidden => self.status().into_response(),
			AdmissionReject::Throttled => (
				self.status(),
				Json(serde_json::json!({ "err": THROTTLED_MESSAGE, "code": THROTTLED_CODE })),
			)
				.into_response(),
		}
	}
}


// vim: ts=4
