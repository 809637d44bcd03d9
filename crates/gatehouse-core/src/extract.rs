//! Request extractors
//!
//! Client address resolution and query parameter lookup used by the
//! admission layers.

use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use hyper::Request;

/// How the server is reached by clients
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServerMode {
	/// Clients connect directly; the socket peer is the client
	#[default]
	Standalone,
	/// Behind a reverse proxy; forwarding headers name the client
	Proxy,
}

impl std::str::FromStr for ServerMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"standalone" => Ok(ServerMode::Standalone),
			"proxy" => Ok(ServerMode::Proxy),
			_ => Err(format!("unknown server mode: {}", s)),
		}
	}
}

/// Extract client IP from request based on ServerMode
///
/// - Standalone mode: Use peer IP directly from ConnectInfo
/// - Proxy mode: Check forwarding headers first
pub fn extract_client_ip<B>(req: &Request<B>, mode: ServerMode) -> Option<IpAddr> {
	let peer = || req.extensions().get::<ConnectInfo<SocketAddr>>().map(|ci| ci.0.ip());
	match mode {
		ServerMode::Standalone => peer(),
		ServerMode::Proxy => extract_from_xff(req)
			.or_else(|| extract_from_x_real_ip(req))
			.or_else(|| extract_from_forwarded(req))
			.or_else(peer),
	}
}

/// Extract IP from X-Forwarded-For header
fn extract_from_xff<B>(req: &Request<B>) -> Option<IpAddr> {
	req.headers()
		.get("x-forwarded-for")
		.and_then(|h| h.to_str().ok())
		.and_then(|s| {
			// "client, proxy1, proxy2": the leftmost entry is the original client
			s.split(',').next().map(str::trim).and_then(|ip| ip.parse().ok())
		})
}

/// Extract IP from X-Real-IP header
fn extract_from_x_real_ip<B>(req: &Request<B>) -> Option<IpAddr> {
	req.headers()
		.get("x-real-ip")
		.and_then(|h| h.to_str().ok())
		.and_then(|s| s.trim().parse().ok())
}

/// Extract IP from Forwarded header (RFC 7239)
fn extract_from_forwarded<B>(req: &Request<B>) -> Option<IpAddr> {
	req.headers().get("forwarded").and_then(|h| h.to_str().ok()).and_then(|s| {
		// "for=192.0.2.60;proto=http;by=203.0.113.43" or "for=\"[2001:db8::1]\""
		s.split([';', ','])
			.map(str::trim)
			.find(|part| part.get(..4).is_some_and(|key| key.eq_ignore_ascii_case("for=")))
			.and_then(|for_part| {
				let cleaned = for_part.get(4..)?.trim_matches('"').trim_matches('[').trim_matches(']');
				cleaned.parse().ok()
			})
	})
}

/// Value of a query parameter, percent-decoded. Missing parameters yield an
/// empty string; for repeated parameters the first one wins.
pub fn query_param<B>(req: &Request<B>, name: &str) -> String {
	if name.is_empty() {
		return String::new();
	}
	let Some(query) = req.uri().query() else {
		return String::new();
	};
	serde_urlencoded::from_str::<Vec<(String, String)>>(query)
		.ok()
		.and_then(|pairs| pairs.into_iter().find(|(key, _)| key == name))
		.map(|(_, value)| value)
		.unwrap_or_default()
}


// vim: ts=4
