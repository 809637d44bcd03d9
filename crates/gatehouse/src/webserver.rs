//! Webserver: request logging, serving and graceful shutdown

use std::net::SocketAddr;
use std::time::Instant;

use axum::Router;
use axum::extract::{ConnectInfo, Request};
use axum::middleware::Next;
use axum::response::Response;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::prelude::*;

/// Log one line per request and one per response with the elapsed time
pub async fn log_request(req: Request, next: Next) -> Response {
	let start = Instant::now();
	let peer_addr = req
		.extensions()
		.get::<ConnectInfo<SocketAddr>>()
		.map_or_else(|| "-".to_string(), |a| a.0.to_string());
	info!("REQ [{}] {} {}", &peer_addr, req.method(), req.uri().path());

	let res = next.run(req).await;

	let status = res.status();
	if status.is_client_error() || status.is_server_error() {
		warn!("RES: {} tm:{:?}", &status, start.elapsed().as_millis());
	} else {
		info!("RES: {} tm:{:?}", &status, start.elapsed().as_millis());
	}
	res
}

/// Resolves on SIGINT or SIGTERM
pub async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			error!("Failed to install Ctrl+C handler: {}", e);
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut s) => {
				s.recv().await;
			}
			Err(e) => {
				error!("Failed to install signal handler: {}", e);
				() = std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => info!("Received SIGINT, shutting down"),
		() = terminate => info!("Received SIGTERM, shutting down"),
	}
}

/// Serve `router` on `listen` until a shutdown signal arrives or `cancel`
/// fires. In-flight requests are allowed to finish.
pub async fn serve(listen: &str, router: Router, cancel: CancellationToken) -> ClResult<()> {
	let listener = tokio::net::TcpListener::bind(listen).await.map_err(|e| {
		error!("FATAL: Cannot listen on {}: {}", listen, e);
		Error::Io(e)
	})?;
	info!("Listening on HTTP {}", listen);

	axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
		.with_graceful_shutdown(async move {
			tokio::select! {
				() = shutdown_signal() => {}
				() = cancel.cancelled() => info!("Shutdown requested"),
			}
		})
		.await?;
	Ok(())
}

// vim: ts=4
