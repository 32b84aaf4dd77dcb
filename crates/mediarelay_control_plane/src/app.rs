use std::future::Future;

use anyhow::{Context, Result};
use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tracing::info;

pub const LIVENESS_BODY: &str = "Media relay bot is running 24/7!";

pub fn build_router() -> Router {
    Router::new().route("/", get(liveness))
}

async fn liveness() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, mime::TEXT_PLAIN_UTF_8.to_string())],
        LIVENESS_BODY,
    )
}

pub async fn serve<F>(listener: TcpListener, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener.local_addr().context("listener has no local address")?;
    info!(bind = %local_addr, "liveness endpoint listening");
    axum::serve(listener, build_router())
        .with_graceful_shutdown(shutdown)
        .await
        .context("axum server failed")
}
