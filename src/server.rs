use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{Method, StatusCode},
    Router,
};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::relay::RelayContext;

/// Every path and method lands on the webhook handler; Telegram only cares
/// that it gets a 200 back. The body limit is off so an oversized payload
/// reaches the handler instead of being answered with 413.
pub fn router(ctx: Arc<RelayContext>) -> Router {
    Router::new()
        .fallback(receive_update)
        .layer(DefaultBodyLimit::disable())
        .with_state(ctx)
}

async fn receive_update(
    State(ctx): State<Arc<RelayContext>>,
    method: Method,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let outcome = ctx.process(method == Method::POST, &body).await;
    debug!("Webhook request finished: {:?}", outcome);
    (StatusCode::OK, "OK")
}

pub async fn serve(listener: TcpListener, ctx: Arc<RelayContext>) -> Result<()> {
    let addr = listener.local_addr().context("Listener has no local address")?;
    info!("Webhook relay listening on http://{}", addr);

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;

    Ok(())
}
