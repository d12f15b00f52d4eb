//! HTTP/WebSocket surface: the `/media` bridge plus the webhook and TwiML
//! routes the telephony provider and the outbound chat bot talk to.

pub mod media;
pub mod state;
pub mod webhooks;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State as AxumState;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use state::AppState;

/// Build the full router. Kept separate from [`serve`] so tests can mount it
/// without binding a socket.
pub fn router(state: AppState) -> Router {
    let chat_bot_path = state.config.telegram_outbound.webhook_path.clone();
    Router::new()
        .route("/health", get(health))
        .route("/media", get(media_upgrade))
        .route("/webhooks/transcript", post(webhooks::transcript_webhook))
        .route("/webhooks/recording", post(webhooks::recording_webhook))
        .route(&chat_bot_path, post(webhooks::chat_bot_webhook))
        .route("/twiml/press/{digit}", get(webhooks::auto_press_twiml))
        .route("/twiml/press-sequence", get(webhooks::press_sequence_twiml))
        .route("/twiml/outbound", get(webhooks::outbound_twiml))
        .with_state(state)
}

/// Bind and serve the gateway's HTTP surface.
pub async fn serve(addr: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("trinity-gateway listening on http://{local_addr}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn media_upgrade(AxumState(state): AxumState<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| media::run_call(socket, state))
}

/// Percent-encode a query-string value. Shared by the webhook handlers and
/// the media bridge's REST-redirect URL builders.
pub(crate) fn urlencode(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~') {
                c.to_string()
            } else {
                format!("%{:02X}", c as u32)
            }
        })
        .collect()
}
