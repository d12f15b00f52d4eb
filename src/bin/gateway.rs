//! `trinity-gateway` binary: bind the HTTP/WebSocket surface and start
//! bridging telephony calls to the realtime speech model.

use std::sync::Arc;

use trinity_gateway::clock::RealClock;
use trinity_gateway::config_provider::{ConfigProvider, HttpConfigSource};
use trinity_gateway::control::auto_press::AutoPressRateLimit;
use trinity_gateway::http::state::AppState;
use trinity_gateway::log_sink::{LogSink, TelegramLogSink};
use trinity_gateway::outbound::fsm::OutboundStore;
use trinity_gateway::rest::TelephonyRestClient;
use trinity_gateway::GatewayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(GatewayConfig::from_env().map_err(|e| {
        tracing::error!(error = %e, "invalid configuration");
        anyhow::anyhow!("trinity-gateway failed to start: {e}")
    })?);

    tracing::info!(port = config.port, "trinity-gateway starting");

    let clock: Arc<dyn trinity_gateway::clock::Clock> = Arc::new(RealClock);

    let config_provider = Arc::new(ConfigProvider::new(
        Box::new(HttpConfigSource::new(config.config_provider.url.clone())),
        config.config_provider.ttl_ms,
        clock.clone(),
        "Trinity",
    ));

    let telephony_rest = Arc::new(TelephonyRestClient::new(
        config.telephony.account_sid.clone(),
        config.telephony.auth_token.clone(),
    ));

    let mut log_sinks: Vec<Box<dyn LogSink>> = Vec::new();
    if !config.telegram.bot_token.is_empty() {
        log_sinks.push(Box::new(TelegramLogSink::new(
            reqwest::Client::new(),
            config.telegram.bot_token.clone(),
            config.telegram.chat_id.clone(),
        )));
    }

    let state = AppState {
        config: config.clone(),
        calls: trinity_gateway::call::store::CallStore::new(),
        config_provider,
        auto_press_limiter: Arc::new(AutoPressRateLimit::new()),
        outbound: Arc::new(OutboundStore::new()),
        telephony_rest,
        log_sinks: Arc::new(log_sinks),
        clock,
    };

    let addr = format!("0.0.0.0:{}", config.port);
    trinity_gateway::http::serve(&addr, state).await?;
    Ok(())
}
