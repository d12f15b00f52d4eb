//! Shared application state handed to every axum route.

use std::sync::Arc;

use crate::call::store::CallStore;
use crate::clock::SharedClock;
use crate::config::GatewayConfig;
use crate::config_provider::ConfigProvider;
use crate::control::auto_press::AutoPressRateLimit;
use crate::log_sink::LogSink;
use crate::outbound::fsm::OutboundStore;
use crate::rest::TelephonyRestClient;

/// Everything a request handler needs, cloned cheaply via `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub calls: CallStore,
    pub config_provider: Arc<ConfigProvider>,
    pub auto_press_limiter: Arc<AutoPressRateLimit>,
    pub outbound: Arc<OutboundStore>,
    pub telephony_rest: Arc<TelephonyRestClient>,
    pub log_sinks: Arc<Vec<Box<dyn LogSink>>>,
    pub clock: SharedClock,
}
