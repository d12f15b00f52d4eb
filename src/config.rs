//! Configuration for the voice gateway, assembled from environment variables.
//!
//! Every field has a typed default; [`GatewayConfig::from_env`] never fails on
//! a missing key, only on a key that is present but malformed.

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Cloud speech-model connection settings.
    pub model: ModelConfig,
    /// Remote config (system prompt / VIP directory / business list) source.
    pub config_provider: ConfigProviderConfig,
    /// Idle-hangup watchdog settings.
    pub idle: IdleConfig,
    /// Number-recitation mute settings.
    pub number_mode: NumberModeConfig,
    /// Auto-press DTMF removal engine settings.
    pub auto_press: AutoPressConfig,
    /// Do-not-call / hangup-after-removal settings.
    pub dnc: DncConfig,
    /// Telephony provider account and call-control settings.
    pub telephony: TelephonyConfig,
    /// Public HTTPS base URL this gateway is reachable at (for webhook callbacks).
    pub webhook_base: String,
    /// Inbound transcript/call log sink (chat messenger).
    pub telegram: TelegramConfig,
    /// Outbound command channel (chat-bot webhook for `/call`).
    pub telegram_outbound: TelegramOutboundConfig,
    /// Outbound confirmation code TTL, in milliseconds.
    pub outbound_code_ttl_ms: u64,
    /// HTTP listen port.
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            config_provider: ConfigProviderConfig::default(),
            idle: IdleConfig::default(),
            number_mode: NumberModeConfig::default(),
            auto_press: AutoPressConfig::default(),
            dnc: DncConfig::default(),
            telephony: TelephonyConfig::default(),
            webhook_base: String::new(),
            telegram: TelegramConfig::default(),
            telegram_outbound: TelegramOutboundConfig::default(),
            outbound_code_ttl_ms: 120_000,
            port: 8080,
        }
    }
}

impl GatewayConfig {
    /// Build configuration from the process environment.
    ///
    /// Recognized keys are listed in the gateway's external interface
    /// specification; unset keys fall back to the defaults below.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(v) = env_str("OPENAI_API_KEY") {
            cfg.model.api_key = v;
        }
        if let Some(v) = env_str("OPENAI_REALTIME_MODEL") {
            cfg.model.realtime_model = v;
        }
        if let Some(v) = env_str("DEFAULT_VOICE") {
            cfg.model.default_voice = v;
        }
        if let Some(v) = env_str("MALE_VOICE") {
            cfg.model.male_voice = v;
        }

        if let Some(v) = env_str("GOOGLE_CONFIG_URL") {
            cfg.config_provider.url = v;
        }
        if let Some(v) = env_u64("CONFIG_TTL_MS")? {
            cfg.config_provider.ttl_ms = v;
        }

        if let Some(v) = env_u64("IDLE_HANGUP_SECS")? {
            cfg.idle.hangup_secs = v;
        }
        if let Some(v) = env_bool("IDLE_SEND_GOODBYE")? {
            cfg.idle.send_goodbye = v;
        }
        if let Some(v) = env_str("IDLE_GOODBYE_LINE") {
            cfg.idle.goodbye_line = v;
        }

        if let Some(v) = env_u64("NUMBER_SILENCE_GRACE_MS")? {
            cfg.number_mode.silence_grace_ms = v;
        }
        if let Some(v) = env_u32("NUMBER_MIN_DIGITS")? {
            cfg.number_mode.min_digits = v;
        }

        if let Some(v) = env_bool("AUTO_DNC_ENABLE")? {
            cfg.auto_press.enable = v;
        }
        if let Some(v) = env_bool("AUTO_DNC_ON_CNAM")? {
            cfg.auto_press.on_cnam = v;
        }
        if let Some(v) = env_bool("AUTO_DNC_ONLY_ON_PHRASE")? {
            cfg.auto_press.only_on_phrase = v;
        }
        if let Some(v) = env_str("AUTO_DNC_DIGITS") {
            cfg.auto_press.digits = v;
        }
        if let Some(v) = env_u64("AUTO_DNC_GAP_MS")? {
            cfg.auto_press.gap_ms = v;
        }
        if let Some(v) = env_f64("AUTO_PRESS_CONFIDENCE")? {
            cfg.auto_press.confidence = v;
        }
        if let Some(v) = env_u64("AUTO_PRESS_RATE_LIMIT_SECS")? {
            cfg.auto_press.rate_limit_secs = v;
        }

        if let Some(v) = env_u64("DNC_HANGUP_AFTER")? {
            cfg.dnc.hangup_after = v;
        }
        if let Some(v) = env_str("DNC_SAY_LINE") {
            cfg.dnc.say_line = v;
        }

        if let Some(v) = env_str("TWILIO_ACCOUNT_SID") {
            cfg.telephony.account_sid = v;
        }
        if let Some(v) = env_str("TWILIO_AUTH_TOKEN") {
            cfg.telephony.auth_token = v;
        }
        if let Some(v) = env_str("TWILIO_OUTBOUND_FROM") {
            cfg.telephony.outbound_from = v;
        }

        if let Some(v) = env_str("WEBHOOK_URL") {
            cfg.webhook_base = v;
        }

        if let Some(v) = env_str("TELEGRAM_BOT_TOKEN") {
            cfg.telegram.bot_token = v;
        }
        if let Some(v) = env_str("TELEGRAM_CHAT_ID") {
            cfg.telegram.chat_id = v;
        }
        if let Some(v) = env_str("TELEGRAM_TZ") {
            cfg.telegram.tz = v;
        }

        if let Some(v) = env_str("TELEGRAM_OUTBOUND_BOT_TOKEN") {
            cfg.telegram_outbound.bot_token = v;
        }
        if let Some(v) = env_str("TELEGRAM_OUTBOUND_CHAT_ID") {
            cfg.telegram_outbound.chat_id = v;
        }
        if let Some(v) = env_str("TELEGRAM_OUTBOUND_ALLOWED_CHAT_ID") {
            cfg.telegram_outbound.allowed_chat_id = v;
        }
        if let Some(v) = env_str("TELEGRAM_OUTBOUND_WEBHOOK_PATH") {
            cfg.telegram_outbound.webhook_path = v;
        }
        if let Some(v) = env_str("TELEGRAM_OUTBOUND_WEBHOOK_SECRET") {
            cfg.telegram_outbound.webhook_secret = Some(v);
        }

        if let Some(v) = env_u64("OUTBOUND_CODE_TTL_MS")? {
            cfg.outbound_code_ttl_ms = v;
        }
        if let Some(v) = env_u32("PORT")? {
            cfg.port = v as u16;
        }

        Ok(cfg)
    }
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_bool(key: &str) -> Result<Option<bool>> {
    match env_str(key) {
        None => Ok(None),
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => Err(GatewayError::Config(format!(
                "{key}: expected boolean, got {other:?}"
            ))),
        },
    }
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match env_str(key) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| GatewayError::Config(format!("{key}: expected integer, got {v:?}"))),
    }
}

fn env_u32(key: &str) -> Result<Option<u32>> {
    match env_str(key) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| GatewayError::Config(format!("{key}: expected integer, got {v:?}"))),
    }
}

fn env_f64(key: &str) -> Result<Option<f64>> {
    match env_str(key) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| GatewayError::Config(format!("{key}: expected number, got {v:?}"))),
    }
}

/// Cloud speech-model connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// API key for the realtime speech-model endpoint.
    pub api_key: String,
    /// Realtime model identifier.
    pub realtime_model: String,
    /// Default voice name (must be in the allowed voice set).
    pub default_voice: String,
    /// Configured male voice, used for the legacy `"male"` VIP override value.
    pub male_voice: String,
    /// Server-side VAD activation threshold.
    pub vad_threshold: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            realtime_model: "gpt-4o-realtime-preview".to_owned(),
            default_voice: "trinity".to_owned(),
            male_voice: "ballad".to_owned(),
            vad_threshold: 0.55,
        }
    }
}

/// Remote config-source settings (system prompt + VIP directory + businesses).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigProviderConfig {
    /// Spreadsheet-webhook URL serving `{ system_prompt, vips[], businesses[] }`.
    pub url: String,
    /// In-process cache TTL, in milliseconds.
    pub ttl_ms: u64,
}

impl Default for ConfigProviderConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            ttl_ms: 20_000,
        }
    }
}

/// Idle-hangup watchdog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// Seconds of call silence before the watchdog fires.
    pub hangup_secs: u64,
    /// Whether to send a goodbye utterance before hanging up.
    pub send_goodbye: bool,
    /// Goodbye line text (sent as a `response.create` instruction).
    pub goodbye_line: String,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            hangup_secs: 180,
            send_goodbye: true,
            goodbye_line: "I haven't heard from you in a while, so I'll let you go. Goodbye!"
                .to_owned(),
        }
    }
}

/// Number-recitation mute settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberModeConfig {
    /// Silence window after the last digit before number-mode releases.
    pub silence_grace_ms: u64,
    /// Minimum digit count that forces number-mode to release early.
    pub min_digits: u32,
}

impl Default for NumberModeConfig {
    fn default() -> Self {
        Self {
            silence_grace_ms: 2_500,
            min_digits: 10,
        }
    }
}

/// Auto-press DTMF removal engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoPressConfig {
    /// Whether the engine is enabled at all.
    pub enable: bool,
    /// Whether a spam/scam CNAM match alone can trigger the default-digits variant.
    pub on_cnam: bool,
    /// If true, only fire on an explicit removal phrase, never on CNAM alone.
    pub only_on_phrase: bool,
    /// Default digit sequence fired on CNAM match before any phrase is heard.
    pub digits: String,
    /// Inter-digit wait, in milliseconds, for the default-digits variant.
    pub gap_ms: u64,
    /// Minimum classifier confidence required to fire.
    pub confidence: f64,
    /// Rate-limit window, in seconds, per `(caller_last10, digit)`.
    pub rate_limit_secs: u64,
}

impl Default for AutoPressConfig {
    fn default() -> Self {
        Self {
            enable: true,
            on_cnam: true,
            only_on_phrase: false,
            digits: "9,8".to_owned(),
            gap_ms: 800,
            confidence: 0.90,
            rate_limit_secs: 6 * 3_600,
        }
    }
}

/// Do-not-call latch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DncConfig {
    /// Seconds to wait after latching DNC before hanging up.
    pub hangup_after: u64,
    /// Optional line spoken before hangup once DNC is latched.
    pub say_line: String,
}

impl Default for DncConfig {
    fn default() -> Self {
        Self {
            hangup_after: 2,
            say_line: String::new(),
        }
    }
}

/// Telephony provider account and outbound-call settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelephonyConfig {
    /// Account SID used for REST basic auth.
    pub account_sid: String,
    /// Auth token used for REST basic auth.
    pub auth_token: String,
    /// Caller-id used for gateway-initiated outbound calls.
    pub outbound_from: String,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            outbound_from: String::new(),
        }
    }
}

/// Inbound log-sink chat-bot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token for the inbound transcript/event log sink.
    pub bot_token: String,
    /// Destination chat id for log messages.
    pub chat_id: String,
    /// Timezone used to render log timestamps.
    pub tz: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            tz: "UTC".to_owned(),
        }
    }
}

/// Outbound command-channel (chat-bot `/call`) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramOutboundConfig {
    /// Bot token for the outbound-command bot.
    pub bot_token: String,
    /// Chat id the bot replies into.
    pub chat_id: String,
    /// Allow-listed chat id permitted to issue commands.
    pub allowed_chat_id: String,
    /// Webhook path the chat-bot provider posts updates to.
    pub webhook_path: String,
    /// Optional shared secret checked against a request header.
    pub webhook_secret: Option<String>,
}

impl Default for TelegramOutboundConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            allowed_chat_id: String::new(),
            webhook_path: "/outbound/webhook".to_owned(),
            webhook_secret: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.model.vad_threshold, 0.55);
        assert_eq!(cfg.idle.hangup_secs, 180);
        assert_eq!(cfg.number_mode.silence_grace_ms, 2_500);
        assert_eq!(cfg.number_mode.min_digits, 10);
        assert_eq!(cfg.auto_press.confidence, 0.90);
        assert_eq!(cfg.auto_press.rate_limit_secs, 6 * 3_600);
        assert_eq!(cfg.outbound_code_ttl_ms, 120_000);
        assert_eq!(cfg.config_provider.ttl_ms, 20_000);
    }

    #[test]
    fn env_bool_rejects_garbage() {
        // SAFETY: test-only, single-threaded env mutation guarded by std::env::var read-back.
        unsafe { std::env::set_var("GATEWAY_TEST_BOOL", "maybe") };
        let err = env_bool("GATEWAY_TEST_BOOL").unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
        unsafe { std::env::remove_var("GATEWAY_TEST_BOOL") };
    }
}
