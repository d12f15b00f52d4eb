//! Trinity Gateway: a real-time voice bridge between a telephony bidirectional
//! media stream and a cloud speech model's realtime socket.
//!
//! # Architecture
//!
//! One task per call bridges two WebSockets through a pure reducer:
//! - **Telephony socket**: inbound μ-law media frames, DTMF, start/stop events
//! - **Model socket**: the realtime speech model's session/audio events
//! - **Orchestrator**: a synchronous `CallState -> Vec<Action>` reducer that
//!   owns barge-in, number-mode, idle, auto-press, and greeting logic, kept
//!   free of IO so it can be unit-tested without real sockets or sleeps
//! - **HTTP surface**: webhooks for transcription, recording, and the
//!   outbound-call chat bot, plus the TwiML the REST redirects point at

pub mod call;
pub mod clock;
pub mod codec;
pub mod config;
pub mod config_provider;
pub mod control;
pub mod error;
pub mod http;
pub mod instructions;
pub mod log_sink;
pub mod model;
pub mod outbound;
pub mod rest;
pub mod telephony;
pub mod transcript;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
