//! Outbound call placement: chat-bot command parsing and confirmation.

pub mod fsm;
