//! Telephony media-socket wire events (§6, upstream direction).

use serde::{Deserialize, Serialize};

/// Custom parameters attached to the `start` event for outbound calls
/// (or carried through for inbound CNAM-based routing).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StartCustomParameters {
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(rename = "callerName")]
    pub caller_name: Option<String>,
    #[serde(rename = "callSid")]
    pub call_sid: Option<String>,
    pub reason: Option<String>,
    pub theme: Option<String>,
    #[serde(rename = "recipientName")]
    pub recipient_name: Option<String>,
}

/// Payload of the `start` event.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StartPayload {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "callSid")]
    pub call_sid: String,
    #[serde(rename = "customParameters", default)]
    pub custom_parameters: StartCustomParameters,
}

/// Inbound media frame payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaPayload {
    /// Base64-encoded 8 kHz μ-law audio.
    pub payload: String,
}

/// A closed variant over every telephony media event this gateway
/// understands. Unknown/malformed events are dropped at the deserialization
/// boundary rather than represented here.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyEvent {
    Connected,
    Start {
        start: StartPayload,
    },
    Media {
        media: MediaPayload,
    },
    Stop,
}

/// Parse a raw telephony-socket text frame into a known event.
///
/// Returns `None` for malformed JSON or an event tag this gateway does not
/// recognize; callers should drop the frame and (optionally) bump a counter.
pub fn parse_telephony_event(raw: &str) -> Option<TelephonyEvent> {
    serde_json::from_str(raw).ok()
}

/// Build the outbound `media` frame carrying one 20 ms μ-law slice.
pub fn build_media_frame(stream_sid: &str, payload_b64: &str) -> serde_json::Value {
    serde_json::json!({
        "event": "media",
        "streamSid": stream_sid,
        "media": { "payload": payload_b64 },
    })
}

/// Build the outbound `clear` frame that tells the telephony socket to
/// discard buffered outbound audio (used on barge-in).
pub fn build_clear_frame(stream_sid: &str) -> serde_json::Value {
    serde_json::json!({
        "event": "clear",
        "streamSid": stream_sid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connected() {
        let event = parse_telephony_event(r#"{"event":"connected"}"#);
        assert!(matches!(event, Some(TelephonyEvent::Connected)));
    }

    #[test]
    fn parses_start_with_custom_parameters() {
        let raw = r#"{
            "event":"start",
            "start":{
                "streamSid":"MZ1",
                "callSid":"CA1",
                "customParameters":{"from":"+15551235680","to":"+18005551212","callerName":"Jeff"}
            }
        }"#;
        let event = parse_telephony_event(raw).expect("should parse");
        match event {
            TelephonyEvent::Start { start } => {
                assert_eq!(start.stream_sid, "MZ1");
                assert_eq!(start.custom_parameters.from.as_deref(), Some("+15551235680"));
                assert_eq!(start.custom_parameters.caller_name.as_deref(), Some("Jeff"));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_event_tag_drops_to_none() {
        assert!(parse_telephony_event(r#"{"event":"mystery"}"#).is_none());
    }

    #[test]
    fn malformed_json_drops_to_none() {
        assert!(parse_telephony_event("not json").is_none());
    }
}
