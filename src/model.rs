//! Realtime speech-model socket wire events (§6, downstream direction).

use serde::{Deserialize, Serialize};

/// Audio delta payload, shared by both `response.audio.delta` and the
/// `response.output_audio.delta` alias some model versions emit.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioDeltaPayload {
    /// Base64-encoded μ-law audio chunk.
    pub delta: String,
}

/// Error payload.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelErrorPayload {
    pub message: Option<String>,
    pub code: Option<String>,
}

/// A closed variant over every model-socket event this gateway understands.
/// Unknown event types are logged and dropped rather than represented here.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ModelEvent {
    #[serde(rename = "session.updated")]
    SessionUpdated,
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,
    #[serde(rename = "response.audio.delta")]
    AudioDelta(AudioDeltaPayload),
    #[serde(rename = "response.output_audio.delta")]
    OutputAudioDelta(AudioDeltaPayload),
    #[serde(rename = "response.done")]
    Done,
    #[serde(rename = "response.completed")]
    Completed,
    #[serde(rename = "output_audio_buffer.cleared")]
    OutputCleared,
    #[serde(rename = "error")]
    Error(ModelErrorPayload),
}

impl ModelEvent {
    /// The audio delta's base64 payload, if this is an audio-delta event.
    pub fn audio_delta(&self) -> Option<&str> {
        match self {
            ModelEvent::AudioDelta(p) | ModelEvent::OutputAudioDelta(p) => Some(&p.delta),
            _ => None,
        }
    }

    /// Whether this event signals the end of an assistant response turn.
    pub fn is_response_end(&self) -> bool {
        matches!(self, ModelEvent::Done | ModelEvent::Completed)
    }
}

/// Parse a raw model-socket text frame into a known event.
pub fn parse_model_event(raw: &str) -> Option<ModelEvent> {
    serde_json::from_str(raw).ok()
}

/// Build a `session.update` event: voice, VAD config, audio formats, and the
/// full instruction document, per §4.5.
pub fn build_session_update(
    voice: &str,
    vad_threshold: f32,
    instructions: &str,
) -> serde_json::Value {
    serde_json::json!({
        "type": "session.update",
        "session": {
            "voice": voice,
            "turn_detection": {
                "type": "server_vad",
                "threshold": vad_threshold,
            },
            "input_audio_format": "g711_ulaw",
            "output_audio_format": "g711_ulaw",
            "instructions": instructions,
        }
    })
}

/// Build `input_audio_buffer.append` carrying one base64 μ-law chunk.
pub fn build_audio_append(payload_b64: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "input_audio_buffer.append",
        "audio": payload_b64,
    })
}

/// Build `input_audio_buffer.clear`.
pub fn build_audio_clear() -> serde_json::Value {
    serde_json::json!({ "type": "input_audio_buffer.clear" })
}

/// Build `response.create` carrying a greeting/goodbye instruction string.
pub fn build_response_create(instructions: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "response.create",
        "response": { "instructions": instructions },
    })
}

/// Build `response.cancel` (sent during barge-in).
pub fn build_response_cancel() -> serde_json::Value {
    serde_json::json!({ "type": "response.cancel" })
}

/// Build `output_audio_buffer.clear` (sent during barge-in, after `response.cancel`).
pub fn build_output_audio_clear() -> serde_json::Value {
    serde_json::json!({ "type": "output_audio_buffer.clear" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_session_updated() {
        let event = parse_model_event(r#"{"type":"session.updated"}"#);
        assert!(matches!(event, Some(ModelEvent::SessionUpdated)));
    }

    #[test]
    fn parses_audio_delta_and_extracts_payload() {
        let event = parse_model_event(r#"{"type":"response.audio.delta","delta":"abcd"}"#)
            .expect("should parse");
        assert_eq!(event.audio_delta(), Some("abcd"));
    }

    #[test]
    fn response_done_and_completed_both_end_turn() {
        assert!(parse_model_event(r#"{"type":"response.done"}"#)
            .unwrap()
            .is_response_end());
        assert!(parse_model_event(r#"{"type":"response.completed"}"#)
            .unwrap()
            .is_response_end());
        assert!(!parse_model_event(r#"{"type":"session.updated"}"#)
            .unwrap()
            .is_response_end());
    }

    #[test]
    fn unknown_type_drops_to_none() {
        assert!(parse_model_event(r#"{"type":"something.else"}"#).is_none());
    }
}
