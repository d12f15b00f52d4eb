//! Transcript integrator (§4.11): ingests timestamped utterances by track,
//! coalesces same-speaker runs, and renders the interleaved call transcript.

use crate::call::state::{CallState, Role, TranscriptEvent};

/// Window within which adjacent same-speaker entries are coalesced into one
/// turn.
pub const COALESCE_WINDOW_MS: i64 = 2_000;

const GREETING_PREFIXES: &[&str] = &["this is trinity", "dan hasn't picked up"];

/// Stamp `started_at` the first time a `transcription-started` event arrives.
pub fn on_transcription_started(state: &mut CallState, now_ms: i64) {
    if state.meta.started_at == 0 {
        state.meta.started_at = now_ms;
    }
}

/// Map a telephony track name to a transcript role.
pub fn classify_track(track: &str) -> Option<Role> {
    match track {
        "inbound_track" => Some(Role::Caller),
        "outbound_track" => Some(Role::Assistant),
        _ => None,
    }
}

/// Extract the spoken text from a `transcription-content` payload: a JSON
/// string with a `text` field, falling back to the raw string verbatim.
pub fn extract_text(raw: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) {
        if let Some(text) = value.get("text").and_then(|v| v.as_str()) {
            return text.to_string();
        }
    }
    raw.to_string()
}

/// Whether `text` looks like the operator's recorded greeting, via a
/// normalized substring test.
fn looks_like_greeting(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    GREETING_PREFIXES.iter().any(|p| lower.contains(p))
}

/// Handle one `transcription-content` event. Returns whether the utterance
/// was appended (the operator's own greeting echo is dropped for the first
/// assistant utterance only).
pub fn on_transcription_content(
    state: &mut CallState,
    track: &str,
    raw_payload: &str,
    now_ms: i64,
) -> bool {
    let Some(role) = classify_track(track) else {
        return false;
    };
    let text = extract_text(raw_payload);

    if role == Role::Assistant
        && looks_like_greeting(&text)
        && !state.events.iter().any(|e| e.role == Role::Assistant)
    {
        return false;
    }

    state.push_event(role, text, now_ms);
    true
}

/// Render the call's `events` as an interleaved transcript: sorted by
/// timestamp, adjacent same-speaker entries within [`COALESCE_WINDOW_MS`]
/// merged into one turn, each turn rendered as `<Role>:\n<text>`.
pub fn render_transcript(state: &CallState) -> String {
    let mut events = state.events.clone();
    events.sort_by_key(|e| e.ts);

    let mut turns: Vec<TranscriptEvent> = Vec::new();
    for event in events {
        match turns.last_mut() {
            Some(last) if last.role == event.role && event.ts - last.ts <= COALESCE_WINDOW_MS => {
                if last.text.ends_with('-') {
                    last.text = format!("{}{}", last.text.trim_end_matches('-'), event.text);
                } else {
                    last.text = format!("{} {}", last.text, event.text);
                }
                last.ts = event.ts;
            }
            _ => turns.push(event),
        }
    }

    turns
        .iter()
        .map(|t| format!("{}:\n{}", role_label(t.role), t.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::Caller => "Caller",
        Role::Assistant => "Assistant",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn started_event_stamps_once() {
        let mut state = CallState::new("CA1");
        on_transcription_started(&mut state, 100);
        on_transcription_started(&mut state, 500);
        assert_eq!(state.meta.started_at, 100);
    }

    #[test]
    fn structured_payload_extracts_text_field() {
        assert_eq!(extract_text(r#"{"text":"hello there"}"#), "hello there");
    }

    #[test]
    fn plain_payload_falls_back_verbatim() {
        assert_eq!(extract_text("hello there"), "hello there");
    }

    #[test]
    fn first_assistant_greeting_echo_is_dropped() {
        let mut state = CallState::new("CA1");
        let appended = on_transcription_content(
            &mut state,
            "outbound_track",
            r#"{"text":"Hi Jeff, this is Trinity, Dan hasn't picked up yet."}"#,
            0,
        );
        assert!(!appended);
        assert!(state.events.is_empty());
    }

    #[test]
    fn second_assistant_utterance_is_kept_even_if_greeting_shaped() {
        let mut state = CallState::new("CA1");
        state.push_event(Role::Assistant, "earlier turn", 0);
        let appended =
            on_transcription_content(&mut state, "outbound_track", "this is trinity again", 100);
        assert!(appended);
    }

    #[test]
    fn caller_track_is_never_dropped() {
        let mut state = CallState::new("CA1");
        let appended =
            on_transcription_content(&mut state, "inbound_track", "this is trinity", 0);
        assert!(appended);
    }

    #[test]
    fn unknown_track_is_ignored() {
        let mut state = CallState::new("CA1");
        assert!(!on_transcription_content(&mut state, "mystery_track", "hi", 0));
    }

    #[test]
    fn coalesces_same_speaker_runs_within_window() {
        let mut state = CallState::new("CA1");
        state.push_event(Role::Caller, "hello", 0);
        state.push_event(Role::Caller, "there", 1_000);
        state.push_event(Role::Assistant, "hi back", 1_500);
        let rendered = render_transcript(&state);
        assert_eq!(rendered, "Caller:\nhello there\n\nAssistant:\nhi back");
    }

    #[test]
    fn does_not_coalesce_across_the_window() {
        let mut state = CallState::new("CA1");
        state.push_event(Role::Caller, "hello", 0);
        state.push_event(Role::Caller, "much later", 5_000);
        let rendered = render_transcript(&state);
        assert_eq!(rendered, "Caller:\nhello\n\nCaller:\nmuch later");
    }

    #[test]
    fn hyphen_continuation_joins_without_space() {
        let mut state = CallState::new("CA1");
        state.push_event(Role::Caller, "hold on-", 0);
        state.push_event(Role::Caller, "e moment", 500);
        let rendered = render_transcript(&state);
        assert_eq!(rendered, "Caller:\nhold one moment");
    }
}
