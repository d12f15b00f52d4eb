//! Barge-in controller (§4.6): detects caller speech over assistant TTS.

use crate::call::state::CallState;

/// Debounce window: a speech-start within this many ms of the last barge-in
/// assertion is ignored.
pub const DEBOUNCE_MS: i64 = 250;

/// Delay before a release, scheduled after speech-stop, actually takes effect.
pub const RELEASE_DELAY_MS: i64 = 200;

/// Handle `input_audio_buffer.speech_started`.
///
/// Returns `true` if this event activated barge-in (debounce not hit) — the
/// caller must then, in order: emit telephony `clear`, then `response.cancel`,
/// then `output_audio_buffer.clear` to the model.
pub fn on_speech_started(state: &mut CallState, now_ms: i64) -> bool {
    if let Some(last) = state.barge_in.last_event_at_ms {
        if now_ms - last < DEBOUNCE_MS {
            return false;
        }
    }
    state.barge_in.last_event_at_ms = Some(now_ms);
    state.mute_bus.barge_in_active = true;
    true
}

/// Handle `input_audio_buffer.speech_stopped`. Returns the deadline (in ms)
/// at which [`try_release`] should be attempted.
pub fn on_speech_stopped(now_ms: i64) -> i64 {
    now_ms + RELEASE_DELAY_MS
}

/// Attempt the release scheduled by [`on_speech_stopped`] at `scheduled_at_ms`.
///
/// Only releases if neither number-mode nor a new barge-in assertion has
/// occurred since scheduling. Returns whether the release took effect.
pub fn try_release(state: &mut CallState, scheduled_at_ms: i64) -> bool {
    if state.mute_bus.number_mode_active {
        return false;
    }
    if let Some(last) = state.barge_in.last_event_at_ms {
        if last > scheduled_at_ms {
            return false;
        }
    }
    state.mute_bus.barge_in_active = false;
    true
}
