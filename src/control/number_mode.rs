//! Number-mode controller (§4.7): mutes the assistant while the caller
//! recites a phone number.

use crate::call::state::CallState;

const WORD_DIGITS: &[(&str, char)] = &[
    ("zero", '0'),
    ("oh", '0'),
    ("o", '0'),
    ("one", '1'),
    ("two", '2'),
    ("three", '3'),
    ("four", '4'),
    ("five", '5'),
    ("six", '6'),
    ("seven", '7'),
    ("eight", '8'),
    ("nine", '9'),
];

/// Extract every digit in `line`, combining literal numerals and the
/// spoken-word digit table.
pub fn extract_digits(line: &str) -> Vec<char> {
    let mut digits = Vec::new();
    for raw_word in line.split(|c: char| !c.is_alphanumeric()) {
        if raw_word.is_empty() {
            continue;
        }
        if raw_word.chars().all(|c| c.is_ascii_digit()) {
            digits.extend(raw_word.chars());
            continue;
        }
        let lower = raw_word.to_ascii_lowercase();
        if let Some((_, d)) = WORD_DIGITS.iter().find(|(w, _)| *w == lower) {
            digits.push(*d);
        }
    }
    digits
}

/// Whether `line` carries phone punctuation (`-`, `(`, `)`) that, combined
/// with any digit content, signals a recited number.
pub fn has_phone_punctuation(line: &str) -> bool {
    line.contains('-') || line.contains('(') || line.contains(')')
}

/// Result of feeding one transcript line to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberModeOutcome {
    /// No change; the line did not look like digit recitation.
    Unchanged,
    /// Number-mode just activated (or extended) on this line.
    Active { new_release_deadline_ms: i64 },
    /// Number-mode just released because the minimum digit count was met.
    ReleasedMinDigitsMet,
}

/// Feed one caller transcript line into the number-mode state machine.
pub fn on_transcript_line(
    state: &mut CallState,
    line: &str,
    now_ms: i64,
    silence_grace_ms: i64,
    min_digits: u32,
) -> NumberModeOutcome {
    let digits = extract_digits(line);
    let looks_like_number = digits.len() >= 3 || (!digits.is_empty() && has_phone_punctuation(line));

    if !looks_like_number && !state.mute_bus.number_mode_active {
        return NumberModeOutcome::Unchanged;
    }
    if !looks_like_number {
        // Already in number-mode but this line contributed nothing; leave
        // the existing silence timer alone.
        return NumberModeOutcome::Unchanged;
    }

    state.mute_bus.number_mode_active = true;
    state.number_mode.digits_collected += digits.len() as u32;
    state.number_mode.last_digit_at_ms = Some(now_ms);
    let deadline = now_ms + silence_grace_ms;
    state.number_mode.release_deadline_ms = Some(deadline);

    if state.number_mode.digits_collected >= min_digits {
        release(state);
        return NumberModeOutcome::ReleasedMinDigitsMet;
    }

    NumberModeOutcome::Active {
        new_release_deadline_ms: deadline,
    }
}

/// Release number-mode. Per §4.7 this clears `number_mode_active`
/// unconditionally; overall mute stays asserted if barge-in still holds it.
fn release(state: &mut CallState) {
    state.number_mode.digits_collected = 0;
    state.number_mode.last_digit_at_ms = None;
    state.number_mode.release_deadline_ms = None;
    state.mute_bus.number_mode_active = false;
}

/// Fire the silence timer scheduled by the last digit. Returns `true` if it
/// actually released (the deadline had not been superseded by a later digit).
pub fn try_silence_release(state: &mut CallState, scheduled_deadline_ms: i64) -> bool {
    if state.number_mode.release_deadline_ms != Some(scheduled_deadline_ms) {
        return false;
    }
    release(state);
    true
}
