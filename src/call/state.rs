//! Per-call state, as specified by the data model.

use serde::{Deserialize, Serialize};

/// Lifecycle stage of a call. Transitions are monotonic: `NEW -> STREAM_STARTED
/// -> SESSION_READY -> GREETED -> ACTIVE -> ENDING -> DONE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallPhase {
    New,
    StreamStarted,
    SessionReady,
    Greeted,
    Active,
    Ending,
    Done,
}

impl CallPhase {
    /// Whether `next` is a legal forward transition from `self`.
    pub fn can_advance_to(self, next: CallPhase) -> bool {
        use CallPhase::*;
        matches!(
            (self, next),
            (New, StreamStarted)
                | (StreamStarted, SessionReady)
                | (SessionReady, Greeted)
                | (Greeted, Active)
                | (Active, Ending)
                | (Ending, Done)
                // A call may end abruptly from any non-terminal phase.
                | (New, Ending)
                | (StreamStarted, Ending)
                | (SessionReady, Ending)
                | (Greeted, Ending)
        )
    }
}

/// Speaker role for a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Caller,
    Assistant,
}

/// One timestamped transcript entry. `events` is append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub role: Role,
    pub text: String,
    /// Milliseconds since the Unix epoch, monotonic within the call.
    pub ts: i64,
}

/// Outbound-call metadata, present only when this call was gateway-initiated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutboundMeta {
    pub is_outbound: bool,
    pub reason: Option<String>,
    pub theme: Option<String>,
    pub recipient_name: Option<String>,
}

/// Call metadata assigned at `start`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallMeta {
    pub from: String,
    pub to: String,
    pub caller_name: Option<String>,
    pub started_at: i64,
    pub outbound: OutboundMeta,
}

/// Greeting scheduler state.
#[derive(Debug, Clone, Default)]
pub struct GreetingState {
    pub skipped_upstream_greeting: bool,
    pub sent: bool,
    pub pending: bool,
    pub fallback_deadline_ms: Option<i64>,
}

/// Voice selection, locked for the call once chosen.
#[derive(Debug, Clone, Default)]
pub struct VoiceState {
    pub selected: String,
    pub assistant_name: String,
}

/// The logical OR of barge-in and number-mode; assistant audio is dropped
/// whenever either bit is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct MuteBus {
    pub barge_in_active: bool,
    pub number_mode_active: bool,
}

impl MuteBus {
    pub fn muted(&self) -> bool {
        self.barge_in_active || self.number_mode_active
    }
}

/// Barge-in debounce bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct BargeInState {
    pub last_event_at_ms: Option<i64>,
}

/// Number-mode digit accumulation.
#[derive(Debug, Clone, Default)]
pub struct NumberModeState {
    pub digits_collected: u32,
    pub last_digit_at_ms: Option<i64>,
    /// Deadline (silence timer) at which number-mode releases if not
    /// extended by a new digit first.
    pub release_deadline_ms: Option<i64>,
}

/// Do-not-call latch. Once `attempted` is true it never resets.
#[derive(Debug, Clone, Default)]
pub struct DncState {
    pub attempted: bool,
    pub reason: Option<String>,
}

/// One live call's full state, keyed by call id in the [`crate::call::store::CallStore`].
#[derive(Debug, Clone)]
pub struct CallState {
    pub call_id: String,
    pub stream_id: Option<String>,
    pub phase: CallPhase,
    pub meta: CallMeta,
    pub events: Vec<TranscriptEvent>,
    pub greeting: GreetingState,
    pub voice: VoiceState,
    pub session_ready: bool,
    pub mute_bus: MuteBus,
    pub barge_in: BargeInState,
    pub number_mode: NumberModeState,
    pub dnc: DncState,
    pub idle_deadline_ms: Option<i64>,
}

impl CallState {
    /// Create a new call in the `New` phase with empty defaults.
    pub fn new(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            stream_id: None,
            phase: CallPhase::New,
            meta: CallMeta::default(),
            events: Vec::new(),
            greeting: GreetingState::default(),
            voice: VoiceState::default(),
            session_ready: false,
            mute_bus: MuteBus::default(),
            barge_in: BargeInState::default(),
            number_mode: NumberModeState::default(),
            dnc: DncState::default(),
            idle_deadline_ms: None,
        }
    }

    /// Advance the call's phase, ignoring no-op/illegal transitions.
    ///
    /// Illegal transitions are logged by the caller; this just refuses to
    /// corrupt the monotonic lifecycle.
    pub fn advance_phase(&mut self, next: CallPhase) -> bool {
        if self.phase.can_advance_to(next) {
            self.phase = next;
            true
        } else {
            false
        }
    }

    /// Append a transcript entry, stamping it at `ts`.
    pub fn push_event(&mut self, role: Role, text: impl Into<String>, ts: i64) {
        self.events.push(TranscriptEvent {
            role,
            text: text.into(),
            ts,
        });
    }

    /// Whether assistant audio is currently allowed to reach the telephony socket.
    pub fn assistant_audio_allowed(&self) -> bool {
        !self.mute_bus.muted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_transitions_are_monotonic_forward_only() {
        assert!(CallPhase::New.can_advance_to(CallPhase::StreamStarted));
        assert!(!CallPhase::StreamStarted.can_advance_to(CallPhase::New));
        assert!(!CallPhase::Done.can_advance_to(CallPhase::Active));
    }

    #[test]
    fn mute_bus_is_authoritative_or() {
        let mut bus = MuteBus::default();
        assert!(!bus.muted());
        bus.barge_in_active = true;
        assert!(bus.muted());
        bus.barge_in_active = false;
        bus.number_mode_active = true;
        assert!(bus.muted());
    }
}
