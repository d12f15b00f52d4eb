//! Idle watchdog (§4.8): hangs up a call that has gone silent.

use crate::call::state::CallState;

/// Delay between sending the goodbye utterance and forcing the REST hangup.
pub const GOODBYE_TO_HANGUP_MS: i64 = 1_500;

/// Bump the idle timer: called on any audio frame, transcript line, or
/// control event in either direction.
pub fn bump_activity(state: &mut CallState, now_ms: i64, timeout_secs: u64) {
    state.idle_deadline_ms = Some(now_ms + timeout_secs as i64 * 1_000);
}

/// What the orchestrator should do when the idle timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleFireAction {
    /// DNC is already latched; the watchdog yields and does nothing.
    Yield,
    /// Send the goodbye utterance, then hang up after [`GOODBYE_TO_HANGUP_MS`].
    SendGoodbyeThenHangup,
    /// Hang up immediately (goodbye disabled).
    HangupNow,
}

/// Decide what to do when the idle timer for `scheduled_deadline_ms` fires.
///
/// Returns `None` if the deadline has since been superseded by fresh
/// activity (the fired timer is stale and must be ignored).
pub fn on_fire(
    state: &CallState,
    scheduled_deadline_ms: i64,
    send_goodbye: bool,
) -> Option<IdleFireAction> {
    if state.idle_deadline_ms != Some(scheduled_deadline_ms) {
        return None;
    }
    if state.dnc.attempted {
        return Some(IdleFireAction::Yield);
    }
    Some(if send_goodbye {
        IdleFireAction::SendGoodbyeThenHangup
    } else {
        IdleFireAction::HangupNow
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_sets_deadline_relative_to_now() {
        let mut state = CallState::new("CA1");
        bump_activity(&mut state, 10_000, 180);
        assert_eq!(state.idle_deadline_ms, Some(10_000 + 180_000));
    }

    #[test]
    fn fire_yields_when_dnc_latched() {
        let mut state = CallState::new("CA1");
        bump_activity(&mut state, 0, 180);
        state.dnc.attempted = true;
        let deadline = state.idle_deadline_ms.unwrap();
        assert_eq!(on_fire(&state, deadline, true), Some(IdleFireAction::Yield));
    }

    #[test]
    fn fire_sends_goodbye_when_configured() {
        let mut state = CallState::new("CA1");
        bump_activity(&mut state, 0, 180);
        let deadline = state.idle_deadline_ms.unwrap();
        assert_eq!(
            on_fire(&state, deadline, true),
            Some(IdleFireAction::SendGoodbyeThenHangup)
        );
    }

    #[test]
    fn stale_fire_is_ignored() {
        let mut state = CallState::new("CA1");
        bump_activity(&mut state, 0, 180);
        let stale_deadline = state.idle_deadline_ms.unwrap();
        bump_activity(&mut state, 5_000, 180); // pushes the deadline out
        assert_eq!(on_fire(&state, stale_deadline, true), None);
    }
}
