//! Session orchestrator (§4.5): the per-call reducer tying the codec,
//! control loops, and instruction builder together.
//!
//! Driven as a pure state machine — every entry point takes `&mut CallState`
//! plus an explicit timestamp and returns the [`Action`]s the caller (the
//! real socket/timer-driven task in `src/bin/gateway.rs`) must perform. This
//! mirrors the control-loop modules' testing style: the reducer is exercised
//! with injected timestamps, no real sleeps or sockets required.

use crate::call::state::{CallPhase, CallState};
use crate::codec::{mulaw, Framer};
use crate::config::GatewayConfig;
use crate::config_provider::RemoteConfig;
use crate::control::{auto_press, barge_in, idle, number_mode};
use crate::instructions::{
    self, CallerContext, OutboundContext, VoiceSelection,
};
use crate::model::{self, ModelEvent};
use crate::telephony::{self, StartPayload};

/// Side effect the caller must perform in response to a reducer call.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SendToTelephony(serde_json::Value),
    SendToModel(serde_json::Value),
    /// Schedule a one-shot timer that, on firing, re-enters the reducer with
    /// the named event at the given deadline (ms since epoch).
    ScheduleTimer { kind: TimerKind, deadline_ms: i64 },
    /// Place a REST call-update redirecting the in-flight call to press a
    /// DTMF digit, then hang up.
    RedirectAndPressDigit { digit: char },
    /// Place a REST call-update redirecting the in-flight call to press a
    /// sequence of DTMF digits with inter-digit waits, then hang up (§4.9
    /// step 4's default-digits variant, fired on a CNAM spam match before
    /// any transcript line has been heard).
    RedirectAndPressDigits { digits: String },
    /// Hang up the call via REST immediately.
    Hangup,
}

/// Which timer fired, carried so the caller can re-enter the right handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    GreetingFallback,
    BargeInRelease,
    NumberModeSilence,
    Idle,
    GoodbyeThenHangup,
    /// Safety-net hangup scheduled the moment DNC latches. The auto-press
    /// TwiML redirect already ends the call itself; this only fires a REST
    /// hangup if that redirect never took effect.
    DncHangup,
}

/// Grace window, after a call's media socket closes or after the
/// orchestrator issues its own hangup, during which a trailing transcription
/// webhook is still honored. Once it elapses, [`handle_call_ended`] runs as a
/// fallback so a call whose transcription webhook never arrives doesn't leak
/// in the call store.
pub const CALL_CLEANUP_GRACE_MS: i64 = 8_000;

/// Finalize a call's lifecycle: advance through ENDING to DONE. Idempotent —
/// each `advance_phase` call no-ops once the phase has already moved past
/// it, so this is safe to call from more than one teardown path (the media
/// bridge's grace-period fallback and the transcript webhook both call it).
pub fn handle_call_ended(state: &mut CallState) {
    state.advance_phase(CallPhase::Ending);
    state.advance_phase(CallPhase::Done);
}

/// Everything the reducer needs that isn't already on `CallState`: static
/// config, the cached remote directory, and the voice/instructions picked
/// once at session start.
pub struct SessionContext {
    pub remote: RemoteConfig,
    pub voice: VoiceSelection,
    pub is_vip: bool,
    pub vip_first_name: Option<String>,
}

/// Handle the telephony `start` event: resolve the caller, pick the voice,
/// assemble instructions, and kick off the session-update + greeting
/// schedule, per §4.5's ordering rules.
pub fn handle_start(
    state: &mut CallState,
    config: &GatewayConfig,
    remote: &RemoteConfig,
    start: &StartPayload,
    limiter: &auto_press::AutoPressRateLimit,
    now_ms: i64,
) -> (SessionContext, Vec<Action>) {
    state.stream_id = Some(start.stream_sid.clone());
    state.advance_phase(CallPhase::StreamStarted);

    let from = start.custom_parameters.from.clone().unwrap_or_default();
    let to = start.custom_parameters.to.clone().unwrap_or_default();
    let last10 = instructions::normalize_last10(&from);
    let vip = remote.find_vip_by_last10(&last10);
    let is_outbound = start.custom_parameters.reason.is_some();

    state.meta.from = from.clone();
    state.meta.to = to;
    state.meta.caller_name = start.custom_parameters.caller_name.clone();
    state.meta.started_at = now_ms;
    state.meta.outbound.is_outbound = is_outbound;
    state.meta.outbound.reason = start.custom_parameters.reason.clone();
    state.meta.outbound.theme = start.custom_parameters.theme.clone();
    state.meta.outbound.recipient_name = start.custom_parameters.recipient_name.clone();

    let mut default_digits_action = None;
    if config.auto_press.enable
        && !state.dnc.attempted
        && auto_press::should_fire_default_digits(
            state.meta.caller_name.as_deref(),
            config.auto_press.on_cnam,
            config.auto_press.only_on_phrase,
        )
        && limiter.try_fire(
            &last10,
            auto_press::DEFAULT_DIGITS_KEY,
            now_ms,
            (config.auto_press.rate_limit_secs * 1000) as i64,
        )
    {
        state.dnc.attempted = true;
        state.dnc.reason = Some("auto-press default-digits on CNAM match".to_string());
        default_digits_action = Some(Action::RedirectAndPressDigits {
            digits: config.auto_press.digits.clone(),
        });
    }
    let dnc_hangup_deadline_ms = state
        .dnc
        .attempted
        .then(|| now_ms + (config.dnc.hangup_after * 1000) as i64);

    let voice = instructions::select_voice(vip, &config.model.default_voice, &config.model.male_voice);
    state.voice.selected = voice.voice.clone();
    state.voice.assistant_name = voice.assistant_name.clone();

    let outbound_ctx = is_outbound.then(|| OutboundContext {
        reason: state.meta.outbound.reason.clone(),
        theme: state.meta.outbound.theme.clone(),
    });
    let caller_ctx = CallerContext {
        last10: Some(last10),
    };
    let doc = instructions::build_instructions(
        remote,
        &caller_ctx,
        vip,
        outbound_ctx.as_ref(),
        &voice,
        0,
    );

    let mut actions = vec![
        Action::SendToModel(model::build_session_update(
            &voice.voice,
            config.model.vad_threshold,
            &doc,
        )),
        Action::SendToModel(model::build_audio_clear()),
    ];

    state.greeting.pending = true;
    state.greeting.fallback_deadline_ms = Some(now_ms + 6_000);
    actions.push(Action::ScheduleTimer {
        kind: TimerKind::GreetingFallback,
        deadline_ms: now_ms,
    });
    actions.push(Action::ScheduleTimer {
        kind: TimerKind::GreetingFallback,
        deadline_ms: now_ms + 6_000,
    });

    idle::bump_activity(state, now_ms, config.idle.hangup_secs);
    actions.push(Action::ScheduleTimer {
        kind: TimerKind::Idle,
        deadline_ms: state.idle_deadline_ms.unwrap(),
    });

    if let Some(action) = default_digits_action {
        actions.push(action);
    }
    if let Some(deadline_ms) = dnc_hangup_deadline_ms {
        actions.push(Action::ScheduleTimer {
            kind: TimerKind::DncHangup,
            deadline_ms,
        });
    }

    let ctx = SessionContext {
        remote: remote.clone(),
        voice,
        is_vip: vip.is_some(),
        vip_first_name: vip.and_then(|v| v.name.split_whitespace().next().map(str::to_string)),
    };
    (ctx, actions)
}

/// Attempt the greeting, firing either immediately after `start` or from the
/// +6 s fallback timer. No-op if already sent (this is how the fallback's
/// "cancellation" is expressed: it simply finds nothing to do).
pub fn attempt_greeting(state: &mut CallState, ctx: &SessionContext, _now_ms: i64) -> Vec<Action> {
    if state.greeting.sent {
        return Vec::new();
    }
    let outbound_ctx = state.meta.outbound.is_outbound.then(|| OutboundContext {
        reason: state.meta.outbound.reason.clone(),
        theme: state.meta.outbound.theme.clone(),
    });
    let greeting = instructions::build_greeting(
        &ctx.voice.assistant_name,
        outbound_ctx.as_ref(),
        ctx.is_vip,
        ctx.vip_first_name.as_deref(),
    );
    state.greeting.sent = true;
    state.greeting.pending = false;
    state.advance_phase(CallPhase::SessionReady);
    state.advance_phase(CallPhase::Greeted);
    state.session_ready = true;
    vec![Action::SendToModel(model::build_response_create(&greeting))]
}

/// Handle a `session.updated` acknowledgement from the model.
pub fn handle_session_updated(state: &mut CallState) {
    state.session_ready = true;
}

/// Handle one inbound telephony `media` frame: forward verbatim upstream and
/// bump the idle timer.
pub fn handle_telephony_media(
    state: &mut CallState,
    config: &GatewayConfig,
    payload_b64: &str,
    now_ms: i64,
) -> Vec<Action> {
    idle::bump_activity(state, now_ms, config.idle.hangup_secs);
    vec![
        Action::SendToModel(model::build_audio_append(payload_b64)),
        Action::ScheduleTimer {
            kind: TimerKind::Idle,
            deadline_ms: state.idle_deadline_ms.unwrap(),
        },
    ]
}

/// Handle a downstream model event that is not plain audio (audio deltas are
/// handled by [`handle_model_audio_delta`] so the framer stays stateful per
/// call without threading it through every event).
pub fn handle_model_event(state: &mut CallState, event: &ModelEvent, now_ms: i64) -> Vec<Action> {
    match event {
        ModelEvent::SessionUpdated => {
            handle_session_updated(state);
            Vec::new()
        }
        ModelEvent::SpeechStarted => {
            if barge_in::on_speech_started(state, now_ms) {
                let stream_sid = state.stream_id.clone().unwrap_or_default();
                vec![
                    Action::SendToTelephony(telephony::build_clear_frame(&stream_sid)),
                    Action::SendToModel(model::build_response_cancel()),
                    Action::SendToModel(model::build_output_audio_clear()),
                ]
            } else {
                Vec::new()
            }
        }
        ModelEvent::SpeechStopped => {
            let deadline = barge_in::on_speech_stopped(now_ms);
            vec![Action::ScheduleTimer {
                kind: TimerKind::BargeInRelease,
                deadline_ms: deadline,
            }]
        }
        ModelEvent::Error(payload) => {
            tracing::warn!(
                call_id = %state.call_id,
                message = ?payload.message,
                code = ?payload.code,
                "model socket reported an error"
            );
            Vec::new()
        }
        ModelEvent::Done | ModelEvent::Completed => {
            // The model's response turn has fully played out. The first one
            // to land after the greeting marks the call as a normal,
            // steady-state conversation rather than still-greeting.
            state.advance_phase(CallPhase::Active);
            Vec::new()
        }
        ModelEvent::OutputCleared => Vec::new(),
        ModelEvent::AudioDelta(_) | ModelEvent::OutputAudioDelta(_) => Vec::new(),
    }
}

/// Handle a `response.audio.delta` / `response.output_audio.delta` chunk:
/// re-frame to 160-byte slices and forward to telephony, unless muted.
pub fn handle_model_audio_delta(
    state: &CallState,
    framer: &mut Framer,
    delta_b64: &str,
) -> Vec<Action> {
    if !state.assistant_audio_allowed() {
        return Vec::new();
    }
    let Ok(raw) = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, delta_b64)
    else {
        return Vec::new();
    };
    let stream_sid = state.stream_id.clone().unwrap_or_default();
    framer
        .push(&raw)
        .into_iter()
        .map(|frame| {
            let b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, frame);
            Action::SendToTelephony(telephony::build_media_frame(&stream_sid, &b64))
        })
        .collect()
}

/// Handle the barge-in release timer firing.
pub fn handle_barge_in_release_fire(state: &mut CallState, scheduled_at_ms: i64) {
    barge_in::try_release(state, scheduled_at_ms);
}

/// Handle one caller transcript line: feed number-mode and the auto-press
/// classifier.
pub fn handle_caller_transcript_line(
    state: &mut CallState,
    config: &GatewayConfig,
    limiter: &auto_press::AutoPressRateLimit,
    line: &str,
    now_ms: i64,
) -> Vec<Action> {
    let mut actions = Vec::new();

    let outcome = number_mode::on_transcript_line(
        state,
        line,
        now_ms,
        config.number_mode.silence_grace_ms as i64,
        config.number_mode.min_digits,
    );
    if let number_mode::NumberModeOutcome::Active {
        new_release_deadline_ms,
    } = outcome
    {
        actions.push(Action::ScheduleTimer {
            kind: TimerKind::NumberModeSilence,
            deadline_ms: new_release_deadline_ms,
        });
    }

    if !state.dnc.attempted && config.auto_press.enable {
        if let Some(classified) =
            auto_press::classify(line, state.meta.caller_name.as_deref())
        {
            if classified.confidence >= config.auto_press.confidence {
                let last10 = instructions::normalize_last10(&state.meta.from);
                let digit_key = classified.digit.to_string();
                if limiter.try_fire(&last10, &digit_key, now_ms, (config.auto_press.rate_limit_secs * 1000) as i64) {
                    state.dnc.attempted = true;
                    state.dnc.reason = Some(format!("auto-press digit {}", classified.digit));
                    actions.push(Action::RedirectAndPressDigit {
                        digit: classified.digit,
                    });
                    actions.push(Action::ScheduleTimer {
                        kind: TimerKind::DncHangup,
                        deadline_ms: now_ms + (config.dnc.hangup_after * 1000) as i64,
                    });
                }
            }
        }
    }

    idle::bump_activity(state, now_ms, config.idle.hangup_secs);
    actions.push(Action::ScheduleTimer {
        kind: TimerKind::Idle,
        deadline_ms: state.idle_deadline_ms.unwrap(),
    });
    actions
}

/// Handle the number-mode silence timer firing.
pub fn handle_number_mode_silence_fire(state: &mut CallState, scheduled_deadline_ms: i64) {
    number_mode::try_silence_release(state, scheduled_deadline_ms);
}

/// Handle the idle watchdog firing.
pub fn handle_idle_fire(
    state: &mut CallState,
    config: &GatewayConfig,
    scheduled_deadline_ms: i64,
    now_ms: i64,
) -> Vec<Action> {
    match idle::on_fire(state, scheduled_deadline_ms, config.idle.send_goodbye) {
        None | Some(idle::IdleFireAction::Yield) => Vec::new(),
        Some(idle::IdleFireAction::HangupNow) => {
            handle_call_ended(state);
            vec![Action::Hangup]
        }
        Some(idle::IdleFireAction::SendGoodbyeThenHangup) => {
            vec![
                Action::SendToModel(model::build_response_create(&config.idle.goodbye_line)),
                Action::ScheduleTimer {
                    kind: TimerKind::GoodbyeThenHangup,
                    deadline_ms: now_ms + idle::GOODBYE_TO_HANGUP_MS,
                },
            ]
        }
    }
}

/// Handle telephony `stop`: the call is ending.
pub fn handle_telephony_stop(state: &mut CallState) {
    state.advance_phase(CallPhase::Ending);
}

/// Handle the DNC safety-net hangup timer firing. The auto-press TwiML
/// redirect already plays the digit/line and hangs up on its own, so this
/// only forces a REST hangup if the call somehow hasn't ended by the time it
/// fires (the redirect failed, or the provider dropped the TwiML).
pub fn handle_dnc_hangup_fire(state: &mut CallState) -> Vec<Action> {
    if matches!(state.phase, CallPhase::Ending | CallPhase::Done) {
        return Vec::new();
    }
    handle_call_ended(state);
    vec![Action::Hangup]
}

/// μ-law passthrough is the common case; this documents the PCM16 fallback
/// entry point the spec calls for when the model delivers binary PCM16 @ 16
/// kHz instead of base64 μ-law.
pub fn reframe_pcm16_fallback(framer: &mut Framer, samples: &[i16]) -> Vec<Vec<u8>> {
    let encoded = crate::codec::framer::pcm16_16k_to_mulaw_8k(samples);
    framer.push(&encoded)
}

#[allow(dead_code)]
fn _assert_mulaw_linked() {
    let _ = mulaw::encode(&[]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_provider::VipRecord;
    use crate::telephony::StartCustomParameters;

    fn gateway_config() -> GatewayConfig {
        GatewayConfig::default()
    }

    fn start_payload(from: &str) -> StartPayload {
        StartPayload {
            stream_sid: "MZ1".into(),
            call_sid: "CA1".into(),
            custom_parameters: StartCustomParameters {
                from: Some(from.to_string()),
                to: Some("+18005551212".into()),
                caller_name: Some("Jeff".into()),
                call_sid: Some("CA1".into()),
                reason: None,
                theme: None,
                recipient_name: None,
            },
        }
    }

    #[test]
    fn start_sends_session_update_before_greeting_schedule() {
        let mut state = CallState::new("CA1");
        let config = gateway_config();
        let remote = RemoteConfig {
            system_prompt: "base".into(),
            vips: vec![VipRecord {
                name: "Jeff Smith".into(),
                phone: "+15551235680".into(),
                ..Default::default()
            }],
            businesses: vec![],
        };
        let limiter = auto_press::AutoPressRateLimit::new();
        let (ctx, actions) =
            handle_start(&mut state, &config, &remote, &start_payload("+15551235680"), &limiter, 0);
        assert!(matches!(actions[0], Action::SendToModel(_)));
        assert!(ctx.is_vip);
        assert_eq!(state.phase, CallPhase::StreamStarted);
    }

    #[test]
    fn start_fires_default_digits_on_cnam_spam_match() {
        let mut state = CallState::new("CA1");
        let config = gateway_config();
        let remote = RemoteConfig::default();
        let limiter = auto_press::AutoPressRateLimit::new();
        let mut start = start_payload("+15551235680");
        start.custom_parameters.caller_name = Some("SPAM LIKELY".into());
        let (_ctx, actions) = handle_start(&mut state, &config, &remote, &start, &limiter, 0);
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::RedirectAndPressDigits { digits } if digits == "9,8"
        )));
        assert!(state.dnc.attempted);
    }

    #[test]
    fn start_does_not_fire_default_digits_twice_for_same_caller() {
        let config = gateway_config();
        let remote = RemoteConfig::default();
        let limiter = auto_press::AutoPressRateLimit::new();
        let mut start = start_payload("+15551235680");
        start.custom_parameters.caller_name = Some("SPAM LIKELY".into());

        let mut first = CallState::new("CA1");
        handle_start(&mut first, &config, &remote, &start, &limiter, 0);

        let mut second = CallState::new("CA2");
        let (_ctx, actions) = handle_start(&mut second, &config, &remote, &start, &limiter, 1_000);
        assert!(!actions
            .iter()
            .any(|a| matches!(a, Action::RedirectAndPressDigits { .. })));
        assert!(!second.dnc.attempted);
    }

    #[test]
    fn greeting_is_sent_only_once() {
        let mut state = CallState::new("CA1");
        state.advance_phase(CallPhase::StreamStarted);
        let ctx = SessionContext {
            remote: RemoteConfig::default(),
            voice: VoiceSelection {
                voice: "trinity".into(),
                assistant_name: "Trinity".into(),
            },
            is_vip: true,
            vip_first_name: Some("Jeff".into()),
        };
        let first = attempt_greeting(&mut state, &ctx, 0);
        assert_eq!(first.len(), 1);
        assert_eq!(state.phase, CallPhase::Greeted);
        let second = attempt_greeting(&mut state, &ctx, 6_000);
        assert!(second.is_empty());
    }

    #[test]
    fn barge_in_orders_clear_before_cancel_before_output_clear() {
        let mut state = CallState::new("CA1");
        state.stream_id = Some("MZ1".into());
        let actions = handle_model_event(&mut state, &ModelEvent::SpeechStarted, 0);
        assert_eq!(actions.len(), 3);
        assert!(matches!(actions[0], Action::SendToTelephony(_)));
        match &actions[1] {
            Action::SendToModel(v) => assert_eq!(v["type"], "response.cancel"),
            _ => panic!("expected response.cancel"),
        }
        match &actions[2] {
            Action::SendToModel(v) => assert_eq!(v["type"], "output_audio_buffer.clear"),
            _ => panic!("expected output_audio_buffer.clear"),
        }
    }

    #[test]
    fn muted_audio_delta_is_dropped() {
        let mut state = CallState::new("CA1");
        state.mute_bus.barge_in_active = true;
        let mut framer = Framer::default();
        let actions = handle_model_audio_delta(&state, &mut framer, "AAAA");
        assert!(actions.is_empty());
    }

    #[test]
    fn auto_press_redirects_once_then_is_rate_limited() {
        let mut state = CallState::new("CA1");
        state.meta.from = "+15551235680".into();
        let config = gateway_config();
        let limiter = auto_press::AutoPressRateLimit::new();
        let actions = handle_caller_transcript_line(
            &mut state,
            &config,
            &limiter,
            "press nine to be removed",
            0,
        );
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::RedirectAndPressDigit { digit: '9' })));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::ScheduleTimer {
                kind: TimerKind::DncHangup,
                ..
            }
        )));
        assert!(state.dnc.attempted);

        let mut state2 = CallState::new("CA1");
        state2.meta.from = "+15551235680".into();
        state2.dnc.attempted = true;
        let actions2 = handle_caller_transcript_line(
            &mut state2,
            &config,
            &limiter,
            "press nine to be removed",
            1_000,
        );
        assert!(!actions2
            .iter()
            .any(|a| matches!(a, Action::RedirectAndPressDigit { .. })));
    }

    #[test]
    fn response_done_after_greeted_advances_to_active() {
        let mut state = CallState::new("CA1");
        state.advance_phase(CallPhase::StreamStarted);
        state.advance_phase(CallPhase::SessionReady);
        state.advance_phase(CallPhase::Greeted);
        let actions = handle_model_event(&mut state, &ModelEvent::Done, 0);
        assert!(actions.is_empty());
        assert_eq!(state.phase, CallPhase::Active);
    }

    #[test]
    fn idle_hangup_now_drives_phase_all_the_way_to_done() {
        let mut state = CallState::new("CA1");
        let mut config = gateway_config();
        config.idle.send_goodbye = false;
        state.advance_phase(CallPhase::StreamStarted);
        idle::bump_activity(&mut state, 0, config.idle.hangup_secs);
        let deadline = state.idle_deadline_ms.unwrap();
        let actions = handle_idle_fire(&mut state, &config, deadline, deadline);
        assert_eq!(actions, vec![Action::Hangup]);
        assert_eq!(state.phase, CallPhase::Done);
    }

    #[test]
    fn dnc_hangup_fire_is_a_no_op_once_the_call_has_already_ended() {
        let mut state = CallState::new("CA1");
        state.advance_phase(CallPhase::StreamStarted);
        state.advance_phase(CallPhase::Ending);
        assert!(handle_dnc_hangup_fire(&mut state).is_empty());
        assert_eq!(state.phase, CallPhase::Ending);
    }

    #[test]
    fn dnc_hangup_fire_hangs_up_as_a_safety_net_if_still_live() {
        let mut state = CallState::new("CA1");
        state.advance_phase(CallPhase::StreamStarted);
        state.advance_phase(CallPhase::SessionReady);
        state.advance_phase(CallPhase::Greeted);
        let actions = handle_dnc_hangup_fire(&mut state);
        assert_eq!(actions, vec![Action::Hangup]);
        assert_eq!(state.phase, CallPhase::Done);
    }

    #[test]
    fn idle_fire_sends_goodbye_then_schedules_hangup() {
        let mut state = CallState::new("CA1");
        let config = gateway_config();
        idle::bump_activity(&mut state, 0, config.idle.hangup_secs);
        let deadline = state.idle_deadline_ms.unwrap();
        let actions = handle_idle_fire(&mut state, &config, deadline, deadline);
        assert!(matches!(actions[0], Action::SendToModel(_)));
        assert!(matches!(
            actions[1],
            Action::ScheduleTimer {
                kind: TimerKind::GoodbyeThenHangup,
                ..
            }
        ));
    }
}
