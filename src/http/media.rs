//! The `/media` WebSocket bridge: one task per call, running the
//! orchestrator reducer over the telephony socket, the model socket, and
//! the call's timers.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;

use crate::call::orchestrator::{self, Action, SessionContext, TimerKind};
use crate::call::state::CallPhase;
use crate::codec::Framer;
use crate::instructions;
use crate::model::{self, ModelEvent};
use crate::telephony::{self, TelephonyEvent};

use super::state::AppState;

struct TimerFired {
    kind: TimerKind,
    deadline_ms: i64,
}

fn schedule_timer(timer_tx: mpsc::Sender<TimerFired>, kind: TimerKind, deadline_ms: i64, now_ms: i64) {
    let delay_ms = (deadline_ms - now_ms).max(0) as u64;
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        let _ = timer_tx.send(TimerFired { kind, deadline_ms }).await;
    });
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Drive one call's lifetime: connect to the model, then bridge both
/// sockets through the orchestrator reducer until either side closes.
pub async fn run_call(socket: WebSocket, state: AppState) {
    let (mut tele_tx, mut tele_rx) = socket.split();
    let (timer_tx, mut timer_rx) = mpsc::channel::<TimerFired>(32);

    let model_url = format!(
        "wss://api.openai.com/v1/realtime?model={}",
        state.config.model.realtime_model
    );
    let mut request = match model_url.into_client_request() {
        Ok(r) => r,
        Err(err) => {
            tracing::error!(error = %err, "failed to build model socket request");
            return;
        }
    };
    request.headers_mut().insert(
        "Authorization",
        match format!("Bearer {}", state.config.model.api_key).parse() {
            Ok(v) => v,
            Err(_) => return,
        },
    );

    let (model_ws, _) = match tokio_tungstenite::connect_async(request).await {
        Ok(pair) => pair,
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to model socket");
            return;
        }
    };
    let (mut model_tx, mut model_rx) = model_ws.split();

    let mut call_id: Option<String> = None;
    let mut ctx: Option<SessionContext> = None;
    let mut framer = Framer::default();

    loop {
        tokio::select! {
            frame = tele_rx.next() => {
                let Some(Ok(msg)) = frame else { break };
                let Message::Text(raw) = msg else { continue };
                let Some(event) = telephony::parse_telephony_event(&raw) else { continue };
                match event {
                    TelephonyEvent::Connected => {}
                    TelephonyEvent::Start { start } => {
                        let id = start.call_sid.clone();
                        let call = state.calls.insert(id.clone());
                        let remote = state.config_provider.get(false).await;
                        let (session_ctx, actions) = {
                            let mut guard = call.lock().expect("call state mutex poisoned");
                            orchestrator::handle_start(
                                &mut guard,
                                &state.config,
                                &remote,
                                &start,
                                &state.auto_press_limiter,
                                now_ms(),
                            )
                        };
                        ctx = Some(session_ctx);
                        call_id = Some(id);
                        apply_actions(actions, &call, &mut tele_tx, &mut model_tx, &state, &timer_tx).await;
                    }
                    TelephonyEvent::Media { media } => {
                        let Some(call) = call_id.as_ref().and_then(|id| state.calls.get(id)) else { continue };
                        let actions = {
                            let mut guard = call.lock().expect("call state mutex poisoned");
                            orchestrator::handle_telephony_media(&mut guard, &state.config, &media.payload, now_ms())
                        };
                        apply_actions(actions, &call, &mut tele_tx, &mut model_tx, &state, &timer_tx).await;
                    }
                    TelephonyEvent::Stop => {
                        if let Some(call) = call_id.as_ref().and_then(|id| state.calls.get(id)) {
                            orchestrator::handle_telephony_stop(&mut call.lock().expect("call state mutex poisoned"));
                        }
                        break;
                    }
                }
            }
            frame = model_rx.next() => {
                let Some(Ok(msg)) = frame else { break };
                let raw = match msg {
                    TungsteniteMessage::Text(t) => t,
                    TungsteniteMessage::Close(_) => break,
                    _ => continue,
                };
                let Some(call) = call_id.as_ref().and_then(|id| state.calls.get(id)) else { continue };
                let Some(event) = model::parse_model_event(&raw) else { continue };

                if let Some(delta) = event.audio_delta() {
                    let actions = {
                        let guard = call.lock().expect("call state mutex poisoned");
                        orchestrator::handle_model_audio_delta(&guard, &mut framer, delta)
                    };
                    apply_actions(actions, &call, &mut tele_tx, &mut model_tx, &state, &timer_tx).await;
                    continue;
                }

                let actions = {
                    let mut guard = call.lock().expect("call state mutex poisoned");
                    orchestrator::handle_model_event(&mut guard, &event, now_ms())
                };
                apply_actions(actions, &call, &mut tele_tx, &mut model_tx, &state, &timer_tx).await;

                if matches!(event, ModelEvent::SessionUpdated) {
                    if let Some(session_ctx) = ctx.as_ref() {
                        let greet_actions = {
                            let mut guard = call.lock().expect("call state mutex poisoned");
                            orchestrator::attempt_greeting(&mut guard, session_ctx, now_ms())
                        };
                        apply_actions(greet_actions, &call, &mut tele_tx, &mut model_tx, &state, &timer_tx).await;
                    }
                }
            }
            Some(fired) = timer_rx.recv() => {
                let Some(call) = call_id.as_ref().and_then(|id| state.calls.get(id)) else { continue };
                let actions = handle_timer(&call, &ctx, fired, &state).await;
                apply_actions(actions, &call, &mut tele_tx, &mut model_tx, &state, &timer_tx).await;
            }
        }

        if call_id
            .as_ref()
            .and_then(|id| state.calls.get(id))
            .map(|c| c.lock().expect("call state mutex poisoned").phase == CallPhase::Done)
            .unwrap_or(false)
        {
            break;
        }
    }

    // The socket loop has ended — either the telephony/model side closed on
    // its own, or a Hangup action already drove the call to DONE. Either
    // way, finalize on a grace delay: a transcription webhook for this call
    // may still arrive briefly, and its own `-stopped`/`-error` handler
    // races this fallback to remove the entry and dispatch the transcript
    // first. Whichever runs first wins; the loser's `finalize_call` is a
    // no-op against an already-removed id.
    if let Some(id) = call_id {
        if let Some(call) = state.calls.get(&id) {
            call.lock()
                .expect("call state mutex poisoned")
                .advance_phase(CallPhase::Ending);
        }
        let state = state.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(orchestrator::CALL_CLEANUP_GRACE_MS as u64)).await;
            finalize_call(&id, &state).await;
        });
    }
}

/// Advance a call the rest of the way to DONE and remove it from the store,
/// dispatching its transcript. Called from the transcript webhook's
/// `-stopped`/`-error` handler (the common, prompt path) and from this
/// module's post-teardown grace-period fallback (the safety net for a call
/// whose transcription webhook never arrives).
pub(crate) async fn finalize_call(call_id: &str, state: &AppState) {
    let Some(call) = state.calls.get(call_id) else {
        return;
    };
    {
        let mut guard = call.lock().expect("call state mutex poisoned");
        orchestrator::handle_call_ended(&mut guard);
    }
    let Some(call) = state.calls.remove(call_id) else {
        return;
    };
    let transcript = {
        let guard = call.lock().expect("call state mutex poisoned");
        crate::transcript::render_transcript(&guard)
    };
    crate::log_sink::dispatch_transcript(&state.log_sinks, call_id, &transcript).await;
}

async fn handle_timer(
    call: &crate::call::store::SharedCall,
    ctx: &Option<SessionContext>,
    fired: TimerFired,
    state: &AppState,
) -> Vec<Action> {
    let now = now_ms();
    let mut guard = call.lock().expect("call state mutex poisoned");
    match fired.kind {
        TimerKind::GreetingFallback => match ctx {
            Some(session_ctx) => orchestrator::attempt_greeting(&mut guard, session_ctx, now),
            None => Vec::new(),
        },
        TimerKind::BargeInRelease => {
            orchestrator::handle_barge_in_release_fire(&mut guard, fired.deadline_ms);
            Vec::new()
        }
        TimerKind::NumberModeSilence => {
            orchestrator::handle_number_mode_silence_fire(&mut guard, fired.deadline_ms);
            Vec::new()
        }
        TimerKind::Idle => {
            orchestrator::handle_idle_fire(&mut guard, &state.config, fired.deadline_ms, now)
        }
        TimerKind::GoodbyeThenHangup => {
            orchestrator::handle_call_ended(&mut guard);
            vec![Action::Hangup]
        }
        TimerKind::DncHangup => orchestrator::handle_dnc_hangup_fire(&mut guard),
    }
}

async fn apply_actions(
    actions: Vec<Action>,
    call: &crate::call::store::SharedCall,
    tele_tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    model_tx: &mut futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
        TungsteniteMessage,
    >,
    state: &AppState,
    timer_tx: &mpsc::Sender<TimerFired>,
) {
    for action in actions {
        match action {
            Action::SendToTelephony(value) => {
                let _ = tele_tx.send(Message::Text(value.to_string().into())).await;
            }
            Action::SendToModel(value) => {
                let _ = model_tx.send(TungsteniteMessage::Text(value.to_string())).await;
            }
            Action::ScheduleTimer { kind, deadline_ms } => {
                schedule_timer(timer_tx.clone(), kind, deadline_ms, now_ms());
            }
            Action::RedirectAndPressDigit { digit } => {
                let call_sid = call.lock().expect("call state mutex poisoned").call_id.clone();
                let rest = state.telephony_rest.clone();
                let webhook_base = state.config.webhook_base.clone();
                tokio::spawn(async move {
                    let url = format!("{webhook_base}/twiml/press/{digit}");
                    if let Err(err) = rest.redirect_call(&call_sid, &url).await {
                        tracing::warn!(call_sid, %err, "auto-press redirect failed");
                    }
                });
            }
            Action::RedirectAndPressDigits { digits } => {
                let call_sid = call.lock().expect("call state mutex poisoned").call_id.clone();
                let rest = state.telephony_rest.clone();
                let webhook_base = state.config.webhook_base.clone();
                tokio::spawn(async move {
                    let url = format!(
                        "{webhook_base}/twiml/press-sequence?digits={}",
                        super::urlencode(&digits)
                    );
                    if let Err(err) = rest.redirect_call(&call_sid, &url).await {
                        tracing::warn!(call_sid, %err, "auto-press default-digits redirect failed");
                    }
                });
            }
            Action::Hangup => {
                let call_sid = call.lock().expect("call state mutex poisoned").call_id.clone();
                let rest = state.telephony_rest.clone();
                tokio::spawn(async move {
                    if let Err(err) = rest.hangup_call(&call_sid).await {
                        tracing::warn!(call_sid, %err, "hangup failed");
                    }
                });
            }
        }
    }
}

/// Route table entry for the outbound-call TwiML endpoint (connects to the
/// media socket with the custom parameters the orchestrator expects).
pub fn build_outbound_twiml(webhook_base: &str, to: &str, reason: &str, theme: &str, recipient_name: &str, call_sid: &str) -> String {
    let last10 = instructions::normalize_last10(to);
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Start><Transcription statusCallbackUrl=\"{webhook_base}/webhooks/transcript\"/></Start><Connect><Stream url=\"{webhook_base}/media\"><Parameter name=\"to\" value=\"{to}\"/><Parameter name=\"reason\" value=\"{reason}\"/><Parameter name=\"theme\" value=\"{theme}\"/><Parameter name=\"recipientName\" value=\"{recipient_name}\"/><Parameter name=\"callSid\" value=\"{call_sid}\"/><Parameter name=\"lastTen\" value=\"{last10}\"/></Stream></Connect></Response>"
    )
}
