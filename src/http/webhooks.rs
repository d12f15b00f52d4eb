//! HTTP webhook surfaces: transcript ingestion, recording upload, the
//! chat-bot outbound-command bot, and the TwiML the REST redirects point at.

use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::Deserialize;

use crate::call::orchestrator::{self, Action, TimerKind};
use crate::instructions;
use crate::outbound::fsm::{self, Command, ConfirmOutcome};
use crate::rest;

use super::state::AppState;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Apply the REST/timer side of reducer [`Action`]s produced outside the
/// media socket's own loop (the caller-transcript-line and idle-timer paths
/// both run here, driven by the transcription webhook rather than the
/// socket's `tokio::select!`).
fn apply_webhook_actions(actions: Vec<Action>, call_sid: String, state: AppState) {
    for action in actions {
        match action {
            Action::RedirectAndPressDigit { digit } => {
                let rest = state.telephony_rest.clone();
                let webhook_base = state.config.webhook_base.clone();
                let call_sid = call_sid.clone();
                tokio::spawn(async move {
                    let url = format!("{webhook_base}/twiml/press/{digit}");
                    if let Err(err) = rest.redirect_call(&call_sid, &url).await {
                        tracing::warn!(call_sid, %err, "auto-press redirect failed");
                    }
                });
            }
            Action::RedirectAndPressDigits { digits } => {
                let rest = state.telephony_rest.clone();
                let webhook_base = state.config.webhook_base.clone();
                let call_sid = call_sid.clone();
                tokio::spawn(async move {
                    let url = format!("{webhook_base}/twiml/press-sequence?digits={}", urlencoding_escape(&digits));
                    if let Err(err) = rest.redirect_call(&call_sid, &url).await {
                        tracing::warn!(call_sid, %err, "auto-press default-digits redirect failed");
                    }
                });
            }
            Action::Hangup => {
                let rest = state.telephony_rest.clone();
                let call_sid = call_sid.clone();
                tokio::spawn(async move {
                    if let Err(err) = rest.hangup_call(&call_sid).await {
                        tracing::warn!(call_sid, %err, "hangup failed");
                    }
                });
            }
            Action::ScheduleTimer { kind, deadline_ms } => {
                let state = state.clone();
                let call_sid = call_sid.clone();
                tokio::spawn(async move {
                    let delay_ms = (deadline_ms - now_ms()).max(0) as u64;
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                    let Some(call) = state.calls.get(&call_sid) else { return };
                    let now = now_ms();
                    let follow_up = {
                        let mut guard = call.lock().expect("call state mutex poisoned");
                        match kind {
                            TimerKind::NumberModeSilence => {
                                orchestrator::handle_number_mode_silence_fire(&mut guard, deadline_ms);
                                Vec::new()
                            }
                            TimerKind::Idle => {
                                orchestrator::handle_idle_fire(&mut guard, &state.config, deadline_ms, now)
                            }
                            TimerKind::DncHangup => orchestrator::handle_dnc_hangup_fire(&mut guard),
                            TimerKind::GreetingFallback | TimerKind::BargeInRelease | TimerKind::GoodbyeThenHangup => {
                                Vec::new()
                            }
                        }
                    };
                    apply_webhook_actions(follow_up, call_sid, state);
                });
            }
            Action::SendToTelephony(_) | Action::SendToModel(_) => {
                tracing::warn!(call_sid, "unexpected socket action from webhook-driven reducer call");
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TranscriptWebhookForm {
    #[serde(rename = "TranscriptionEvent")]
    event: String,
    #[serde(rename = "CallSid")]
    call_sid: String,
    #[serde(rename = "Track", default)]
    track: Option<String>,
    #[serde(rename = "TranscriptionData", default)]
    transcription_data: Option<String>,
    #[serde(rename = "TranscriptionText", default)]
    transcription_text: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TranscriptQueryHints {
    #[allow(dead_code)]
    from: Option<String>,
    #[allow(dead_code)]
    to: Option<String>,
    #[serde(rename = "callerName")]
    #[allow(dead_code)]
    caller_name: Option<String>,
}

/// `POST /webhooks/transcript`: the telephony provider's transcription
/// side-channel, per §4.11 and §6.
pub async fn transcript_webhook(
    State(state): State<AppState>,
    Query(_hints): Query<TranscriptQueryHints>,
    Form(body): Form<TranscriptWebhookForm>,
) -> impl IntoResponse {
    let Some(call) = state.calls.get(&body.call_sid) else {
        return StatusCode::NOT_FOUND;
    };
    let now = crate::clock::Clock::now_ms(state.clock.as_ref());

    match body.event.as_str() {
        "transcription-started" => {
            let mut guard = call.lock().expect("call state mutex poisoned");
            crate::transcript::on_transcription_started(&mut guard, now);
        }
        "transcription-content" => {
            let raw = body
                .transcription_data
                .or(body.transcription_text)
                .unwrap_or_default();
            let track = body.track.unwrap_or_default();
            let is_caller = track == "inbound_track";
            let mut guard = call.lock().expect("call state mutex poisoned");
            crate::transcript::on_transcription_content(&mut guard, &track, &raw, now);
            let follow_up = if is_caller {
                let text = crate::transcript::extract_text(&raw);
                orchestrator::handle_caller_transcript_line(
                    &mut guard,
                    &state.config,
                    &state.auto_press_limiter,
                    &text,
                    now,
                )
            } else {
                Vec::new()
            };
            drop(guard);
            apply_webhook_actions(follow_up, body.call_sid.clone(), state.clone());
        }
        "transcription-stopped" | "transcription-error" => {
            crate::http::media::finalize_call(&body.call_sid, &state).await;
        }
        _ => {}
    }

    StatusCode::OK
}

#[derive(Debug, Deserialize)]
pub struct RecordingWebhookForm {
    #[serde(rename = "CallSid")]
    call_sid: String,
    #[serde(rename = "RecordingUrl")]
    recording_url: String,
}

/// `POST /webhooks/recording`: fetch the recording (with retry/format
/// fallback) and forward it to every log sink, best-effort.
pub async fn recording_webhook(
    State(state): State<AppState>,
    Form(body): Form<RecordingWebhookForm>,
) -> impl IntoResponse {
    let rest = state.telephony_rest.clone();
    let sinks = state.log_sinks.clone();
    tokio::spawn(async move {
        match rest.fetch_recording(&body.recording_url).await {
            Ok((bytes, content_type)) => {
                for sink in sinks.iter() {
                    if let Err(err) = sink.post_recording(&body.call_sid, &bytes, content_type).await {
                        tracing::warn!(sink = sink.id(), call_sid = %body.call_sid, %err, "recording post failed");
                    }
                }
            }
            Err(err) => {
                tracing::warn!(call_sid = %body.call_sid, %err, "recording download failed");
            }
        }
    });
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
pub struct ChatBotWebhookBody {
    chat_id: String,
    text: String,
    sender_id: String,
}

/// `POST /webhooks/chat-bot`: the outbound command FSM's entry point.
pub async fn chat_bot_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<ChatBotWebhookBody>,
) -> impl IntoResponse {
    let cfg = &state.config.telegram_outbound;
    if body.chat_id != cfg.allowed_chat_id {
        return (StatusCode::FORBIDDEN, "chat not allowed".to_string());
    }
    if let Some(secret) = cfg.webhook_secret.as_deref() {
        let header_secret = headers
            .get("X-Telegram-Bot-Api-Secret-Token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if header_secret != secret {
            return (StatusCode::UNAUTHORIZED, "bad secret".to_string());
        }
    }

    match fsm::parse_command(&body.text) {
        Command::Help => (
            StatusCode::OK,
            "Commands: /call <name> <last4> | <theme>, /call <phone> | <theme>, YES <code>, /cancel <code>"
                .to_string(),
        ),
        Command::Call { target, theme } => {
            let remote = state.config_provider.get(true).await;
            match fsm::resolve_target(&target, &remote.vips) {
                Some(recipient) => {
                    let now = crate::clock::Clock::now_ms(state.clock.as_ref());
                    let display = recipient.display.clone();
                    let code = state
                        .outbound
                        .create(recipient, theme, body.sender_id.clone(), now);
                    (
                        StatusCode::OK,
                        format!("Calling {display}. Reply YES {code} to confirm."),
                    )
                }
                None => (StatusCode::OK, "Could not resolve that recipient.".to_string()),
            }
        }
        Command::Confirm { code } => {
            let now = crate::clock::Clock::now_ms(state.clock.as_ref());
            match state
                .outbound
                .confirm(&code, now, state.config.outbound_code_ttl_ms as i64)
            {
                ConfirmOutcome::Confirmed(pending) => {
                    let status_callback = format!("{}/webhooks/call-status", state.config.webhook_base);
                    let twiml_url = format!(
                        "{}/twiml/outbound?to={}&reason={}&theme={}&recipientName={}",
                        state.config.webhook_base,
                        urlencoding_escape(&pending.destination_e164),
                        urlencoding_escape("outbound follow-up"),
                        urlencoding_escape(&pending.theme),
                        urlencoding_escape(pending.recipient_name.as_deref().unwrap_or("")),
                    );
                    match state
                        .telephony_rest
                        .create_call(
                            &pending.destination_e164,
                            &state.config.telephony.outbound_from,
                            &twiml_url,
                            &status_callback,
                        )
                        .await
                    {
                        Ok(sid) => (StatusCode::OK, format!("Calling {} ({sid}).", pending.display)),
                        Err(err) => (StatusCode::OK, format!("Call failed: {err}")),
                    }
                }
                ConfirmOutcome::Expired => (StatusCode::OK, "That code has expired.".to_string()),
                ConfirmOutcome::Unknown => (StatusCode::OK, "Unknown confirmation code.".to_string()),
            }
        }
        Command::Cancel { code } => {
            if state.outbound.cancel(&code) {
                (StatusCode::OK, "Cancelled.".to_string())
            } else {
                (StatusCode::OK, "Unknown confirmation code.".to_string())
            }
        }
        Command::Unrecognized => (
            StatusCode::OK,
            "Sorry, I didn't understand that. Try /help.".to_string(),
        ),
    }
}

fn urlencoding_escape(raw: &str) -> String {
    super::urlencode(raw)
}

/// `POST /twiml/press/:digit`: the TwiML an auto-press redirect points at.
pub async fn auto_press_twiml(
    State(state): State<AppState>,
    Path(digit): Path<char>,
) -> impl IntoResponse {
    let say_line = (!state.config.dnc.say_line.is_empty()).then_some(state.config.dnc.say_line.as_str());
    (
        [("Content-Type", "text/xml")],
        rest::build_auto_press_twiml(digit, say_line),
    )
}

/// `GET /twiml/press-sequence?digits=9,8`: the TwiML the CNAM-triggered
/// default-digits variant (§4.9 step 4) redirects to.
#[derive(Debug, Deserialize)]
pub struct PressSequenceQuery {
    digits: String,
}

pub async fn press_sequence_twiml(
    State(state): State<AppState>,
    Query(q): Query<PressSequenceQuery>,
) -> impl IntoResponse {
    (
        [("Content-Type", "text/xml")],
        rest::build_default_digits_twiml(&q.digits, state.config.auto_press.gap_ms),
    )
}

#[derive(Debug, Deserialize, Default)]
pub struct OutboundTwimlQuery {
    to: String,
    reason: String,
    theme: String,
    #[serde(rename = "recipientName", default)]
    recipient_name: String,
}

/// `GET /twiml/outbound`: TwiML placed for a confirmed outbound call; starts
/// dual-track transcription and connects to the media socket with the
/// custom parameters the orchestrator expects.
pub async fn outbound_twiml(
    State(state): State<AppState>,
    Query(q): Query<OutboundTwimlQuery>,
) -> impl IntoResponse {
    let call_sid = instructions::normalize_last10(&q.to);
    let xml = crate::http::media::build_outbound_twiml(
        &state.config.webhook_base,
        &q.to,
        &q.reason,
        &q.theme,
        &q.recipient_name,
        &call_sid,
    );
    ([("Content-Type", "text/xml")], xml)
}
