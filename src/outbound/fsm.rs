//! Outbound command FSM (§4.10): chat-bot webhook commands that resolve a
//! recipient, issue a confirmation code, and place an outbound call.

use std::collections::HashMap;
use std::sync::Mutex;

use rand::Rng;

use crate::config_provider::VipRecord;
use crate::instructions::{last4, normalize_last10};

/// A parsed chat-bot command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Call { target: CallTarget, theme: String },
    Confirm { code: String },
    Cancel { code: String },
    Unrecognized,
}

/// The recipient half of a `/call` command, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    NameLast4 { name: String, last4: String },
    Phone(String),
}

/// Parse one chat-bot message into a [`Command`].
pub fn parse_command(text: &str) -> Command {
    let trimmed = text.trim();
    let lower = trimmed.to_ascii_lowercase();

    if lower == "/help" || lower == "/start" || lower == "help" {
        return Command::Help;
    }

    if let Some(rest) = strip_prefix_ci(trimmed, "/cancel ") {
        return Command::Cancel {
            code: rest.trim().to_string(),
        };
    }

    if let Some(rest) = strip_prefix_ci(trimmed, "yes ") {
        return Command::Confirm {
            code: rest.trim().to_string(),
        };
    }

    if let Some(rest) = strip_prefix_ci(trimmed, "/call ") {
        let mut parts = rest.splitn(2, '|');
        let target_part = parts.next().unwrap_or("").trim();
        let theme = parts.next().unwrap_or("").trim().to_string();
        if theme.is_empty() {
            return Command::Unrecognized;
        }
        return match parse_call_target(target_part) {
            Some(target) => Command::Call { target, theme },
            None => Command::Unrecognized,
        };
    }

    Command::Unrecognized
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

fn parse_call_target(s: &str) -> Option<CallTarget> {
    let tokens: Vec<&str> = s.split_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }
    if tokens.len() == 1 {
        return Some(CallTarget::Phone(tokens[0].to_string()));
    }
    let last = tokens[tokens.len() - 1];
    if last.len() == 4 && last.chars().all(|c| c.is_ascii_digit()) {
        let name = tokens[..tokens.len() - 1].join(" ");
        return Some(CallTarget::NameLast4 {
            name,
            last4: last.to_string(),
        });
    }
    None
}

/// A resolved call recipient, ready for an [`OutboundPending`] entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRecipient {
    pub destination_e164: String,
    pub display: String,
    pub recipient_name: Option<String>,
}

/// Resolve a `/call` target against the current VIP directory or direct phone.
pub fn resolve_target(target: &CallTarget, vips: &[VipRecord]) -> Option<ResolvedRecipient> {
    match target {
        CallTarget::NameLast4 { name, last4: l4 } => {
            let query_name = name.to_ascii_lowercase();
            vips.iter()
                .find(|v| {
                    v.name.to_ascii_lowercase().contains(&query_name)
                        && last4(&normalize_last10(&v.phone)) == l4
                })
                .map(|v| ResolvedRecipient {
                    destination_e164: normalize_to_e164(&v.phone),
                    display: v.name.clone(),
                    recipient_name: Some(v.name.clone()),
                })
        }
        CallTarget::Phone(raw) => Some(ResolvedRecipient {
            destination_e164: normalize_to_e164(raw),
            display: raw.clone(),
            recipient_name: None,
        }),
    }
}

/// Normalize a phone number to E.164, defaulting to the US country code.
fn normalize_to_e164(raw: &str) -> String {
    if raw.trim_start().starts_with('+') {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        return format!("+{digits}");
    }
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 11 && digits.starts_with('1') {
        format!("+{digits}")
    } else {
        format!("+1{digits}")
    }
}

/// A pending outbound call awaiting `YES <code>` confirmation.
#[derive(Debug, Clone)]
pub struct OutboundPending {
    pub destination_e164: String,
    pub display: String,
    pub theme: String,
    pub recipient_name: Option<String>,
    pub created_at_ms: i64,
    pub requester_id: String,
}

/// Outcome of confirming a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed(Box<OutboundPending>),
    Expired,
    Unknown,
}

impl PartialEq for OutboundPending {
    fn eq(&self, other: &Self) -> bool {
        self.destination_e164 == other.destination_e164
            && self.display == other.display
            && self.theme == other.theme
            && self.recipient_name == other.recipient_name
            && self.created_at_ms == other.created_at_ms
            && self.requester_id == other.requester_id
    }
}
impl Eq for OutboundPending {}

/// Code-keyed store of outbound confirmation requests.
#[derive(Debug, Default)]
pub struct OutboundStore {
    pending: Mutex<HashMap<String, OutboundPending>>,
}

impl OutboundStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending entry under a fresh 6-digit code, avoiding collisions
    /// with any code currently outstanding.
    pub fn create(
        &self,
        recipient: ResolvedRecipient,
        theme: String,
        requester_id: String,
        now_ms: i64,
    ) -> String {
        let mut map = self.pending.lock().expect("outbound store mutex poisoned");
        let code = loop {
            let candidate = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
            if !map.contains_key(&candidate) {
                break candidate;
            }
        };
        map.insert(
            code.clone(),
            OutboundPending {
                destination_e164: recipient.destination_e164,
                display: recipient.display,
                theme,
                recipient_name: recipient.recipient_name,
                created_at_ms: now_ms,
                requester_id,
            },
        );
        code
    }

    /// Pop and return the pending entry for `code` if confirmation arrives
    /// within `ttl_ms` of creation; an expired entry is purged and reported
    /// as [`ConfirmOutcome::Expired`].
    pub fn confirm(&self, code: &str, now_ms: i64, ttl_ms: i64) -> ConfirmOutcome {
        let mut map = self.pending.lock().expect("outbound store mutex poisoned");
        match map.remove(code) {
            None => ConfirmOutcome::Unknown,
            Some(entry) if now_ms - entry.created_at_ms > ttl_ms => ConfirmOutcome::Expired,
            Some(entry) => ConfirmOutcome::Confirmed(Box::new(entry)),
        }
    }

    /// Remove a pending entry by code, regardless of expiry. Returns whether
    /// an entry existed.
    pub fn cancel(&self, code: &str) -> bool {
        self.pending
            .lock()
            .expect("outbound store mutex poisoned")
            .remove(code)
            .is_some()
    }
}
