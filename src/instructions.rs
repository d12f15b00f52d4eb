//! Per-call instruction document assembly (§4.4).

use crate::config_provider::{RemoteConfig, VipRecord};

/// Allowed voice names. Any VIP override or legacy value outside this set
/// falls back to the operator's configured default.
pub const ALLOWED_VOICES: &[&str] = &[
    "trinity", "ballad", "verse", "sage", "amber", "cove", "ember",
];

/// Strip non-digits and keep the last ten. Empty when `phone` has no digits.
pub fn normalize_last10(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() <= 10 {
        digits
    } else {
        digits[digits.len() - 10..].to_string()
    }
}

/// The last four digits a caller may hear confirmed aloud.
pub fn last4(last10: &str) -> &str {
    if last10.len() <= 4 {
        last10
    } else {
        &last10[last10.len() - 4..]
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

/// Resolve the voice override in a VIP record against the allowed set,
/// applying the legacy `male`/`female` mapping.
fn resolve_override(raw: &str, default_voice: &str, male_voice: &str) -> Option<String> {
    let lower = raw.to_ascii_lowercase();
    match lower.as_str() {
        "male" => Some(male_voice.to_ascii_lowercase()),
        "female" => Some(default_voice.to_ascii_lowercase()),
        other if ALLOWED_VOICES.contains(&other) => Some(other.to_string()),
        _ => None,
    }
}

/// The result of voice selection for a call: the realtime-session voice
/// name, and the assistant name spoken to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSelection {
    pub voice: String,
    pub assistant_name: String,
}

/// Select the session voice and display name, per §4.5's voice rules.
pub fn select_voice(
    vip: Option<&VipRecord>,
    default_voice: &str,
    male_voice: &str,
) -> VoiceSelection {
    let override_raw = vip.and_then(|v| v.voice_override.as_deref());
    match override_raw.and_then(|raw| resolve_override(raw, default_voice, male_voice)) {
        Some(voice) => VoiceSelection {
            assistant_name: title_case(&voice),
            voice,
        },
        None => VoiceSelection {
            voice: default_voice.to_string(),
            assistant_name: "Trinity".to_string(),
        },
    }
}

/// Outbound-call context carried into the instruction document.
#[derive(Debug, Clone, Default)]
pub struct OutboundContext {
    pub reason: Option<String>,
    pub theme: Option<String>,
}

/// Caller-id context resolved for the call.
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    pub last10: Option<String>,
}

const POLICY_PARAGRAPHS: &[&str] = &[
    "Default to speaking in the caller's apparent language; switch languages if the caller does.",
    "When reciting any number back to the caller, pause briefly between each digit.",
    "Never hallucinate, guess, or invent the last four digits of a phone number you were not given.",
    "If the caller offers a callback number, repeat it back once to confirm before ending the call.",
    "Never ask the caller for their phone number; the caller's number is already available to you.",
    "Keep responses brief and conversational; avoid long monologues.",
    "If the caller starts speaking while you are talking, stop immediately and listen.",
];

const OPENING_STYLES: &[&str] = &[
    "Open the call warmly and get to the point quickly.",
    "Open the call with a brief, friendly greeting before asking how you can help.",
    "Open the call in a calm, professional tone.",
];

/// Assemble the newline-delimited per-call instruction document, per §4.4.
///
/// The IDENTITY_LOCK block is emitted after the base prompt so it overrides
/// any contrary default baked into the system prompt.
pub fn build_instructions(
    remote: &RemoteConfig,
    caller: &CallerContext,
    vip: Option<&VipRecord>,
    outbound: Option<&OutboundContext>,
    voice: &VoiceSelection,
    opening_style_index: usize,
) -> String {
    let mut doc = Vec::new();

    doc.push(remote.system_prompt.clone());

    for p in POLICY_PARAGRAPHS {
        doc.push((*p).to_string());
    }

    if !remote.vips.is_empty() {
        let directory = remote
            .vips
            .iter()
            .map(|v| format!("{}={}", normalize_last10(&v.phone), v.name))
            .collect::<Vec<_>>()
            .join(", ");
        doc.push(directory);
    }

    let mut call_context = vec!["[CALL CONTEXT]".to_string()];
    match caller.last10.as_deref().filter(|l| !l.is_empty()) {
        Some(last10) => {
            call_context.push("CallerID_AVAILABLE=true".to_string());
            call_context.push(format!("CallerID_LAST10={last10}"));
            call_context.push(format!("CallerID_LAST4_VERIFIED={}", last4(last10)));
        }
        None => call_context.push("CallerID_AVAILABLE=false".to_string()),
    }
    doc.push(call_context.join("\n"));

    if let Some(vip) = vip {
        let relationship = vip.relationship.as_deref().unwrap_or("contact");
        doc.push(format!("Recognized VIP: {} ({relationship})", vip.name));
    }

    if let Some(ob) = outbound {
        let reason = ob.reason.as_deref().unwrap_or("a follow-up");
        let theme = ob.theme.as_deref().unwrap_or("");
        doc.push(format!(
            "[OUTBOUND CONTEXT]\nThis is an outbound call placed for reason: {reason}. Theme: {theme}.\nDo not say anything implying Dan \"hasn't picked up yet\" — that phrase only applies to inbound calls."
        ));
    }

    doc.push(format!(
        "[IDENTITY_LOCK]\nYour spoken name for this entire call is \"{}\". Never refer to yourself by any other name.",
        voice.assistant_name
    ));

    let style = OPENING_STYLES[opening_style_index % OPENING_STYLES.len()];
    doc.push(style.to_string());

    doc.join("\n")
}

/// Compose the greeting text, per §4.5's three greeting variants.
pub fn build_greeting(
    assistant_name: &str,
    outbound: Option<&OutboundContext>,
    is_vip: bool,
    vip_first_name: Option<&str>,
) -> String {
    if let Some(ob) = outbound {
        let name = vip_first_name.unwrap_or("there");
        let theme = ob.theme.as_deref().unwrap_or("a quick follow-up");
        format!(
            "Hi {name} — this is {assistant_name}, Dan's VIP AI assistant. Dan asked me to call about: {theme}. Is now a good time?"
        )
    } else if is_vip {
        let name = vip_first_name.unwrap_or("there");
        format!(
            "Hi {name} — This is {assistant_name}, Dan's VIP Assistant. Dan hasn't picked up yet. How can I help?"
        )
    } else {
        format!("Hi — it's {assistant_name}. How can I help?")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_law_last10_normalization() {
        assert_eq!(normalize_last10("+1 (555) 123-5680"), "5551235680");
        assert_eq!(normalize_last10("123"), "123");
        assert_eq!(normalize_last10("no digits here"), "");
    }

    #[test]
    fn default_voice_is_trinity_when_no_override() {
        let selection = select_voice(None, "trinity", "ballad");
        assert_eq!(selection.voice, "trinity");
        assert_eq!(selection.assistant_name, "Trinity");
    }

    #[test]
    fn vip_voice_override_sets_assistant_name() {
        let vip = VipRecord {
            voice_override: Some("ballad".into()),
            ..Default::default()
        };
        let selection = select_voice(Some(&vip), "trinity", "ballad");
        assert_eq!(selection.voice, "ballad");
        assert_eq!(selection.assistant_name, "Ballad");
    }

    #[test]
    fn legacy_male_female_map_to_configured_defaults() {
        let male = VipRecord {
            voice_override: Some("male".into()),
            ..Default::default()
        };
        assert_eq!(select_voice(Some(&male), "trinity", "ballad").voice, "ballad");

        let female = VipRecord {
            voice_override: Some("female".into()),
            ..Default::default()
        };
        assert_eq!(
            select_voice(Some(&female), "trinity", "ballad").voice,
            "trinity"
        );
    }

    #[test]
    fn unrecognized_override_falls_back_to_default() {
        let vip = VipRecord {
            voice_override: Some("not-a-real-voice".into()),
            ..Default::default()
        };
        let selection = select_voice(Some(&vip), "trinity", "ballad");
        assert_eq!(selection.voice, "trinity");
        assert_eq!(selection.assistant_name, "Trinity");
    }

    #[test]
    fn inbound_vip_greeting_matches_scenario_1() {
        let greeting = build_greeting("Trinity", None, true, Some("Jeff"));
        assert_eq!(
            greeting,
            "Hi Jeff — This is Trinity, Dan's VIP Assistant. Dan hasn't picked up yet. How can I help?"
        );
    }

    #[test]
    fn inbound_stranger_greeting() {
        let greeting = build_greeting("Trinity", None, false, None);
        assert_eq!(greeting, "Hi — it's Trinity. How can I help?");
    }

    #[test]
    fn identity_lock_contains_overridden_name() {
        let remote = RemoteConfig {
            system_prompt: "base prompt".into(),
            vips: vec![],
            businesses: vec![],
        };
        let voice = VoiceSelection {
            voice: "ballad".into(),
            assistant_name: "Ballad".into(),
        };
        let doc = build_instructions(&remote, &CallerContext::default(), None, None, &voice, 0);
        assert!(doc.contains("[IDENTITY_LOCK]"));
        assert!(doc.contains("\"Ballad\""));
        // identity lock must come after the base prompt
        let base_idx = doc.find("base prompt").unwrap();
        let lock_idx = doc.find("[IDENTITY_LOCK]").unwrap();
        assert!(lock_idx > base_idx);
    }
}
