//! Auto-press engine (§4.9): classifies caller speech for "press N to be
//! removed" intent and issues a rate-limited DTMF redirect.

use std::collections::HashMap;
use std::sync::Mutex;

const TRIGGER_WORDS: &[&str] = &["press", "dial", "hit", "enter", "push", "tap"];

const DIGIT_WORDS: &[(&str, char)] = &[
    ("zero", '0'),
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

const STRONG_REMOVAL_PHRASES: &[&str] = &[
    "to be removed",
    "to opt out",
    "to opt-out",
    "to unsubscribe",
    "do not call",
];

const REMOVAL_KEYWORDS: &[&str] = &[
    "remove",
    "removed",
    "opt out",
    "opt-out",
    "unsubscribe",
    "do not call",
];

/// Rate-limit key slot used by the default-digits variant (fired on CNAM
/// match before any phrase is heard). Shares the namespace with real digit
/// keys; preserved from the source behavior (see DESIGN.md).
pub const DEFAULT_DIGITS_KEY: &str = "default";

/// Whether the default-digits variant should fire on stream start, per §4.9
/// step 4: the caller-name field matches spam/scam and phrase-only mode is
/// off. Does not check the rate limiter or `dnc.attempted` — the caller
/// does that, since only it can record the fire.
pub fn should_fire_default_digits(caller_name: Option<&str>, on_cnam: bool, only_on_phrase: bool) -> bool {
    on_cnam && !only_on_phrase && caller_name.map(cnam_matches_spam).unwrap_or(false)
}

fn word_to_digit(word: &str) -> Option<char> {
    DIGIT_WORDS
        .iter()
        .find(|(w, _)| *w == word)
        .map(|(_, d)| *d)
}

fn tokenize(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_lowercase())
        .collect()
}

/// Extract a single target digit via `press|dial|hit|enter|push|tap
/// (<digit>|<digit-word>)`. Returns `None` if no trigger+digit pair exists.
fn extract_target_digit(lower: &str) -> Option<char> {
    let tokens = tokenize(lower);
    for (i, tok) in tokens.iter().enumerate() {
        if !TRIGGER_WORDS.contains(&tok.as_str()) {
            continue;
        }
        for next in tokens.iter().skip(i + 1).take(2) {
            if next.len() == 1 {
                if let Some(c) = next.chars().next().filter(|c| c.is_ascii_digit()) {
                    return Some(c);
                }
            }
            if let Some(d) = word_to_digit(next) {
                return Some(d);
            }
        }
    }
    None
}

fn cnam_matches_spam(caller_name: &str) -> bool {
    let lower = caller_name.to_ascii_lowercase();
    lower.contains("spam") || lower.contains("scam")
}

/// A classified auto-press intent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoPressClassification {
    pub digit: char,
    pub confidence: f64,
}

/// Classify a single caller utterance for auto-press intent, per §4.9 step 1-2.
///
/// Returns `None` if no target digit could be extracted (abort per step 1).
pub fn classify(utterance: &str, caller_name: Option<&str>) -> Option<AutoPressClassification> {
    let lower = utterance.to_ascii_lowercase();
    let digit = extract_target_digit(&lower)?;

    let strong = STRONG_REMOVAL_PHRASES.iter().any(|p| lower.contains(p));
    let any_removal = REMOVAL_KEYWORDS.iter().any(|k| lower.contains(k));
    let cnam_spam = caller_name.map(cnam_matches_spam).unwrap_or(false);

    let confidence = if strong {
        0.97
    } else if any_removal {
        0.94
    } else if cnam_spam {
        0.90
    } else if caller_name.is_some() {
        0.35
    } else {
        0.25
    };

    Some(AutoPressClassification { digit, confidence })
}

/// Per-`(caller_last10, digit)` rate limiter for auto-press fires.
///
/// Preserves the source's `record-before-result` behavior (Open Question 3,
/// see DESIGN.md): a fire attempt is recorded as soon as it is permitted,
/// before the caller learns whether the subsequent REST redirect succeeded,
/// so a failed redirect still consumes the rate-limit window rather than
/// being retried on the next call from the same source.
#[derive(Debug, Default)]
pub struct AutoPressRateLimit {
    last_fired_at_ms: Mutex<HashMap<(String, String), i64>>,
}

impl AutoPressRateLimit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to consume the rate-limit window for `(caller_last10, digit)`.
    ///
    /// Returns `true` (and records the attempt) if no prior fire exists
    /// within `window_ms`; returns `false` without recording otherwise.
    pub fn try_fire(
        &self,
        caller_last10: &str,
        digit: &str,
        now_ms: i64,
        window_ms: i64,
    ) -> bool {
        let key = (caller_last10.to_string(), digit.to_string());
        let mut map = self.last_fired_at_ms.lock().expect("rate limit mutex poisoned");
        if let Some(&last) = map.get(&key) {
            if now_ms - last < window_ms {
                return false;
            }
        }
        map.insert(key, now_ms);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_removal_phrase_scores_highest() {
        let c = classify("press nine to be removed", None).unwrap();
        assert_eq!(c.digit, '9');
        assert_eq!(c.confidence, 0.97);
    }

    #[test]
    fn bare_removal_keyword_scores_094() {
        let c = classify("press 3 and we will remove you", None).unwrap();
        assert_eq!(c.digit, '3');
        assert_eq!(c.confidence, 0.94);
    }

    #[test]
    fn cnam_spam_without_phrase_scores_090() {
        let c = classify("press five now", Some("SPAM LIKELY")).unwrap();
        assert_eq!(c.digit, '5');
        assert_eq!(c.confidence, 0.90);
    }

    #[test]
    fn known_non_spam_caller_scores_035() {
        let c = classify("press five now", Some("Acme Corp")).unwrap();
        assert_eq!(c.confidence, 0.35);
    }

    #[test]
    fn unknown_caller_scores_025() {
        let c = classify("press five now", None).unwrap();
        assert_eq!(c.confidence, 0.25);
    }

    #[test]
    fn no_trigger_digit_aborts() {
        assert!(classify("please hold the line", None).is_none());
    }

    #[test]
    fn default_digits_fires_on_cnam_spam_match() {
        assert!(should_fire_default_digits(Some("SPAM LIKELY"), true, false));
    }

    #[test]
    fn default_digits_does_not_fire_without_cnam_match() {
        assert!(!should_fire_default_digits(Some("Acme Corp"), true, false));
    }

    #[test]
    fn default_digits_respects_only_on_phrase() {
        assert!(!should_fire_default_digits(Some("SPAM LIKELY"), true, true));
    }

    #[test]
    fn default_digits_respects_on_cnam_disabled() {
        assert!(!should_fire_default_digits(Some("SPAM LIKELY"), false, false));
    }

    #[test]
    fn rate_limiter_blocks_within_window() {
        let limiter = AutoPressRateLimit::new();
        assert!(limiter.try_fire("5551235680", "9", 0, 21_600_000));
        assert!(!limiter.try_fire("5551235680", "9", 1_000, 21_600_000));
        assert!(limiter.try_fire("5551235680", "9", 21_600_001, 21_600_000));
    }

    #[test]
    fn rate_limiter_is_per_digit() {
        let limiter = AutoPressRateLimit::new();
        assert!(limiter.try_fire("5551235680", "9", 0, 21_600_000));
        assert!(limiter.try_fire("5551235680", "8", 0, 21_600_000));
    }
}
