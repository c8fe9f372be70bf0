//! Complexity scoring — spec §4.1.1.
//!
//! Deterministic on `(message, router_config)`. Token count is a coarse
//! `ceil(len/4)` approximation, not a real tokenizer — the spec is explicit
//! that this formula must not be replaced by one, since downstream tests
//! depend on the exact numbers it produces.

use crate::types::RouterConfig;

const MULTI_STEP_MARKERS: &[&str] = &["then", "after", "next", "first", "second", "third", "finally", "step"];
const DOMAIN_KEYWORDS: &[&str] = &["code", "math", "law"];
const REALTIME_MARKERS: &[&str] = &["now", "immediately", "quick", "fast", "urgent"];
const PRIVACY_MARKERS: &[&str] = &["private", "confidential", "secret", "personal"];

fn approx_token_count(text: &str) -> usize {
    (text.len() + 3) / 4
}

fn contains_step_sequence(lower: &str) -> bool {
    // \b\d+\s*[.)]\s+\w+ — a digit, optional whitespace, `.` or `)`, whitespace, a word.
    let bytes = lower.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let digit_is_word_start = start == 0 || !is_word_byte(bytes[start - 1]);
            if !digit_is_word_start {
                continue;
            }
            let mut j = i;
            while j < bytes.len() && bytes[j] == b' ' {
                j += 1;
            }
            if j < bytes.len() && (bytes[j] == b'.' || bytes[j] == b')') {
                let mut k = j + 1;
                let mut saw_space = false;
                while k < bytes.len() && bytes[k] == b' ' {
                    k += 1;
                    saw_space = true;
                }
                if saw_space && k < bytes.len() && is_word_byte(bytes[k]) {
                    return true;
                }
            }
        } else {
            i += 1;
        }
    }
    false
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Result of scoring a task's message: complexity plus the two derived flags
/// that do not themselves add to the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scored {
    pub complexity: u8,
    pub realtime: bool,
    pub privacy_flag: bool,
}

/// Score `message` against `config` — spec §4.1.1. Pure and deterministic;
/// P1 (Scoring determinism) follows directly from having no hidden state.
pub fn score(message: &str, config: &RouterConfig) -> Scored {
    let lower = message.to_lowercase();
    let mut total: u32 = 0;

    let tokens = approx_token_count(message);
    if tokens >= 1000 {
        total += 2;
    }
    if tokens >= 4000 {
        total += 2;
    }

    let has_marker = MULTI_STEP_MARKERS.iter().any(|m| lower.contains(m)) || contains_step_sequence(&lower);
    if has_marker {
        total += 3;
    }

    if DOMAIN_KEYWORDS.iter().any(|k| lower.contains(k)) {
        total += 2;
    }

    let complexity = total.min(10) as u8;
    let realtime = REALTIME_MARKERS.iter().any(|m| lower.contains(m));
    let privacy_flag = config.privacy_mode || PRIVACY_MARKERS.iter().any(|m| lower.contains(m));

    Scored { complexity, realtime, privacy_flag }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RouterConfig {
        RouterConfig::default()
    }

    #[test]
    fn short_plain_message_scores_zero() {
        let s = score("Hi", &cfg());
        assert_eq!(s.complexity, 0);
        assert!(!s.realtime);
        assert!(!s.privacy_flag);
    }

    #[test]
    fn long_multistep_text_matches_scenario_3() {
        // ~4,100 approximate tokens (len/4) containing "first ... then ... finally"
        // but no domain keyword. Expected: min(2+2+3, 10) = 7.
        let filler = "word ".repeat(4100 * 4 / 5);
        let text = format!("{filler} first we prepare, then we execute, finally we verify.");
        let s = score(&text, &cfg());
        assert_eq!(s.complexity, 7);
    }

    #[test]
    fn domain_keyword_adds_once_even_with_multiple_families() {
        let s = score("please review this code and also the math and the law here", &cfg());
        // code/math/law all present but the bonus is +2 once, not stacked.
        assert_eq!(s.complexity, 2);
    }

    #[test]
    fn numbered_step_list_is_detected_by_regex_equivalent() {
        let s = score("1. gather inputs 2. run the job 3. report results", &cfg());
        assert_eq!(s.complexity, 3);
    }

    #[test]
    fn realtime_markers_do_not_add_to_score() {
        let s = score("I need this now, urgent!", &cfg());
        assert_eq!(s.complexity, 0);
        assert!(s.realtime);
    }

    #[test]
    fn privacy_marker_sets_flag_without_affecting_score() {
        let s = score("this is confidential information", &cfg());
        assert_eq!(s.complexity, 0);
        assert!(s.privacy_flag);
    }

    #[test]
    fn privacy_mode_config_forces_flag_even_without_keyword() {
        let mut c = cfg();
        c.privacy_mode = true;
        let s = score("summarise this document", &c);
        assert!(s.privacy_flag);
    }

    #[test]
    fn score_is_deterministic_p1() {
        let text = "first do this, then do that, finally ship the code";
        let a = score(text, &cfg());
        let b = score(text, &cfg());
        assert_eq!(a, b);
        assert!(a.complexity <= 10);
    }
}
