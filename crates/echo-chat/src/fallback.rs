//! In-character replies used when the completion backend is unavailable.

use std::sync::LazyLock;

use rand::seq::IndexedRandom;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackCategory {
    Greeting,
    Help,
    Question,
    Default,
}

static GREETING: LazyLock<Regex> = LazyLock::new(|| keyword(r"(?i)\b(hello|hi|hey|greet\w*)\b"));
static HELP: LazyLock<Regex> = LazyLock::new(|| keyword(r"(?i)\b(help\w*|assist\w*|support\w*)\b"));
static QUESTION: LazyLock<Regex> = LazyLock::new(|| keyword(r"(?i)\b(what|how|why|when|where)\b"));

fn keyword(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid fallback pattern {pattern}: {e}"))
}

/// Pick the pool by the first keyword class the input hits.
pub fn categorize(content: &str) -> FallbackCategory {
    if GREETING.is_match(content) {
        FallbackCategory::Greeting
    } else if HELP.is_match(content) {
        FallbackCategory::Help
    } else if content.contains('?') || QUESTION.is_match(content) {
        FallbackCategory::Question
    } else {
        FallbackCategory::Default
    }
}

/// Every reply the category can produce for `content`.
pub fn pool(category: FallbackCategory, content: &str) -> Vec<String> {
    match category {
        FallbackCategory::Greeting => vec![
            "[apologetic beep] Sorry\u{2026} my server is unreachable right now. [whirr\u{26A1}]".into(),
            "[oops boop] Circuits are cooling down\u{2026} please try again later. [zzz\u{1F916}]".into(),
        ],
        FallbackCategory::Help => vec![
            "[sad beep] I can't process help requests \u{2014} connection to my brain is lost. [signal\u{274C}]".into(),
            "[gentle whirr] Systems paused\u{2026} server not responding. [\u{1F527}\u{2728}]".into(),
        ],
        FallbackCategory::Question => vec![
            "[confused beep] My smart answers are offline! Try a simpler question? [diagnostic whirr]".into(),
            "[apologetic boop] Question processing unavailable\u{2026} my AI brain needs rest! [sleepy beep]".into(),
        ],
        FallbackCategory::Default => vec![
            format!(
                "[attentive beep] I heard: \"{}\" - My AI brain is recharging! Try again tomorrow? [patient whirr]",
                excerpt(content)
            ),
            "[understanding beep] My advanced responses are offline for now, but I'm still listening! [comforting whirr]".into(),
            "[apologetic beep] Sorry, my smart circuits hit their daily limit! But I'm still your WALL-Echo! [hopeful ding]".into(),
        ],
    }
}

/// A random reply from the pool matching the input. Never empty.
pub fn fallback_reply(content: &str) -> String {
    let replies = pool(categorize(content), content);
    replies
        .choose(&mut rand::rng())
        .cloned()
        .unwrap_or_else(|| "[beep]".to_string())
}

fn excerpt(content: &str) -> String {
    const MAX: usize = 50;
    if content.chars().count() > MAX {
        let head: String = content.chars().take(MAX).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}
