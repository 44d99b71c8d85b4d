//! Heuristic technical / casual / mixed scoring of a user message.
//!
//! Every lexical pattern that matches adds 2 to its category, every contextual
//! clue adds 1. The rule tables are built once and never mutated.

use std::sync::LazyLock;

use regex::Regex;

use echo_types::models::{ConversationType, MessageMetadata, Scores};

const LEXICAL_WEIGHT: u32 = 2;
const CLUE_WEIGHT: u32 = 1;

/// A contextual clue: either a regex or a plain predicate over the text.
pub enum Clue {
    Pattern(Regex),
    Check(fn(&str) -> bool),
}

impl Clue {
    fn matches(&self, text: &str) -> bool {
        match self {
            Self::Pattern(re) => re.is_match(text),
            Self::Check(check) => check(text),
        }
    }
}

pub struct Rules {
    pub technical_patterns: Vec<Regex>,
    pub casual_patterns: Vec<Regex>,
    pub technical_clues: Vec<Clue>,
    pub casual_clues: Vec<Clue>,
}

fn re(pattern: &str) -> Regex {
    // Patterns are compile-time literals covered by tests.
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid classifier pattern {pattern}: {e}"))
}

/// Words are counted by single spaces, so runs of spaces add empty words.
fn word_count(text: &str) -> usize {
    text.split(' ').count()
}

/// The built-in rule set.
pub static RULES: LazyLock<Rules> = LazyLock::new(|| Rules {
    technical_patterns: vec![
        re(r"(?i)^(explain|define|what\s+is|how\s+does|how\s+do|why\s+does)"),
        re(r"(?i)^(compare|difference\s+between|implement|create|build)"),
        re(r"(?i)^(solve|calculate|find|determine|analyze|design)"),
        re(r"(?i)(step\s+by\s+step|tutorial|guide|documentation)"),
    ],
    casual_patterns: vec![
        re(r"(?i)^(hi|hello|hey|good\s+(morning|afternoon|evening))"),
        re(r"(?i)^(how\s+are\s+you|whats?\s+up|feeling)"),
        re(r"(?i)(chat|talk|story|joke|funny)"),
    ],
    technical_clues: vec![
        Clue::Check(|t| t.contains('(') && t.contains(')')),
        Clue::Pattern(re(r"(?-u:\b)[A-Z]{2,}(?-u:\b)")),
        Clue::Pattern(re(r"(?-u:\b\d+)\s*[a-zA-Z]+(?-u:\b)")),
        Clue::Check(|t| t.contains("vs") || t.contains("versus")),
        Clue::Pattern(re(r"(?-u:\b\w+)\.(?-u:\w+)")),
    ],
    casual_clues: vec![
        Clue::Check(|t| t.contains('!') && !t.contains('?')),
        Clue::Pattern(re(r"(?i)(?-u:\b)(lol|haha|omg|wow)(?-u:\b)")),
        Clue::Check(|t| t.contains('😊') || t.contains("❤️")),
        Clue::Check(|t| word_count(t) < 10 && !t.contains('?')),
    ],
});

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub kind: ConversationType,
    pub technical_score: u32,
    pub casual_score: u32,
}

impl Classification {
    /// Share of the total score held by the winning category; 0.5 when
    /// neither side won.
    pub fn confidence(&self) -> f64 {
        let total = self.technical_score + self.casual_score;
        let winner = match self.kind {
            ConversationType::Technical => self.technical_score,
            ConversationType::Casual => self.casual_score,
            ConversationType::Mixed => return 0.5,
        };
        if total == 0 {
            return 0.5;
        }
        f64::from(winner) / f64::from(total)
    }

    pub fn metadata(&self, is_shared: bool) -> MessageMetadata {
        MessageMetadata {
            conversation_type: self.kind,
            confidence: self.confidence(),
            scores: Scores {
                technical: self.technical_score,
                casual: self.casual_score,
            },
            is_shared,
        }
    }
}

/// Classify with the built-in rules.
pub fn classify(text: &str) -> Classification {
    classify_with(&RULES, text)
}

/// Patterns see the raw text: anchored rules do not skip leading whitespace
/// and word boundaries are ASCII-only.
pub fn classify_with(rules: &Rules, text: &str) -> Classification {
    if text.trim().is_empty() {
        return Classification {
            kind: ConversationType::Mixed,
            technical_score: 0,
            casual_score: 0,
        };
    }

    let mut technical = lexical_score(&rules.technical_patterns, text)
        + clue_score(&rules.technical_clues, text);
    let mut casual =
        lexical_score(&rules.casual_patterns, text) + clue_score(&rules.casual_clues, text);

    let words = word_count(text);
    if words > 20 && text.contains('?') {
        technical += 1;
    }
    if words < 5 {
        casual += 1;
    }

    let kind = if technical > casual && technical >= 2 {
        ConversationType::Technical
    } else if casual > technical {
        ConversationType::Casual
    } else {
        ConversationType::Mixed
    };

    Classification {
        kind,
        technical_score: technical,
        casual_score: casual,
    }
}

fn lexical_score(patterns: &[Regex], text: &str) -> u32 {
    patterns.iter().filter(|p| p.is_match(text)).count() as u32 * LEXICAL_WEIGHT
}

fn clue_score(clues: &[Clue], text: &str) -> u32 {
    clues.iter().filter(|c| c.matches(text)).count() as u32 * CLUE_WEIGHT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explain_prompt_is_technical() {
        let c = classify("explain how TCP works");
        assert_eq!(c.kind, ConversationType::Technical);
        // ^explain (+2) and the all-caps token (+1)
        assert_eq!(c.technical_score, 3);
        assert_eq!(c.casual_score, 2);
    }

    #[test]
    fn leading_whitespace_defeats_anchored_patterns() {
        let c = classify("  explain how TCP works");
        // only the all-caps clue and the short-message clue fire
        assert_eq!(c.technical_score, 1);
        assert_eq!(c.casual_score, 1);
        assert_eq!(c.kind, ConversationType::Mixed);
    }

    #[test]
    fn word_boundaries_are_ascii() {
        // É is not a word character, so "CAF" counts as an all-caps token
        let c = classify("CAFÉ menu");
        assert_eq!(c.technical_score, 1);
        assert_eq!(c.casual_score, 2);
    }

    #[test]
    fn empty_text_is_mixed() {
        for text in ["", "   ", "\n"] {
            let c = classify(text);
            assert_eq!(c.kind, ConversationType::Mixed);
            assert_eq!(c.technical_score, c.casual_score);
        }
    }

    #[test]
    fn greeting_is_casual() {
        let c = classify("hello! how are you doing today");
        assert_eq!(c.kind, ConversationType::Casual);
        assert_eq!(c.casual_score, 4);
        assert_eq!(c.technical_score, 0);
    }

    #[test]
    fn comparison_question_is_technical() {
        let c = classify("What is the difference between TCP vs UDP (for games)?");
        assert_eq!(c.kind, ConversationType::Technical);
        assert_eq!(c.technical_score, 5);
        assert_eq!(c.casual_score, 0);
    }

    #[test]
    fn single_technical_clue_is_not_enough() {
        let c = classify("Is the 5 km route shorter than the other one?");
        assert_eq!(c.technical_score, 1);
        assert_eq!(c.casual_score, 0);
        assert_eq!(c.kind, ConversationType::Mixed);
    }

    #[test]
    fn long_question_gets_technical_bonus() {
        let text = "I was wondering if you could tell me a little bit more about the way \
                    that plants manage to turn sunlight into the food they need?";
        let c = classify(text);
        assert!(text.split_whitespace().count() > 20);
        assert_eq!(c.technical_score, 1);
    }

    #[test]
    fn classification_is_deterministic() {
        let inputs = [
            "explain how TCP works",
            "lol that was funny!",
            "design a REST API for v2.0 of the app",
            "",
        ];
        for text in inputs {
            assert_eq!(classify(text), classify(text));
        }
    }

    #[test]
    fn confidence_reflects_winning_share() {
        let c = classify("explain how TCP works");
        assert!((c.confidence() - 0.6).abs() < 1e-9);
        assert_eq!(classify("").confidence(), 0.5);

        let meta = c.metadata(true);
        assert_eq!(meta.scores.technical, 3);
        assert!(meta.is_shared);
    }
}
