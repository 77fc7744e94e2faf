//! Intent extraction from the user's first message.
//!
//! Heuristic: the goal is the message itself (minus agent-injected reminder
//! blocks), the expected scope is every file path or backticked identifier
//! it mentions, and constraints are the sentences that forbid or oblige.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use dg_domain::task::Decision;

static REMINDER_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<system-reminder>.*?</system-reminder>").expect("valid regex")
});

static FILE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[\s(`'\x22])((?:\.{0,2}/)?(?:[\w.-]+/)*[\w-]+\.[A-Za-z][A-Za-z0-9]{0,5})\b")
        .expect("valid regex")
});

static BACKTICKED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`\n]{2,80})`").expect("valid regex"));

static CONSTRAINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(don't|do not|never|must|only|avoid|without|should not|shouldn't|keep)\b")
        .expect("valid regex")
});

static DECISION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(i'll use|i will use|decided to|going with|chose to|opting for|instead of|switching to)\b")
        .expect("valid regex")
});

static BECAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(because|since|so that)\b").expect("valid regex"));

const STOPWORDS: &[&str] = &[
    "that", "this", "with", "from", "have", "will", "would", "should", "could", "there",
    "their", "then", "than", "them", "into", "also", "just", "like", "make", "need", "want",
    "when", "what", "which", "where", "while", "some", "more", "only", "here", "been", "being",
    "does", "file", "files", "code", "sure", "let's", "now", "next", "first",
];

/// What the user asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Intent {
    pub goal: String,
    pub scope: Vec<String>,
    pub constraints: Vec<String>,
}

/// Strip the reminder blocks coding agents prepend to user messages.
pub fn strip_reminders(text: &str) -> String {
    REMINDER_BLOCK.replace_all(text, "").trim().to_owned()
}

pub fn extract_intent(first_message: &str, max_goal_chars: usize) -> Intent {
    let cleaned = strip_reminders(first_message);
    let goal: String = cleaned.chars().take(max_goal_chars).collect();

    let mut scope: Vec<String> = Vec::new();
    let mut push = |s: &str| {
        let s = s.trim().trim_end_matches(['.', ',', ':']);
        if !s.is_empty() && !scope.iter().any(|x| x == s) {
            scope.push(s.to_owned());
        }
    };
    for cap in FILE_PATH.captures_iter(&cleaned) {
        push(&cap[1]);
    }
    for cap in BACKTICKED.captures_iter(&cleaned) {
        push(&cap[1]);
    }

    let constraints = sentences(&cleaned)
        .filter(|s| CONSTRAINT.is_match(s))
        .map(str::to_owned)
        .collect();

    Intent {
        goal,
        scope,
        constraints,
    }
}

/// A key decision stated in the agent's reasoning, if any.
pub fn extract_decision(reasoning: &str) -> Option<Decision> {
    let sentence = sentences(reasoning).find(|s| DECISION.is_match(s))?;
    let (choice, reason) = match BECAUSE.find(sentence) {
        Some(m) => (
            sentence[..m.start()].trim().trim_end_matches(','),
            sentence[m.end()..].trim(),
        ),
        None => (sentence, ""),
    };
    Some(Decision {
        choice: choice.to_owned(),
        reason: reason.to_owned(),
    })
}

/// The most frequent non-trivial words, most frequent first.
pub fn keywords(text: &str, max: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for word in text
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '\''))
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| w.chars().count() >= 4 && !STOPWORDS.contains(&w.as_str()))
    {
        let n = counts.entry(word.clone()).or_insert(0);
        if *n == 0 {
            order.push(word);
        }
        *n += 1;
    }
    // Stable on first appearance for equal counts.
    order.sort_by_key(|w| std::cmp::Reverse(counts[w]));
    order.truncate(max);
    order
}

fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| s.len() > 3)
}
