//! Fact extraction: turning one user/assistant exchange into durable
//! memory candidates.
//!
//! Only information expected to stay true beyond the current exchange is
//! extracted (identity, preferences, relationships, goals, location, work).
//! Greetings, one-off questions, and passing moods yield nothing.

mod llm;
mod pattern;

pub use llm::LlmExtractor;
pub use pattern::PatternExtractor;

use std::collections::BTreeSet;

use async_trait::async_trait;
use mnemo_core::FactCandidate;

/// Extracts memory candidates from an exchange.
///
/// Never fails: implementations recover from their own errors and return
/// an empty list, so extraction can never block a reply.
#[async_trait]
pub trait FactExtractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, user_input: &str, ai_response: &str) -> Vec<FactCandidate>;
}

const SMALL_TALK: &[&str] = &[
    "hi", "hello", "hey", "thanks", "thank you", "bye", "goodbye", "ok", "okay", "cool",
];

/// Inputs that cannot carry a durable fact.
pub fn is_small_talk(user_input: &str) -> bool {
    let normalized: String = user_input
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_lowercase();
    normalized.len() < 3 || SMALL_TALK.contains(&normalized.as_str())
}

const TAG_RULES: &[(&str, &[&str])] = &[
    ("preferences", &["favorite", "favourite", "like", "love", "prefer", "enjoy"]),
    ("identity", &["name", "called", "age", "old", "birthday"]),
    (
        "family",
        &["mother", "father", "mom", "dad", "sister", "brother", "wife", "husband", "son", "daughter", "partner"],
    ),
    ("work", &["work", "job", "career", "profession", "employer", "company"]),
    ("location", &["live", "city", "country", "from", "based"]),
    ("memory", &["remember", "recall"]),
];

/// Keyword-derived tags for a candidate that arrived without any.
pub fn infer_tags(question: &str, answer: &str) -> BTreeSet<String> {
    let text = format!("{question} {answer}");
    let words: BTreeSet<String> = crate::token::words(&text).collect();
    let mut tags: BTreeSet<String> = TAG_RULES
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| words.contains(*k)))
        .map(|(tag, _)| tag.to_string())
        .collect();
    if tags.is_empty() {
        tags.insert("general".into());
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greetings_are_small_talk() {
        for input in ["hi", "Hello!", "thank you.", "  bye  ", "ok"] {
            assert!(is_small_talk(input), "{input}");
        }
        assert!(!is_small_talk("hi, my name is Sam"));
    }

    #[test]
    fn tags_follow_keywords() {
        let tags = infer_tags("What is the user's favorite color?", "Blue");
        assert!(tags.contains("preferences"));

        let tags = infer_tags("Where does the user work?", "Google");
        assert!(tags.contains("work"));

        let tags = infer_tags("Who is the user's sister?", "Maya");
        assert!(tags.contains("family"));

        assert_eq!(
            infer_tags("Something odd?", "Indeed"),
            BTreeSet::from(["general".to_string()])
        );
    }
}
