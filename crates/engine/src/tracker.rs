//! Per-thread conversation context tracking.
//!
//! Classifies each thread from its recent messages (technical or not, how
//! expert the user seems, what kind of request it is) and accumulates
//! interaction patterns as evidence arrives. State lives in a
//! `ContextStore`, so a restarted tracker resumes where it left off.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use mnemo_config::TrackerConfig;
use mnemo_core::{
    ContextState, ContextStore, ConversationType, EmotionalTone, Error, ExpertiseLevel, Message,
    Result, Role, TaskComplexity, Urgency, UserPattern,
};
use tracing::debug;

use crate::token::{contains_any, word_count, words};

const TECHNICAL_WORDS: &[&str] = &[
    "code", "function", "class", "algorithm", "debug", "implementation", "api", "compile",
    "rust", "database", "server", "deploy",
];

const TROUBLESHOOTING_WORDS: &[&str] = &["error", "bug", "broken", "crash", "issue", "problem"];
const MEMORY_WORDS: &[&str] = &["remember", "recall"];
const WEB_SEARCH_WORDS: &[&str] = &["weather", "news", "latest"];
const CREATION_WORDS: &[&str] = &["build", "create", "make", "develop", "write"];

const LOW_EXPERTISE_CUES: &[&str] = &[
    "i'm new to",
    "i am new to",
    "beginner",
    "eli5",
    "explain like",
    "in simple terms",
    "never used",
];

/// The user telling us a previous answer missed.
const CORRECTION_WORDS: &[&str] = &["wrong", "incorrect", "mistake", "mistaken", "inaccurate"];
const CORRECTION_PHRASES: &[&str] = &["not right", "that's not", "doesn't work", "didn't work"];

const POSITIVE_WORDS: &[&str] = &["thanks", "great", "good", "awesome", "perfect", "excellent"];
const NEGATIVE_WORDS: &[&str] = &["frustrated", "confused", "difficult", "problem", "issue", "stuck"];

/// Recent user messages, including the query, read for emotional tone.
const TONE_WINDOW: usize = 3;

const URGENCY_CUES: &[&str] = &["urgent", "asap", "quickly", "immediately", "right now"];
const POLITE_CUES: &[&str] = &["please", "thanks", "thank you"];
const EXPLANATION_WORDS: &[&str] = &["explain", "how", "why"];

const NEW_PATTERN_CONFIDENCE: f32 = 0.2;
const PATTERN_STEP: f32 = 0.1;

/// Patterns at or above this confidence are mentioned in prompts.
pub const AWARENESS_MIN_CONFIDENCE: f32 = 0.5;

pub struct ConversationContextTracker {
    store: Arc<dyn ContextStore>,
    config: TrackerConfig,
}

impl ConversationContextTracker {
    pub fn new(store: Arc<dyn ContextStore>, config: TrackerConfig) -> Self {
        Self { store, config }
    }

    /// Fold one new query into the thread's state and persist it.
    ///
    /// `history` is the thread's recent messages, oldest first, not
    /// including `query`.
    pub async fn update(
        &self,
        thread_id: &str,
        history: &[Message],
        query: &str,
    ) -> Result<ContextState> {
        let mut state = self
            .store
            .load_context(thread_id)
            .await?
            .unwrap_or_else(|| ContextState::new(thread_id));
        let query_lower = query.to_lowercase();

        let window = self.config.window.max(1);
        let recent = &history[history.len().saturating_sub(window)..];
        let technical_hits = recent
            .iter()
            .map(|m| m.content.as_str())
            .chain(std::iter::once(query))
            .filter(|text| is_technical(text))
            .count();

        let (conversation_type, expertise) = if technical_hits >= self.config.technical_threshold {
            let expertise = if technical_hits >= self.config.high_expertise_threshold {
                ExpertiseLevel::High
            } else {
                ExpertiseLevel::Medium
            };
            (ConversationType::Technical, expertise)
        } else {
            (route(&query_lower), non_technical_expertise(&query_lower))
        };

        let keep_persisted = history.is_empty()
            && state.evolution_count > 0
            && conversation_type == ConversationType::General
            && expertise == ExpertiseLevel::Medium;
        if !keep_persisted {
            state.conversation_type = conversation_type;
            state.user_expertise = expertise;
        }

        state.task_complexity = if word_count(query) > self.config.complex_query_words {
            TaskComplexity::Complex
        } else {
            TaskComplexity::Simple
        };
        state.urgency = if contains_any(&query_lower, URGENCY_CUES) {
            Urgency::High
        } else {
            Urgency::Normal
        };

        let user_texts: Vec<String> = recent
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.to_lowercase())
            .chain(std::iter::once(query_lower.clone()))
            .collect();
        state.recent_errors = user_texts.iter().filter(|t| is_correction(t)).count() as u32;
        let tone_from = user_texts.len().saturating_sub(TONE_WINDOW);
        state.emotional_tone = emotional_tone(&user_texts[tone_from..]);

        for (pattern_type, value) in observed_patterns(query, &query_lower) {
            record_pattern(&mut state, pattern_type, value);
        }
        state.evolution_count += 1;
        state.last_updated = Utc::now();

        self.store.upsert_context(&state).await?;
        debug!(
            thread_id,
            conversation_type = %state.conversation_type,
            expertise = %state.user_expertise,
            technical_hits,
            recent_errors = state.recent_errors,
            tone = %state.emotional_tone,
            evolution = state.evolution_count,
            "Updated conversation context"
        );
        Ok(state)
    }

    /// Persisted state; `Error::NotFound` for threads never seen.
    pub async fn get(&self, thread_id: &str) -> Result<ContextState> {
        self.store
            .load_context(thread_id)
            .await?
            .ok_or_else(|| Error::not_found("thread", thread_id))
    }

    /// Drop a thread's state. Returns whether there was any.
    pub async fn forget(&self, thread_id: &str) -> Result<bool> {
        self.store.delete_context(thread_id).await
    }
}

fn word_set(text: &str) -> BTreeSet<String> {
    words(text).collect()
}

/// Matches singular and simple plural forms ("servers", "functions").
fn has_word(set: &BTreeSet<String>, vocabulary: &[&str]) -> bool {
    set.iter().any(|w| {
        vocabulary.contains(&w.as_str())
            || w.strip_suffix('s').is_some_and(|s| vocabulary.contains(&s))
    })
}

fn is_technical(text: &str) -> bool {
    has_word(&word_set(text), TECHNICAL_WORDS)
}

/// Keyword routing for non-technical queries. Earlier routes win.
fn route(query_lower: &str) -> ConversationType {
    let set = word_set(query_lower);
    if has_word(&set, TROUBLESHOOTING_WORDS) {
        ConversationType::Troubleshooting
    } else if has_word(&set, MEMORY_WORDS) || query_lower.contains("about me") {
        ConversationType::Memory
    } else if has_word(&set, WEB_SEARCH_WORDS)
        || contains_any(query_lower, &["stock price", "search for"])
    {
        ConversationType::WebSearch
    } else if has_word(&set, CREATION_WORDS) {
        ConversationType::Creation
    } else {
        ConversationType::General
    }
}

fn non_technical_expertise(query_lower: &str) -> ExpertiseLevel {
    if contains_any(query_lower, LOW_EXPERTISE_CUES) {
        ExpertiseLevel::Low
    } else {
        ExpertiseLevel::Medium
    }
}

fn is_correction(text_lower: &str) -> bool {
    has_word(&word_set(text_lower), CORRECTION_WORDS) || contains_any(text_lower, CORRECTION_PHRASES)
}

fn emotional_tone(texts_lower: &[String]) -> EmotionalTone {
    let set: BTreeSet<String> = texts_lower.iter().flat_map(|t| words(t)).collect();
    let count = |vocabulary: &[&str]| vocabulary.iter().filter(|w| set.contains(**w)).count();
    let (positive, negative) = (count(POSITIVE_WORDS), count(NEGATIVE_WORDS));
    match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => EmotionalTone::Positive,
        std::cmp::Ordering::Less => EmotionalTone::Negative,
        std::cmp::Ordering::Equal => EmotionalTone::Neutral,
    }
}

fn observed_patterns(query: &str, query_lower: &str) -> Vec<(&'static str, &'static str)> {
    let set = word_set(query_lower);
    let mut patterns = Vec::new();
    if contains_any(query_lower, POLITE_CUES) {
        patterns.push(("communication_style", "polite"));
    }
    if word_count(query) <= 8 && query.trim_end().ends_with('?') {
        patterns.push(("communication_style", "concise"));
    }
    if has_word(&set, EXPLANATION_WORDS) {
        patterns.push(("interaction", "seeks_explanations"));
    }
    if has_word(&set, TECHNICAL_WORDS) {
        patterns.push(("interaction", "technical_communication"));
    }
    if contains_any(query_lower, URGENCY_CUES) {
        patterns.push(("urgency", "high"));
    }
    patterns
}

/// New patterns start at 0.2; each corroboration adds 0.1 up to 1.0.
fn record_pattern(state: &mut ContextState, pattern_type: &str, value: &str) {
    let tag = state.conversation_type.as_str().to_string();
    let key = format!("{pattern_type}:{value}");
    match state.learned_patterns.get_mut(&key) {
        Some(pattern) => {
            pattern.reinforce(PATTERN_STEP);
            pattern.context_tags.insert(tag);
        }
        None => {
            let mut pattern = UserPattern::new(pattern_type, value, NEW_PATTERN_CONFIDENCE);
            pattern.context_tags.insert(tag);
            state.learned_patterns.insert(key, pattern);
        }
    }
}

/// Prompt guidance derived from a thread's context. Empty when there is
/// nothing beyond the defaults to say.
pub fn context_awareness(state: &ContextState) -> String {
    let mut lines: Vec<String> = Vec::new();

    let kind = match state.conversation_type {
        ConversationType::General => None,
        ConversationType::Technical => {
            Some("The conversation is technical; precise terminology and code examples are welcome.")
        }
        ConversationType::Troubleshooting => {
            Some("The user is troubleshooting a problem; focus on diagnosing and fixing it.")
        }
        ConversationType::Creation => {
            Some("The user is making something; offer concrete, usable output.")
        }
        ConversationType::Memory => {
            Some("The user is asking what you know about them; draw on the remembered facts.")
        }
        ConversationType::WebSearch => {
            Some("The user wants current information; say plainly what you cannot verify.")
        }
    };
    lines.extend(kind.map(str::to_string));

    match state.user_expertise {
        ExpertiseLevel::High => lines.push("The user is highly experienced; skip the basics.".into()),
        ExpertiseLevel::Low => {
            lines.push("The user is new to this; explain terms and avoid jargon.".into())
        }
        ExpertiseLevel::Medium => {}
    }
    if state.task_complexity == TaskComplexity::Complex {
        lines.push("This is a complex request; structure the answer.".into());
    }
    if state.urgency == Urgency::High {
        lines.push("The user is in a hurry; lead with the answer.".into());
    }
    if state.recent_errors > 1 {
        lines.push(
            "Recent answers missed the mark; check this one carefully and correct earlier mistakes."
                .into(),
        );
    }
    match state.emotional_tone {
        EmotionalTone::Negative => {
            lines.push("The user seems frustrated; be patient and acknowledge the difficulty.".into())
        }
        EmotionalTone::Positive => {
            lines.push("The user is happy with the help so far; keep the same approach.".into())
        }
        EmotionalTone::Neutral => {}
    }

    let patterns: Vec<String> = state
        .confident_patterns(AWARENESS_MIN_CONFIDENCE)
        .into_iter()
        .map(|p| format!("{} {}", p.pattern_type.replace('_', " "), p.pattern_value.replace('_', " ")))
        .collect();
    if !patterns.is_empty() {
        lines.push(format!("Observed about this user: {}.", patterns.join("; ")));
    }

    lines.join("\n")
}
