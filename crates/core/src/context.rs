//! Per-thread conversation context.
//!
//! `ContextState` is the evolving summary the tracker keeps for each
//! thread: what kind of conversation it is, how expert the user seems, and
//! which interaction patterns have been observed.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::memory::clamp_unit;

macro_rules! label_enum {
    ($name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationType {
    #[default]
    General,
    Technical,
    Troubleshooting,
    Creation,
    Memory,
    WebSearch,
}

label_enum!(ConversationType {
    General => "general",
    Technical => "technical",
    Troubleshooting => "troubleshooting",
    Creation => "creation",
    Memory => "memory",
    WebSearch => "web_search",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpertiseLevel {
    Low,
    #[default]
    Medium,
    High,
}

label_enum!(ExpertiseLevel {
    Low => "low",
    Medium => "medium",
    High => "high",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskComplexity {
    #[default]
    Simple,
    Complex,
}

label_enum!(TaskComplexity {
    Simple => "simple",
    Complex => "complex",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    #[default]
    Normal,
    High,
}

label_enum!(Urgency {
    Normal => "normal",
    High => "high",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionalTone {
    Positive,
    #[default]
    Neutral,
    Negative,
}

label_enum!(EmotionalTone {
    Positive => "positive",
    Neutral => "neutral",
    Negative => "negative",
});

/// An interaction pattern learned about the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPattern {
    pub pattern_type: String,
    pub pattern_value: String,
    /// Grows with corroborating evidence, capped at 1.0
    pub confidence: f32,
    pub evidence_count: u32,
    pub last_observed: DateTime<Utc>,
    #[serde(default)]
    pub context_tags: BTreeSet<String>,
}

impl UserPattern {
    pub fn new(
        pattern_type: impl Into<String>,
        pattern_value: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            pattern_type: pattern_type.into(),
            pattern_value: pattern_value.into(),
            confidence: clamp_unit(confidence),
            evidence_count: 1,
            last_observed: Utc::now(),
            context_tags: BTreeSet::new(),
        }
    }

    /// Map key used in `ContextState::learned_patterns`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.pattern_type, self.pattern_value)
    }

    /// Add one piece of corroborating evidence. Confidence never decreases.
    pub fn reinforce(&mut self, step: f32) {
        self.confidence = clamp_unit(self.confidence + step.max(0.0));
        self.evidence_count = self.evidence_count.saturating_add(1);
        self.last_observed = Utc::now();
    }
}

/// Evolving context for one conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextState {
    pub thread_id: String,
    #[serde(default)]
    pub conversation_type: ConversationType,
    #[serde(default)]
    pub user_expertise: ExpertiseLevel,
    #[serde(default)]
    pub task_complexity: TaskComplexity,
    #[serde(default)]
    pub urgency: Urgency,
    /// Recent user messages saying an answer was wrong
    #[serde(default)]
    pub recent_errors: u32,
    #[serde(default)]
    pub emotional_tone: EmotionalTone,
    /// Number of updates applied to this thread
    #[serde(default)]
    pub evolution_count: u64,
    #[serde(default)]
    pub learned_patterns: BTreeMap<String, UserPattern>,
    pub last_updated: DateTime<Utc>,
}

impl ContextState {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            conversation_type: ConversationType::default(),
            user_expertise: ExpertiseLevel::default(),
            task_complexity: TaskComplexity::default(),
            urgency: Urgency::default(),
            recent_errors: 0,
            emotional_tone: EmotionalTone::default(),
            evolution_count: 0,
            learned_patterns: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }

    /// Patterns at or above `min_confidence`, strongest first.
    pub fn confident_patterns(&self, min_confidence: f32) -> Vec<&UserPattern> {
        let mut patterns: Vec<_> = self
            .learned_patterns
            .values()
            .filter(|p| p.confidence >= min_confidence)
            .collect();
        patterns.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        patterns
    }
}

/// Persistence for per-thread context state.
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn load_context(&self, thread_id: &str) -> Result<Option<ContextState>>;

    async fn upsert_context(&self, state: &ContextState) -> Result<()>;

    /// Returns whether a state existed.
    async fn delete_context(&self, thread_id: &str) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_confidence_is_monotonic_and_capped() {
        let mut p = UserPattern::new("communication_style", "polite", 0.2);
        let mut last = p.confidence;
        for _ in 0..20 {
            p.reinforce(0.1);
            assert!(p.confidence >= last);
            last = p.confidence;
        }
        assert_eq!(p.confidence, 1.0);
        assert_eq!(p.evidence_count, 21);

        p.reinforce(-0.5);
        assert_eq!(p.confidence, 1.0);
    }

    #[test]
    fn labels_match_serde_names() {
        let json = serde_json::to_string(&ConversationType::WebSearch).unwrap();
        assert_eq!(json, format!("\"{}\"", ConversationType::WebSearch));
        assert_eq!(ExpertiseLevel::High.to_string(), "high");
    }

    #[test]
    fn states_written_before_tone_tracking_still_load() {
        let json = r#"{"thread_id":"t1","conversation_type":"technical","last_updated":"2024-05-01T10:00:00Z"}"#;
        let state: ContextState = serde_json::from_str(json).unwrap();
        assert_eq!(state.conversation_type, ConversationType::Technical);
        assert_eq!(state.recent_errors, 0);
        assert_eq!(state.emotional_tone, EmotionalTone::Neutral);
    }

    #[test]
    fn confident_patterns_are_sorted() {
        let mut state = ContextState::new("t1");
        for (value, conf) in [("polite", 0.3), ("concise", 0.8), ("urgent", 0.6)] {
            let p = UserPattern::new("style", value, conf);
            state.learned_patterns.insert(p.key(), p);
        }
        let strong: Vec<_> = state
            .confident_patterns(0.5)
            .into_iter()
            .map(|p| p.pattern_value.as_str())
            .collect();
        assert_eq!(strong, vec!["concise", "urgent"]);
    }
}
