//! Heuristic response quality scoring.
//!
//! Every response starts from a neutral 0.5; each `QualitySignal` that
//! fires nudges the score up or down and may name an issue. The result
//! feeds the prompt component registry's weight updates.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::trace;

use crate::token::contains_any;

const NEUTRAL_SCORE: f32 = 0.5;

/// The effect of one signal on one response.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalOutcome {
    pub delta: f32,
    pub issue: Option<String>,
}

impl SignalOutcome {
    pub fn bonus(delta: f32) -> Self {
        Self { delta, issue: None }
    }

    pub fn penalty(delta: f32, issue: impl Into<String>) -> Self {
        Self {
            delta: -delta.abs(),
            issue: Some(issue.into()),
        }
    }
}

/// One pluggable quality heuristic.
///
/// `response_lower` and `query_lower` are already lowercased; `None`
/// means the signal has nothing to say about this exchange.
pub trait QualitySignal: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, response_lower: &str, query_lower: &str) -> Option<SignalOutcome>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QualityReport {
    /// Final score in [0, 1]
    pub overall_score: f32,
    pub issues: Vec<String>,
    /// Delta contributed by each signal that fired, keyed by signal name
    pub signals: BTreeMap<String, f32>,
    /// Whether the score clears the success threshold
    pub success: bool,
}

pub struct QualityAssessor {
    signals: Vec<Box<dyn QualitySignal>>,
    success_threshold: f32,
}

impl QualityAssessor {
    /// An assessor with no signals; every non-empty response scores 0.5.
    pub fn empty(success_threshold: f32) -> Self {
        Self {
            signals: Vec::new(),
            success_threshold,
        }
    }

    /// The standard rubric: length, apology, uncertainty, recall, helpfulness.
    pub fn heuristic(success_threshold: f32) -> Self {
        Self::empty(success_threshold)
            .with_signal(LengthSignal)
            .with_signal(ApologySignal)
            .with_signal(UncertaintySignal)
            .with_signal(RecallSignal)
            .with_signal(HelpfulSignal)
    }

    pub fn with_signal(mut self, signal: impl QualitySignal + 'static) -> Self {
        self.signals.push(Box::new(signal));
        self
    }

    pub fn signal_names(&self) -> Vec<&str> {
        self.signals.iter().map(|s| s.name()).collect()
    }

    pub fn score(&self, response: &str, query: &str) -> QualityReport {
        if response.trim().is_empty() {
            return QualityReport {
                overall_score: 0.0,
                issues: vec!["empty_response".into()],
                signals: BTreeMap::new(),
                success: false,
            };
        }

        let response_lower = response.to_lowercase();
        let query_lower = query.to_lowercase();

        let mut score = NEUTRAL_SCORE;
        let mut issues = Vec::new();
        let mut signals = BTreeMap::new();
        for signal in &self.signals {
            let Some(outcome) = signal.evaluate(&response_lower, &query_lower) else {
                continue;
            };
            score += outcome.delta;
            signals.insert(signal.name().to_string(), outcome.delta);
            if let Some(issue) = outcome.issue {
                issues.push(issue);
            }
        }

        let overall_score = score.clamp(0.0, 1.0);
        trace!(overall_score, ?issues, "Scored response");
        QualityReport {
            overall_score,
            issues,
            signals,
            success: overall_score > self.success_threshold,
        }
    }
}

/// Very short replies are penalized, thorough ones rewarded.
pub struct LengthSignal;

impl QualitySignal for LengthSignal {
    fn name(&self) -> &str {
        "length"
    }

    fn evaluate(&self, response_lower: &str, _query_lower: &str) -> Option<SignalOutcome> {
        let chars = response_lower.trim().chars().count();
        if chars < 20 {
            Some(SignalOutcome::penalty(0.2, "too_short"))
        } else if chars > 1000 {
            Some(SignalOutcome::bonus(0.1))
        } else {
            None
        }
    }
}

const APOLOGY_PHRASES: &[&str] = &[
    "sorry",
    "i apologize",
    "unfortunately",
    "i encountered an error",
    "an error occurred",
];

pub struct ApologySignal;

impl QualitySignal for ApologySignal {
    fn name(&self) -> &str {
        "apology"
    }

    fn evaluate(&self, response_lower: &str, _query_lower: &str) -> Option<SignalOutcome> {
        contains_any(response_lower, APOLOGY_PHRASES)
            .then(|| SignalOutcome::penalty(0.15, "apologetic"))
    }
}

const UNCERTAINTY_PHRASES: &[&str] = &[
    "i'm not sure",
    "i am not sure",
    "i don't know",
    "i'm unsure",
    "i can't be certain",
    "i cannot be certain",
    "it's unclear",
    "i can't say for sure",
];

/// Penalty per hedge, applied at most twice.
pub struct UncertaintySignal;

impl QualitySignal for UncertaintySignal {
    fn name(&self) -> &str {
        "uncertainty"
    }

    fn evaluate(&self, response_lower: &str, _query_lower: &str) -> Option<SignalOutcome> {
        let hits = UNCERTAINTY_PHRASES
            .iter()
            .filter(|p| response_lower.contains(*p))
            .count()
            .min(2);
        (hits > 0).then(|| SignalOutcome::penalty(0.15 * hits as f32, "uncertainty"))
    }
}

const RECALL_CUES: &[&str] = &[
    "remember",
    "about me",
    "what's my",
    "what is my",
    "do you know my",
    "recall",
];

const PERSONAL_VOCABULARY: &[&str] = &[
    "your",
    "you mentioned",
    "you told me",
    "you said",
    "you are",
    "you're",
    "you work",
    "you like",
    "you live",
];

const RECALL_DENIALS: &[&str] = &[
    "i don't have any information about you",
    "i don't remember",
    "i do not remember",
    "i don't have memory",
    "i can't recall",
    "i don't have access to personal",
];

/// When the user asks what the assistant remembers, the reply should
/// talk about them.
pub struct RecallSignal;

impl QualitySignal for RecallSignal {
    fn name(&self) -> &str {
        "recall"
    }

    fn evaluate(&self, response_lower: &str, query_lower: &str) -> Option<SignalOutcome> {
        if !contains_any(query_lower, RECALL_CUES) {
            return None;
        }
        let personal = contains_any(response_lower, PERSONAL_VOCABULARY)
            && !contains_any(response_lower, RECALL_DENIALS);
        Some(if personal {
            SignalOutcome::bonus(0.15)
        } else {
            SignalOutcome::penalty(0.2, "missed_recall")
        })
    }
}

const HELPFUL_PHRASES: &[&str] = &["here's how", "you can", "try this", "first", "step"];

/// Small bonus per actionable phrase, capped at +0.15.
pub struct HelpfulSignal;

impl QualitySignal for HelpfulSignal {
    fn name(&self) -> &str {
        "helpful"
    }

    fn evaluate(&self, response_lower: &str, _query_lower: &str) -> Option<SignalOutcome> {
        let hits = HELPFUL_PHRASES
            .iter()
            .filter(|p| response_lower.contains(*p))
            .count();
        (hits > 0).then(|| SignalOutcome::bonus((0.05 * hits as f32).min(0.15)))
    }
}
