//! Memory facts: durable question/answer records about a user.
//!
//! A fact is written once by the engine after extraction and read back by
//! the context compressor on every later turn. Only importance can change
//! after the write (consolidation re-scoring).

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Tag marking a fact as belonging to one thread only. Such facts are
/// removed together with their thread.
pub const THREAD_SCOPED_TAG: &str = "thread_scoped";

/// Coarse importance of a remembered fact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    #[default]
    Medium,
    High,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Importance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Importance {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" | "normal" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown importance '{other}'")),
        }
    }
}

/// A persisted memory fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryFact {
    /// Unique ID (UUID v4 unless supplied)
    pub id: String,

    /// Question phrasing, e.g. "What is the user's name?"
    pub question: String,

    /// Answer phrasing, e.g. "Alex"
    pub answer: String,

    /// Category tags; a set, so ordering and duplicates do not matter
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// The agent (persona) that recorded this fact
    pub agent: String,

    #[serde(default)]
    pub importance: Importance,

    /// Extraction confidence in [0, 1]
    pub confidence: f32,

    pub created_at: DateTime<Utc>,

    /// Thread the fact was extracted from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_thread_id: Option<String>,
}

impl MemoryFact {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            question: question.into(),
            answer: answer.into(),
            tags: BTreeSet::new(),
            agent: agent.into(),
            importance: Importance::default(),
            confidence: 1.0,
            created_at: Utc::now(),
            source_thread_id: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = clamp_unit(confidence);
        self
    }

    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.source_thread_id = Some(thread_id.into());
        self
    }

    /// Bring a record read from storage back within the value invariants.
    pub fn normalized(mut self) -> Self {
        self.confidence = clamp_unit(self.confidence);
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
        self
    }

    pub fn is_thread_scoped_to(&self, thread_id: &str) -> bool {
        self.tags.contains(THREAD_SCOPED_TAG)
            && self.source_thread_id.as_deref() == Some(thread_id)
    }

    /// Whether the fact carries at least one of `tags`.
    pub fn has_any_tag(&self, tags: &BTreeSet<String>) -> bool {
        tags.iter().any(|t| self.tags.contains(t))
    }
}

/// A fact proposed by an extractor, not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCandidate {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub importance: Importance,
    pub confidence: f32,
    /// Why this is worth remembering
    #[serde(default)]
    pub justification: String,
}

impl FactCandidate {
    /// Turn the candidate into a storable fact owned by `agent`.
    pub fn into_fact(self, agent: &str, thread_id: Option<&str>) -> MemoryFact {
        let mut fact = MemoryFact::new(self.question, self.answer, agent)
            .with_tags(self.tags)
            .with_importance(self.importance)
            .with_confidence(self.confidence);
        fact.source_thread_id = thread_id.map(str::to_string);
        fact
    }
}

/// Filter for `MemoryStore::find`. Empty filter returns everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactFilter {
    /// Match facts carrying any of these tags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,

    /// Match facts recorded by this agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

impl FactFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn tagged<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: Some(tags.into_iter().map(Into::into).collect()),
            agent: None,
        }
    }

    pub fn for_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn matches(&self, fact: &MemoryFact) -> bool {
        let tag_ok = self
            .tags
            .as_ref()
            .is_none_or(|tags| tags.is_empty() || fact.has_any_tag(tags));
        let agent_ok = self.agent.as_deref().is_none_or(|a| fact.agent == a);
        tag_ok && agent_ok
    }
}

/// Durable fact storage.
///
/// Implementations: in-memory (tests), JSONL file, SQLite.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "file", "in_memory").
    fn name(&self) -> &str;

    /// Persist a fact and return its id.
    async fn save(&self, fact: MemoryFact) -> Result<String>;

    /// Facts matching `filter`, in insertion order.
    async fn find(&self, filter: &FactFilter) -> Result<Vec<MemoryFact>>;

    /// Fetch one fact; `Error::NotFound` when unknown.
    async fn get(&self, id: &str) -> Result<MemoryFact>;

    /// Remove one fact; `Error::NotFound` when unknown.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Re-score a fact's importance.
    async fn update_importance(&self, id: &str, importance: Importance) -> Result<()>;

    /// Remove facts scoped to `thread_id`, returning how many were removed.
    async fn delete_thread_scoped(&self, thread_id: &str) -> Result<usize>;

    async fn count(&self) -> Result<usize>;
}

pub(crate) fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}
