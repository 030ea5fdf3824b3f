//! Prompt components: interchangeable prompt fragments with learned weights.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Lifecycle of a component. Derived from `usage_count`: a component that
/// has never been selected is a candidate, anything used is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Candidate,
    Active,
}

/// A single prompt fragment competing within its category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptComponent {
    pub id: String,

    /// Category (e.g. "tone", "persona"); one component per category is
    /// used for each prompt
    pub category: String,

    /// Fragment text; may contain `{conversation_type}` and
    /// `{user_expertise}` placeholders
    pub text_template: String,

    /// Learned preference in [-1, 1]
    #[serde(default)]
    pub weight: f32,

    /// Exponential moving average of successful uses, in [0, 1]
    #[serde(default = "default_success_rate")]
    pub success_rate: f32,

    #[serde(default)]
    pub usage_count: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

fn default_success_rate() -> f32 {
    0.5
}

impl PromptComponent {
    pub fn new(
        id: impl Into<String>,
        category: impl Into<String>,
        text_template: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            text_template: text_template.into(),
            weight: 0.0,
            success_rate: default_success_rate(),
            usage_count: 0,
            last_used_at: None,
        }
    }

    pub fn status(&self) -> ComponentStatus {
        if self.usage_count == 0 {
            ComponentStatus::Candidate
        } else {
            ComponentStatus::Active
        }
    }

    /// Record a selection.
    pub fn mark_used(&mut self) {
        self.usage_count += 1;
        self.last_used_at = Some(Utc::now());
    }

    /// Substitute context placeholders in the template.
    pub fn render(&self, conversation_type: &str, user_expertise: &str) -> String {
        self.text_template
            .replace("{conversation_type}", conversation_type)
            .replace("{user_expertise}", user_expertise)
    }

    /// Clamp learned values back into range (used after loading).
    pub fn normalized(mut self) -> Self {
        self.weight = if self.weight.is_nan() { 0.0 } else { self.weight.clamp(-1.0, 1.0) };
        self.success_rate = crate::memory::clamp_unit(self.success_rate);
        self
    }
}

/// Persistence for prompt components. Keyed by component id.
#[async_trait]
pub trait ComponentStore: Send + Sync {
    async fn load_components(&self) -> Result<Vec<PromptComponent>>;

    /// Insert or replace a component.
    async fn upsert_component(&self, component: &PromptComponent) -> Result<()>;
}
