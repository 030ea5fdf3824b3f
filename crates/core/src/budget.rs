//! Token allocation across the four prompt regions.

use serde::{Deserialize, Serialize};

/// How a turn's token budget is split. Ephemeral; never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAllocation {
    pub memory_context: usize,
    pub conversation_history: usize,
    pub system_prompt: usize,
    pub response_buffer: usize,
}

impl TokenAllocation {
    pub fn total(&self) -> usize {
        self.memory_context + self.conversation_history + self.system_prompt + self.response_buffer
    }

    pub fn min_bucket(&self) -> usize {
        self.memory_context
            .min(self.conversation_history)
            .min(self.system_prompt)
            .min(self.response_buffer)
    }
}

impl std::fmt::Display for TokenAllocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "memory={} history={} system={} response={} (total {})",
            self.memory_context,
            self.conversation_history,
            self.system_prompt,
            self.response_buffer,
            self.total()
        )
    }
}
