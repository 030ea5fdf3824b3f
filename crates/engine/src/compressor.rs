//! Memory selection under a token budget.
//!
//! Drops assistant boilerplate that was mistakenly stored as a fact and
//! repeated copies of the same fact, keeps the most recent facts, and
//! renders as many as fit into a `Q: ... / A: ...` block. Facts tagged with
//! a word from the query render first. Facts are never split: one that does
//! not fit is skipped and smaller ones after it may still be included.

use std::collections::{BTreeSet, HashSet};

use mnemo_config::CompressorConfig;
use mnemo_core::MemoryFact;
use serde::Serialize;
use tracing::debug;

use crate::token::{estimate_tokens, word_count, words};

const FACT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CompressionStats {
    /// Facts handed to the compressor
    pub memories_processed: usize,
    /// Facts rendered into the output
    pub memories_included: usize,
    /// Facts dropped as boilerplate or empty
    pub memories_filtered: usize,
    /// Older copies of a fact already kept
    pub duplicates_removed: usize,
    /// Estimated tokens of the output
    pub token_count: usize,
    /// Included over considered; 1.0 when the budget dropped nothing
    pub compression_ratio: f32,
}

pub struct ContextCompressor {
    max_facts: usize,
    denylist: Vec<String>,
}

impl ContextCompressor {
    pub fn new(config: &CompressorConfig) -> Self {
        Self {
            max_facts: config.max_facts,
            denylist: config.denylist.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    fn is_boilerplate(&self, fact: &MemoryFact) -> bool {
        if fact.question.trim().is_empty() || fact.answer.trim().is_empty() {
            return true;
        }
        let answer = fact.answer.to_lowercase();
        self.denylist.iter().any(|p| answer.contains(p.as_str()))
    }

    pub fn compress(
        &self,
        memories: &[MemoryFact],
        query: &str,
        token_budget: usize,
    ) -> (String, CompressionStats) {
        if memories.is_empty() {
            return (String::new(), CompressionStats::default());
        }

        let mut eligible: Vec<(usize, &MemoryFact)> = memories
            .iter()
            .enumerate()
            .filter(|(_, f)| !self.is_boilerplate(f))
            .collect();
        let filtered = memories.len() - eligible.len();

        // Newest first; equal timestamps fall back to later insertion first.
        eligible.sort_by(|(ia, a), (ib, b)| b.created_at.cmp(&a.created_at).then(ib.cmp(ia)));

        let mut seen = HashSet::new();
        let before_dedup = eligible.len();
        eligible.retain(|(_, f)| seen.insert(dedup_key(f)));
        let duplicates_removed = before_dedup - eligible.len();

        eligible.truncate(self.max_facts);

        // Stable, so recency still orders facts within each group.
        let query_words: BTreeSet<String> = words(query).collect();
        eligible.sort_by_key(|(_, f)| !f.tags.iter().any(|t| query_words.contains(t.as_str())));

        let mut text = String::new();
        let mut included = 0;
        for (_, fact) in &eligible {
            let block = format!("Q: {}\nA: {}", fact.question.trim(), fact.answer.trim());
            let separator = if text.is_empty() { "" } else { FACT_SEPARATOR };
            let projected = text.len() + separator.len() + block.len();
            if projected.div_ceil(4) > token_budget {
                continue;
            }
            text.push_str(separator);
            text.push_str(&block);
            included += 1;
        }

        let considered = eligible.len();
        let compression_ratio = if included == considered {
            1.0
        } else {
            included as f32 / considered as f32
        };

        let stats = CompressionStats {
            memories_processed: memories.len(),
            memories_included: included,
            memories_filtered: filtered,
            duplicates_removed,
            token_count: estimate_tokens(&text),
            compression_ratio,
        };
        debug!(
            query_words = word_count(query),
            token_budget,
            processed = stats.memories_processed,
            included = stats.memories_included,
            filtered = stats.memories_filtered,
            duplicates = stats.duplicates_removed,
            "Compressed memory context"
        );
        (text, stats)
    }
}

/// Case and whitespace do not make two facts different.
fn dedup_key(fact: &MemoryFact) -> (String, String) {
    let squash = |s: &str| {
        s.chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect::<String>()
    };
    (squash(&fact.question), squash(&fact.answer))
}
