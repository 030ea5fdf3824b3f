//! Token budget allocation across memory, history, system prompt, and
//! response reserve.
//!
//! Pure and deterministic. Long queries carry their own context and need
//! room to answer; short ones lean on recent history. A thread where the
//! user keeps correcting answers leans on stored facts over the history
//! that went wrong.

use mnemo_config::BudgetConfig;
use mnemo_core::{ContextState, ConversationType, TokenAllocation};
use tracing::trace;

use crate::token::word_count;

const MEMORY: usize = 0;
const HISTORY: usize = 1;
const SYSTEM: usize = 2;
const RESPONSE: usize = 3;

/// Tolerance when flooring products of float fractions, so 0.4 * 1000 is
/// 400 and not 399.
const FLOOR_EPSILON: f64 = 1e-6;

pub struct TokenBudgetAllocator {
    config: BudgetConfig,
}

impl TokenBudgetAllocator {
    pub fn new(config: BudgetConfig) -> Self {
        Self { config }
    }

    /// Split `total_budget` for `query`.
    ///
    /// Guarantees `sum <= total_budget`, and every bucket is at least
    /// `min_bucket` whenever `total_budget >= 4 * min_bucket`.
    pub fn allocate(
        &self,
        query: &str,
        total_budget: usize,
        context: Option<&ContextState>,
    ) -> TokenAllocation {
        let fractions = self.fractions(query, context);
        let min = self.config.min_bucket;

        let buckets = if total_budget >= min * 4 {
            distribute_with_floor(total_budget, &fractions, min)
        } else {
            let mut buckets = [0usize; 4];
            for (b, f) in buckets.iter_mut().zip(fractions) {
                *b = floor_share(total_budget, f, 1.0);
            }
            buckets
        };

        let allocation = TokenAllocation {
            memory_context: buckets[MEMORY],
            conversation_history: buckets[HISTORY],
            system_prompt: buckets[SYSTEM],
            response_buffer: buckets[RESPONSE],
        };
        trace!(total_budget, %allocation, "Allocated token budget");
        allocation
    }

    /// Adjusted, non-negative fractions summing to 1.0.
    fn fractions(&self, query: &str, context: Option<&ContextState>) -> [f64; 4] {
        let c = &self.config;
        let mut f = [
            c.memory_fraction,
            c.history_fraction,
            c.system_fraction,
            c.response_fraction,
        ]
        .map(decimal);

        let words = word_count(query);
        if words > c.long_query_words {
            f[MEMORY] += 0.1;
            f[RESPONSE] += 0.1;
            f[HISTORY] -= 0.2;
        } else if words < c.short_query_words {
            f[HISTORY] += 0.1;
            f[MEMORY] -= 0.1;
        }

        if c.technical_shift
            && context.is_some_and(|ctx| ctx.conversation_type == ConversationType::Technical)
        {
            f[MEMORY] += 0.1;
            f[SYSTEM] -= 0.1;
        }

        if c.error_shift && context.is_some_and(|ctx| ctx.recent_errors > 1) {
            f[MEMORY] += 0.15;
            f[HISTORY] -= 0.15;
        }

        for v in f.iter_mut() {
            *v = v.max(0.0);
        }
        let sum: f64 = f.iter().sum();
        if sum <= 0.0 {
            return [0.25; 4];
        }
        f.map(|v| v / sum)
    }
}

/// Config fractions are written as short decimals; drop the f32 noise so
/// 0.4 widens to exactly 0.4 rather than 0.4000000059604645.
fn decimal(v: f32) -> f64 {
    (f64::from(v) * 1e6).round() / 1e6
}

fn floor_share(total: usize, fraction: f64, weight_sum: f64) -> usize {
    if weight_sum <= 0.0 {
        return 0;
    }
    (total as f64 * fraction / weight_sum + FLOOR_EPSILON).floor() as usize
}

/// Proportional split where any bucket that would fall under `min` is
/// pinned at `min` and the rest is re-split among the others.
fn distribute_with_floor(total: usize, fractions: &[f64; 4], min: usize) -> [usize; 4] {
    let mut pinned = [false; 4];
    let mut buckets = [min; 4];

    loop {
        let pinned_count = pinned.iter().filter(|p| **p).count();
        let free_total = total - min * pinned_count;
        let free: Vec<usize> = (0..4).filter(|i| !pinned[*i]).collect();
        let free_weight: f64 = free.iter().map(|&i| fractions[i]).sum();

        let mut newly_pinned = false;
        for i in free {
            let share = floor_share(free_total, fractions[i], free_weight);
            if share < min {
                pinned[i] = true;
                newly_pinned = true;
            } else {
                buckets[i] = share;
            }
        }

        if !newly_pinned {
            break;
        }
    }

    for i in 0..4 {
        if pinned[i] {
            buckets[i] = min;
        }
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator() -> TokenBudgetAllocator {
        TokenBudgetAllocator::new(BudgetConfig::default())
    }

    fn query_of(words: usize) -> String {
        vec!["word"; words].join(" ")
    }

    #[test]
    fn base_split_for_medium_queries() {
        let a = allocator().allocate(&query_of(20), 1000, None);
        assert_eq!(a.memory_context, 400);
        assert_eq!(a.conversation_history, 300);
        assert_eq!(a.system_prompt, 200);
        assert_eq!(a.response_buffer, 100);
    }

    #[test]
    fn long_queries_shift_toward_memory_and_response() {
        let a = allocator().allocate(&query_of(60), 1000, None);
        assert_eq!(a.memory_context, 500);
        assert_eq!(a.conversation_history, 100);
        assert_eq!(a.response_buffer, 200);
    }

    #[test]
    fn short_queries_shift_toward_history() {
        let a = allocator().allocate(&query_of(5), 1000, None);
        assert_eq!(a.memory_context, 300);
        assert_eq!(a.conversation_history, 400);
    }

    #[test]
    fn long_query_gets_at_least_short_query_memory() {
        let alloc = allocator();
        for total in [400, 800, 1500, 4000, 32_000] {
            let long = alloc.allocate(&query_of(60), total, None);
            let short = alloc.allocate(&query_of(5), total, None);
            assert!(long.memory_context >= short.memory_context, "total {total}");
        }
    }

    #[test]
    fn invariants_hold_across_budgets_and_queries() {
        let alloc = allocator();
        let technical = {
            let mut s = ContextState::new("t");
            s.conversation_type = ConversationType::Technical;
            s
        };
        let corrected = {
            let mut s = technical.clone();
            s.recent_errors = 3;
            s
        };
        for total in (400..6000).step_by(37) {
            for words in [0, 3, 9, 10, 25, 50, 51, 120] {
                for ctx in [None, Some(&technical), Some(&corrected)] {
                    let a = alloc.allocate(&query_of(words), total, ctx);
                    assert!(a.total() <= total, "sum {} > {total}", a.total());
                    assert!(a.min_bucket() >= 100, "{a} for total {total}, {words} words");
                }
            }
        }
    }

    #[test]
    fn floor_is_enforced_by_rebalancing() {
        // 60 words at 400: history share would be 40 tokens.
        let a = allocator().allocate(&query_of(60), 400, None);
        assert_eq!(a.conversation_history, 100);
        assert!(a.total() <= 400);
        assert!(a.min_bucket() >= 100);
    }

    #[test]
    fn tiny_budgets_never_overspend() {
        for total in [0, 1, 50, 150, 399] {
            let a = allocator().allocate("hello there", total, None);
            assert!(a.total() <= total);
        }
    }

    #[test]
    fn technical_context_moves_system_budget_to_memory() {
        let mut ctx = ContextState::new("t");
        ctx.conversation_type = ConversationType::Technical;
        let plain = allocator().allocate(&query_of(20), 2000, None);
        let tech = allocator().allocate(&query_of(20), 2000, Some(&ctx));
        assert!(tech.memory_context > plain.memory_context);
        assert!(tech.system_prompt < plain.system_prompt);
    }

    #[test]
    fn repeated_corrections_move_history_budget_to_memory() {
        let mut ctx = ContextState::new("t");
        ctx.recent_errors = 1;
        let once = allocator().allocate(&query_of(20), 1000, Some(&ctx));
        assert_eq!(once.memory_context, 400);

        ctx.recent_errors = 2;
        let a = allocator().allocate(&query_of(20), 1000, Some(&ctx));
        assert_eq!(a.memory_context, 550);
        assert_eq!(a.conversation_history, 150);
        assert_eq!(a.system_prompt, 200);
        assert_eq!(a.response_buffer, 100);
    }

    #[test]
    fn allocation_is_deterministic() {
        let q = "How should I structure a Rust workspace with several crates?";
        assert_eq!(allocator().allocate(q, 3000, None), allocator().allocate(q, 3000, None));
    }
}
