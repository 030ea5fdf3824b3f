//! `mnemo allocate` — Preview the token split for a query.

use std::path::Path;

use mnemo_core::TokenAllocation;
use mnemo_engine::TokenBudgetAllocator;
use mnemo_engine::token::{estimate_tokens, word_count};

use super::{CliResult, load_config};

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

fn rows(a: &TokenAllocation) -> [(&'static str, usize); 4] {
    [
        ("memory", a.memory_context),
        ("history", a.conversation_history),
        ("system", a.system_prompt),
        ("response", a.response_buffer),
    ]
}

pub async fn run(config_path: Option<&Path>, query: &str, total: Option<usize>) -> CliResult {
    let config = load_config(config_path)?;
    let total = total.unwrap_or(config.engine.total_tokens);
    let allocator = TokenBudgetAllocator::new(config.budget.clone());
    let allocation = allocator.allocate(query, total, None);

    println!("📊 Token budget for {total} tokens");
    println!(
        "   Query: {} words, ~{} tokens",
        word_count(query),
        estimate_tokens(query)
    );
    println!();
    for (name, tokens) in rows(&allocation) {
        println!("   {name:<10} {tokens:>7}  ({:>5.1}%)", percent(tokens, total));
    }
    println!("   {:<10} {:>7}", "total", allocation.total());
    Ok(())
}
