//! `mnemo thread` — Inspect or delete a thread's tracked context.

use std::path::Path;

use mnemo_engine::ConversationContextTracker;
use mnemo_engine::registry::PromptStrategy;
use mnemo_engine::tracker::context_awareness;

use super::{CliResult, load_config, open_stores};

pub async fn show(config_path: Option<&Path>, id: &str) -> CliResult {
    let config = load_config(config_path)?;
    let stores = open_stores(&config).await?;
    let tracker = ConversationContextTracker::new(stores.contexts, config.tracker.clone());
    let state = tracker.get(id).await?;

    println!("🧵 Thread {id}");
    println!("   Type:        {}", state.conversation_type);
    println!("   Expertise:   {}", state.user_expertise);
    println!("   Complexity:  {}", state.task_complexity);
    println!("   Urgency:     {}", state.urgency);
    println!("   Tone:        {}", state.emotional_tone);
    println!("   Corrections: {}", state.recent_errors);
    println!("   Strategy:    {:?}", PromptStrategy::for_context(&state));
    println!("   Updates:     {}", state.evolution_count);
    println!("   Updated at:  {}", state.last_updated.to_rfc3339());

    if !state.learned_patterns.is_empty() {
        println!();
        println!("   Patterns:");
        for pattern in state.confident_patterns(0.0) {
            println!(
                "     {:<40} confidence {:.2} ({} observations)",
                pattern.key(),
                pattern.confidence,
                pattern.evidence_count
            );
        }
    }

    let awareness = context_awareness(&state);
    if !awareness.is_empty() {
        println!();
        println!("   Prompt guidance:");
        for line in awareness.lines() {
            println!("     {line}");
        }
    }
    Ok(())
}

/// Chat history lives only inside a running `chat` session, so from here a
/// thread is its persisted context plus the facts scoped to it.
pub async fn delete(config_path: Option<&Path>, id: &str) -> CliResult {
    let config = load_config(config_path)?;
    let stores = open_stores(&config).await?;
    let tracker = ConversationContextTracker::new(stores.contexts, config.tracker.clone());

    let had_context = tracker.forget(id).await?;
    let facts_removed = stores.memory.delete_thread_scoped(id).await?;
    if !had_context && facts_removed == 0 {
        return Err(format!("thread not found: {id}").into());
    }

    println!("🗑️  Deleted thread {id}");
    println!("   Context:  {}", if had_context { "removed" } else { "none" });
    println!("   Facts:    {facts_removed} removed");
    Ok(())
}
