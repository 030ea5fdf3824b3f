//! Prompt assembly under token budgets.

use mnemo_core::Message;

use crate::registry::SelectedComponent;
use crate::token::{estimate_message_tokens, estimate_tokens, truncate_to_tokens};

pub const MEMORY_HEADER: &str = "What you know about the user from earlier conversations:";

/// Order in which component categories appear in the system prompt.
const CATEGORY_ORDER: &[&str] = &[
    "persona",
    "tone",
    "reasoning_style",
    "output_format",
    "memory_guidelines",
];

fn category_rank(category: &str) -> usize {
    CATEGORY_ORDER
        .iter()
        .position(|c| *c == category)
        .unwrap_or(CATEGORY_ORDER.len())
}

/// Base identity, then components, then context guidance, cut off at
/// `budget` tokens. The section that crosses the budget is truncated and
/// everything after it is dropped.
pub fn build_system_prompt(
    base: &str,
    components: &[SelectedComponent],
    awareness: &str,
    budget: usize,
) -> String {
    let mut ordered: Vec<&SelectedComponent> = components.iter().collect();
    ordered.sort_by(|a, b| {
        category_rank(&a.component.category)
            .cmp(&category_rank(&b.component.category))
            .then_with(|| a.component.category.cmp(&b.component.category))
    });

    let sections = std::iter::once(base)
        .chain(ordered.iter().map(|c| c.text.as_str()))
        .chain(std::iter::once(awareness))
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let mut prompt = String::new();
    for section in sections {
        let separator = if prompt.is_empty() { "" } else { "\n\n" };
        let candidate = format!("{prompt}{separator}{section}");
        if estimate_tokens(&candidate) <= budget {
            prompt = candidate;
            continue;
        }
        let used = estimate_tokens(&format!("{prompt}{separator}"));
        let room = budget.saturating_sub(used);
        let partial = truncate_to_tokens(section, room);
        if !partial.is_empty() {
            prompt.push_str(separator);
            prompt.push_str(partial);
        }
        break;
    }
    prompt
}

/// The memory section appended after the system prompt, or `None` when no
/// memories were included.
pub fn memory_block(compressed: &str) -> Option<String> {
    (!compressed.is_empty()).then(|| format!("{MEMORY_HEADER}\n{compressed}"))
}

/// Tokens the memory header costs on top of the compressed memories.
pub fn memory_header_tokens() -> usize {
    estimate_tokens(MEMORY_HEADER) + 1
}

/// The newest messages that fit in `budget` tokens, oldest first.
pub fn trim_history(history: &[Message], budget: usize) -> Vec<Message> {
    let mut used = 0;
    let mut kept: Vec<Message> = Vec::new();
    for message in history.iter().rev() {
        let cost = estimate_message_tokens(message);
        if used + cost > budget {
            break;
        }
        used += cost;
        kept.push(message.clone());
    }
    kept.reverse();
    kept
}
