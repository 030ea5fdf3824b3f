//! `mnemo memory` — Memory management commands.

use std::collections::BTreeSet;
use std::path::Path;

use mnemo_core::{FactFilter, MemoryFact};

use super::{CliResult, load_config, open_stores, preview};

fn filter_from(tags: Vec<String>, agent: Option<String>) -> FactFilter {
    let tags: BTreeSet<String> = tags
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    FactFilter {
        tags: (!tags.is_empty()).then_some(tags),
        agent,
    }
}

fn print_fact_line(i: usize, fact: &MemoryFact) {
    println!(
        "  {i:>3}. [{}] {} {}",
        fact.importance.as_str(),
        fact.question,
        preview(&fact.answer, 80)
    );
    let tags: Vec<&str> = fact.tags.iter().map(String::as_str).collect();
    println!("       id: {}  tags: {}", fact.id, tags.join(", "));
}

pub async fn list(
    config_path: Option<&Path>,
    tags: Vec<String>,
    agent: Option<String>,
    json: bool,
) -> CliResult {
    let config = load_config(config_path)?;
    let stores = open_stores(&config).await?;
    let facts = stores.memory.find(&filter_from(tags, agent)).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&facts)?);
        return Ok(());
    }

    if facts.is_empty() {
        println!("  No memories found.");
        return Ok(());
    }
    println!("🧠 {} memories ({})", facts.len(), stores.memory.name());
    println!();
    for (i, fact) in facts.iter().enumerate() {
        print_fact_line(i + 1, fact);
    }
    Ok(())
}

pub async fn show(config_path: Option<&Path>, id: &str) -> CliResult {
    let config = load_config(config_path)?;
    let stores = open_stores(&config).await?;
    let fact = stores.memory.get(id).await?;
    println!("{}", serde_json::to_string_pretty(&fact)?);
    Ok(())
}

pub async fn delete(config_path: Option<&Path>, id: &str) -> CliResult {
    let config = load_config(config_path)?;
    let stores = open_stores(&config).await?;
    stores.memory.delete(id).await?;
    println!("🗑️  Deleted memory {id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tag_list_means_no_tag_filter() {
        let filter = filter_from(vec![" ".into()], None);
        assert!(filter.tags.is_none());
        assert!(filter.agent.is_none());
    }

    #[test]
    fn tags_are_normalized() {
        let filter = filter_from(vec!["Work".into(), "work ".into()], Some("default".into()));
        assert_eq!(filter.tags.unwrap().len(), 1);
        assert_eq!(filter.agent.as_deref(), Some("default"));
    }
}
