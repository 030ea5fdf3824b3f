//! `mnemo components` — Show prompt components and their learned weights.

use std::path::Path;

use mnemo_core::PromptComponent;
use mnemo_engine::PromptComponentRegistry;

use super::{CliResult, load_config, open_stores, preview};

fn print_component(c: &PromptComponent) {
    println!(
        "  {:<28} {:>6.3} {:>6.2} {:>6}  {:<9} {}",
        c.id,
        c.weight,
        c.success_rate,
        c.usage_count,
        format!("{:?}", c.status()).to_lowercase(),
        preview(&c.text_template, 50)
    );
}

pub async fn run(config_path: Option<&Path>, category: Option<&str>) -> CliResult {
    let config = load_config(config_path)?;
    let stores = open_stores(&config).await?;
    let registry = PromptComponentRegistry::load(stores.components, config.registry.clone()).await?;

    let components: Vec<PromptComponent> = registry
        .components()
        .await
        .into_iter()
        .filter(|c| category.is_none_or(|cat| c.category == cat))
        .collect();

    if components.is_empty() {
        println!("  No prompt components found.");
        return Ok(());
    }

    let mut current: Option<&str> = None;
    for c in &components {
        if current != Some(c.category.as_str()) {
            println!();
            println!("  [{}]", c.category);
            println!(
                "  {:<28} {:>6} {:>6} {:>6}  {:<9} text",
                "id", "weight", "succ", "uses", "status"
            );
            current = Some(c.category.as_str());
        }
        print_component(c);
    }
    println!();
    Ok(())
}
