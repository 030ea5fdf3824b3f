//! `mnemo config` and `mnemo init` — Configuration management commands.

use std::path::Path;

use mnemo_config::AppConfig;

use super::{CliResult, config_file, load_config};

pub async fn init(config_path: Option<&Path>, force: bool) -> CliResult {
    let path = config_file(config_path);
    if path.exists() && !force {
        println!("  Config already exists: {}", path.display());
        println!("  Run with --force to overwrite it.");
        return Ok(());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("✅ Wrote default config to {}", path.display());
    println!("   Set MNEMO_API_KEY (or api_key in the file) before chatting.");
    Ok(())
}

/// Checks that are not errors but usually mean a broken setup.
fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if !config.has_api_key() {
        warnings.push("No API key set (set MNEMO_API_KEY or OPENAI_API_KEY)");
    }
    let floor_total = config.budget.min_bucket * 4;
    if config.engine.total_tokens < floor_total {
        warnings.push("engine.total_tokens is below 4 × budget.min_bucket; bucket floors will not apply");
    }
    if !config.registry.seed_defaults {
        warnings.push("registry.seed_defaults is off; an empty store yields no prompt components");
    }
    warnings
}

pub async fn validate(config_path: Option<&Path>) -> CliResult {
    println!("🔍 Validating configuration...");

    match load_config(config_path) {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Model:      {}", config.provider.model);
            println!("   Endpoint:   {}", config.provider.api_url);
            println!(
                "   Storage:    {:?} ({})",
                config.storage.backend,
                config.storage.resolved_path().display()
            );
            println!("   Budget:     {} tokens", config.engine.total_tokens);
            println!("   Extractor:  {:?}", config.extractor.mode);
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e);
        }
    }

    Ok(())
}

pub async fn show(config_path: Option<&Path>) -> CliResult {
    let mut config = load_config(config_path)?;
    // Never print the key itself.
    if config.api_key.is_some() {
        config.api_key = Some("[REDACTED]".into());
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path(config_path: Option<&Path>) -> CliResult {
    println!("{}", config_file(config_path).display());
    Ok(())
}
