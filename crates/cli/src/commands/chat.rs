//! `mnemo chat` — Interactive or single-message chat.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use mnemo_config::AppConfig;
use mnemo_core::Provider;
use mnemo_engine::{Engine, TurnOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{CliResult, config_file, load_config, open_stores};

/// A line typed in interactive mode.
#[derive(Debug, PartialEq)]
enum Input<'a> {
    Quit,
    Help,
    Context,
    Memories,
    Rate(u8),
    Invalid(&'static str),
    Say(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    match line {
        "exit" | "quit" | "/exit" | "/quit" => return Input::Quit,
        "/help" => return Input::Help,
        "/context" => return Input::Context,
        "/memories" => return Input::Memories,
        _ => {}
    }
    if let Some(arg) = line.strip_prefix("/rate") {
        return match arg.trim().parse::<u8>() {
            Ok(n) if (1..=5).contains(&n) => Input::Rate(n),
            _ => Input::Invalid("usage: /rate <1-5>"),
        };
    }
    if line.starts_with('/') {
        return Input::Invalid("unknown command; try /help");
    }
    Input::Say(line)
}

pub async fn run(
    config_path: Option<&Path>,
    thread: &str,
    message: Option<String>,
    json: bool,
) -> CliResult {
    let config = load_config(config_path)?;

    // Fail early, with setup instructions, when no key is configured.
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set MNEMO_API_KEY (or OPENAI_API_KEY), or add api_key to:");
        eprintln!("    {}", config_file(config_path).display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let provider: Arc<dyn Provider> = Arc::new(mnemo_providers::from_config(&config)?);
    let stores = open_stores(&config).await?;
    let engine = Engine::new(&config, provider, stores).await?;

    if let Some(msg) = message {
        let outcome = engine.handle_turn(thread, &msg).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        } else {
            println!("{}", outcome.reply);
        }
        if outcome.degraded {
            eprintln!("  [warning] the language model was unavailable");
        }
        engine.wait_idle().await;
        return Ok(());
    }

    interactive(&engine, &config, thread).await?;
    engine.wait_idle().await;
    Ok(())
}

async fn interactive(engine: &Engine, config: &AppConfig, thread: &str) -> CliResult {
    println!();
    println!("  Mnemo — Interactive Mode");
    println!();
    println!("  Model:     {}", config.provider.model);
    println!("  Storage:   {:?}", config.storage.backend);
    println!("  Thread:    {thread}");
    println!();
    println!("  Type your message and press Enter. /help lists commands.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last: Option<TurnOutcome> = None;

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_input(&line) {
            Input::Quit => break,
            Input::Say("") => continue,
            Input::Help => {
                println!("  /rate <1-5>  rate the last reply");
                println!("  /context     show what this thread has learned");
                println!("  /memories    list stored facts");
                println!("  exit         quit");
            }
            Input::Invalid(msg) => eprintln!("  {msg}"),
            Input::Rate(n) => match last.as_ref() {
                Some(outcome) => match engine.rate_turn(&outcome.turn_id, n).await {
                    Ok(update) => println!("  Rated {n}; updated {} component(s).", update.updated.len()),
                    Err(e) => eprintln!("  [Error] {e}"),
                },
                None => eprintln!("  Nothing to rate yet."),
            },
            Input::Context => match engine.get_context(thread).await {
                Ok(ctx) => println!(
                    "  type={} expertise={} complexity={} urgency={} tone={} corrections={} updates={}",
                    ctx.conversation_type,
                    ctx.user_expertise,
                    ctx.task_complexity,
                    ctx.urgency,
                    ctx.emotional_tone,
                    ctx.recent_errors,
                    ctx.evolution_count
                ),
                Err(e) if e.is_not_found() => println!("  No context yet."),
                Err(e) => eprintln!("  [Error] {e}"),
            },
            Input::Memories => {
                // Pending extraction from the last turn lands first.
                engine.wait_idle().await;
                match engine.query_memories(None, None).await {
                    Ok(facts) if facts.is_empty() => println!("  No memories yet."),
                    Ok(facts) => {
                        for fact in facts {
                            println!("  - {} {}", fact.question, fact.answer);
                        }
                    }
                    Err(e) => eprintln!("  [Error] {e}"),
                }
            }
            Input::Say(text) => {
                eprint!("  ...");
                match engine.handle_turn(thread, text).await {
                    Ok(outcome) => {
                        eprint!("\r     \r");
                        println!();
                        for line in outcome.reply.lines() {
                            println!("  Assistant > {line}");
                        }
                        println!();
                        last = Some(outcome);
                    }
                    Err(e) => {
                        eprint!("\r     \r");
                        eprintln!("  [Error] {e}");
                    }
                }
            }
        }
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_messages() {
        assert_eq!(parse_input("exit"), Input::Quit);
        assert_eq!(parse_input("  /context "), Input::Context);
        assert_eq!(parse_input("/rate 4"), Input::Rate(4));
        assert_eq!(parse_input("hello there"), Input::Say("hello there"));
        assert_eq!(parse_input("   "), Input::Say(""));
    }

    #[test]
    fn rejects_bad_ratings_and_unknown_commands() {
        assert!(matches!(parse_input("/rate 9"), Input::Invalid(_)));
        assert!(matches!(parse_input("/rate"), Input::Invalid(_)));
        assert!(matches!(parse_input("/bogus"), Input::Invalid(_)));
    }
}
