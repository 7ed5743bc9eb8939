//! `toolweave status` — show configuration, provider and server status.

use anyhow::Result;
use colored::Colorize;

use toolweave_core::config::{get_config_path, load_config};
use toolweave_providers::registry::{match_provider, PROVIDERS};

use crate::helpers::display_path;

/// Run the status command.
pub fn run() -> Result<()> {
    let config = load_config(None);
    let config_path = get_config_path();

    println!();
    println!("{}", "Toolweave Status".cyan().bold());
    println!();

    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        display_path(&config_path),
        if config_path.exists() {
            "✓".green().to_string()
        } else {
            "(not found, using defaults)".red().to_string()
        }
    );

    let history_path = config.sessions.history_path();
    println!(
        "  {:<18} {} {}",
        "Sessions:".bold(),
        display_path(&history_path),
        format!(
            "(ttl {} min, keep {} recent)",
            config.sessions.ttl_minutes, config.sessions.max_recent
        )
        .dimmed()
    );

    // Model
    let providers_map = config.providers.to_map();
    let provider = match match_provider(&config.agent.model, &providers_map) {
        Some((_, spec)) => format!("via {}", spec.display_name).green().to_string(),
        None => "no configured provider".red().to_string(),
    };
    println!(
        "  {:<18} {} {}",
        "Model:".bold(),
        config.agent.model,
        provider
    );

    println!(
        "  {:<18} {} | {} | {}",
        "Parameters:".bold(),
        format!("temp: {}", config.agent.temperature).dimmed(),
        format!("max_tokens: {}", config.agent.max_tokens).dimmed(),
        format!(
            "rounds: {}, calls/round: {}",
            config.agent.max_rounds, config.agent.max_tool_calls_per_round
        )
        .dimmed(),
    );

    // Providers
    println!();
    println!("  {}", "Providers:".bold());
    for spec in PROVIDERS {
        let status = match providers_map.get(spec.name) {
            Some(p) if p.is_configured() => format!("{} (key set)", "✓".green()),
            _ => format!("{}", "· not configured".dimmed()),
        };
        println!("    {:<20} {}", spec.display_name, status);
    }

    // Tool servers
    println!();
    println!("  {}", "Tool servers:".bold());
    if config.servers.is_empty() {
        println!("    {}", "(none)".dimmed());
    }
    for server in &config.servers {
        let timeout = server
            .timeout_secs
            .unwrap_or(config.agent.tool_call_timeout_secs);
        println!(
            "    {:<20} {} {}",
            server.name,
            std::iter::once(server.command.as_str())
                .chain(server.args.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" "),
            format!("(timeout {timeout}s, clip {} chars)", server.result_max_chars).dimmed()
        );
    }

    println!();

    Ok(())
}
