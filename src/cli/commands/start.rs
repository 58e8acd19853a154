//! `envboot start` - run the bootstrap and render its events live.

use std::sync::Arc;

use anyhow::Context;
use console::style;

use envboot::bootstrap::{
    BootstrapEvent, BootstrapState, ChannelSink, EnvBootstrapService, LogEntry, LogLevel,
    LogSource,
};
use envboot::config::AppConfig;

pub async fn execute(config: &AppConfig, json: bool) -> anyhow::Result<()> {
    let service =
        EnvBootstrapService::from_config(config).context("Failed to set up bootstrap service")?;

    let (sink, mut rx) = ChannelSink::channel();
    let renderer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if json {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!("Failed to serialize event: {}", e),
                }
            } else {
                print_event(&event);
            }
        }
    });

    let state = service.start(Arc::new(sink)).await;
    // the service drops its observers once the run settles, closing the channel
    renderer.await.context("Event renderer stopped unexpectedly")?;

    if json {
        println!("{}", serde_json::to_string(&state)?);
    } else {
        print_summary(&state, config);
    }

    if state.failed {
        anyhow::bail!("environment setup failed");
    }
    Ok(())
}

fn print_event(event: &BootstrapEvent) {
    match event {
        BootstrapEvent::StageChanged { stage, .. } => {
            println!("{} {}", style("→").cyan().bold(), style(stage).cyan());
        }
        BootstrapEvent::LogAppended(entry) => print_log(entry),
        BootstrapEvent::StateSnapshot(_) => {}
    }
}

fn print_log(entry: &LogEntry) {
    let tag = match entry.source {
        Some(LogSource::ToolA) => style("[toolA] ").magenta(),
        Some(LogSource::ToolB) => style("[toolB] ").blue(),
        Some(LogSource::System) | None => style("").dim(),
    };

    match entry.level {
        LogLevel::Info => println!("  {}{}", tag, entry.message),
        LogLevel::Warn => println!("  {}{}", tag, style(&entry.message).yellow()),
        LogLevel::Error => println!("  {}{}", tag, style(&entry.message).red().bold()),
    }
}

fn print_summary(state: &BootstrapState, config: &AppConfig) {
    println!();
    if state.is_ready() {
        println!(
            "{} {} and {} are ready",
            style("✓").green().bold(),
            style(&config.tool_a.name).white().bold(),
            style(&config.tool_b.name).white().bold()
        );
        return;
    }

    let Some(error) = &state.error else {
        return;
    };

    println!("{} {}", style("✗").red().bold(), style(&error.message).red());
    if let Some(command) = &error.command {
        println!("  {}   {}", style("Command").dim(), command);
    }
    if let Some(code) = error.exit_code {
        println!("  {} {}", style("Exit code").dim(), code);
    }
    if let Some(stderr) = &error.stderr_tail {
        println!("  {}", style("Stderr (tail)").dim());
        for line in stderr.lines().rev().take(20).collect::<Vec<_>>().into_iter().rev() {
            println!("    {}", style(line).dim());
        }
    }
    if let Some(suggestion) = &error.suggestion {
        println!();
        println!("  {} {}", style("→").yellow().bold(), suggestion);
    }
}
