//! `envboot probe` - presence check only.

use console::style;

use envboot::config::{AppConfig, ToolSpec};
use envboot::probe::{BinaryProbe, PathProbe};

pub async fn execute(config: &AppConfig) -> anyhow::Result<()> {
    let probe = PathProbe;

    for tool in [&config.tool_a, &config.tool_b] {
        print_tool(tool, probe.any_exists(&tool.aliases).await);
    }

    Ok(())
}

fn print_tool(tool: &ToolSpec, present: bool) {
    let marker = if present {
        style("●").green().bold()
    } else {
        style("○").red().bold()
    };
    let status = if present {
        style("installed").green()
    } else {
        style("missing").red()
    };

    println!(
        "  {} {:<12} {} {}",
        marker,
        tool.name,
        status,
        style(format!("({})", tool.aliases.join(" | "))).dim()
    );
}
