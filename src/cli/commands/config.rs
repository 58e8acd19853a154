use console::style;

use envboot::config::AppConfig;

pub fn show(config: &AppConfig) -> anyhow::Result<()> {
    println!("{}", style("Current Configuration").bold().cyan());
    println!();
    for (label, tool) in [("Tool A", &config.tool_a), ("Tool B", &config.tool_b)] {
        println!("  {}", style(label).bold());
        println!("    Name:      {}", style(&tool.name).white());
        println!("    Aliases:   {}", style(tool.aliases.join(", ")).white());
        println!(
            "    Installer: {}",
            style(tool.installer_path().display()).dim()
        );
    }
    println!();
    print!("  Interpreter: ");
    match &config.interpreter {
        Some(interpreter) => println!("{}", style(interpreter).white()),
        None => println!("{}", style("(platform default)").dim()),
    }
    print!("  Locale file: ");
    match config.locale_path() {
        Some(path) => println!("{}", style(path.display()).white()),
        None => println!("{}", style("(built-in English)").dim()),
    }

    Ok(())
}

pub fn path() -> anyhow::Result<()> {
    println!("{}", AppConfig::config_path()?.display());
    Ok(())
}
