mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(cli.verbose).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    cli.execute().await
}

/// Filter used when `RUST_LOG` is unset.
///
/// `start` already renders every stage and log line on stdout, so tracing on
/// stderr stays quiet unless asked.
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "envboot=debug"
    } else {
        "envboot=warn"
    }
}
