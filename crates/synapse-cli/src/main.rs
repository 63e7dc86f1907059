use anyhow::Context;
use clap::Parser;

mod bootstrap;
mod cli;
mod commands;
mod context;
mod output;
mod ui;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("synapse error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let flags = cli.global_flags();
    let serving = matches!(cli.command, cli::Commands::Serve(_));
    init_tracing(flags.quiet, flags.verbose, serving)?;
    ui::init(&flags);

    let config = bootstrap::load_config(&flags).context("failed to load configuration")?;
    let ctx = context::AppContext::init(config)
        .await
        .context("failed to initialize synapse application context")?;

    commands::dispatch::dispatch(cli.command, &ctx, &flags).await
}

/// `SYNAPSE_LOG` wins; otherwise the server logs at info and one-shot
/// commands stay at warn so their output is clean.
fn init_tracing(quiet: bool, verbose: bool, serving: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else if serving {
        "info"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("SYNAPSE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
