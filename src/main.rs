use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use pagepilot_cli::cli::{
    cmd_act, cmd_snapshot, init_logging, load_config, metrics::print_metrics, Cli, Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration before logging; the logging section lives in it
    let loaded = load_config(cli.config.as_ref()).await?;
    let config = loaded.config;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let _log_guard = init_logging(&level, cli.debug, &config.logging)?;

    info!("Starting PagePilot v{}", env!("CARGO_PKG_VERSION"));
    match (&loaded.path, loaded.found) {
        (Some(path), true) => info!("Loaded configuration from: {}", path.display()),
        (Some(path), false) => warn!(
            "Config file not found, using defaults: {}",
            path.display()
        ),
        (None, _) => warn!("No config directory available, using defaults"),
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling");
            on_interrupt.cancel();
        }
    });

    let result = match cli.command {
        Commands::Snapshot(args) => cmd_snapshot(args, &config, cli.output, &cancel).await,
        Commands::Act(args) => cmd_act(args, &config, cli.output, &cancel).await,
    };

    if cli.metrics {
        if let Err(err) = print_metrics(cli.output) {
            warn!(?err, "failed to print metrics");
        }
    }

    match result {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
