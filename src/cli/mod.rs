pub mod act;
pub mod metrics;
pub mod output;
pub mod runtime;
pub mod snapshot;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use act::{cmd_act, ActArgs};
pub use output::OutputFormat;
pub use runtime::{init_logging, load_config, LoadedConfig};
pub use snapshot::{cmd_snapshot, SnapshotArgs, SnapshotFlags};

#[derive(Parser, Debug)]
#[command(name = "pagepilot")]
#[command(about = "Index the interactable elements of a page and act on them by index")]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (overrides logging.level)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Enable debug mode
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Output format
    #[arg(short, long, default_value = "human", global = true)]
    pub output: OutputFormat,

    /// Print perceiver, action and adapter counters when the command finishes
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open a page and print its indexed interactable elements
    Snapshot(SnapshotArgs),

    /// Snapshot a page, run one action by index, then snapshot again
    Act(ActArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "pagepilot",
            "snapshot",
            "--url",
            "https://example.com",
            "-o",
            "json",
            "--metrics",
        ])
        .unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(cli.metrics);
        assert!(cli.log_level.is_none());
        assert!(matches!(cli.command, Commands::Snapshot(_)));
    }
}
