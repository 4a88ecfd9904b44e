mod commands;
mod ui;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clipforge::Settings;
use tracing_subscriber::prelude::*;
use ui::ProgressMode;

#[derive(Parser)]
#[command(
    name = "clipforge",
    version,
    about = "Split a video into fixed-length parts using ffmpeg"
)]
struct Cli {
    /// Settings file (default: clipforge.json next to the executable or in the working directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log pipeline steps to stderr
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a video into <base>_part_NNN files under <output>/Outputs/<base>/
    Split {
        input: PathBuf,

        /// Output root folder. Default: settings outputRoot.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Base name for the parts. Default: the input file name.
        #[arg(short, long)]
        name: Option<String>,

        /// Part length in seconds. Default: settings segmentSeconds.
        #[arg(short, long)]
        length: Option<f64>,

        /// Progress display mode: auto (TTY-aware), rich, plain, json, quiet.
        #[arg(long, value_enum, default_value_t = ProgressMode::Auto)]
        progress: ProgressMode,
    },

    /// Report length and part count without writing anything
    Analyze {
        input: PathBuf,

        /// Part length in seconds. Default: settings segmentSeconds.
        #[arg(short, long)]
        length: Option<f64>,

        /// Progress display mode: auto (TTY-aware), rich, plain, json, quiet.
        #[arg(long, value_enum, default_value_t = ProgressMode::Auto)]
        progress: ProgressMode,
    },

    /// Show which ffmpeg and ffprobe will be used
    CheckTools,

    /// Inspect or create the settings file
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the effective settings
    Show,
    /// Write a settings file with default values
    Init {
        /// Destination. Default: clipforge.json next to the executable.
        path: Option<PathBuf>,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Commands::Settings {
        action: SettingsAction::Init { path, force },
    } = cli.cmd
    {
        return commands::settings::init(path, force);
    }

    let settings = Settings::load(cli.config.as_deref()).map_err(anyhow::Error::msg)?;

    match cli.cmd {
        Commands::Split {
            input,
            output,
            name,
            length,
            progress,
        } => {
            commands::split::split(
                settings,
                commands::split::SplitArgs {
                    input,
                    output,
                    name,
                    length,
                    progress,
                },
            )
            .await
        }
        Commands::Analyze {
            input,
            length,
            progress,
        } => commands::analyze::analyze(settings, input, length, progress).await,
        Commands::CheckTools => commands::tools::check_tools(settings).await,
        Commands::Settings { .. } => commands::settings::show(&settings),
    }
}

/// `RUST_LOG` wins; otherwise info with `-v`, warnings only without.
fn init_logging(verbose: bool) {
    let default = if verbose { "clipforge=info" } else { "clipforge=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
