use anyhow::Result;
use bsod_analyzer::{
    analyze_command, batch_command, config_command, history_command, init_logging,
    prune_command, resolve_layout, scan_command, show_command, stats_command, OutputFormat,
};
use bsod_core::db::{load_config, AnalyzerContext};
use clap::{Parser, Subcommand};

/// Windows crash dump (BSOD) analyzer.
///
/// This CLI is a thin wrapper around `bsod-core` (exposed in code as `bsod_core`).
/// All decoding and attribution logic lives in the library.
#[derive(Parser, Debug)]
#[command(
    name = "bsod-analyzer",
    version,
    about = "Analyze Windows crash dumps and attribute the crash to a driver",
    long_about = None
)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,

    /// Data directory holding config.json and the crash database.
    /// Defaults to ~/.bsod_analyzer.
    #[arg(long, global = true)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a single dump file.
    Analyze {
        /// Path to the .dmp file.
        dump: String,

        /// Report format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Write the report to a file instead of stdout.
        #[arg(short, long)]
        output: Option<String>,

        /// Record the analysis in the crash history database.
        #[arg(long, default_value_t = false)]
        save: bool,
    },

    /// Analyze every dump in a directory in parallel.
    Batch {
        /// Directory containing dump files.
        dir: String,

        /// Maximum number of files to analyze.
        #[arg(long)]
        limit: Option<usize>,

        /// File extension to match.
        #[arg(long, default_value = "dmp")]
        ext: String,

        /// Record successful analyses in the crash history database.
        #[arg(long, default_value_t = false)]
        save: bool,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List recorded crashes, newest first.
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Only include crashes from the last N days.
        #[arg(long)]
        days: Option<u32>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show one recorded analysis by id.
    Show {
        id: i64,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Crash statistics from the history database.
    Stats {
        #[arg(long, default_value_t = 30)]
        days: u32,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Delete history records older than N days.
    Prune {
        #[arg(long, default_value_t = 90)]
        days: u32,
    },

    /// Find dump files in the standard Windows locations.
    Scan {
        /// Analyze every recognized dump that was found.
        #[arg(long, default_value_t = false)]
        analyze: bool,

        #[arg(long)]
        limit: Option<usize>,

        /// Also list files whose signature was not recognized.
        #[arg(long, default_value_t = false)]
        all: bool,

        /// Analyze the recognized dumps and record them in the history.
        #[arg(long, default_value_t = false)]
        save: bool,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show the effective configuration.
    Config {
        /// Write the stored configuration, with defaults filled in, to config.json.
        #[arg(long, default_value_t = false)]
        init: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let layout = resolve_layout(cli.data_dir.as_deref())?;
    let config = load_config(&layout)?;
    init_logging(&config.log_level, cli.verbose);

    match cli.command {
        Command::Analyze { dump, format, output, save } => {
            analyze_command(&layout, &config, &dump, format, output.as_deref(), save)?
        }
        Command::Batch { dir, limit, ext, save, json } => {
            batch_command(&layout, &config, &dir, limit, &ext, save, json)?
        }
        Command::History { limit, days, json } => {
            history_command(&AnalyzerContext::open(layout, config)?, limit, days, json)?
        }
        Command::Show { id, format } => {
            show_command(&AnalyzerContext::open(layout, config)?, id, format)?
        }
        Command::Stats { days, json } => {
            stats_command(&AnalyzerContext::open(layout, config)?, days, json)?
        }
        Command::Prune { days } => prune_command(&AnalyzerContext::open(layout, config)?, days)?,
        Command::Scan { analyze, limit, all, save, json } => {
            scan_command(&layout, &config, analyze, limit, all, save, json)?
        }
        Command::Config { init } => config_command(&layout, &config, init)?,
    }

    Ok(())
}
