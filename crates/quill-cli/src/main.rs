//! Quill command-line driver
//!
//! Runs, checks and inspects scripts against the default context
//! (`def execute(Map params)`) and the standard whitelist.

mod commands;
mod output;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Quill scripting language toolchain", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Color output: auto, always, never
    #[arg(long, global = true)]
    color: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Overrides for values of the settings file.
#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Skip the IR optimizers
    #[arg(long)]
    pub no_optimize: bool,

    /// Reject regex literals
    #[arg(long)]
    pub no_regex: bool,

    /// Loop budget per execution (0 disables it)
    #[arg(long)]
    pub max_loop_counter: Option<u32>,

    /// Maximum script call depth
    #[arg(long)]
    pub max_call_depth: Option<usize>,

    /// Largest array a script may allocate
    #[arg(long)]
    pub max_array_length: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and run a script (or an encoded `.qbc` unit)
    Run {
        /// Script file
        file: PathBuf,
        /// `params` map as a JSON object
        #[arg(short, long)]
        params: Option<String>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Compile scripts and report errors without running them
    Check {
        /// Script files
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Output format: pretty or json
        #[arg(long, default_value = "pretty")]
        format: String,
        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Print the IR or the bytecode of a script
    Ir {
        /// Script file
        file: PathBuf,
        /// Disassemble the code unit instead of printing IR
        #[arg(long)]
        bytecode: bool,
        /// Also write the encoded code unit to this path
        #[arg(long, value_name = "PATH")]
        emit: Option<PathBuf>,
        #[command(flatten)]
        settings: SettingsArgs,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("QUILL_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let color = output::resolve_color_choice(cli.color.as_deref());

    match cli.command {
        Commands::Run {
            file,
            params,
            json,
            settings,
        } => {
            let settings = commands::load_settings(cli.config.as_deref(), &settings)?;
            commands::run::execute(&file, params.as_deref(), json, settings, color)
        }
        Commands::Check {
            files,
            format,
            settings,
        } => {
            let settings = commands::load_settings(cli.config.as_deref(), &settings)?;
            commands::check::execute(&files, &format, settings, color)
        }
        Commands::Ir {
            file,
            bytecode,
            emit,
            settings,
        } => {
            let settings = commands::load_settings(cli.config.as_deref(), &settings)?;
            commands::ir::execute(&file, bytecode, emit.as_deref(), settings)
        }
    }
}
