// PromptGrid CLI - pipeline spreadsheet operations
// Batch runs are headless; `open` starts the interactive grid.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use promptgrid_cli::exit_codes::{EXIT_PROVIDER_KEYCHAIN, EXIT_SUCCESS};
use promptgrid_cli::run::{OutputFormat, RunArgs};
use promptgrid_cli::{doctor, pipeline, run, tui, CliError};
use promptgrid_config::keys;
use promptgrid_config::settings::Settings;

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  promptgrid-engine ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  promptgrid-engine ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
        )
    }
}

#[derive(Parser)]
#[command(name = "pgrid")]
#[command(about = "Pipeline spreadsheet — each column is a model transformation step")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a sample pipeline definition
    #[command(after_help = "\
Examples:
  pgrid init
  pgrid init translations.toml")]
    Init {
        /// Destination file (default: pipeline.toml)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Run a pipeline over entry values read from stdin
    #[command(after_help = "\
Examples:
  cat articles.csv | pgrid run -p pipeline.toml --headers
  printf 'Long text...\\n' | pgrid run -p pipeline.toml -t json
  pgrid run -p pipeline.toml -o out.csv < inputs.txt")]
    Run {
        /// Pipeline definition file
        #[arg(long, short = 'p')]
        pipeline: PathBuf,

        /// First input row is a header (skipped)
        #[arg(long)]
        headers: bool,

        /// Output file (omit for stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, short = 't', value_enum, default_value = "csv")]
        to: OutputFormat,

        /// Suppress progress output
        #[arg(long, short = 'q')]
        quiet: bool,

        /// Print a chain summary line when done
        #[arg(long)]
        verbose: bool,
    },

    /// Open the interactive grid
    Open {
        /// Pipeline definition file (omit for a blank grid)
        #[arg(long, short = 'p')]
        pipeline: Option<PathBuf>,
    },

    /// Inspect the resolved provider configuration
    Doctor {
        /// Also check that the configured endpoint answers
        #[arg(long)]
        test: bool,
    },

    /// Manage the hosted provider API key
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Store the API key in the system keychain (reads stdin if omitted)
    Set { key: Option<String> },
    /// Remove the API key from the system keychain
    Clear,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        None => {
            eprintln!("Usage: pgrid <command> [options]");
            eprintln!("       pgrid --help for more information");
            Ok(())
        }
        Some(Commands::Init { path, force }) => cmd_init(path, force),
        Some(Commands::Run {
            pipeline,
            headers,
            output,
            to,
            quiet,
            verbose,
        }) => run::cmd_run(RunArgs {
            pipeline,
            headers,
            output,
            to,
            quiet,
            verbose,
        }),
        Some(Commands::Open { pipeline }) => cmd_open(pipeline),
        Some(Commands::Doctor { test }) => doctor::cmd_doctor(test),
        Some(Commands::Key { command }) => match command {
            KeyCommands::Set { key } => cmd_key_set(key),
            KeyCommands::Clear => cmd_key_clear(),
        },
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError {
            code,
            message,
            hint,
        }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn cmd_init(path: Option<PathBuf>, force: bool) -> Result<(), CliError> {
    let path = path.unwrap_or_else(|| PathBuf::from("pipeline.toml"));
    pipeline::write_sample(&path, force)?;
    eprintln!("Wrote {}", path.display());
    eprintln!("Try: printf 'Long text...\\n' | pgrid run -p {}", path.display());
    Ok(())
}

fn cmd_open(pipeline_path: Option<PathBuf>) -> Result<(), CliError> {
    let (mut grid, title) = match &pipeline_path {
        Some(path) => (
            pipeline::load(path)?,
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
        ),
        None => (
            promptgrid_engine::grid::Grid::new("Input"),
            "untitled".to_string(),
        ),
    };
    if grid.rows().is_empty() {
        grid.add_row();
    }

    let settings = Settings::load();
    tui::run(grid, settings, title).map_err(|e| CliError {
        code: promptgrid_cli::exit_codes::EXIT_ERROR,
        message: e,
        hint: None,
    })
}

fn cmd_key_set(key: Option<String>) -> Result<(), CliError> {
    let key = match key {
        Some(key) => key,
        None => {
            // Read from stdin so the key stays out of shell history
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| CliError::io(format!("cannot read key from stdin: {}", e)))?;
            buf
        }
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(CliError::usage("empty API key"));
    }

    keys::set_api_key(keys::HOSTED_PROVIDER, key).map_err(|e| CliError {
        code: EXIT_PROVIDER_KEYCHAIN,
        message: e,
        hint: Some(format!(
            "or set the {} environment variable",
            keys::env_var_name(keys::HOSTED_PROVIDER)
        )),
    })?;
    eprintln!("Stored hosted provider key in the system keychain");
    Ok(())
}

fn cmd_key_clear() -> Result<(), CliError> {
    keys::delete_api_key(keys::HOSTED_PROVIDER).map_err(|e| CliError {
        code: EXIT_PROVIDER_KEYCHAIN,
        message: e,
        hint: None,
    })?;
    eprintln!("Removed hosted provider key from the system keychain");
    Ok(())
}
