//! emufetch CLI - fetch, unpack and file emulator downloads
//!
//! Downloads archives from plain URLs or Google Drive shares and places them
//! into a library folder layout.

mod commands;
mod output;
mod progress;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use emufetch_core::{AcquireError, EmufetchCore, SettingsStore};
use emufetch_types::DestinationCategory;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// emufetch - Emulator download helper
#[derive(Parser)]
#[command(name = "emufetch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Settings file
    #[arg(long, env = "EMUFETCH_SETTINGS")]
    settings: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "human")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Human,
    Json,
    Table,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a file and unpack or move it into place
    Acquire {
        /// URL to download (plain or Google Drive share)
        url: String,

        /// Destination category (emulator, firmware, tool, wiigames, firmware-keys, firmware-content, base)
        #[arg(short, long, default_value = "base")]
        category: DestinationCategory,

        /// Library base directory
        #[arg(short, long)]
        base: Option<PathBuf>,

        /// File name to use instead of the one the server announces
        #[arg(short, long)]
        name: Option<String>,

        /// Title used as the folder name for tools
        #[arg(short, long)]
        title: Option<String>,

        /// Emulator firmware root (for firmware-keys and firmware-content)
        #[arg(long)]
        firmware_root: Option<PathBuf>,
    },

    /// Unpack an archive that is already on disk
    Extract {
        /// Archive to unpack
        archive: PathBuf,

        /// Directory to unpack into
        target: PathBuf,
    },

    /// Create the library folder layout
    Init {
        /// Library base directory
        base: PathBuf,
    },

    /// Show/update settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Show all settings
    Show,

    /// Print the settings file location
    Path,

    /// Get a setting value
    Get {
        /// Setting key
        key: String,
    },

    /// Set a setting value
    Set {
        /// Setting key
        key: String,

        /// Setting value
        value: String,
    },

    /// Reset to defaults
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let format = cli.output;
    if let Err(err) = run(cli).await {
        report_error(&err, format);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "emufetch_core=debug,info" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let store = SettingsStore::new(cli.settings.unwrap_or_else(SettingsStore::default_path));

    match cli.command {
        Commands::Settings { action } => {
            return commands::settings_action(&store, action, cli.output).await
        }
        Commands::Completions { shell } => {
            use clap::CommandFactory;
            clap_complete::generate(shell, &mut Cli::command(), "emufetch", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    // Initialize core
    let settings = store.load().await?;
    let core = EmufetchCore::new(settings)?;

    match cli.command {
        Commands::Acquire {
            url,
            category,
            base,
            name,
            title,
            firmware_root,
        } => {
            let mut request = emufetch_types::AcquisitionRequest::new(url, category);
            request.base_path = base;
            request.file_name = name;
            request.title = title;
            request.firmware_root = firmware_root;
            commands::acquire(&core, request, cli.output).await?
        }

        Commands::Extract { archive, target } => {
            commands::extract(&core, &archive, &target, cli.output).await?
        }

        Commands::Init { base } => commands::init(&core, &base, cli.output).await?,

        Commands::Settings { .. } | Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Print a failure; pipeline errors keep their kind in JSON mode
fn report_error(err: &anyhow::Error, format: OutputFormat) {
    match (format, err.downcast_ref::<AcquireError>()) {
        (OutputFormat::Json, Some(acquire)) => {
            let body = serde_json::json!({
                "error": acquire.kind(),
                "details": acquire.to_string(),
                "retryable": acquire.is_retryable(),
            });
            println!("{}", body);
        }
        (_, Some(acquire)) if acquire.is_retryable() => {
            eprintln!("{} {} (retrying may help)", style("✗").red().bold(), acquire);
        }
        _ => eprintln!("{} {:#}", style("✗").red().bold(), err),
    }
}
