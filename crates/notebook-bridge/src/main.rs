//! notebook-bridge CLI entry point.
//!
//! Opens a notebook (or starts an untitled one), connects to the external
//! client relay and serves commands until the connection closes.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::info;
use notebook_bridge::channel;
use notebook_bridge::handlers::HandlerContext;
use notebook_bridge::memory::{MemoryNotebook, NoKernel};
use notebook_bridge::session::CellType;
use notebook_bridge::settings::{self, BridgeSettings};

#[derive(Parser, Debug)]
#[command(name = "notebook-bridge")]
#[command(about = "Serve notebook commands to an external automation client")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Notebook to open; an untitled notebook is created when omitted
    #[arg(long, global = true)]
    notebook: Option<PathBuf>,

    /// WebSocket URL of the relay (default from settings: ws://localhost:8765)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Fail execution-bound commands after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Answer unknown command types with an error envelope
    #[arg(long, global = true)]
    report_unknown: bool,

    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect and serve commands (default if no command specified)
    Run,

    /// Print the effective settings
    Settings {
        /// Persist the effective settings to the settings file
        #[arg(long)]
        save: bool,
    },
}

impl Cli {
    fn apply_overrides(&self, mut settings: BridgeSettings) -> BridgeSettings {
        if let Some(url) = &self.url {
            settings.url = url.clone();
        }
        if self.timeout.is_some() {
            settings.execution_timeout_secs = self.timeout;
        }
        if self.report_unknown {
            settings.report_unknown_commands = true;
        }
        settings
    }
}


#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let settings = cli.apply_overrides(settings::load_settings());

    match cli.command {
        Some(Commands::Settings { save }) => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            if save {
                settings::save_settings(&settings)?;
                println!("Saved to {}", settings::settings_path().display());
            }
            Ok(())
        }
        Some(Commands::Run) | None => run(settings, cli.notebook).await,
    }
}

async fn run(settings: BridgeSettings, notebook: Option<PathBuf>) -> anyhow::Result<()> {
    let session = match notebook {
        Some(path) => MemoryNotebook::open(&path, NoKernel)?,
        None => {
            let nb = MemoryNotebook::new(NoKernel);
            nb.append_cell(CellType::Code, "");
            nb
        }
    };

    info!(
        "[bridge] Serving notebook commands at {} (timeout: {:?})",
        settings.url,
        settings.execution_timeout()
    );

    let ctx = HandlerContext::new(Arc::new(session))
        .with_execution_timeout(settings.execution_timeout());
    channel::connect(&settings.url, ctx, settings.report_unknown_commands).await
}
