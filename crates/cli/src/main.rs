//! CareClaw CLI: the main entry point.
//!
//! Commands:
//! - `chat`    : Single message or interactive session
//! - `classify`: Print the priority of a message
//! - `export`  : Print a saved session
//! - `tools`   : List the clinical tools
//! - `config`  : Print the effective configuration

use careclaw_config::AppConfig;
use careclaw_core::role::Role;
use clap::{Args, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "careclaw",
    about = "CareClaw: role-aware clinical assistant",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a session and talk to the assistant
    Chat(ChatArgs),

    /// Classify the priority of a message
    Classify {
        /// The message text
        text: String,
    },

    /// Print a saved session as JSON
    Export {
        /// Visit id of the session
        visit_id: String,

        /// Print the rendered history instead of JSON
        #[arg(long)]
        text: bool,
    },

    /// List the clinical tools
    Tools {
        /// Only list the tools this role may use
        #[arg(short, long)]
        role: Option<Role>,

        /// Print the tool definitions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct ChatArgs {
    /// Role of the user: health_professional, patient or admin_staff
    #[arg(short, long, default_value = "health_professional")]
    pub role: Role,

    #[arg(long, default_value = "P001")]
    pub patient_id: String,

    #[arg(long, default_value = "Paciente")]
    pub patient_name: String,

    #[arg(long, default_value = "PROF001")]
    pub professional_id: String,

    /// Visit id; a random one is generated when absent
    #[arg(long)]
    pub visit_id: Option<String>,

    /// Reason for the visit
    #[arg(long, default_value = "Consulta general")]
    pub reason: String,

    /// Load the visit from the demo clinical records (e.g. VISITA123)
    #[arg(long, conflicts_with_all = ["patient_id", "patient_name", "professional_id", "visit_id", "reason"])]
    pub record: Option<String>,

    /// Send a single message instead of entering interactive mode
    #[arg(short, long)]
    pub message: Option<String>,

    /// Persist the session through the configured repository
    #[arg(long)]
    pub save: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Initialize tracing
    let level = if cli.verbose {
        "debug"
    } else {
        "info,careclaw::audit=warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    if config.telemetry.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Chat(args) => commands::chat::run(&config, args).await?,
        Commands::Classify { text } => commands::classify::run(&config, &text),
        Commands::Export { visit_id, text } => {
            commands::export::run(&config, &visit_id, text).await?
        }
        Commands::Tools { role, json } => commands::tools::run(role, json)?,
        Commands::Config => commands::config_cmd::run(&config),
    }

    Ok(())
}
