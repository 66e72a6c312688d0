//! Kundli CLI - manage accounts, birth profiles and chart conversations

use clap::{Parser, Subcommand};
use kundli_chat::config::{self, KundliConfig};
use kundli_chat::storage::Store;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "kundli")]
#[command(version)]
#[command(about = "Accounts, birth profiles and chart conversations over SQLite or SurrealDB")]
#[command(long_about = r#"
Kundli keeps the state behind a Vedic chart chat assistant:
  • User accounts with salted password hashes
  • Saved birth profiles
  • Conversations and their chat turns

Data lives in a local SQLite file unless a remote SurrealDB URL is configured
(kundli.toml or KUNDLI_REMOTE_URL). An unreachable remote falls back to SQLite.

Example usage:
  kundli signup --username asha --password s3cret
  kundli profile save --username asha --name Asha --dob 1990-01-01 --tob 12:00 --city "New Delhi, India"
  kundli conversation new --username asha --title "Career"
  kundli chat --username asha --conversation 1 --role user --message "What about my career?"
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the SQLite database file (overrides config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter kundli.toml
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Show which backend is in use
    Status,

    /// Register a new user
    Signup {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },

    /// Check a user's credentials
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },

    /// Saved birth profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Conversations
    Conversation {
        #[command(subcommand)]
        action: ConversationAction,
    },

    /// Append a chat turn to a conversation
    Chat {
        #[arg(short, long)]
        username: String,

        /// Conversation id
        #[arg(short = 'C', long)]
        conversation: String,

        /// user or assistant
        #[arg(short, long, default_value = "user")]
        role: String,

        #[arg(short, long)]
        message: String,
    },

    /// Clear a user's chat history
    Clear {
        #[arg(short, long)]
        username: String,
    },

    /// Print the version
    Version,
}

#[derive(Subcommand)]
pub enum ProfileAction {
    /// Save a birth profile
    Save {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        name: String,
        /// Date of birth, YYYY-MM-DD
        #[arg(long)]
        dob: String,
        /// Time of birth, HH:MM
        #[arg(long)]
        tob: String,
        #[arg(long)]
        city: String,
    },

    /// List a user's saved profiles
    List {
        #[arg(short, long)]
        username: String,
    },
}

#[derive(Subcommand)]
pub enum ConversationAction {
    /// Start a conversation
    New {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        title: Option<String>,
    },

    /// List a user's conversations, newest first
    List {
        #[arg(short, long)]
        username: String,
    },

    /// Delete a conversation and its messages
    Delete {
        #[arg(long)]
        id: String,
    },

    /// Show a conversation's messages
    History {
        #[arg(long)]
        id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn is_human(&self) -> bool {
        matches!(self, OutputMode::Human)
    }
}

/// Print a successful result as a JSON envelope
pub fn emit_success(mode: OutputMode, command: &str, data: serde_json::Value) -> anyhow::Result<()> {
    if mode == OutputMode::Json {
        let envelope = serde_json::json!({
            "ok": true,
            "command": command,
            "data": data,
        });
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let output_mode = if cli.json { OutputMode::Json } else { OutputMode::Human };
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);

    match cli.command {
        Commands::Init { force } => {
            return commands::run_init(output_mode, &config_path, force);
        }
        Commands::Version => {
            return commands::run_version(output_mode);
        }
        _ => {}
    }

    let mut settings = config::load_config(Some(&config_path))?.unwrap_or_default();
    settings.apply_env();
    if let Some(database) = &cli.database {
        settings.database = Some(database.to_string_lossy().to_string());
    }

    let store = open_store(&settings).await?;

    match cli.command {
        Commands::Status => commands::run_status(output_mode, &store, &settings)?,
        Commands::Signup { username, password } => {
            commands::run_signup(output_mode, &store, &username, &password).await?
        }
        Commands::Login { username, password } => {
            commands::run_login(output_mode, &store, &username, &password).await?
        }
        Commands::Profile { action } => commands::run_profile(output_mode, &store, action).await?,
        Commands::Conversation { action } => {
            commands::run_conversation(output_mode, &store, action).await?
        }
        Commands::Chat { username, conversation, role, message } => {
            commands::run_chat(output_mode, &store, &username, &conversation, &role, &message).await?
        }
        Commands::Clear { username } => commands::run_clear(output_mode, &store, &username).await?,
        Commands::Init { .. } | Commands::Version => unreachable!("handled before opening the store"),
    }

    Ok(())
}

async fn open_store(settings: &KundliConfig) -> anyhow::Result<Store> {
    let database = settings.database_path();
    tracing::debug!("Local database: {:?}", database);
    let store = Store::connect(&database, settings.remote.as_ref()).await?;
    Ok(store)
}
