//! Abroad CLI - Command-line client for the mentoring marketplace
//!
//! Usage:
//!   abroad login <username>
//!   abroad whoami
//!   abroad mentors search --major cs --language english --sort price-asc
//!   abroad forum list
//!   abroad chat send "Which documents do I need?"
//!   abroad session watch
//!
//! The session is kept in `~/.abroad/session.json` (or `ABROAD_SESSION_FILE`)
//! so it survives between invocations.

mod commands;

use abroad_client::{AbroadClient, FileStorage};
use abroad_core::{AppConfig, LoggingConfig, SortBy, UserRole};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "abroad")]
#[command(about = "Study-abroad mentoring marketplace CLI")]
#[command(version)]
struct Cli {
    /// TOML config file (environment variables still take precedence)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and remember the session
    Login {
        username: String,
        /// Password (read from ABROAD_PASSWORD or stdin when omitted)
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account and log in
    Register {
        username: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        role: Option<UserRole>,
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Exchange the token for a fresh one
    Refresh,
    /// Session management
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Search and inspect mentors
    Mentors {
        #[command(subcommand)]
        action: MentorAction,
    },
    /// Community forum
    Forum {
        #[command(subcommand)]
        action: ForumAction,
    },
    /// AI study-abroad advisor
    Chat {
        #[command(subcommand)]
        action: ChatAction,
    },
    /// Profile and statistics
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// Upload a document
    Upload {
        path: PathBuf,
        /// Content type (guessed from the extension when omitted)
        #[arg(long)]
        mime: Option<String>,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Show lifecycle state and token lifetime
    Status,
    /// Keep the session alive and print every state change until Ctrl-C
    Watch,
}

#[derive(Subcommand)]
enum MentorAction {
    /// Search mentors; filters are applied by the backend and re-checked locally
    Search {
        #[arg(long)]
        major: Option<String>,
        #[arg(long)]
        university: Option<String>,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        min_price: Option<f64>,
        #[arg(long)]
        max_price: Option<f64>,
        /// Free text over name, university, major and bio
        #[arg(long)]
        text: Option<String>,
        /// relevance, price-asc, price-desc or rating
        #[arg(long, default_value = "relevance")]
        sort: SortBy,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show one mentor
    Show { id: i64 },
}

#[derive(Subcommand)]
enum ForumAction {
    /// List posts
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Show a post with its replies
    Show { id: i64 },
    /// Write a new post
    Post {
        title: String,
        content: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Reply to a post
    Reply { post_id: i64, content: String },
}

#[derive(Subcommand)]
enum ChatAction {
    /// List conversations
    Sessions,
    /// Show a conversation
    History { session_id: Uuid },
    /// Ask the advisor; starts a new conversation unless --session is given
    Send {
        message: String,
        #[arg(long)]
        session: Option<Uuid>,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Show the profile as stored by the backend
    Show,
    /// Update profile fields
    Update {
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        university: Option<String>,
        #[arg(long)]
        major: Option<String>,
        #[arg(long)]
        bio: Option<String>,
    },
    /// Dashboard statistics
    Stats,
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    if let Some(url) = &cli.api_url {
        config.api.base_url = url.clone();
    }
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "abroad_cli={0},abroad_client={0},abroad_core={0}",
            logging.level
        )
        .into()
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config.logging);

    let storage = Arc::new(FileStorage::new(&config.session.storage_path));
    tracing::debug!(path = %storage.path().display(), "Using session file");

    let client = AbroadClient::bootstrap(config, storage)
        .await
        .context("Failed to start client")?;

    let result = commands::run(&client, cli.command, cli.json).await;
    client.shutdown().await;
    result
}
