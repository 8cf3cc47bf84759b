use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

mod cli;
mod config;

use crate::config::{EmotiaConfig, Overrides};

#[derive(Parser)]
#[command(name = "emotia")]
#[command(about = "Terminal client for EMOTIA clinic chat and emotion streaming")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Custom data directory (defaults to ~/.emotia)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Backend base URL (overrides [server] base_url)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Act as this user id (overrides [session] user_id)
    #[arg(long, global = true)]
    user_id: Option<i64>,

    /// Bearer token (overrides [session] token)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and print the session environment exports
    Login(LoginArgs),

    /// List the patients assigned to you
    Contacts,

    /// Open a conversation
    Chat(ChatArgs),

    /// Stream frames to an emotion-prediction room
    Room(RoomArgs),
}

#[derive(Parser)]
struct LoginArgs {
    #[arg(long)]
    email: String,

    #[arg(long)]
    password: String,
}

#[derive(Parser)]
struct ChatArgs {
    /// Peer user id (default: your assigned psychologist)
    #[arg(long)]
    peer: Option<i64>,
}

#[derive(Parser)]
struct RoomArgs {
    /// Directory of JPEG/PNG frames, replayed in name order
    #[arg(long)]
    frames: PathBuf,

    /// Prediction session id
    #[arg(long, default_value = "1")]
    session: String,

    /// Capture interval in milliseconds (overrides [capture] interval_ms)
    #[arg(long)]
    interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config = EmotiaConfig::new(cli.data_dir.clone())?.with_overrides(Overrides {
        base_url: cli.server,
        user_id: cli.user_id,
        token: cli.token,
    });

    match cli.command {
        Commands::Login(args) => cli::login_command(&config, &args.email, &args.password).await,
        Commands::Contacts => cli::contacts_command(&config).await,
        Commands::Chat(args) => cli::chat_command(&config, args.peer).await,
        Commands::Room(args) => {
            cli::room_command(&config, &args.frames, &args.session, args.interval_ms).await
        }
    }
}

/// Logs go to stderr; stdout carries the transcript.
fn init_logging(debug: bool) {
    let default_directive = if debug {
        "emotia=debug,emotia_link=debug,info"
    } else {
        "emotia=info,emotia_link=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}
