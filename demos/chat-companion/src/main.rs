//! Terminal chat with a companion session.
//!
//! Uses the offline mock generator and the local hashing embedder, so it runs
//! without network access. Type `/help` for commands.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use companion::adapters::MockGenerator;
use companion::config::load_from_path;
use companion::memory::HashingEmbedder;
use companion::profile::UpdateOutcome;
use companion::session::{CompanionSession, SessionRegistry, TurnError};
use companion::telemetry::init_tracing;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "chat-companion", about = "Chat with a companion that remembers you")]
struct Args {
    /// JSON configuration file. Missing files fall back to defaults.
    #[arg(long, default_value = "companion.json")]
    config: PathBuf,

    /// User id; selects the per-user memory and profile.
    #[arg(long, default_value = "local-user")]
    user: String,

    /// Overrides `storage.data_dir`.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Keep everything in memory instead of on disk.
    #[arg(long)]
    in_memory: bool,
}

const HELP: &str = "commands: /profile  /cycle  /memory  /reset  /help  /quit";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = load_from_path(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(dir) = args.data_dir {
        config.storage.data_dir = dir;
    }
    init_tracing(&config.telemetry)?;

    let dimensions = NonZeroUsize::new(config.memory.embedding_dimensions)
        .context("memory.embedding_dimensions must be > 0")?;
    let generator = Arc::new(MockGenerator::new());
    let embedder = Arc::new(HashingEmbedder::new(dimensions));
    let registry = if args.in_memory {
        SessionRegistry::in_memory(config, generator, embedder)
    } else {
        SessionRegistry::new(config, generator, embedder)
    };

    let session = registry.session(&args.user).await?;
    info!(user = %session.id(), mode = ?registry.mode(), "chat ready");
    chat(&session).await?;
    registry.close(&args.user).await;
    Ok(())
}

async fn chat(session: &CompanionSession) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    stdout.write_all(format!("{HELP}\n> ").as_bytes()).await?;
    stdout.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let output = match line.trim() {
            "/quit" | "/exit" => break,
            "/help" => HELP.to_owned(),
            "/profile" => serde_json::to_string_pretty(&session.user_profile().await)?,
            "/cycle" => serde_json::to_string_pretty(&session.scheduler().cycle().await)?,
            "/memory" => {
                let recent = session.memory().recency().len().await;
                let stored = session.memory().semantic().len().await;
                format!("recent: {recent}, long-term: {stored}")
            }
            "/reset" => {
                session.reset_conversation().await;
                "conversation window cleared".to_owned()
            }
            "" => String::new(),
            text => turn(session, text).await,
        };
        if !output.is_empty() {
            stdout.write_all(output.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
        }
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
    }
    Ok(())
}

async fn turn(session: &CompanionSession, text: &str) -> String {
    match session.respond(text).await {
        Ok(outcome) => {
            match outcome.profile_update {
                UpdateOutcome::Updated { changed, .. } => {
                    info!(changed, "profile refreshed");
                }
                UpdateOutcome::Failed(err) => warn!(?err, "profile refresh failed"),
                UpdateOutcome::Waiting { .. } => {}
            }
            outcome.reply.content().to_owned()
        }
        Err(TurnError::EmptyMessage) => String::new(),
        Err(err) => format!("[no reply: {err}]"),
    }
}
