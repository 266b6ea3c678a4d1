use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use reel::{
    util, Clock, Config, RecorderStatus, SessionLibrary, SqliteStore, StateStore, SystemClock,
};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "reel", version, about = "Screen session recorder and session library")]
struct Cli {
    /// Override the data directory (default ~/.reel)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect and manage stored sessions
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },
}

#[derive(Subcommand)]
enum SessionsCommand {
    /// List stored sessions, newest first
    List,
    /// Show one session in detail
    Show { id: Uuid },
    /// Export a session as a JSON archive
    Export {
        id: Uuid,
        /// Directory the archive is written to (default ~/.reel/exports)
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
    /// Import a session archive as a new session
    Import { path: PathBuf },
    /// Delete sessions together with their recordings
    Delete {
        #[arg(required = true)]
        ids: Vec<Uuid>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    util::init_data_dir(cli.data_dir.clone());

    // Initialize logging to file (~/.reel/logs/reel.log)
    fs::create_dir_all(util::logs_dir())?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(util::log_file_path())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(log_file)
        .with_ansi(false) // Disable ANSI colors in log file
        .init();

    let store = SqliteStore::open_default()?;
    let library = SessionLibrary::new(Arc::new(store.clone()));

    match cli.command {
        None => status(&store, &library).await,
        Some(Command::Sessions { command }) => sessions(&library, command).await,
    }
}

async fn status(store: &SqliteStore, library: &SessionLibrary) -> Result<()> {
    let state = StateStore::load(Arc::new(store.clone())).await?.state();
    match state.status {
        RecorderStatus::Recording => {
            if let Some(start) = state.start_timestamp {
                let elapsed = SystemClock.now_ms().saturating_sub(start);
                println!("recorder: RECORDING ({}s elapsed)", elapsed / 1_000);
            } else {
                println!("recorder: RECORDING");
            }
        }
        status => println!("recorder: {status}"),
    }

    let sessions = library.get_all_sessions().await?;
    println!("sessions: {}", sessions.len());
    println!("data dir: {}", util::data_dir().display());

    let config = Config::load();
    println!(
        "capture: audio {}, cross-origin frames {}, {}ms media timeslice",
        on_off(config.record_audio),
        on_off(config.record_cross_origin_frames),
        config.media_timeslice_ms,
    );
    Ok(())
}

async fn sessions(library: &SessionLibrary, command: SessionsCommand) -> Result<()> {
    match command {
        SessionsCommand::List => {
            let sessions = library.get_all_sessions().await?;
            if sessions.is_empty() {
                println!("no sessions recorded yet");
                return Ok(());
            }
            for session in sessions {
                println!(
                    "{}  {}  {}",
                    session.id,
                    format_timestamp(session.create_timestamp),
                    session.name
                );
            }
        }
        SessionsCommand::Show { id } => {
            let session = library
                .get_session(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no session {id}"))?;
            let events = library.get_events(id).await?;
            let media_chunks = library.get_media_chunks(id).await?;
            println!("name:     {}", session.name);
            println!("id:       {}", session.id);
            println!("created:  {}", format_timestamp(session.create_timestamp));
            println!("modified: {}", format_timestamp(session.modify_timestamp));
            println!("recorder: {}", session.recorder_version);
            if !session.tags.is_empty() {
                println!("tags:     {}", session.tags.join(", "));
            }
            println!("events:   {}", events.len());
            println!("media:    {} chunks", media_chunks.len());
        }
        SessionsCommand::Export { id, out } => {
            let dir = out.unwrap_or_else(util::exports_dir);
            let path = library.export_session(id, &dir).await?;
            println!("exported to {}", path.display());
        }
        SessionsCommand::Import { path } => {
            let session = library.import_session(&path).await?;
            println!("imported \"{}\" as {}", session.name, session.id);
        }
        SessionsCommand::Delete { ids } => {
            library.delete_sessions(&ids).await?;
            println!("deleted {} session(s)", ids.len());
        }
    }
    Ok(())
}

fn format_timestamp(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}
