// src/main.rs
//! Keytrace command line
//!
//! Inspect, replay, export and prune recorded keystroke sessions.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use keytrace_engine::observability::{init_metrics, init_tracing};
use keytrace_engine::replay::driver::PlaybackHandle;
use keytrace_engine::replay::exporter::{ExportFormat, Exporter};
use keytrace_engine::replay::player::PlaybackStatus;
use keytrace_engine::{EngineConfig, EngineContext};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "keytrace", version, about = "Keystroke recording and replay engine")]
struct Cli {
    /// Configuration file (defaults to ./keytrace.{toml,yaml,json})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List recorded sessions
    Sessions {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Print the reconstructed content at a point in time
    Replay {
        id: String,
        /// Offset in milliseconds (end of recording when omitted)
        #[arg(long)]
        at: Option<f64>,
    },
    /// Play a recording back in the terminal
    Play {
        id: String,
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
    },
    /// Export a recording
    Export {
        id: String,
        #[arg(long, default_value = "json")]
        format: ExportFormat,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete a recording and its session key
    Delete { id: String },
    /// Delete completed recordings past their retention period
    Purge,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = EngineConfig::load_from(cli.config.as_deref())?;

    // Initialize observability (tracing, metrics)
    init_tracing(&config.logging)?;
    init_metrics();

    info!("Keytrace Engine v{}", keytrace_engine::VERSION);
    let context = EngineContext::open(config).await?;

    match cli.command {
        Command::Sessions { owner } => list_sessions(&context, owner.as_deref()).await,
        Command::Replay { id, at } => replay_at(&context, &id, at).await,
        Command::Play { id, speed } => play(&context, &id, speed).await,
        Command::Export { id, format, output } => export(&context, &id, format, output).await,
        Command::Delete { id } => {
            context.delete_recording(&id).await?;
            println!("deleted {}", id);
            Ok(())
        }
        Command::Purge => {
            let purged = context.purge_expired(Utc::now()).await?;
            for id in &purged {
                println!("purged {}", id);
            }
            println!("{} recordings purged", purged.len());
            Ok(())
        }
    }
}

async fn list_sessions(context: &EngineContext, owner: Option<&str>) -> Result<()> {
    let sessions = context.store().list_sessions(owner).await?;
    if sessions.is_empty() {
        println!("no sessions");
        return Ok(());
    }

    for session in sessions {
        println!(
            "{}  {:<9} {:>6} events  {}  {} / {}  {:?}",
            session.id,
            session.status.as_str(),
            session.event_count,
            session.metadata.started_at.format("%Y-%m-%d %H:%M"),
            session.metadata.owner_id,
            session.metadata.document_id,
            session.metadata.title,
        );
    }
    Ok(())
}

async fn replay_at(context: &EngineContext, id: &str, at: Option<f64>) -> Result<()> {
    let mut player = context.player();
    player.load_recording(&context.loader(), id).await?;

    let target = at.unwrap_or(player.state().duration_ms as f64);
    player.seek(target)?;

    let state = player.state();
    eprintln!(
        "{} / {} ms, {} of {} events",
        state.current_time_ms, state.duration_ms, state.event_index, state.total_events
    );
    println!("{}", player.content());
    Ok(())
}

async fn play(context: &EngineContext, id: &str, speed: f64) -> Result<()> {
    let mut player = context.player();
    player.load_recording(&context.loader(), id).await?;

    let handle = PlaybackHandle::spawn(player);
    let applied = handle.set_speed(speed).await?;
    if applied != speed {
        eprintln!("speed clamped to {}x", applied);
    }

    let mut updates = handle.subscribe();
    handle.play().await?;

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                // Clear screen, then redraw
                print!("\x1b[2J\x1b[H{}", snapshot.content);
                std::io::stdout().flush()?;
                if snapshot.state.status == PlaybackStatus::Complete {
                    println!();
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                info!("Playback interrupted");
                break;
            }
        }
    }

    handle.teardown().await?;
    Ok(())
}

async fn export(
    context: &EngineContext,
    id: &str,
    format: ExportFormat,
    output: Option<PathBuf>,
) -> Result<()> {
    let recording = context.loader().load(id).await?;
    if recording.skipped > 0 {
        eprintln!("warning: {} events could not be decoded", recording.skipped);
    }

    let bytes = Exporter::new(format)
        .with_model(context.config().playback.content_model)
        .export(&recording)?;

    match output {
        Some(path) => {
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("wrote {} bytes to {}", bytes.len(), path.display());
        }
        None => {
            if format == ExportFormat::Archive {
                bail!("archive export is binary; pass --output <file>.{}", format.extension());
            }
            println!("{}", String::from_utf8_lossy(&bytes));
        }
    }
    Ok(())
}
