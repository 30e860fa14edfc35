//! Classroom Arcade engine - Main entry point.
//!
//! Joins one room as one player and runs the session until Ctrl-C. Lines
//! typed on stdin are sent as chat; a few slash commands stand in for the
//! game client's buttons.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arcade_engine::infrastructure::config::EngineConfig;
use arcade_engine::use_cases::game_state::RoomEvent;
use arcade_engine::App;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from repo root (the binary is often run from `crates/engine`).
    load_dotenv_from_repo_root();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arcade_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Classroom Arcade engine");

    let config = EngineConfig::from_env()?;
    tracing::info!(
        room = %config.room_id,
        player = %config.player_id,
        api = %config.room_api_url,
        "Joining room"
    );

    let app = App::connect(&config).await?;
    let shutdown = CancellationToken::new();

    tokio::spawn(read_local_input(app.events.clone(), shutdown.clone()));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received");
        }
        signal_token.cancel();
    });

    let handler = app.runner.run(shutdown).await;
    tracing::info!(
        phase = ?handler.phase(),
        error = handler.error_message().unwrap_or("none"),
        "Session ended"
    );
    Ok(())
}

/// Forward stdin lines to the session until EOF or shutdown.
async fn read_local_input(events: mpsc::Sender<RoomEvent>, shutdown: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stdin");
                break;
            }
        };
        let Some(event) = parse_command(&line) else {
            continue;
        };
        if events.send(event).await.is_err() {
            break;
        }
    }
}

fn parse_command(line: &str) -> Option<RoomEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let event = match line.split_once(' ').unwrap_or((line, "")) {
        ("/retry", _) => RoomEvent::RetryRequested,
        ("/viewed", _) => RoomEvent::SimulationEnded,
        ("/ready", _) => RoomEvent::ReadyToContinue,
        ("/reflect", text) if !text.trim().is_empty() => RoomEvent::SubmitReflection(text.trim().to_string()),
        _ => RoomEvent::LocalChat(line.to_string()),
    };
    Some(event)
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}
