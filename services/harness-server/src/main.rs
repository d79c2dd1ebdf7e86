use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use harness_server::{bootstrap_default_session, transport, AppState, StartupConfig};
use replay_protocol::SessionMode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Passthrough,
    Record,
    Playback,
}

impl From<ModeArg> for SessionMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Passthrough => SessionMode::Passthrough,
            ModeArg::Record => SessionMode::Record,
            ModeArg::Playback => SessionMode::Playback,
        }
    }
}

/// A record/replay harness sitting between a program and a platform.
#[derive(Debug, Parser)]
struct Cli {
    /// Operational mode of the default session dialed into via ?session=default.
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// UNIX domain socket path to listen on. Mutually exclusive with --port.
    #[arg(long)]
    socket: Option<PathBuf>,

    /// TCP port to listen on. Mutually exclusive with --socket.
    #[arg(long)]
    port: Option<u16>,

    /// Recording file for the default session (record destination or playback source).
    #[arg(long)]
    recording_path: Option<String>,

    /// Base directory relative recording paths are resolved against.
    #[arg(long)]
    base_recording_dir: Option<PathBuf>,

    /// Log level passed to `tracing_subscriber::EnvFilter`.
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Parses `REPLAY_HASH_NORMALIZE` (§6), defaulting to `true` when unset.
/// Controls whether request hashing strips the envelope's own ambient
/// fields (`streamId`/`traceId`/`timestamp`) or folds them into the hash.
fn parse_hash_normalize_env() -> Result<bool, String> {
    match std::env::var("REPLAY_HASH_NORMALIZE") {
        Err(_) => Ok(true),
        Ok(v) => match v.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(format!("invalid REPLAY_HASH_NORMALIZE value: {other}")),
        },
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(cli.log_level.clone()))
        .init();

    let hash_normalize = match parse_hash_normalize_env() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("config error: {e}");
            std::process::exit(2);
        }
    };

    if cli.socket.is_some() && cli.port.is_some() {
        eprintln!("config error: --socket and --port are mutually exclusive");
        std::process::exit(2);
    }

    let state = Arc::new(AppState::with_hash_normalize(cli.base_recording_dir.clone(), hash_normalize));

    let config = StartupConfig {
        mode: cli.mode.map(SessionMode::from),
        recording_path: cli.recording_path.clone(),
        base_recording_dir: cli.base_recording_dir.clone(),
    };
    if let Err(e) = bootstrap_default_session(&state, &config).await {
        eprintln!("startup error: {e}");
        std::process::exit(1);
    }

    let serve = async {
        match (&cli.socket, cli.port) {
            (Some(path), _) => transport::serve_unix(path, state).await,
            (None, Some(port)) => transport::serve_tcp(port, state).await,
            (None, None) => transport::serve_tcp(8787, state).await,
        }
    };

    tokio::select! {
        result = serve => {
            if let Err(e) = result {
                error!(error = %e, "server exited with an error");
                std::process::exit(1);
            }
        }
        () = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }
    info!("server shut down");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
