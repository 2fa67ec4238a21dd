use anyhow::Result;
use clap::Parser;
use collabhub::config::HubConfig;
use collabhub::{rest, AppState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "collabhubd",
    about = "Collaboration Hub — real-time collaborative coding workspace server",
    version
)]
struct Args {
    /// HTTP/WebSocket listener port (`PORT`)
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Data directory for the bundled SQLite store and `config.toml`
    #[arg(long, env = "COLLABHUB_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "COLLABHUB_LOG")]
    log: Option<String>,

    /// JWKS endpoint used by the Auth Gate to verify bearer tokens (`JWT_JWKS_URL`)
    #[arg(long, env = "JWT_JWKS_URL")]
    jwt_jwks_url: Option<String>,

    /// Write logs to this file (daily-rotated) in addition to stdout
    #[arg(long, env = "COLLABHUB_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Arc::new(HubConfig::new(
        args.port,
        args.data_dir,
        args.log.clone(),
        args.jwt_jwks_url,
    ));

    let _log_guard = setup_logging(&config.log, args.log_file.as_deref());

    info!(version = env!("CARGO_PKG_VERSION"), "collabhubd starting");
    info!(
        data_dir = %config.data_dir.display(),
        port = config.port,
        store_uri = %config.store_uri,
        "config loaded"
    );

    let state = AppState::new(config.clone()).await?;

    // §4.4 SweepIdle — periodic idle-room GC, independent of request traffic.
    {
        let rooms = state.rooms.clone();
        let period = config.sweep_period;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                rooms.sweep_idle().await;
            }
        });
    }

    let app = rest::build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "listening (REST + real-time share one port)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("collabhubd stopped");
    Ok(())
}

/// Resolves on SIGTERM (Unix) or Ctrl-C (all platforms), the same signal
/// pair a long-running server process should drain on (§5 cancellation —
/// a closed listener stops new accepts while in-flight rooms finish their
/// current lane turn and the Persistence Worker flushes on room destroy).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!(err = %e, "failed to register SIGTERM handler — Ctrl-C only");
                tokio::signal::ctrl_c().await.ok();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
    info!("shutdown signal received — draining connections");
}

/// Initializes the tracing subscriber. If `log_file` is set, logs go to both
/// stdout and a daily-rolling file; the returned `WorkerGuard` must stay
/// alive for the process lifetime to flush the non-blocking writer.
///
/// Falls back to stdout-only logging (with a warning, not a panic) if the
/// log directory can't be created.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let Some(path) = log_file else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        return None;
    };

    let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let filename = path
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("collabhubd.log"));

    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!(
            "warn: could not create log directory '{}': {e} — falling back to stdout",
            dir.display()
        );
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(dir, filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(log_level))
        .with(tracing_subscriber::fmt::layer().compact())
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
        .init();

    Some(guard)
}
