//! Process entry point: wires config, the counter store, the hot-swap
//! policy loader, the stats aggregator, and the HTTP dispatcher together
//! (spec.md §6).

mod access_log;
mod cli;
mod handlers;
mod pidfile;
mod telemetry;

use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use ratewarden_config::Config;
use ratewarden_engine::Engine;
use ratewarden_loader::Loader;
use ratewarden_stats::Aggregator;
use ratewarden_store::RedisBackend;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use handlers::{browse, browse_complete, monitor_alive, multi_browse, not_found, update, AppState};

#[tokio::main]
async fn main() {
    telemetry::init_json_logging();

    let cli = cli::Cli::parse();
    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    if let Err(e) = pidfile::write_pid_file(Path::new(config.pid_file())) {
        tracing::warn!(error = %e, "failed to write pid file");
    }

    let backend = match RedisBackend::connect(config.redis_server(), config.redis_auth()).await {
        Ok(b) => Arc::new(b),
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to counter store");
            std::process::exit(1);
        }
    };

    let loader = match Loader::bootstrap(config.rule_file()) {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, "failed to load initial policy");
            std::process::exit(1);
        }
    };
    let policy_handle = loader.active_handle();
    let reload_task = loader.spawn(Duration::from_secs(config.policy_loader_frequency_secs()));

    let (aggregator, stats_sender) = Aggregator::new(
        config.stats_channel_capacity(),
        config.counter_day_offset_minutes(),
    );
    let log_dir = config.log_dir().to_string();
    let stats_task = tokio::spawn(async move {
        aggregator
            .run(|bucket, lines| {
                if let Err(e) = append_stats_log(&log_dir, bucket, &lines) {
                    tracing::error!(error = %e, bucket, "failed to write stats log");
                }
            })
            .await;
    });

    let engine = Engine::new(
        Arc::clone(&backend),
        stats_sender,
        config.counter_day_offset_minutes(),
    );
    let state = Arc::new(AppState {
        policy: policy_handle,
        engine,
        backend,
    });

    let app = Router::new()
        .route("/rule/browse", get(browse).post(browse))
        .route(
            "/rule/browse_complete",
            get(browse_complete).post(browse_complete),
        )
        .route("/rule/update", get(update).post(update))
        .route("/multi/browse", get(multi_browse).post(multi_browse))
        .route("/monitor/alive", get(monitor_alive).post(monitor_alive))
        .fallback(not_found)
        .layer(axum::middleware::from_fn(access_log::log_access))
        .layer(axum::middleware::from_fn(access_log::extract_attrs))
        .with_state(state);

    let listen_addr: SocketAddr = match config.listen().parse() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(error = %e, addr = config.listen(), "invalid listen address");
            std::process::exit(1);
        }
    };
    let listener = match tokio::net::TcpListener::bind(listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, addr = %listen_addr, "failed to bind listen address");
            std::process::exit(1);
        }
    };

    tracing::info!(addr = %listen_addr, "ratewarden-gateway listening");
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        tracing::error!(error = %e, "server exited with error");
    }

    reload_task.abort();
    if let Err(e) = stats_task.await {
        tracing::warn!(error = %e, "stats aggregator task panicked");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

fn append_stats_log(log_dir: &str, bucket: &str, lines: &[String]) -> std::io::Result<()> {
    use std::io::Write;
    std::fs::create_dir_all(log_dir)?;
    let path = Path::new(log_dir).join(format!("stats_{bucket}.log"));
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    for line in lines {
        writeln!(f, "{line}")?;
    }
    Ok(())
}
