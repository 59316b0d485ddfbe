use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use sheetsync_core::registry;
use sheetsync_engine::{
    ChecksumStore, GoogleSheetsClient, RateLimiter, SheetGateway, SyncEngine, TokenSource,
};

use crate::api;
use crate::config::{DaemonConfig, LogFormat};
use crate::error::{io_err, DaemonError};
use crate::paths::checksum_path;
use crate::state::{AppState, SyncSettings};

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config: DaemonConfig) -> Result<(), DaemonError> {
    init_tracing(config.log_format);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Build the shared state from `config`: loads the mapping registry and the
/// checksum store from the data directory.
pub fn build_state(
    config: &DaemonConfig,
    gateway: Arc<dyn SheetGateway>,
    limiter: Arc<RateLimiter>,
) -> Result<AppState, DaemonError> {
    ensure_data_dir(&config.data_dir)?;
    let mappings = registry::load_at(&config.data_dir)?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        mappings = mappings.len(),
        "mapping registry loaded",
    );
    let checksums = ChecksumStore::load(checksum_path(&config.data_dir));

    let engine = SyncEngine::new(gateway, limiter, checksums);
    let settings = SyncSettings {
        interval: config.sync_interval.as_millis() as u64,
        auto_start: config.auto_start,
    };
    Ok(AppState::new(engine, mappings, settings, config.data_dir.clone()))
}

/// Run the daemon: HTTP server, rate-limiter refill, optional auto-started
/// scheduler. Returns after a shutdown signal once checksums are persisted.
pub async fn run(config: DaemonConfig) -> Result<(), DaemonError> {
    let tokens = TokenSource::from_env()?;
    let gateway = Arc::new(GoogleSheetsClient::new(&config.sheets_api_base_url, tokens)?);
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit_capacity,
        config.rate_limit_window,
    ));
    let state = build_state(&config, gateway, limiter.clone())?;

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let refill_handle = limiter.spawn_refill(shutdown_tx.subscribe());

    if config.auto_start && state.start_scheduler().await {
        tracing::info!("auto-start enabled, running initial sync");
        let state = state.clone();
        tokio::spawn(async move {
            state.run_sync().await;
        });
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| io_err(addr.to_string(), e))?;
    tracing::info!(%addr, "sync server started");

    let server_handle = {
        let shutdown = shutdown_tx.clone();
        let app = api::router(state.clone(), config.static_dir.as_deref());
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .map_err(|e| io_err(addr.to_string(), e));
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = wait_for_signal() => {
                    let name = signal?;
                    tracing::info!(signal = name, "received shutdown signal, cleaning up");
                    let _ = shutdown.send(());
                    Ok(())
                }
            }
        })
    };

    let (server_result, signal_result, refill_result) =
        tokio::join!(server_handle, signal_handle, refill_handle);

    state.scheduler.shutdown().await;
    state.engine.persist_checksums().await;
    tracing::info!("sync server stopped");

    handle_join("http_server", server_result)?;
    handle_join("signal_handler", signal_result)?;
    refill_result.map_err(|err| DaemonError::Task {
        task: "rate_limiter_refill",
        message: err.to_string(),
    })?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<&'static str, DaemonError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate()).map_err(|e| io_err("SIGTERM handler", e))?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.map_err(|e| io_err("SIGINT handler", e))?;
            Ok("SIGINT")
        }
        _ = term.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<&'static str, DaemonError> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| io_err("ctrl-c handler", e))?;
    Ok("ctrl-c")
}

fn ensure_data_dir(dir: &Path) -> Result<(), DaemonError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    Ok(())
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Task {
            task,
            message: format!("join failure: {err}"),
        }),
    }
}

/// `RUST_LOG` wins; otherwise `LOG_LEVEL`, otherwise `info`. Blank or
/// unparsable values fall through to the next source.
fn build_filter(rust_log: Option<String>, log_level: Option<String>) -> EnvFilter {
    [rust_log, log_level]
        .into_iter()
        .flatten()
        .filter(|directives| !directives.trim().is_empty())
        .find_map(|directives| EnvFilter::try_new(directives.trim()).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn init_tracing(format: LogFormat) {
    use tracing_subscriber::fmt;

    let filter = build_filter(std::env::var("RUST_LOG").ok(), std::env::var("LOG_LEVEL").ok());
    let _ = match format {
        LogFormat::Json => fmt().json().with_env_filter(filter).with_target(false).try_init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(false).try_init(),
    };
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sheetsync_core::{registry, MappingRegistry, NewMapping};
    use sheetsync_engine::rate_limiter::DEFAULT_WINDOW;
    use sheetsync_engine::MemorySheets;
    use tempfile::TempDir;

    use super::*;

    fn config_in(tmp: &TempDir) -> DaemonConfig {
        let mut config = DaemonConfig::defaults(tmp.path());
        config.data_dir = tmp.path().join("data");
        config.sync_interval = Duration::from_secs(60);
        config
    }

    #[tokio::test]
    async fn build_state_creates_data_dir_and_loads_registry() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);

        let mut seeded = MappingRegistry::default();
        seeded
            .create(NewMapping {
                source_sheet_id: Some("SheetA".to_string()),
                source_tab: Some("Tab1".to_string()),
                dest_sheet_id: Some("SheetB".to_string()),
                dest_tab: Some("Tab1".to_string()),
                name: Some("seed".to_string()),
                description: None,
            })
            .unwrap();
        registry::save_at(&config.data_dir, &seeded).unwrap();

        let state = build_state(
            &config,
            Arc::new(MemorySheets::new()),
            Arc::new(RateLimiter::new(80, DEFAULT_WINDOW)),
        )
        .unwrap();

        assert_eq!(state.mappings().await, seeded.snapshot());
        assert_eq!(state.settings().await.interval, 60_000);
        assert_eq!(state.data_dir(), config.data_dir.as_path());
    }

    #[tokio::test]
    async fn build_state_rejects_corrupt_registry() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        std::fs::create_dir_all(&config.data_dir).unwrap();
        std::fs::write(registry::registry_path_at(&config.data_dir), "mappings: [unterminated").unwrap();

        let result = build_state(
            &config,
            Arc::new(MemorySheets::new()),
            Arc::new(RateLimiter::default()),
        );
        assert!(matches!(result, Err(DaemonError::Registry(_))));
    }

    #[test]
    fn blank_log_settings_fall_back_to_info() {
        use tracing_subscriber::filter::LevelFilter;

        let level = |rust_log: Option<&str>, log_level: Option<&str>| {
            build_filter(rust_log.map(String::from), log_level.map(String::from)).max_level_hint()
        };
        assert_eq!(level(None, None), Some(LevelFilter::INFO));
        assert_eq!(level(None, Some("")), Some(LevelFilter::INFO));
        assert_eq!(level(Some("  "), Some(" ")), Some(LevelFilter::INFO));
        assert_eq!(level(None, Some("debug")), Some(LevelFilter::DEBUG));
        assert_eq!(level(Some(""), Some("warn")), Some(LevelFilter::WARN));
        assert_eq!(level(Some("trace"), Some("warn")), Some(LevelFilter::TRACE));
    }

    #[test]
    fn handle_join_surfaces_inner_error() {
        let inner: Result<Result<(), DaemonError>, tokio::task::JoinError> =
            Ok(Err(DaemonError::Config("bad".to_string())));
        assert!(matches!(handle_join("t", inner), Err(DaemonError::Config(_))));
    }
}
