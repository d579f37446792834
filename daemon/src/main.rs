mod cache;
mod collections;
mod config;
mod error;
mod http;
mod ipc_server;
mod macros;
mod orchestrator;
mod providers;
mod variants;

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::collections::LocalCollections;
use crate::http::ReqwestTransport;
use crate::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration before logging so its log level applies
    let config_path = config::Config::default_config_path()?;
    let (config, config_error) = match config::Config::load() {
        Ok(cfg) => (cfg, None),
        Err(e) => (config::Config::default(), Some(e)),
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.general.log_level.as_str()),
    )
    .init();

    log::info!("Starting wallfetch daemon v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Looking for config at: {}", config_path.display());

    if let Some(e) = config_error {
        log::warn!("Failed to load config: {:#}. Using defaults.", e);
    } else {
        log::info!("✓ Configuration loaded");
    }
    log::info!("  General settings:");
    log::info!("    - Log level: {}", config.general.log_level);
    log::info!("  HTTP settings:");
    log::info!("    - Timeout: {}s", config.http.timeout_secs);
    log::info!("    - User agent: {}", config.http.user_agent);
    log::info!("  iCloud settings:");
    log::info!("    - Default host: {}", config.icloud.default_host);
    log::info!("    - Max redirects: {}", config.icloud.max_redirects);

    let collections = LocalCollections::load(&config.collections);
    log::info!(
        "  Collections: firetv {} image(s), chromecast {} image(s)",
        collections.firetv.len(),
        collections.chromecast.len()
    );

    let transport = Arc::new(ReqwestTransport::new(&config.http)?);
    let orchestrator = Arc::new(Orchestrator::new(transport, collections, &config));

    let state = Arc::new(Mutex::new(DaemonState::new()));

    // Start IPC server
    let ipc_state = state.clone();
    let ipc_handle = tokio::spawn(async move {
        if let Err(e) = ipc_server::start(ipc_state, orchestrator).await {
            log::error!("IPC server error: {}", e);
        }
    });

    // Set up signal handlers
    let signal_state = state.clone();
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to setup SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                log::info!("Received SIGTERM, shutting down...");
            }
            _ = sigint.recv() => {
                log::info!("Received SIGINT, shutting down...");
            }
        }

        signal_state.lock().await.should_exit = true;
    });

    if let Err(e) = ipc_handle.await {
        log::error!("IPC server task failed: {}", e);
    }

    log::info!("Daemon shutting down");
    Ok(())
}

/// Shared daemon state
pub struct DaemonState {
    pub should_exit: bool,
    pub start_time: std::time::Instant,
}

impl DaemonState {
    fn new() -> Self {
        Self {
            should_exit: false,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
