//! Process bootstrap (SPEC_FULL.md §12): load the YAML user config, build
//! the initial [`app_state::AppState`], start the correlation-id-wrapped
//! axum server, and poll the config file for hot reload (§12.3).
//!
//! A thin binary: wires logging, builds shared state, and hands everything
//! to an async runtime. The actual handler and state logic lives in the
//! library crate so it can be exercised directly by integration tests.

use axum::routing::post;
use axum::Router;
use ccproxy_core::config::UserConfig;
use ccproxy_server::app_state::AppState;
use ccproxy_server::{correlation, edge, logging};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_CONFIG_PATH: &str = "./config.yaml";
const RELOAD_POLL_INTERVAL: Duration = Duration::from_secs(5);

fn config_path() -> String {
    std::env::var("CCPROXY_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

fn load_config(path: &str) -> ccproxy_core::error::Result<UserConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| ccproxy_core::error::ProxyError::config(format!("failed to read config '{path}': {e}")))?;
    UserConfig::from_yaml(&raw)
}

fn file_modified(path: &str) -> Option<std::time::SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

/// Polls the config file's mtime every [`RELOAD_POLL_INTERVAL`] and swaps a
/// freshly built `AppState` in on change. A failed reload (bad YAML, a
/// dangling provider/model reference, an unconstructible transformer chain)
/// is logged and the previous good state keeps serving (§7's ConfigError
/// policy, SPEC_FULL.md §12.3).
async fn watch_for_reload(path: String, shared: Arc<arc_swap::ArcSwap<AppState>>) {
    let mut last_seen = file_modified(&path);
    loop {
        tokio::time::sleep(RELOAD_POLL_INTERVAL).await;
        let modified = file_modified(&path);
        if modified.is_none() || modified == last_seen {
            continue;
        }
        last_seen = modified;

        match load_config(&path).and_then(|config| AppState::build(&config)) {
            Ok(state) => {
                tracing::info!(providers = state.providers.len(), "config reloaded");
                shared.store(Arc::new(state));
            }
            Err(err) => {
                tracing::warn!(error = %err, "config reload failed, keeping previous configuration");
            }
        }
    }
}

#[tokio::main]
async fn main() {
    logging::init();

    let path = config_path();
    let config = match load_config(&path) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, path = %path, "failed to load initial configuration");
            std::process::exit(1);
        }
    };

    let state = match AppState::build(&config) {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(error = %err, "failed to build initial provider state");
            std::process::exit(1);
        }
    };

    tracing::info!(providers = state.providers.len(), models = config.models.len(), "cc-proxy starting");

    let shared: Arc<arc_swap::ArcSwap<AppState>> = Arc::new(arc_swap::ArcSwap::from_pointee(state));
    tokio::spawn(watch_for_reload(path, shared.clone()));

    let app: Router = Router::new()
        .route("/v1/messages", post(edge::messages))
        .route("/v1/messages/count_tokens", post(edge::count_tokens))
        .route_layer(axum::middleware::from_fn(correlation::correlation_id_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(shared);

    let bind_addr = std::env::var("CCPROXY_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, addr = %bind_addr, "failed to bind listening socket");
            std::process::exit(1);
        }
    };

    tracing::info!(addr = %bind_addr, "listening");
    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!(error = %err, "server exited with error");
    }
}
