//! Structured logging bootstrap (SPEC_FULL.md §12.2): stdout in either
//! `fmt` or `json` shape selected by an env var, with `RUST_LOG`-style
//! filtering. No file appender — the gateway has no use for one.

use tracing_subscriber::EnvFilter;

/// `CCPROXY_LOG_FORMAT=json` switches to structured JSON output (so
/// `correlation_id` fields land as their own key); anything else, including
/// unset, uses the human-readable `fmt` layer.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = std::env::var("CCPROXY_LOG_FORMAT").unwrap_or_default();

    let result = if format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(true).json().try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init()
    };

    if let Err(err) = result {
        eprintln!("tracing subscriber already initialized: {err}");
    }
}
