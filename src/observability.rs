//! Observability setup
//!
//! Structured logging via `tracing`. The filter comes from `RUST_LOG`,
//! defaulting to `info`; set `REPLAY_ENGINE_LOG_FORMAT=json` for line-JSON
//! output suitable for log shippers.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber
pub fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("REPLAY_ENGINE_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let result = if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(true).try_init()
    };

    result.map_err(|e| anyhow::anyhow!("tracing init failed: {}", e))
}
