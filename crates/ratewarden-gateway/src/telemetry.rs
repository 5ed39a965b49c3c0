//! Structured JSON logging init (spec.md §6 logger options; ambient stack,
//! not itself part of the core spec).

use tracing_subscriber::{fmt, EnvFilter};

/// Install a JSON-formatted `tracing` subscriber honoring `RUST_LOG`
/// (default `info`).
pub fn init_json_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().json().with_env_filter(filter).init();
}
