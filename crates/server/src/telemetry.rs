use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Structured logging via `tracing` + `tracing-subscriber`'s `EnvFilter`
/// layer, driven by `RUST_LOG` (defaults to `info`). JSON output in
/// production, compact in development — toggled by `LOG_FORMAT=json`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}
