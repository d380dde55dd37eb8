use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes the global tracing subscriber exactly once.
///
/// `env_filter` uses the standard `RUST_LOG` directive syntax
/// (e.g. `info,rebalancer=debug`). An invalid filter falls back to `info`
/// instead of aborting startup.
pub fn initialize(env_filter: &str) {
    let filter = EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}
