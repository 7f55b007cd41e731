//! Tracing initialization for the silt CLI.

use tracing_subscriber::EnvFilter;

/// Initialize the console tracing subscriber.
///
/// Logs go to stderr so that `silt get` can stream blob bytes on stdout.
/// `RUST_LOG` overrides the configured level. Call once at startup.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
