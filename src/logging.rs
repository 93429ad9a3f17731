//! Logging setup

use std::io;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging system
///
/// `RUST_LOG` wins when set; otherwise `default_level` applies to this crate
/// and `warn` to dependencies.
pub fn init_logger(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,cbtkit={}", default_level)));

    // A second init (e.g. from tests) is not an error worth reporting
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr) // Keep stdout for command output
                .with_target(false)
                .compact(),
        )
        .try_init();
}
