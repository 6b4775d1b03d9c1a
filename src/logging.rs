//! Tracing subscriber setup.
//!
//! Library crates log through the `log` facade; the subscriber's
//! `tracing-log` bridge picks those records up. Output goes to stderr so
//! that stdout stays clean for `--json`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `RUST_LOG` wins over `log_level` when set and valid.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(filter);

    #[cfg(feature = "logs-json")]
    let result = registry
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .try_init();

    #[cfg(not(feature = "logs-json"))]
    let result = registry
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();

    if let Err(e) = result {
        eprintln!("logging already initialised: {}", e);
    }
}
