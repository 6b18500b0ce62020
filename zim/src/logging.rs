//! Tracing setup; this is the reporter every component logs through.
//!
//! Output goes to stderr so command output on stdout stays clean.
//! `RUST_LOG` overrides the level derived from configuration.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogLevel;

/// Build the filter for `level`, unless `RUST_LOG` is set.
pub fn filter_for(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.filter_directive()))
}

/// Install the global subscriber. Calling it twice is a no-op.
///
/// ```bash
/// RUST_LOG=zim=trace zim -s demo fetch
/// ```
pub fn init(level: LogLevel) {
    let _ = tracing_subscriber::registry()
        .with(filter_for(level))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time()
                .compact(),
        )
        .try_init();
}
