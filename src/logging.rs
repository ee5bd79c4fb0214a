//! Opt-in `tracing` subscriber for binaries and tests embedding the crate.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the filter directives.
pub const LOG_ENV: &str = "OPSYNC_LOG";

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Installs a fmt subscriber filtered by [`LOG_ENV`], defaulting to `info`.
///
/// Only the first call does anything. An already installed global
/// subscriber is left in place.
pub fn init_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true),
        );

        if subscriber.try_init().is_err() {
            tracing::debug!("global tracing subscriber already initialized, keeping it");
        }
    });
}
