//! Tracing bootstrap for binaries and test harnesses embedding sessions.

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Installs the global fmt subscriber writing to stderr.
///
/// `RUST_LOG` selects the filter (e.g. `RUST_LOG=history_log=debug,info`);
/// without it the level is `info`. Calls after the first are no-ops, and an
/// already installed subscriber is left in place.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_ansi(false)
            .with_env_filter(filter)
            .try_init();
    });
}
