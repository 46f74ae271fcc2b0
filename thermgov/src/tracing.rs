//! Logging setup.
//!
//! Modules pull the macros in through [`prelude`] so the whole crate logs
//! the same way. Binaries call [`init`] once at startup.

use std::env;

use time::macros::format_description;
use tracing_subscriber::{EnvFilter, fmt::time::LocalTime, prelude::*};

pub mod prelude {
    pub use ::tracing::{debug, error, info, trace, warn};
}

/// Set to `1` to send logs to the systemd journal instead of stderr.
const JOURNALD_ENV: &str = "THERMGOV_LOG_JOURNALD";

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber.
///
/// Honors `RUST_LOG` for filtering. Falls back to stderr when the journal
/// was requested but its socket can't be reached.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if env::var(JOURNALD_ENV).is_ok_and(|v| v == "1") {
        match tracing_journald::layer() {
            Ok(journald) => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(journald)
                    .init();
                return;
            }
            Err(e) => eprintln!("journald unavailable, logging to stderr: {e}"),
        }
    }

    let timer = LocalTime::new(format_description!(
        "[hour]:[minute]:[second].[subsecond digits:3]"
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(timer)
        .with_writer(std::io::stderr)
        .init();
}
