//! Provide tracing, tailored to this library.
//!
//! Binaries using these drivers should install a subscriber at startup,
//! normally via [`init_journald_or_stdout`]. Driver modules pull in
//! `use crate::tracing::prelude::*` for the usual `trace!()` through
//! `error!()` macros. Every failing kernel call is logged at debug level
//! with the saved errno before the typed error is returned, so a transcript
//! of a misbehaving bus can be captured with `RUST_LOG=linhal=debug`.

use std::env;
use time::OffsetDateTime;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer, time::FormatTime},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{trace, debug, info, warn, error};
}

use prelude::*;

/// Initialize logging, preferring journald.
///
/// Under systemd (detected through `JOURNAL_STREAM`) events go to journald;
/// anywhere else they go to stdout via [`init_stdout`].
pub fn init_journald_or_stdout() {
    if env::var("JOURNAL_STREAM").is_err() {
        init_stdout();
        return;
    }
    match tracing_journald::layer() {
        Ok(layer) => tracing_subscriber::registry().with(layer).init(),
        Err(_) => {
            init_stdout();
            error!("Failed to initialize journald logging, using stdout.");
        }
    }
}

/// Initialize logging to stdout.
///
/// Filtered by the RUST_LOG environment variable, with the default level
/// raised from ERROR to INFO.
pub fn init_stdout() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    let fmt_layer = tracing_subscriber::fmt::layer().with_timer(WallClock);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

// Timestamps in local wall-clock time, to the nearest second. Falls back to
// UTC when the local offset cannot be determined (e.g. multi-threaded
// environments where libc refuses to read /etc/localtime).
struct WallClock;

impl FormatTime for WallClock {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let stamp = now
            .format(time::macros::format_description!(
                "[hour]:[minute]:[second]"
            ))
            .map_err(|_| std::fmt::Error)?;
        write!(w, "{stamp}")
    }
}
