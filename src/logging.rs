//! Diagnostic logging to stderr.
//!
//! Report output goes to stdout; everything here goes to stderr so the two
//! never interleave in pipes. `RUST_LOG` overrides the level chosen from
//! `--verbose`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub(crate) fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "aaa_scanner=info"
    } else {
        "warn"
    }
}

pub fn init_logging(verbose: bool, use_color: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    // A second init (tests, embedding) is not an error worth surfacing.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(use_color),
        )
        .try_init();
}
