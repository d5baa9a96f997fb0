// src/utils/logging.rs
use tracing_subscriber::{fmt, EnvFilter};

// Our own stages at info; dependencies (reqwest, html5ever) only warn.
const DEFAULT_DIRECTIVES: &str = "warn,fs_extractor=info,fs_extract=info";

/// Installs the global subscriber for the `fs-extract` binary.
/// `RUST_LOG` overrides the default directives. Output goes to stderr so the
/// record printed on stdout stays machine-readable.
pub fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Logging ready ({})", DEFAULT_DIRECTIVES);
}
