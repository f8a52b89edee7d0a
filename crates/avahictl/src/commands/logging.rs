//! Logging initialization.
//!
//! Logs go to stderr so that stdout only carries command output.

use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;

/// Initialize logging based on verbosity. `RUST_LOG` overrides both levels.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "avahictl=debug,avahictl_discover=debug"
    } else {
        "avahictl=info,avahictl_discover=info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .init();
}
