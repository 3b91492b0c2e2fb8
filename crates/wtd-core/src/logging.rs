//! Logging setup. See SPEC_FULL.md §11.2.
//!
//! Mirrors `crates/core/src/logging.rs`: a registry with an `EnvFilter`
//! layer driven by `RUST_LOG`, falling back to a CLI-provided level, plus
//! a `fmt` layer writing to stderr so stdout stays clean for anything the
//! command attaches or execs.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber. `cli_level` is the `--log-level`
/// value, used only when `RUST_LOG` is unset.
pub fn init(cli_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Build a filter+fmt pair without installing it globally, for tests
/// that want to assert on emitted output.
#[cfg(test)]
pub fn test_subscriber(level: &str) -> impl tracing::Subscriber {
    fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_test_writer()
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::info;
    use tracing::subscriber::with_default;

    #[test]
    fn test_subscriber_does_not_panic_on_log() {
        with_default(test_subscriber("debug"), || {
            info!("hello from a test");
        });
    }
}
