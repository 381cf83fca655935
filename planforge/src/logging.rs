//! Diagnostic tracing for the planforge binary.
//!
//! Diagnostics go to stderr and are never persisted. The run logs under each
//! project's `run_logs/` are product artifacts and are written whatever filter
//! is chosen here.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Directive used when `RUST_LOG` is unset and no `-v` was given.
pub const DEFAULT_DIRECTIVE: &str = "warn";

/// Filter directive for a `-v` count.
///
/// One `-v` shows step transitions, two or more show routine flow.
pub fn directive_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => DEFAULT_DIRECTIVE,
        1 => "warn,planforge=info",
        _ => "warn,planforge=debug",
    }
}

/// Install the stderr subscriber. `RUST_LOG` takes precedence over `fallback`.
///
/// ```bash
/// RUST_LOG=planforge=debug planforge step my-project
/// ```
pub fn init(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}
