//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for binaries and demos
//! - Honour `RUST_LOG` over the configured level
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - `try_init` so a second initialization (tests, embedding) is an error, not a panic

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global fmt subscriber.
///
/// `level` is used when `RUST_LOG` is unset, e.g. `"info"` or
/// `"circuit_breaker=debug"`.
pub fn init(level: &str) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
}
