//! # Log Setup
//!
//! Compact, structured logs through `tracing-subscriber`. The filter comes from
//! `RUST_LOG` when set, otherwise from the level the caller passes in.
//!
//! ```bash
//! RUST_LOG=debug cargo run                       # full payloads
//! RUST_LOG=cafeteria_pipeline::broker=trace,info # one module loud, rest quiet
//! ```
//!
//! Actors log with an `entity_type` field instead of a module path, so the
//! target is hidden.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Safe to call more than once; later calls are no-ops.
pub fn setup_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
