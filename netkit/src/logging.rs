//! Logging façade.
//!
//! Logging is treated as an external collaborator: simple level-keyed
//! sinks, not a metrics/observability layer. Internally this crate logs
//! exclusively through `tracing`'s macros.
//! `init_logging` is the one piece of setup an embedder needs; everything
//! else is just `tracing::{error,warn,info,debug,trace}!` calls at the
//! call site.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs a `tracing-subscriber` `fmt` layer driven by `RUST_LOG`
/// (defaulting to `info`), before touching any socket. Safe to call more
/// than once; only the first call takes effect.
pub fn init_logging() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}
