//! Structured logging init (SPEC_FULL §A.1). Per-subsystem spans (one per
//! adapter connection, see `crate::adapter::connection`) carry identity
//! instead of module-level loggers, per spec §9's anti-global-logger note.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `default_directive` sets the fallback
/// level when `RUST_LOG` is unset; pretty output in debug builds mirrors
/// the teacher's `fmt().pretty()` choice.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let fmt_layer = if cfg!(debug_assertions) {
        tracing_subscriber::fmt::layer().pretty().boxed()
    } else {
        tracing_subscriber::fmt::layer().compact().boxed()
    };

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}
