//! Shared setup for the lifecycle integration tests.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize the library (once per test process) and wire tracing output
/// to `RUST_LOG`.
pub fn init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
        http_conn::library_init();
    });
}
