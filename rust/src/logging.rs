/// Tracing initialization, called once at `CallaApp::new()` before anything
/// else. Respects `RUST_LOG`; defaults to debug for this crate, info
/// elsewhere. Safe to call more than once (`try_init` swallows the second).
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "calla_core=debug,info".into()),
        )
        .try_init();
}
