use tracing_subscriber::EnvFilter;

/// Configure `tracing` from the required `-v` verbosity flag: `1` silences
/// warnings (errors only), `2` silences info (warn and above), `3`
/// silences debug (info and above).
pub fn init(verbosity: u8) {
    let level = match verbosity {
        1 => "error",
        2 => "warn",
        _ => "info",
    };
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
