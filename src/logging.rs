use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUNMAN_LOG` (or `RUST_LOG`) wins over the
/// verbosity flag; calling this twice is harmless.
pub fn init(verbose: bool) {
    let fallback = if verbose { "runman=debug" } else { "runman=info" };
    let filter = std::env::var("RUNMAN_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
