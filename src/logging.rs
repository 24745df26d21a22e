use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Plain fmt output by default;
/// build with `--features tracing_json` for JSON lines, or
/// `--features tracing_noansi` for plain text without color codes.
pub fn setup_tracing() {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mailout=info"))
    };

    if cfg!(feature = "tracing_json") {
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter())
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Couldn't set global tracing subscriber");
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_ansi(!cfg!(feature = "tracing_noansi"))
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Couldn't set global tracing subscriber");
    }
}
