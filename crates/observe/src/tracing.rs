use {
    std::sync::Once,
    tracing_subscriber::EnvFilter,
};

/// Initializes tracing with the given filter. Loggers can only be set
/// globally once, repeated initialization is a no-op so tests may call this
/// freely.
pub fn initialize(filter: &str) {
    static ONCE: Once = Once::new();
    let filter = filter.to_string();
    ONCE.call_once(move || {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(filter))
            .with_ansi(false)
            .init();
    });
}
