use {prometheus::Registry, std::sync::OnceLock};

/// The process global metrics registry. Components register their collectors
/// here at construction time so a single scrape endpoint can expose them all.
pub fn get_registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::new)
}
