use {
    prometheus::{Encoder, Registry, TextEncoder},
    std::sync::OnceLock,
};

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Configures the global metrics registry with an optional prefix applied to
/// all metric names. Must be called before the first [`get_registry`];
/// later calls are ignored.
pub fn setup_registry(prefix: Option<String>) {
    let registry = Registry::new_custom(prefix, None).expect("invalid metrics prefix");
    let _ = REGISTRY.set(registry);
}

/// The process-wide registry. Components register their collectors here so a
/// single `/metrics` endpoint exposes everything.
pub fn get_registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Renders the registry in the prometheus text exposition format.
pub fn encode_to_string() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(err) = encoder.encode(&get_registry().gather(), &mut buffer) {
        tracing::warn!(?err, "failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_encodes() {
        let gauge = prometheus::IntGauge::new("observe_test_gauge", "test").unwrap();
        get_registry().register(Box::new(gauge.clone())).unwrap();
        gauge.set(3);
        let encoded = encode_to_string();
        assert!(encoded.contains("observe_test_gauge 3"));
    }
}
