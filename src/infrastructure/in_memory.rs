use crate::domain::ports::{PaymentProvider, PaymentProviderRef, ProviderRegistry};
use std::collections::HashMap;
use std::sync::Arc;

/// A provider registry backed by an in-memory map.
///
/// Keys are provider configuration guids as referenced by
/// [`PaymentInstrument::provider_configuration_guid`](crate::domain::instrument::PaymentInstrument).
#[derive(Default, Clone)]
pub struct InMemoryProviderRegistry {
    providers: HashMap<String, PaymentProviderRef>,
}

impl InMemoryProviderRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, configuration_guid: impl Into<String>, provider: PaymentProviderRef) {
        self.providers.insert(configuration_guid.into(), provider);
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with_provider<P>(mut self, configuration_guid: impl Into<String>, provider: Arc<P>) -> Self
    where
        P: PaymentProvider + 'static,
    {
        self.register(configuration_guid, provider);
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl ProviderRegistry for InMemoryProviderRegistry {
    fn provider(&self, configuration_guid: &str) -> Option<PaymentProviderRef> {
        self.providers.get(configuration_guid).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::simulated::SimulatedPaymentProvider;

    #[test]
    fn test_registry_resolves_registered_configuration() {
        let registry = InMemoryProviderRegistry::new()
            .with_provider("gateway", Arc::new(SimulatedPaymentProvider::new("gateway")));

        let provider = registry.provider("gateway").unwrap();
        assert_eq!(provider.configuration_name(), "gateway");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_unknown_configuration() {
        let registry = InMemoryProviderRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.provider("missing").is_none());
    }
}
