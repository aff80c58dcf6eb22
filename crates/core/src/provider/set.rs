use std::collections::HashMap;
use std::sync::Arc;

use super::InflationProvider;

/// The provider adapters known to this process, keyed by provider id.
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: HashMap<&'static str, Arc<dyn InflationProvider>>,
    order: Vec<&'static str>,
}

impl ProviderSet {
    /// Builds a set ordered by each provider's priority hint.
    ///
    /// A later provider with a duplicate id replaces the earlier one.
    pub fn new(providers: Vec<Arc<dyn InflationProvider>>) -> Self {
        let mut set = Self::default();
        for provider in providers {
            let id = provider.id();
            if set.providers.insert(id, provider).is_none() {
                set.order.push(id);
            }
        }
        let providers = &set.providers;
        set.order
            .sort_by_key(|id| (providers.get(id).map(|p| p.priority()).unwrap_or(u8::MAX), *id));
        set
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn InflationProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Provider ids, most preferred first.
    pub fn ids(&self) -> Vec<String> {
        self.order.iter().map(|id| id.to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn InflationProvider>> {
        self.order.iter().filter_map(|id| self.providers.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSet").field("order", &self.order).finish()
    }
}
