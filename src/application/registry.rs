//! Site adapters by name, in registration order

use std::sync::Arc;

use tracing::debug;

use crate::crawling::adapter::SiteAdapter;
use crate::crawling::selector_adapter::SelectorAdapter;
use crate::crawling::site_spec::SiteSpec;
use crate::error::{PipelineError, PipelineResult, ScrapeResult};

#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn SiteAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One selector adapter per configured site.
    pub fn from_specs(specs: &[SiteSpec]) -> ScrapeResult<Self> {
        let mut registry = Self::new();
        for spec in specs {
            registry.register(Arc::new(SelectorAdapter::new(spec.clone())?));
        }
        Ok(registry)
    }

    /// Add `adapter`, replacing any adapter registered under the same name.
    pub fn register(&mut self, adapter: Arc<dyn SiteAdapter>) {
        let name = adapter.site_name().to_string();
        if let Some(existing) = self.adapters.iter_mut().find(|a| a.site_name() == name) {
            debug!("Replacing adapter for {}", name);
            *existing = adapter;
        } else {
            self.adapters.push(adapter);
        }
    }

    pub fn get(&self, site: &str) -> Option<Arc<dyn SiteAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.site_name() == site)
            .map(Arc::clone)
    }

    pub fn names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.site_name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Adapters for `sites` in the given order, or every adapter when `sites` is empty.
    pub fn select(&self, sites: &[String]) -> PipelineResult<Vec<Arc<dyn SiteAdapter>>> {
        if sites.is_empty() {
            return Ok(self.adapters.clone());
        }
        sites
            .iter()
            .map(|site| {
                self.get(site)
                    .ok_or_else(|| PipelineError::UnknownSite(site.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedAdapter;

    fn registry() -> AdapterRegistry {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(ScriptedAdapter::new("Zara")));
        registry.register(Arc::new(ScriptedAdapter::new("Cos")));
        registry
    }

    #[test]
    fn select_keeps_requested_order() {
        let selected = registry()
            .select(&["Cos".to_string(), "Zara".to_string()])
            .unwrap();
        let names: Vec<&str> = selected.iter().map(|a| a.site_name()).collect();
        assert_eq!(names, ["Cos", "Zara"]);
    }

    #[test]
    fn empty_selection_means_all() {
        assert_eq!(registry().select(&[]).unwrap().len(), 2);
    }

    #[test]
    fn unknown_site_is_an_error() {
        let err = registry().select(&["Uniqlo".to_string()]).err().unwrap();
        assert!(matches!(err, PipelineError::UnknownSite(site) if site == "Uniqlo"));
    }

    #[test]
    fn register_replaces_same_name() {
        let mut registry = registry();
        registry.register(Arc::new(ScriptedAdapter::new("Zara")));
        assert_eq!(registry.names(), ["Zara", "Cos"]);
    }

    #[test]
    fn builds_from_site_specs() {
        let registry =
            AdapterRegistry::from_specs(&[crate::crawling::site_spec::tests::boutique()]).unwrap();
        assert_eq!(registry.names(), ["Boutique"]);
    }
}
