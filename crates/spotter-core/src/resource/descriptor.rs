use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::warn;

use crate::api::TransportMethod;
use crate::config::ResourceConfig;
use crate::error::TransportError;

use super::transport::{RawResult, TransportFn};

/// Static description of one resource kind. Built once at startup.
#[derive(Clone)]
pub struct ResourceDescriptor {
    key: String,
    ttl: Duration,
    transport: TransportFn,
    is_critical: bool,
}

impl ResourceDescriptor {
    pub fn new(key: impl Into<String>, ttl: Duration, transport: TransportFn) -> Self {
        Self {
            key: key.into(),
            ttl,
            transport,
            is_critical: false,
        }
    }

    pub fn critical(mut self, is_critical: bool) -> Self {
        self.is_critical = is_critical;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_critical(&self) -> bool {
        self.is_critical
    }

    /// One transport invocation.
    pub fn call(&self) -> BoxFuture<'static, Result<RawResult, TransportError>> {
        (self.transport)(self.key.clone())
    }
}

impl fmt::Debug for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDescriptor")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .field("is_critical", &self.is_critical)
            .finish_non_exhaustive()
    }
}

/// Resource key → descriptor.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    descriptors: BTreeMap<String, Arc<ResourceDescriptor>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the configured resource table. `transport_for` supplies the
    /// transport function for each configured method.
    pub fn from_table<F>(table: &BTreeMap<String, ResourceConfig>, mut transport_for: F) -> Self
    where
        F: FnMut(TransportMethod) -> TransportFn,
    {
        table
            .iter()
            .fold(Self::new(), |registry, (key, resource)| {
                registry.with(
                    ResourceDescriptor::new(key.clone(), resource.ttl(), transport_for(resource.method))
                        .critical(resource.critical),
                )
            })
    }

    pub fn with(mut self, descriptor: ResourceDescriptor) -> Self {
        self.insert(descriptor);
        self
    }

    pub fn insert(&mut self, descriptor: ResourceDescriptor) {
        let key = descriptor.key().to_string();
        if self
            .descriptors
            .insert(key.clone(), Arc::new(descriptor))
            .is_some()
        {
            warn!(key = %key, "Resource registered twice; keeping the latest descriptor");
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<ResourceDescriptor>> {
        self.descriptors.get(key).cloned()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<ResourceDescriptor>> {
        self.descriptors.values()
    }

    pub fn critical(&self) -> impl Iterator<Item = &Arc<ResourceDescriptor>> {
        self.descriptors.values().filter(|d| d.is_critical())
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::resource::transport::transport_fn;
    use serde_json::json;

    fn echo_method() -> impl FnMut(TransportMethod) -> TransportFn {
        |method| transport_fn(move |_key| async move { Ok(RawResult::ok(json!(method.path()))) })
    }

    #[test]
    fn test_from_default_table() {
        let config = Config::default();
        let registry = ResourceRegistry::from_table(&config.resources, echo_method());

        assert_eq!(
            registry.keys().collect::<Vec<_>>(),
            vec!["config", "plans", "products", "services", "stats"]
        );
        let stats = registry.get("stats").expect("stats registered");
        assert_eq!(stats.ttl(), Duration::from_secs(5 * 60));
        let plans = registry.get("plans").expect("plans registered");
        assert_eq!(plans.ttl(), Duration::from_secs(30 * 60));
    }

    #[test]
    fn test_critical_filter() {
        let config = Config::default();
        let registry = ResourceRegistry::from_table(&config.resources, echo_method());
        let critical: Vec<_> = registry.critical().map(|d| d.key().to_string()).collect();
        assert_eq!(critical, vec!["config".to_string(), "services".to_string()]);
    }

    #[tokio::test]
    async fn test_call_dispatches_to_configured_method() {
        let config = Config::default();
        let registry = ResourceRegistry::from_table(&config.resources, echo_method());
        let products = registry.get("products").expect("products registered");

        let raw = products.call().await.expect("transport ok");
        assert_eq!(raw.into_data(), Ok(json!("/products")));
    }

    #[test]
    fn test_insert_replaces() {
        let transport = transport_fn(|_key| async { Ok(RawResult::ok(json!(1))) });
        let registry = ResourceRegistry::new()
            .with(ResourceDescriptor::new("stats", Duration::from_secs(1), transport.clone()))
            .with(ResourceDescriptor::new("stats", Duration::from_secs(2), transport));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("stats").map(|d| d.ttl()), Some(Duration::from_secs(2)));
    }
}
