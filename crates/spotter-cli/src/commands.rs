use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use spotter_core::{CacheEntry, Config, FetchError, Payload, ResourceCache};
use tracing::{info, warn};

/// Fetch each key with `callers` concurrent callers. Callers for the same
/// key share one transport call.
pub async fn fetch(cache: &Arc<ResourceCache>, keys: &[String], callers: usize) -> Result<()> {
    let accesses = keys.iter().flat_map(|key| {
        (0..callers).map(move |_| {
            let cache = Arc::clone(cache);
            let key = key.clone();
            async move {
                let result = cache.fetch(&key).await;
                (key, result)
            }
        })
    });
    let results = join_all(accesses).await;

    for key in keys {
        if let Some((_, result)) = results.iter().find(|(k, _)| k == key) {
            println!("{}", describe(key, result));
        }
    }
    print_entries(cache);
    print_stats(cache)
}

/// Load every critical resource so first paint never waits on the network.
pub async fn warm(cache: &Arc<ResourceCache>) -> Result<()> {
    let keys: Vec<String> = cache
        .registry()
        .critical()
        .map(|d| d.key().to_string())
        .collect();
    info!(count = keys.len(), "Warming critical resources");

    let results = join_all(keys.iter().map(|key| cache.fetch(key))).await;
    let mut failed = 0;
    for (key, result) in keys.iter().zip(&results) {
        if result.is_err() {
            failed += 1;
        }
        println!("{}", describe(key, result));
    }
    if failed > 0 {
        warn!(failed = failed, "Some critical resources could not be loaded");
    }
    print_entries(cache);
    print_stats(cache)
}

pub fn resources(config: &Config) {
    println!("{:<12} {:>10}  {:<10} critical", "key", "ttl", "method");
    for (key, resource) in &config.resources {
        let method = serde_json::to_value(resource.method)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();
        println!(
            "{:<12} {:>8}ms  {:<10} {}",
            key,
            resource.ttl_ms,
            method,
            if resource.critical { "yes" } else { "no" }
        );
    }
}

fn describe(key: &str, result: &Result<Payload, FetchError>) -> String {
    match result {
        Ok(value) => format!("{}: ok ({} bytes)", key, value.to_string().len()),
        Err(e) => format!("{}: error: {}", key, e),
    }
}

fn describe_entry(entry: &CacheEntry<Payload>) -> String {
    format!(
        "{:<12} cached {} ({}), expires in {}s",
        entry.key,
        entry.cached_at.format("%Y-%m-%d %H:%M:%S UTC"),
        entry.age_display(),
        entry.ttl.saturating_sub(entry.age()).as_secs()
    )
}

/// One line per live entry, with the wall-clock time it was written.
fn print_entries(cache: &ResourceCache) {
    let store = cache.store();
    for key in store.keys() {
        if let Some(entry) = store.entry(&key) {
            println!("{}", describe_entry(&entry));
        }
    }
}

fn print_stats(cache: &ResourceCache) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&cache.stats())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_describe() {
        let ok: Result<Payload, FetchError> = Ok(Arc::new(json!([1, 2])));
        assert_eq!(describe("plans", &ok), "plans: ok (5 bytes)");

        let err: Result<Payload, FetchError> = Err(FetchError::UnknownResource("x".to_string()));
        assert_eq!(describe("x", &err), "x: error: Unknown resource: x");
    }

    #[test]
    fn test_describe_entry() {
        let entry = CacheEntry::new("stats", Arc::new(json!({})), Duration::from_secs(300));
        let line = describe_entry(&entry);
        assert!(line.starts_with("stats "));
        assert!(line.contains(" UTC (just now)"));
        assert!(line.ends_with("expires in 300s") || line.ends_with("expires in 299s"));
    }
}
