use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ahash::AHashMap;
use sha2::{Digest, Sha256};

use chatflow_core::Value;
use chatflow_graph::CompiledGraph;

use crate::model::{GraphEdgeDef, GraphNodeDef};
use crate::state::ChatState;

/// A compiled workflow plus the validation warnings gathered while
/// building it. Read-only once built; shared across concurrent runs.
pub struct CompiledFlow {
    pub graph: CompiledGraph<ChatState>,
    pub warnings: Vec<String>,
}

impl fmt::Debug for CompiledFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFlow")
            .field("graph", &self.graph)
            .field("warnings", &self.warnings)
            .finish()
    }
}

struct CacheEntry {
    flow: Arc<CompiledFlow>,
    inserted_at: Instant,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub max_size: usize,
    pub ttl: Duration,
}

/// Content-addressed cache of compiled workflows. One exclusive lock
/// serializes all access; the cache is the only structure shared across
/// concurrent runs.
pub struct GraphCache {
    ttl: Duration,
    max_size: usize,
    inner: Mutex<AHashMap<String, CacheEntry>>,
}

impl Default for GraphCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(30 * 60), 100)
    }
}

impl GraphCache {
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            ttl,
            max_size,
            inner: Mutex::new(AHashMap::new()),
        }
    }

    /// Deterministic key over every field that affects compiled behavior:
    /// node (id, type, configuration, position) and edge (from, to,
    /// condition type, condition config). Iteration order of the inputs
    /// does not matter; entries are sorted before hashing.
    pub fn cache_key(graph_id: &str, nodes: &[GraphNodeDef], edges: &[GraphEdgeDef]) -> String {
        let mut node_parts: Vec<String> = nodes
            .iter()
            .map(|node| {
                format!(
                    "{}|{}|{}|{},{}",
                    node.node_id,
                    node.node_type,
                    canonical_json(&node.configuration),
                    node.position.0,
                    node.position.1
                )
            })
            .collect();
        node_parts.sort();

        let mut edge_parts: Vec<String> = edges
            .iter()
            .map(|edge| {
                format!(
                    "{}|{}|{:?}|{}",
                    edge.from_node_id,
                    edge.to_node_id,
                    edge.condition_type,
                    canonical_json(&edge.condition_config)
                )
            })
            .collect();
        edge_parts.sort();

        let nodes_hash = sha256_hex(node_parts.join("\n").as_bytes());
        let edges_hash = sha256_hex(edge_parts.join("\n").as_bytes());
        sha256_hex(format!("{graph_id}:{nodes_hash}:{edges_hash}").as_bytes())
    }

    /// Returns the cached flow if present and fresh. Expired entries are
    /// evicted lazily here rather than by a background task.
    pub fn get(&self, key: &str) -> Option<Arc<CompiledFlow>> {
        let mut guard = self.inner.lock().ok()?;
        let fresh = match guard.get(key) {
            Some(entry) => entry.inserted_at.elapsed() < self.ttl,
            None => return None,
        };
        if !fresh {
            guard.remove(key);
            tracing::debug!(%key, "cache entry expired");
            return None;
        }
        tracing::debug!(%key, "cache hit");
        guard.get(key).map(|entry| Arc::clone(&entry.flow))
    }

    pub fn put(&self, key: impl Into<String>, flow: Arc<CompiledFlow>) {
        let key = key.into();
        let Ok(mut guard) = self.inner.lock() else {
            return;
        };
        // Replacing an existing key never needs an eviction.
        if guard.len() >= self.max_size && !guard.contains_key(&key) {
            // Evict the single oldest entry by insertion time.
            if let Some(oldest) = guard
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(key, _)| key.clone())
            {
                guard.remove(&oldest);
                tracing::debug!(key = %oldest, "evicted oldest cache entry");
            }
        }
        guard.insert(
            key,
            CacheEntry {
                flow,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.inner
            .lock()
            .map(|mut guard| guard.remove(key).is_some())
            .unwrap_or(false)
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.clear();
        }
    }

    pub fn cleanup_expired(&self) -> usize {
        let Ok(mut guard) = self.inner.lock() else {
            return 0;
        };
        let before = guard.len();
        guard.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
        before - guard.len()
    }

    pub fn stats(&self) -> CacheStats {
        let (total, expired) = self
            .inner
            .lock()
            .map(|guard| {
                let expired = guard
                    .values()
                    .filter(|entry| entry.inserted_at.elapsed() >= self.ttl)
                    .count();
                (guard.len(), expired)
            })
            .unwrap_or((0, 0));
        CacheStats {
            total_entries: total,
            expired_entries: expired,
            max_size: self.max_size,
            ttl: self.ttl,
        }
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// JSON rendered with object keys sorted recursively, so logically equal
/// configurations hash identically regardless of key order.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, String> = map
                .iter()
                .map(|(key, value)| (key, canonical_json(value)))
                .collect();
            let fields: Vec<String> = sorted
                .into_iter()
                .map(|(key, value)| format!("{key:?}:{value}"))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", rendered.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_keys_recursively() {
        let a = json!({"b": 1, "a": {"d": 2, "c": 3}});
        let b = json!({"a": {"c": 3, "d": 2}, "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn canonical_json_keeps_array_order() {
        let a = json!([1, 2]);
        let b = json!([2, 1]);
        assert_ne!(canonical_json(&a), canonical_json(&b));
    }
}
