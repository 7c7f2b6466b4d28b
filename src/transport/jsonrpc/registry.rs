#![forbid(unsafe_code)]

use std::sync::{Arc, RwLock};

/// Names of every registered method, sorted, for `system.help`.
#[derive(Clone, Default)]
pub struct MethodRegistry {
    inner: Arc<RwLock<Vec<String>>>,
}

impl MethodRegistry {
    pub fn track(&self, name: &'static str) {
        let mut methods = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Err(pos) = methods.binary_search_by(|entry| entry.as_str().cmp(name)) {
            methods.insert(pos, name.to_string());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|entry| entry == name)
    }

    pub fn list(&self) -> Vec<String> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::MethodRegistry;

    #[test]
    fn tracks_sorted_unique_names() {
        let registry = MethodRegistry::default();
        registry.track("system.ping");
        registry.track("indexer.status");
        registry.track("system.ping");
        assert_eq!(registry.list(), vec!["indexer.status", "system.ping"]);
        assert!(registry.contains("indexer.status"));
        assert!(!registry.contains("system.help"));
    }
}
