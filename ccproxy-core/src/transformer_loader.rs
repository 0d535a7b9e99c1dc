//! Transformer Loader (§4.2). Rust has no dynamic `class_path` reflection,
//! so the registry is a closed table of named constructors populated at
//! startup (§9 design note) rather than a loader that imports arbitrary
//! code. `ccproxy-transformers` registers its constructors into a
//! [`ConstructorRegistry`] built in `ccproxy-server`'s bootstrap; this crate
//! only defines the registry and the identity-keyed instance cache.

use crate::transform::LoadedTransformer;
use crate::types::TransformerRef;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Constructor = dyn Fn(&serde_json::Map<String, Value>) -> crate::error::Result<LoadedTransformer> + Send + Sync;

/// Name → constructor table. Built once at startup from every crate that
/// contributes transformers; immutable afterward.
#[derive(Default)]
pub struct ConstructorRegistry {
    constructors: HashMap<String, Arc<Constructor>>,
}

impl ConstructorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class_path: impl Into<String>, ctor: impl Fn(&serde_json::Map<String, Value>) -> crate::error::Result<LoadedTransformer> + Send + Sync + 'static) {
        self.constructors.insert(class_path.into(), Arc::new(ctor));
    }

    pub fn contains(&self, class_path: &str) -> bool {
        self.constructors.contains_key(class_path)
    }
}

/// Stable key for the instance cache: class path plus a canonical
/// serialization of params (object key order is insignificant for
/// `serde_json::Map`'s `PartialEq`, but we need a hashable/orderable key —
/// canonicalize by re-serializing through a `BTreeMap`).
fn cache_key(class_path: &str, params: &serde_json::Map<String, Value>) -> String {
    let ordered: std::collections::BTreeMap<&String, &Value> = params.iter().collect();
    let canonical = serde_json::to_string(&ordered).unwrap_or_default();
    format!("{class_path}\u{0}{canonical}")
}

/// Caches instantiated transformers by `(class_path, params)` identity so
/// pipelines sharing an identical config entry share one instance.
pub struct TransformerLoader {
    cache: Mutex<HashMap<String, LoadedTransformer>>,
}

impl TransformerLoader {
    pub fn new() -> Self {
        Self { cache: Mutex::new(HashMap::new()) }
    }

    /// Instantiate (or fetch cached) one transformer. A load failure is the
    /// caller's concern to log and skip — this returns the error untouched.
    pub fn load_one(&self, reference: &TransformerRef, registry: &ConstructorRegistry) -> crate::error::Result<LoadedTransformer> {
        let key = cache_key(&reference.class_path, &reference.params);
        if let Some(cached) = self.cache.lock().expect("transformer cache poisoned").get(&key) {
            return Ok(cached.clone());
        }

        let ctor = registry.constructors.get(&reference.class_path).ok_or_else(|| {
            crate::error::ProxyError::config(format!("unknown transformer class '{}'", reference.class_path))
        })?;
        let instance = ctor(&reference.params)?;

        self.cache.lock().expect("transformer cache poisoned").insert(key, instance.clone());
        Ok(instance)
    }

    /// Load an ordered chain, logging and skipping entries that fail to
    /// construct (§4.2: "the caller's chain is the loaded subset").
    pub fn load_chain(&self, refs: &[TransformerRef], registry: &ConstructorRegistry) -> Vec<LoadedTransformer> {
        refs.iter()
            .filter_map(|r| match self.load_one(r, registry) {
                Ok(t) => Some(t),
                Err(e) => {
                    tracing::warn!(class_path = %r.class_path, error = %e, "skipping transformer that failed to load");
                    None
                }
            })
            .collect()
    }
}

impl Default for TransformerLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{RequestCtx, RequestTransformer};

    struct Noop;
    impl RequestTransformer for Noop {
        fn name(&self) -> &str {
            "noop"
        }
        fn transform(&self, request: Value, _ctx: &mut RequestCtx) -> crate::error::Result<Value> {
            Ok(request)
        }
    }

    fn registry() -> ConstructorRegistry {
        let mut r = ConstructorRegistry::new();
        r.register("test::Noop", |_params| Ok(LoadedTransformer::Request(Arc::new(Noop))));
        r
    }

    #[test]
    fn unknown_class_path_is_config_error() {
        let loader = TransformerLoader::new();
        let registry = ConstructorRegistry::new();
        let reference = TransformerRef { class_path: "does::not::Exist".into(), params: serde_json::Map::new() };
        assert!(loader.load_one(&reference, &registry).is_err());
    }

    #[test]
    fn failing_entries_are_skipped_not_fatal() {
        let loader = TransformerLoader::new();
        let registry = registry();
        let refs = vec![
            TransformerRef { class_path: "test::Noop".into(), params: serde_json::Map::new() },
            TransformerRef { class_path: "missing::Thing".into(), params: serde_json::Map::new() },
        ];
        let chain = loader.load_chain(&refs, &registry);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn identical_config_shares_one_instance() {
        let loader = TransformerLoader::new();
        let registry = registry();
        let reference = TransformerRef { class_path: "test::Noop".into(), params: serde_json::Map::new() };
        let a = loader.load_one(&reference, &registry).unwrap();
        let b = loader.load_one(&reference, &registry).unwrap();
        let (Some(ra), Some(rb)) = (a.as_request(), b.as_request()) else {
            panic!("expected request transformers");
        };
        assert!(Arc::ptr_eq(ra, rb));
    }
}
