//! Named schema mappings, shared across calls.
//!
//! Readers take an `Arc` snapshot and never wait on a writer for longer than
//! a pointer swap. Writers are serialized, build the next state off to the
//! side, persist it, and only then publish it.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, debug_span, info};

use super::schema::{ElementKind, MappingEntry, SchemaMapping, SchemaOptions};
use crate::rdf::vocab;
use crate::storage::ConfigStore;
use crate::{Error, Result};

/// Configuration namespace schema mappings are persisted under.
pub const SCHEMA_CONFIG_NAMESPACE: &str = "schema_mapping";

/// Immutable view of every registered schema.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    schemas: BTreeMap<String, Arc<SchemaMapping>>,
}

impl RegistrySnapshot {
    pub fn get(&self, name: &str) -> Option<&Arc<SchemaMapping>> {
        self.schemas.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

pub struct SchemaRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
    writer: Mutex<()>,
    store: Option<Arc<dyn ConfigStore>>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    /// Registry that lives only as long as the process.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::default()),
            writer: Mutex::new(()),
            store: None,
        }
    }

    /// Registry persisted through `store`, loading whatever it already holds.
    pub fn load(store: Arc<dyn ConfigStore>) -> Result<Self> {
        let mut schemas = BTreeMap::new();
        for (key, payload) in store.load_config(SCHEMA_CONFIG_NAMESPACE)? {
            let schema: SchemaMapping = serde_json::from_str(&payload)?;
            if schema.name != key {
                return Err(Error::InvalidConfig(format!(
                    "persisted schema {key:?} carries name {:?}", schema.name
                )));
            }
            schemas.insert(key, Arc::new(schema));
        }
        info!(schemas = schemas.len(), "schema registry loaded");
        Ok(Self {
            current: RwLock::new(Arc::new(RegistrySnapshot { schemas })),
            writer: Mutex::new(()),
            store: Some(store),
        })
    }

    /// Consistent view of the registry at this instant.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.read().clone()
    }

    pub fn get(&self, name: &str) -> Result<Arc<SchemaMapping>> {
        self.snapshot()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("schema {name:?}")))
    }

    // ========================================================================
    // Schema-level operations
    // ========================================================================

    pub fn add_schema(&self, name: &str, options: SchemaOptions) -> Result<()> {
        let _span = debug_span!("registry_write", schema = name).entered();
        let _guard = self.writer.lock();
        let state = self.snapshot();
        if state.schemas.contains_key(name) {
            return Err(Error::Conflict(format!("schema {name:?} already exists")));
        }
        let schema = SchemaMapping::new(name, options)?;
        self.persist(&schema)?;
        self.publish(&state, name, Some(schema));
        debug!(schema = name, "schema added");
        Ok(())
    }

    /// Remove a schema together with all of its entries.
    pub fn drop_schema(&self, name: &str) -> Result<SchemaMapping> {
        let _span = debug_span!("registry_write", schema = name).entered();
        let _guard = self.writer.lock();
        let state = self.snapshot();
        let dropped = state
            .schemas
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("schema {name:?}")))?;
        let dropped = SchemaMapping::clone(dropped);
        if let Some(store) = &self.store {
            store.delete_config(SCHEMA_CONFIG_NAMESPACE, name)?;
        }
        self.publish(&state, name, None);
        debug!(schema = name, entries = dropped.entries.len(), "schema dropped");
        Ok(dropped)
    }

    pub fn list_schemas(&self) -> Vec<String> {
        self.snapshot().names().map(str::to_string).collect()
    }

    // ========================================================================
    // Entry-level operations
    // ========================================================================

    pub fn add_mapping(
        &self,
        schema: &str,
        prefix: &str,
        kind: ElementKind,
        target_name: &str,
    ) -> Result<Option<MappingEntry>> {
        self.mutate(schema, |s| s.put_entry(prefix, kind, target_name))
    }

    pub fn drop_mapping(&self, schema: &str, prefix: &str, kind: ElementKind) -> Result<MappingEntry> {
        self.mutate(schema, |s| s.remove_entry(prefix, kind))
    }

    pub fn list_mappings(&self, schema: &str) -> Result<Vec<MappingEntry>> {
        Ok(self.get(schema)?.entries.clone())
    }

    pub fn add_namespace(&self, schema: &str, prefix: &str, base: &str) -> Result<()> {
        self.mutate(schema, |s| s.add_namespace(prefix, base))
    }

    /// Seed the well-known vocabulary prefixes. Prefixes already present,
    /// under any base, are left alone. Returns how many were added.
    pub fn add_common_schemas(&self, schema: &str) -> Result<usize> {
        self.mutate(schema, |s| {
            let mut added = 0;
            for (prefix, base) in vocab::COMMON_PREFIXES {
                if s.namespace(prefix).is_none() {
                    s.add_namespace(prefix, base)?;
                    added += 1;
                }
            }
            Ok(added)
        })
    }

    // ========================================================================
    // Copy-on-write plumbing
    // ========================================================================

    fn mutate<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut SchemaMapping) -> Result<T>,
    ) -> Result<T> {
        let _span = debug_span!("registry_write", schema = name).entered();
        let _guard = self.writer.lock();
        let state = self.snapshot();
        let current = state
            .schemas
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("schema {name:?}")))?;
        let mut next = SchemaMapping::clone(current);
        let out = f(&mut next)?;
        if next != **current {
            self.persist(&next)?;
            self.publish(&state, name, Some(next));
        }
        Ok(out)
    }

    fn persist(&self, schema: &SchemaMapping) -> Result<()> {
        if let Some(store) = &self.store {
            let payload = serde_json::to_string(schema)?;
            store.save_config(SCHEMA_CONFIG_NAMESPACE, &schema.name, &payload)?;
        }
        Ok(())
    }

    /// Swap in `state` with `name` replaced (or removed). Caller holds the writer lock.
    fn publish(&self, state: &RegistrySnapshot, name: &str, schema: Option<SchemaMapping>) {
        let mut next = state.clone();
        match schema {
            Some(schema) => next.schemas.insert(name.to_string(), Arc::new(schema)),
            None => next.schemas.remove(name),
        };
        *self.current.write() = Arc::new(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    struct FailingStore;

    impl ConfigStore for FailingStore {
        fn load_config(&self, _namespace: &str) -> Result<Vec<(String, String)>> {
            Ok(Vec::new())
        }
        fn save_config(&self, _namespace: &str, _key: &str, _payload: &str) -> Result<()> {
            Err(Error::StoreUnavailable("disk full".into()))
        }
        fn delete_config(&self, _namespace: &str, _key: &str) -> Result<bool> {
            Err(Error::StoreUnavailable("disk full".into()))
        }
    }

    #[test]
    fn test_snapshot_is_stable_across_mutation() {
        let reg = SchemaRegistry::new();
        reg.add_schema("s", SchemaOptions::default().with_namespace("ex", "http://ex.org/")).unwrap();
        let before = reg.get("s").unwrap();
        reg.add_mapping("s", "ex", ElementKind::Label, "").unwrap();

        assert!(before.entries.is_empty());
        assert_eq!(reg.get("s").unwrap().entries.len(), 1);
    }

    #[test]
    fn test_drop_missing_schema() {
        let reg = SchemaRegistry::new();
        assert!(matches!(reg.drop_schema("nope"), Err(Error::NotFound(_))));
        assert!(matches!(reg.list_mappings("nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_failed_persist_leaves_registry_untouched() {
        let reg = SchemaRegistry::load(Arc::new(FailingStore)).unwrap();
        assert!(reg.add_schema("s", SchemaOptions::default()).is_err());
        assert!(reg.list_schemas().is_empty());
    }

    #[test]
    fn test_reload_from_store() {
        let backend = MemoryBackend::new();
        let reg = SchemaRegistry::load(Arc::new(backend.clone())).unwrap();
        reg.add_schema("s", SchemaOptions::default()).unwrap();
        reg.add_common_schemas("s").unwrap();
        reg.add_mapping("s", "foaf", ElementKind::Label, "").unwrap();

        let reloaded = SchemaRegistry::load(Arc::new(backend)).unwrap();
        assert_eq!(reloaded.get("s").unwrap(), reg.get("s").unwrap());
    }

    #[test]
    fn test_common_schemas_idempotent() {
        let reg = SchemaRegistry::new();
        reg.add_schema("s", SchemaOptions::default().with_namespace("owl", "http://my.org/owl#")).unwrap();
        let first = reg.add_common_schemas("s").unwrap();
        let second = reg.add_common_schemas("s").unwrap();

        assert_eq!(first, vocab::COMMON_PREFIXES.len() - 1);
        assert_eq!(second, 0);
        assert_eq!(reg.get("s").unwrap().namespace("owl"), Some("http://my.org/owl#"));
    }
}
