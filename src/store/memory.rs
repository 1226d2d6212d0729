//! In-memory blob store

use super::{BlobStore, KeyIter, ObjectMeta, PutOptions};
use crate::key::{Clock, SystemClock};
use crate::Result;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Debug)]
struct StoredObject {
    data: Vec<u8>,
    meta: ObjectMeta,
}

/// A blob store held in process memory
///
/// Listing takes a snapshot of the matching keys, so writes made while a
/// listing is consumed are not observed by it.
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Stamp `last_modified` from `clock` instead of the wall clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        MemoryStore {
            objects: RwLock::new(BTreeMap::new()),
            clock,
        }
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for MemoryStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.read().contains_key(key))
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.read().get(key).map(|o| o.data.clone()))
    }

    fn put(&self, key: &str, data: &[u8], options: &PutOptions) -> Result<()> {
        let meta = ObjectMeta::for_write(data, options, self.clock.now());
        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                meta,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.objects.write().remove(key);
        Ok(())
    }

    fn list<'a>(&'a self, prefix: &str) -> Result<KeyIter<'a>> {
        let keys: Vec<String> = {
            let objects = self.objects.read();
            objects
                .range(prefix.to_string()..)
                .take_while(|(k, _)| k.starts_with(prefix))
                .map(|(k, _)| k.clone())
                .collect()
        };
        Ok(Box::new(keys.into_iter().map(Ok)))
    }

    fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        Ok(self.objects.read().get(key).map(|o| o.meta.clone()))
    }
}
