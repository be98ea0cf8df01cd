use crate::types::{ObjectId, Record};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::RwLock;

/// Persistence seam used for reference resolution and autosave.
///
/// Every call is treated as atomic and independently failing; the codec
/// neither batches nor caches results across sibling branches.
pub trait DocumentStore: Send + Sync {
    /// Load a record by type and identifier. `Ok(None)` means not found.
    fn find_by_id(&self, doc_type: &str, id: &ObjectId) -> Result<Option<Record>>;

    /// Insert or replace a record. Returns its identifier, assigning a fresh
    /// one when the record had none.
    fn save(&self, record: &Record) -> Result<ObjectId>;
}

// ── MemoryDocumentStore ──

type StoreKey = (String, ObjectId);

/// In-memory DocumentStore for testing and embedding.
pub struct MemoryDocumentStore {
    inner: RwLock<HashMap<StoreKey, Record>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Seed records in bulk. Records without an identifier are rejected.
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Result<Self> {
        let store = Self::new();
        for record in records {
            let id = record
                .id()
                .ok_or_else(|| anyhow!("Cannot seed unsaved {} record", record.doc_type()))?;
            store
                .inner
                .write()
                .map_err(|e| anyhow!("Lock: {}", e))?
                .insert((record.doc_type().to_string(), id), record);
        }
        Ok(store)
    }

    pub fn len(&self) -> Result<usize> {
        let store = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(store.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn find_by_id(&self, doc_type: &str, id: &ObjectId) -> Result<Option<Record>> {
        let store = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(store.get(&(doc_type.to_string(), *id)).cloned())
    }

    fn save(&self, record: &Record) -> Result<ObjectId> {
        let id = record.id().unwrap_or_default();
        let mut stored = record.clone();
        stored.set_id(id);
        let mut store = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;
        store.insert((record.doc_type().to_string(), id), stored);
        Ok(id)
    }
}
