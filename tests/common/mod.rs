//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use anyhow::anyhow;
use refjson::{
    DocumentCodec, DocumentStore, MemoryDocumentStore, MemorySchemaRegistry, ObjectId, Record,
};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Schemas used across the integration tests.
pub const SCHEMAS: &str = r#"
documents:
  - name: SelfReference
    fields:
      - name: name
        kind: string
      - name: reference
        kind: { reference: { target: SelfReference } }
  - name: TestDocument
    fields:
      - name: title
        kind: string
      - name: references
        kind: { list: { reference: { target: SelfReference } } }
  - name: Comment
    fields:
      - name: text
        kind: string
      - name: author
        db_field: author_id
        kind: { reference: { target: Person, autosave: true } }
  - name: Person
    fields:
      - name: name
        kind: string
      - name: mentor
        kind: { reference: { target: Person, autosave: true } }
  - name: Loose
    dynamic: true
    fields:
      - name: label
        kind: string
"#;

pub fn registry() -> MemorySchemaRegistry {
    MemorySchemaRegistry::from_yaml_str(SCHEMAS).unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("refjson=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// MemoryDocumentStore that records every call made through the trait.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryDocumentStore,
    lookups: Mutex<HashMap<ObjectId, usize>>,
    saves: Mutex<Vec<Record>>,
}

impl RecordingStore {
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            inner: MemoryDocumentStore::with_records(records).unwrap(),
            ..Self::default()
        }
    }

    pub fn lookups_of(&self, id: &ObjectId) -> usize {
        self.lookups.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn total_lookups(&self) -> usize {
        self.lookups.lock().unwrap().values().sum()
    }

    /// Records passed to `save`, in call order.
    pub fn saves(&self) -> Vec<Record> {
        self.saves.lock().unwrap().clone()
    }
}

impl DocumentStore for RecordingStore {
    fn find_by_id(&self, doc_type: &str, id: &ObjectId) -> anyhow::Result<Option<Record>> {
        *self.lookups.lock().unwrap().entry(*id).or_default() += 1;
        self.inner.find_by_id(doc_type, id)
    }

    fn save(&self, record: &Record) -> anyhow::Result<ObjectId> {
        self.saves.lock().unwrap().push(record.clone());
        self.inner.save(record)
    }
}

/// Store whose writes always fail.
pub struct ReadOnlyStore;

impl DocumentStore for ReadOnlyStore {
    fn find_by_id(&self, _: &str, _: &ObjectId) -> anyhow::Result<Option<Record>> {
        Ok(None)
    }

    fn save(&self, _: &Record) -> anyhow::Result<ObjectId> {
        Err(anyhow!("store is read-only"))
    }
}

pub fn codec_with(store: Arc<dyn DocumentStore>) -> DocumentCodec {
    DocumentCodec::new(Arc::new(registry()), store)
}

/// Depths (root = 0) at which an object with `"name": name` appears.
pub fn rendered_depths(json: &Json, name: &str) -> Vec<usize> {
    fn walk(json: &Json, name: &str, depth: usize, out: &mut Vec<usize>) {
        match json {
            Json::Object(map) => {
                if map.get("name").and_then(Json::as_str) == Some(name) {
                    out.push(depth);
                }
                for value in map.values() {
                    walk(value, name, depth + 1, out);
                }
            }
            Json::Array(items) => {
                for item in items {
                    walk(item, name, depth, out);
                }
            }
            _ => {}
        }
    }
    let mut out = Vec::new();
    walk(json, name, 0, &mut out);
    out.sort_unstable();
    out
}
