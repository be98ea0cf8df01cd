//! Record <-> JSON pipelines.
//!
//! [`DocumentCodec`] bundles a schema registry and a document store and
//! exposes both passes. Each call builds its own [`Encoder`] or [`Decoder`],
//! so one codec can serve concurrent callers provided the store is
//! thread-safe.

pub mod decoder;
pub mod encoder;
pub mod reference;
pub mod scalar;

pub use decoder::{Decoder, ObjectHook};
pub use encoder::{Encoder, EncodingContext};
pub use reference::ReferenceField;
pub use scalar::{coerce, decode_scalar, encode_scalar, Decoded, TYPE_KEY};

use crate::config::{DecodeOptions, EncodeOptions};
use crate::error::Result;
use crate::schema::SchemaRegistry;
use crate::store::DocumentStore;
use crate::types::Record;
use serde_json::Value as Json;
use std::sync::Arc;

#[derive(Clone)]
pub struct DocumentCodec {
    registry: Arc<dyn SchemaRegistry>,
    store: Arc<dyn DocumentStore>,
    decode_options: DecodeOptions,
}

impl DocumentCodec {
    pub fn new(registry: Arc<dyn SchemaRegistry>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            registry,
            store,
            decode_options: DecodeOptions::default(),
        }
    }

    pub fn with_decode_options(mut self, options: DecodeOptions) -> Self {
        self.decode_options = options;
        self
    }

    pub fn registry(&self) -> &dyn SchemaRegistry {
        self.registry.as_ref()
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Encode `record` as a JSON tree. Fails atomically: no partial output.
    pub fn to_json(&self, record: &Record, options: &EncodeOptions) -> Result<Json> {
        Encoder::new(self.registry(), self.store(), *options)?.encode(record)
    }

    pub fn to_json_string(&self, record: &Record, options: &EncodeOptions) -> Result<String> {
        let json = self.to_json(record, options)?;
        Ok(serde_json::to_string(&json)?)
    }

    /// Parse JSON text and decode it as a record of `target`.
    pub fn from_json(&self, text: &str, target: &str) -> Result<Record> {
        let json: Json = serde_json::from_str(text)?;
        self.decode(json, target)
    }

    pub fn decode(&self, json: Json, target: &str) -> Result<Record> {
        self.decoder().decode(json, target)
    }

    pub fn make_object_hook(&self, target: impl Into<String>) -> ObjectHook<'_> {
        ObjectHook::new(self.decoder(), target)
    }

    fn decoder(&self) -> Decoder<'_> {
        Decoder::new(self.registry(), self.store(), self.decode_options)
    }
}
