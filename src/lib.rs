//! refjson: reference-following JSON codec for typed document records
//!
//! Records are typed field maps described by a schema registry. Reference
//! fields point at other records by identifier; the encoder can follow them
//! through a document store and render the referent in place, bounded by a
//! per-call depth budget. The decoder rebuilds records bottom-up and can
//! persist nested referents as it goes.
//!
//! - Scalar codec: tagged JSON objects for non-native scalars
//! - Encoder: record tree -> JSON, depth-bounded reference following
//! - Decoder: JSON -> record tree, with optional autosave
//! - YAML/env configuration and YAML schema loading
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use refjson::{
//!     DocumentCodec, DocumentSchema, EncodeOptions, FieldKind, MemoryDocumentStore,
//!     MemorySchemaRegistry, Record, ScalarKind,
//! };
//!
//! let registry = MemorySchemaRegistry::new()
//!     .with(DocumentSchema::new("Note").field("body", FieldKind::Scalar(ScalarKind::String)))
//!     .unwrap();
//! let codec = DocumentCodec::new(Arc::new(registry), Arc::new(MemoryDocumentStore::new()));
//!
//! let note = Record::new("Note").with("body", "hello");
//! let text = codec.to_json_string(&note, &EncodeOptions::default()).unwrap();
//! assert_eq!(codec.from_json(&text, "Note").unwrap(), note);
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod schema;
pub mod store;
pub mod types;

pub use codec::{DocumentCodec, EncodingContext, ObjectHook};
pub use config::{DateFormat, DecodeOptions, EncodeOptions, MAX_DEPTH_CEILING};
pub use error::{CodecError, FieldPath, PathSegment, Result};
pub use schema::{
    DocumentSchema, FieldDescriptor, FieldKind, MemorySchemaRegistry, ReferenceSpec,
    SchemaRegistry,
};
pub use store::{DocumentStore, MemoryDocumentStore};
pub use types::{Geometry, ObjectId, Record, Reference, RegexPattern, Scalar, ScalarKind, Value};
