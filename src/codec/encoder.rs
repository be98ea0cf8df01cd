//! Forward pass: record tree to JSON tree.
//!
//! Reference-following is bounded by depth, not by cycle detection. Each
//! followed hop hands the child a copy of the context with `current_depth`
//! incremented; once `current_depth` reaches `max_depth` the reference is
//! written as a bare identifier. A record reachable along several branches
//! is rendered once per branch, at whatever distance each branch reaches it,
//! because the output is a tree rather than the underlying graph. With
//! `max_depth = 3` and a reference cycle `A -> B -> C -> A`, encoding a list
//! `[A, B, C]` renders each of the three records exactly three times, once at
//! each depth 1, 2 and 3.
//!
//! Embedded documents and lists never consume depth budget.

use crate::codec::reference::ReferenceField;
use crate::codec::scalar::encode_scalar_at;
use crate::config::{DateFormat, EncodeOptions};
use crate::error::{CodecError, FieldPath, Result};
use crate::schema::{FieldKind, ReferenceSpec, SchemaRegistry};
use crate::store::DocumentStore;
use crate::types::{ObjectId, Record, Reference, Scalar, ScalarKind, Value};
use serde_json::{Map, Value as Json};

/// Per-call state threaded through one encode. Passed by value; never shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingContext {
    pub max_depth: u32,
    /// 0 for the root record, +1 per followed reference.
    pub current_depth: u32,
    pub follow_reference: bool,
    pub use_db_field: bool,
    pub date_format: DateFormat,
}

impl EncodingContext {
    pub fn root(options: &EncodeOptions) -> Self {
        Self {
            max_depth: options.max_depth,
            current_depth: 0,
            follow_reference: options.follow_reference,
            use_db_field: options.use_db_field,
            date_format: options.date_format,
        }
    }

    /// Whether a reference at this depth is rendered in full.
    pub fn may_follow(&self, spec: &ReferenceSpec) -> bool {
        (self.follow_reference || spec.always_follow) && self.current_depth < self.max_depth
    }

    /// Context for the record on the far side of a followed reference.
    pub fn descend(self) -> Self {
        Self {
            current_depth: self.current_depth + 1,
            ..self
        }
    }

    pub fn id_key(&self) -> &'static str {
        if self.use_db_field {
            "_id"
        } else {
            "id"
        }
    }
}

pub struct Encoder<'a> {
    registry: &'a dyn SchemaRegistry,
    store: &'a dyn DocumentStore,
    options: EncodeOptions,
}

impl<'a> Encoder<'a> {
    pub fn new(
        registry: &'a dyn SchemaRegistry,
        store: &'a dyn DocumentStore,
        options: EncodeOptions,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            registry,
            store,
            options,
        })
    }

    /// Encode a root record at depth 0.
    pub fn encode(&self, record: &Record) -> Result<Json> {
        self.encode_record(
            record,
            EncodingContext::root(&self.options),
            &FieldPath::root(),
        )
    }

    /// Encode one record: identifier, declared fields in schema order, then
    /// undeclared fields of dynamic documents.
    pub fn encode_record(
        &self,
        record: &Record,
        ctx: EncodingContext,
        path: &FieldPath,
    ) -> Result<Json> {
        let schema = self
            .registry
            .schema(record.doc_type())
            .ok_or_else(|| CodecError::UnknownDocumentType(record.doc_type().to_string()))?;

        let mut out = Map::new();
        if let Some(id) = record.id() {
            out.insert(ctx.id_key().to_string(), self.encode_id(id, ctx, path)?);
        }

        for descriptor in &schema.fields {
            if let Some(value) = record.get(&descriptor.name) {
                let json = self.encode_value(
                    value,
                    &descriptor.kind,
                    ctx,
                    &path.field(&descriptor.name),
                )?;
                out.insert(descriptor.wire_name(ctx.use_db_field).to_string(), json);
            }
        }

        for (name, value) in record.fields() {
            if schema.descriptor(name).is_some() {
                continue;
            }
            if !schema.dynamic {
                return Err(CodecError::UndeclaredField {
                    path: path.clone(),
                    doc_type: schema.name.clone(),
                    field: name.clone(),
                });
            }
            let field_path = path.field(name);
            schema.check_extra_key(name, &field_path)?;
            let json = self.encode_dynamic(value, &schema.name, ctx, &field_path)?;
            out.insert(name.clone(), json);
        }

        Ok(Json::Object(out))
    }

    fn encode_value(
        &self,
        value: &Value,
        kind: &FieldKind,
        ctx: EncodingContext,
        path: &FieldPath,
    ) -> Result<Json> {
        match (kind, value) {
            (_, Value::Scalar(Scalar::Null)) => Ok(Json::Null),
            (FieldKind::Scalar(k), Value::Scalar(s)) => {
                encode_scalar_at(s, *k, ctx.date_format, path)
            }
            (FieldKind::List(inner), Value::List(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.encode_value(item, inner, ctx, &path.index(i)))
                .collect::<Result<Vec<_>>>()
                .map(Json::Array),
            (FieldKind::Embedded(target), Value::Embedded(record)) => {
                if record.doc_type() != target {
                    return Err(CodecError::mismatch(
                        path,
                        kind.to_string(),
                        value.shape(),
                    ));
                }
                self.encode_record(record, ctx, path)
            }
            (FieldKind::Reference(spec), Value::Reference(reference)) => {
                self.encode_reference(reference, spec, ctx, path)
            }
            (kind, value) => Err(CodecError::mismatch(path, kind.to_string(), value.shape())),
        }
    }

    fn encode_reference(
        &self,
        reference: &Reference,
        spec: &ReferenceSpec,
        ctx: EncodingContext,
        path: &FieldPath,
    ) -> Result<Json> {
        let field = ReferenceField::new(spec, self.store);
        let wire_id = field.to_wire_id(reference, path)?;

        if ctx.may_follow(spec) {
            if let Some(record) = field.resolve(reference, path)? {
                if record.doc_type() != spec.target {
                    return Err(CodecError::mismatch(
                        path,
                        format!("reference({})", spec.target),
                        format!("reference({})", record.doc_type()),
                    ));
                }
                let child = ctx.descend();
                tracing::debug!(
                    doc_type = %spec.target,
                    depth = child.current_depth,
                    %path,
                    "following reference"
                );
                return self.encode_record(&record, child, path);
            }
            tracing::warn!(
                doc_type = %spec.target,
                %path,
                "unresolvable reference rendered as bare id"
            );
        } else if ctx.follow_reference || spec.always_follow {
            tracing::debug!(
                doc_type = %spec.target,
                depth = ctx.current_depth,
                max_depth = ctx.max_depth,
                %path,
                "depth budget exhausted, rendering bare id"
            );
        }

        match (wire_id, reference) {
            (Some(id), _) => self.encode_id(id, ctx, path),
            // id_check is off and the referent is unsaved: render it in place.
            (None, Reference::Resolved(record)) => self.encode_record(record, ctx, path),
            (None, Reference::Id(id)) => self.encode_id(*id, ctx, path),
        }
    }

    /// Undeclared value of a dynamic `owner` record, encoded by its own shape.
    fn encode_dynamic(
        &self,
        value: &Value,
        owner: &str,
        ctx: EncodingContext,
        path: &FieldPath,
    ) -> Result<Json> {
        match value {
            Value::Scalar(s) => encode_scalar_at(s, s.kind(), ctx.date_format, path),
            Value::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.encode_dynamic(item, owner, ctx, &path.index(i)))
                .collect::<Result<Vec<_>>>()
                .map(Json::Array),
            Value::Map(entries) => {
                let mut out = Map::new();
                for (key, item) in entries {
                    let key_path = path.field(key);
                    // `$` keys would read back as a tagged scalar
                    if key.starts_with('$') {
                        return Err(CodecError::ReservedField {
                            path: key_path,
                            doc_type: owner.to_string(),
                            field: key.clone(),
                        });
                    }
                    out.insert(key.clone(), self.encode_dynamic(item, owner, ctx, &key_path)?);
                }
                Ok(Json::Object(out))
            }
            Value::Embedded(record) => self.encode_record(record, ctx, path),
            Value::Reference(reference) => match reference.id() {
                Some(id) => self.encode_id(id, ctx, path),
                None => Err(CodecError::MissingIdentifier {
                    path: path.clone(),
                    doc_type: reference
                        .as_record()
                        .map(|r| r.doc_type().to_string())
                        .unwrap_or_default(),
                }),
            },
        }
    }

    fn encode_id(&self, id: ObjectId, ctx: EncodingContext, path: &FieldPath) -> Result<Json> {
        encode_scalar_at(&Scalar::ObjectId(id), ScalarKind::ObjectId, ctx.date_format, path)
    }
}
