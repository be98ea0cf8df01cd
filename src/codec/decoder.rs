//! Reverse pass: JSON tree to record tree.
//!
//! Children are decoded before their parent is built, so a nested record is
//! complete (and autosaved, when its field asks for it) before it is attached.
//! Every object node first goes through [`decode_scalar`]; a matched node is a
//! leaf and is not descended into.

use crate::codec::reference::ReferenceField;
use crate::codec::scalar::{coerce, decode_scalar, Decoded};
use crate::config::DecodeOptions;
use crate::error::{CodecError, FieldPath, Result};
use crate::schema::{FieldKind, ReferenceSpec, SchemaRegistry};
use crate::store::DocumentStore;
use crate::types::{ObjectId, Record, Reference, Scalar, Value};
use serde_json::Value as Json;
use std::collections::BTreeMap;

#[derive(Clone, Copy)]
pub struct Decoder<'a> {
    registry: &'a dyn SchemaRegistry,
    store: &'a dyn DocumentStore,
    options: DecodeOptions,
}

impl<'a> Decoder<'a> {
    pub fn new(
        registry: &'a dyn SchemaRegistry,
        store: &'a dyn DocumentStore,
        options: DecodeOptions,
    ) -> Self {
        Self {
            registry,
            store,
            options,
        }
    }

    /// Decode a whole JSON tree as a record of `target`.
    pub fn decode(&self, json: Json, target: &str) -> Result<Record> {
        self.decode_record(json, target, &FieldPath::root())
    }

    fn decode_record(&self, json: Json, target: &str, path: &FieldPath) -> Result<Record> {
        let schema = self
            .registry
            .schema(target)
            .ok_or_else(|| CodecError::UnknownDocumentType(target.to_string()))?;
        let map = match json {
            Json::Object(map) => map,
            other => {
                return Err(CodecError::mismatch(
                    path,
                    format!("document {target}"),
                    json_shape(&other),
                ))
            }
        };

        let preferred_id_key = if self.options.use_db_field { "_id" } else { "id" };
        let mut record = Record::new(target);
        let mut id_from_preferred = false;

        for (key, value) in map {
            if key == "_id" || key == "id" {
                let preferred = key == preferred_id_key;
                if id_from_preferred && !preferred {
                    continue;
                }
                if let Some(id) = decode_id(value, &path.field(&key))? {
                    record.set_id(id);
                    id_from_preferred = preferred;
                }
                continue;
            }

            if let Some(descriptor) = schema.descriptor_for_key(&key) {
                let field_path = path.field(&descriptor.name);
                let value = self.decode_value(value, &descriptor.kind, &field_path)?;
                record.set(descriptor.name.clone(), value);
            } else if schema.dynamic {
                let field_path = path.field(&key);
                schema.check_extra_key(&key, &field_path)?;
                let value = decode_dynamic(value, &schema.name, &field_path)?;
                record.set(key, value);
            } else {
                return Err(CodecError::UndeclaredField {
                    path: path.clone(),
                    doc_type: schema.name.clone(),
                    field: key,
                });
            }
        }

        Ok(record)
    }

    fn decode_value(&self, json: Json, kind: &FieldKind, path: &FieldPath) -> Result<Value> {
        if json.is_null() {
            return Ok(Value::null());
        }
        match kind {
            FieldKind::Scalar(k) => match decode_scalar(&json) {
                Decoded::Matched(s) => Ok(Value::Scalar(coerce(s, *k, path)?)),
                Decoded::Unmatched(j) => Err(CodecError::mismatch(path, k.as_str(), json_shape(j))),
            },
            FieldKind::List(inner) => match json {
                Json::Array(items) => items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| self.decode_value(item, inner, &path.index(i)))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::List),
                other => Err(CodecError::mismatch(path, kind.to_string(), json_shape(&other))),
            },
            FieldKind::Embedded(target) => {
                if let Some(s) = decode_scalar(&json).into_scalar() {
                    return Err(CodecError::mismatch(path, kind.to_string(), s.kind().as_str()));
                }
                self.decode_record(json, target, path).map(Value::Embedded)
            }
            FieldKind::Reference(spec) => self.decode_reference(json, spec, path).map(Value::Reference),
        }
    }

    /// A string or tagged objectId is a bare pointer; any other object is the
    /// referenced record itself, decoded then handed to `on_decode`.
    fn decode_reference(&self, json: Json, spec: &ReferenceSpec, path: &FieldPath) -> Result<Reference> {
        let expected = || format!("reference({})", spec.target);
        let reference = match json {
            Json::String(s) => ObjectId::parse_str(&s)
                .map(Reference::Id)
                .map_err(|_| CodecError::mismatch(path, expected(), "string"))?,
            obj @ Json::Object(_) => match decode_scalar(&obj).into_scalar() {
                Some(Scalar::ObjectId(id)) => Reference::Id(id),
                Some(other) => {
                    return Err(CodecError::mismatch(path, expected(), other.kind().as_str()))
                }
                None => Reference::from(self.decode_record(obj, &spec.target, path)?),
            },
            other => return Err(CodecError::mismatch(path, expected(), json_shape(&other))),
        };
        ReferenceField::new(spec, self.store).on_decode(reference, path)
    }
}

/// Decoder bound to one target type; invoked once per top-level JSON object.
pub struct ObjectHook<'a> {
    decoder: Decoder<'a>,
    target: String,
}

impl<'a> ObjectHook<'a> {
    pub fn new(decoder: Decoder<'a>, target: impl Into<String>) -> Self {
        Self {
            decoder,
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn call(&self, json: Json) -> Result<Record> {
        self.decoder.decode(json, &self.target)
    }
}

fn decode_id(json: Json, path: &FieldPath) -> Result<Option<ObjectId>> {
    match decode_scalar(&json) {
        Decoded::Matched(Scalar::Null) => Ok(None),
        Decoded::Matched(Scalar::ObjectId(id)) => Ok(Some(id)),
        Decoded::Matched(Scalar::String(s)) => ObjectId::parse_str(&s)
            .map(Some)
            .map_err(|_| CodecError::mismatch(path, "objectId", "string")),
        Decoded::Matched(other) => Err(CodecError::mismatch(path, "objectId", other.kind().as_str())),
        Decoded::Unmatched(j) => Err(CodecError::mismatch(path, "objectId", json_shape(j))),
    }
}

/// Undeclared values of a dynamic `owner` record keep their natural shape;
/// plain objects become maps.
fn decode_dynamic(json: Json, owner: &str, path: &FieldPath) -> Result<Value> {
    if let Some(s) = decode_scalar(&json).into_scalar() {
        return Ok(Value::Scalar(s));
    }
    match json {
        Json::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| decode_dynamic(item, owner, &path.index(i)))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        Json::Object(map) => {
            let mut entries = BTreeMap::new();
            for (key, item) in map {
                let key_path = path.field(&key);
                if key.starts_with('$') {
                    return Err(CodecError::ReservedField {
                        path: key_path,
                        doc_type: owner.to_string(),
                        field: key,
                    });
                }
                let value = decode_dynamic(item, owner, &key_path)?;
                entries.insert(key, value);
            }
            Ok(Value::Map(entries))
        }
        // decode_scalar matches every other shape
        _ => Ok(Value::null()),
    }
}

fn json_shape(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
