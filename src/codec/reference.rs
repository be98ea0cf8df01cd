//! Reference field adapter: the field-level contract both passes use at
//! reference boundaries.

use crate::error::{CodecError, FieldPath, Result};
use crate::schema::ReferenceSpec;
use crate::store::DocumentStore;
use crate::types::{ObjectId, Record, Reference};
use std::borrow::Cow;

pub struct ReferenceField<'a> {
    spec: &'a ReferenceSpec,
    store: &'a dyn DocumentStore,
}

impl<'a> ReferenceField<'a> {
    pub fn new(spec: &'a ReferenceSpec, store: &'a dyn DocumentStore) -> Self {
        Self { spec, store }
    }

    pub fn spec(&self) -> &ReferenceSpec {
        self.spec
    }

    /// Identifier to write when the reference is not followed.
    ///
    /// An unsaved referent is `MissingIdentifier` under `id_check`; without
    /// it the result is `None` and the caller renders the record inline.
    pub fn to_wire_id(&self, reference: &Reference, path: &FieldPath) -> Result<Option<ObjectId>> {
        match reference.id() {
            Some(id) => Ok(Some(id)),
            None if self.spec.id_check => Err(CodecError::MissingIdentifier {
                path: path.clone(),
                doc_type: self.spec.target.clone(),
            }),
            None => Ok(None),
        }
    }

    /// The full referent: the attached record if present, otherwise a store
    /// lookup by identifier.
    ///
    /// A missing referent is `UnresolvedReference` under `id_check`, `None`
    /// without it.
    pub fn resolve<'r>(
        &self,
        reference: &'r Reference,
        path: &FieldPath,
    ) -> Result<Option<Cow<'r, Record>>> {
        let id = match reference {
            Reference::Resolved(record) => return Ok(Some(Cow::Borrowed(&**record))),
            Reference::Id(id) => *id,
        };
        tracing::trace!(doc_type = %self.spec.target, %id, "find_by_id");
        let found = self
            .store
            .find_by_id(&self.spec.target, &id)
            .map_err(|source| CodecError::LookupFailure {
                path: path.clone(),
                doc_type: self.spec.target.clone(),
                id,
                source,
            })?;
        match found {
            Some(record) => Ok(Some(Cow::Owned(record))),
            None if self.spec.id_check => Err(CodecError::UnresolvedReference {
                path: path.clone(),
                doc_type: self.spec.target.clone(),
                id,
            }),
            None => Ok(None),
        }
    }

    /// Finish a decoded reference, persisting a nested referent under
    /// `autosave`. The identifier returned by the store is written back.
    pub fn on_decode(&self, reference: Reference, path: &FieldPath) -> Result<Reference> {
        match reference {
            Reference::Resolved(mut record) if self.spec.autosave => {
                let id = self
                    .store
                    .save(&record)
                    .map_err(|source| CodecError::PersistFailure {
                        path: path.clone(),
                        doc_type: self.spec.target.clone(),
                        source,
                    })?;
                tracing::debug!(doc_type = %self.spec.target, %id, %path, "autosaved referenced record");
                record.set_id(id);
                Ok(Reference::Resolved(record))
            }
            other => Ok(other),
        }
    }
}
