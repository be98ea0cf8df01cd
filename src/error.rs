//! Typed error model for the encode and decode passes.
//!
//! Every failure is terminal for the top-level call that raised it: no partial
//! JSON tree or half-built record is ever returned. Per-field variants carry
//! the [`FieldPath`] from the root record to the offending value.

use std::fmt;

use thiserror::Error;

use crate::types::ObjectId;

pub type Result<T> = std::result::Result<T, CodecError>;

// ---------------------------------------------------------------------------
// FieldPath
// ---------------------------------------------------------------------------

/// One step from a parent value to a child value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

/// Location of a value inside the record tree, e.g. `references[1].reference`.
///
/// Paths are extended by value on each descent so sibling branches never
/// share a path buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn field(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Field(name.into()));
        Self { segments }
    }

    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Index(index));
        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("<root>");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Field(name) if i == 0 => f.write_str(name)?,
                PathSegment::Field(name) => write!(f, ".{name}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CodecError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("{path}: unsupported scalar kind `{kind}`")]
    UnsupportedScalarKind { path: FieldPath, kind: String },

    #[error("{path}: referenced {doc_type} record has no identifier")]
    MissingIdentifier { path: FieldPath, doc_type: String },

    #[error("{path}: {doc_type} {id} not found")]
    UnresolvedReference {
        path: FieldPath,
        doc_type: String,
        id: ObjectId,
    },

    #[error("{path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: FieldPath,
        expected: String,
        found: String,
    },

    #[error("{path}: failed to persist {doc_type}: {source}")]
    PersistFailure {
        path: FieldPath,
        doc_type: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{path}: lookup of {doc_type} {id} failed: {source}")]
    LookupFailure {
        path: FieldPath,
        doc_type: String,
        id: ObjectId,
        #[source]
        source: anyhow::Error,
    },

    #[error("{path}: field `{field}` is not declared on {doc_type}")]
    UndeclaredField {
        path: FieldPath,
        doc_type: String,
        field: String,
    },

    #[error("{path}: field `{field}` on {doc_type} uses a reserved wire key")]
    ReservedField {
        path: FieldPath,
        doc_type: String,
        field: String,
    },

    #[error("unknown document type `{0}`")]
    UnknownDocumentType(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(#[from] serde_yaml::Error),
}

impl CodecError {
    /// Path of the offending value, for the variants raised while walking a tree.
    pub fn path(&self) -> Option<&FieldPath> {
        match self {
            Self::UnsupportedScalarKind { path, .. }
            | Self::MissingIdentifier { path, .. }
            | Self::UnresolvedReference { path, .. }
            | Self::TypeMismatch { path, .. }
            | Self::PersistFailure { path, .. }
            | Self::LookupFailure { path, .. }
            | Self::UndeclaredField { path, .. }
            | Self::ReservedField { path, .. } => Some(path),
            Self::UnknownDocumentType(_)
            | Self::InvalidConfiguration(_)
            | Self::Json(_)
            | Self::Config(_) => None,
        }
    }

    pub(crate) fn mismatch(
        path: &FieldPath,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            path: path.clone(),
            expected: expected.into(),
            found: found.into(),
        }
    }
}
