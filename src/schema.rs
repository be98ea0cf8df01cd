//! Field descriptors and the schema registry.
//!
//! Field kinds are a closed variant resolved once when a schema is
//! registered; the encoder and decoder switch on the tag and never inspect
//! runtime types.

use crate::error::{CodecError, FieldPath, Result};
use crate::types::ScalarKind;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

/// Reserved key names a declared field may not use.
const RESERVED_KEYS: [&str; 2] = ["id", "_id"];

/// Whether `key` is an identifier key or carries the `$` prefix of the
/// tagged-scalar discriminator.
pub(crate) fn is_reserved_key(key: &str) -> bool {
    key.starts_with('$') || RESERVED_KEYS.contains(&key)
}

// ── Field kinds ──

/// Adapter configuration for a reference field. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSpec {
    pub target: String,
    /// Unsaved referents are a hard error when serialized by id.
    pub id_check: bool,
    /// Persist a decoded nested referent before attaching it.
    pub autosave: bool,
    /// Follow this field even when the call does not ask to follow references.
    pub always_follow: bool,
}

impl ReferenceSpec {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            id_check: true,
            autosave: false,
            always_follow: false,
        }
    }

    pub fn with_id_check(mut self, id_check: bool) -> Self {
        self.id_check = id_check;
        self
    }

    pub fn with_autosave(mut self, autosave: bool) -> Self {
        self.autosave = autosave;
        self
    }

    pub fn with_always_follow(mut self, always_follow: bool) -> Self {
        self.always_follow = always_follow;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(ScalarKind),
    Reference(ReferenceSpec),
    List(Box<FieldKind>),
    Embedded(String),
}

impl FieldKind {
    pub fn list_of(inner: FieldKind) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn reference(target: impl Into<String>) -> Self {
        Self::Reference(ReferenceSpec::new(target))
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(kind) => write!(f, "{kind}"),
            Self::Reference(spec) => write!(f, "reference({})", spec.target),
            Self::List(inner) => write!(f, "list({inner})"),
            Self::Embedded(target) => write!(f, "embedded({target})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    /// Storage-side name, used on the wire when `use_db_field` is set.
    pub db_field: Option<String>,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            db_field: None,
            kind,
        }
    }

    pub fn with_db_field(mut self, db_field: impl Into<String>) -> Self {
        self.db_field = Some(db_field.into());
        self
    }

    pub fn wire_name(&self, use_db_field: bool) -> &str {
        match (&self.db_field, use_db_field) {
            (Some(db_field), true) => db_field,
            _ => &self.name,
        }
    }

    /// Whether a wire key names this field under either convention.
    pub fn matches_key(&self, key: &str) -> bool {
        self.name == key || self.db_field.as_deref() == Some(key)
    }
}

/// Declared shape of one document type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSchema {
    pub name: String,
    /// Undeclared fields are kept instead of rejected.
    pub dynamic: bool,
    pub fields: Vec<FieldDescriptor>,
}

impl DocumentSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dynamic: false,
            fields: Vec::new(),
        }
    }

    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor::new(name, kind));
        self
    }

    pub fn with_descriptor(mut self, descriptor: FieldDescriptor) -> Self {
        self.fields.push(descriptor);
        self
    }

    pub fn descriptor(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|d| d.name == name)
    }

    pub fn descriptor_for_key(&self, key: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|d| d.matches_key(key))
    }

    /// Check an undeclared key of a dynamic record. It may not be reserved or
    /// shadow a declared field's wire name.
    pub(crate) fn check_extra_key(&self, key: &str, path: &FieldPath) -> Result<()> {
        if is_reserved_key(key) || self.descriptor_for_key(key).is_some() {
            return Err(CodecError::ReservedField {
                path: path.clone(),
                doc_type: self.name.clone(),
                field: key.to_string(),
            });
        }
        Ok(())
    }

    fn check(&self) -> Result<()> {
        let mut seen: Vec<&str> = Vec::new();
        for d in &self.fields {
            let names = std::iter::once(d.name.as_str()).chain(d.db_field.as_deref());
            for n in names {
                if n.is_empty() || is_reserved_key(n) {
                    return Err(CodecError::InvalidConfiguration(format!(
                        "{}: field name `{n}` is reserved",
                        self.name
                    )));
                }
                if seen.contains(&n) {
                    return Err(CodecError::InvalidConfiguration(format!(
                        "{}: duplicate field name `{n}`",
                        self.name
                    )));
                }
                seen.push(n);
            }
        }
        Ok(())
    }
}

// ── Registry ──

/// Read-only lookup of document schemas by type name.
pub trait SchemaRegistry: Send + Sync {
    fn schema(&self, doc_type: &str) -> Option<&DocumentSchema>;

    /// Declared fields of `doc_type`, in declaration order.
    fn fields_of(&self, doc_type: &str) -> Option<&[FieldDescriptor]> {
        self.schema(doc_type).map(|s| s.fields.as_slice())
    }
}

/// In-memory registry, populated in code or from YAML.
#[derive(Debug, Clone, Default)]
pub struct MemorySchemaRegistry {
    schemas: HashMap<String, DocumentSchema>,
}

// ── YAML format for deserialization ──

#[derive(Debug, Deserialize)]
struct RegistryYaml {
    #[serde(default)]
    documents: Vec<DocumentYaml>,
}

#[derive(Debug, Deserialize)]
struct DocumentYaml {
    name: String,
    #[serde(default)]
    dynamic: bool,
    #[serde(default)]
    fields: Vec<FieldYaml>,
}

#[derive(Debug, Deserialize)]
struct FieldYaml {
    name: String,
    #[serde(default)]
    db_field: Option<String>,
    kind: KindYaml,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum KindYaml {
    Scalar(String),
    Compound(CompoundKindYaml),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum CompoundKindYaml {
    Reference(ReferenceYaml),
    List(Box<KindYaml>),
    Embedded(String),
}

#[derive(Debug, Deserialize)]
struct ReferenceYaml {
    target: String,
    #[serde(default = "default_true")]
    id_check: bool,
    #[serde(default)]
    autosave: bool,
    #[serde(default)]
    always_follow: bool,
}

fn default_true() -> bool {
    true
}

impl KindYaml {
    fn into_kind(self, path: &FieldPath) -> Result<FieldKind> {
        match self {
            KindYaml::Scalar(name) => ScalarKind::parse(&name).map(FieldKind::Scalar).ok_or(
                CodecError::UnsupportedScalarKind {
                    path: path.clone(),
                    kind: name,
                },
            ),
            KindYaml::Compound(CompoundKindYaml::Reference(r)) => {
                Ok(FieldKind::Reference(ReferenceSpec {
                    target: r.target,
                    id_check: r.id_check,
                    autosave: r.autosave,
                    always_follow: r.always_follow,
                }))
            }
            KindYaml::Compound(CompoundKindYaml::List(inner)) => {
                Ok(FieldKind::list_of(inner.into_kind(path)?))
            }
            KindYaml::Compound(CompoundKindYaml::Embedded(target)) => {
                Ok(FieldKind::Embedded(target))
            }
        }
    }
}

impl MemorySchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema, replacing any existing one of the same name.
    pub fn register(&mut self, schema: DocumentSchema) -> Result<()> {
        schema.check()?;
        self.schemas.insert(schema.name.clone(), schema);
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, schema: DocumentSchema) -> Result<Self> {
        self.register(schema)?;
        Ok(self)
    }

    /// Check that every reference and embedded target is registered.
    pub fn validate(&self) -> Result<()> {
        fn targets(kind: &FieldKind) -> Option<&str> {
            match kind {
                FieldKind::Scalar(_) => None,
                FieldKind::Reference(spec) => Some(&spec.target),
                FieldKind::Embedded(target) => Some(target),
                FieldKind::List(inner) => targets(inner),
            }
        }
        for schema in self.schemas.values() {
            for d in &schema.fields {
                if let Some(target) = targets(&d.kind) {
                    if !self.schemas.contains_key(target) {
                        return Err(CodecError::InvalidConfiguration(format!(
                            "{}.{}: unknown target type `{target}`",
                            schema.name, d.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Parse a registry from YAML and validate its cross-references.
    ///
    /// ```yaml
    /// documents:
    ///   - name: Article
    ///     fields:
    ///       - name: title
    ///         kind: string
    ///       - name: author
    ///         db_field: author_id
    ///         kind: { reference: { target: User, autosave: true } }
    ///       - name: tags
    ///         kind: { list: string }
    ///   - name: User
    ///     dynamic: true
    /// ```
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw: RegistryYaml = serde_yaml::from_str(yaml)?;
        let mut registry = Self::new();
        for doc in raw.documents {
            let mut schema = DocumentSchema::new(doc.name);
            schema.dynamic = doc.dynamic;
            for f in doc.fields {
                let path = FieldPath::root().field(&schema.name).field(&f.name);
                let kind = f.kind.into_kind(&path)?;
                schema.fields.push(FieldDescriptor {
                    name: f.name,
                    db_field: f.db_field,
                    kind,
                });
            }
            registry.register(schema)?;
        }
        registry.validate()?;
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl SchemaRegistry for MemorySchemaRegistry {
    fn schema(&self, doc_type: &str) -> Option<&DocumentSchema> {
        self.schemas.get(doc_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
documents:
  - name: Article
    fields:
      - name: title
        kind: string
      - name: published
        kind: date
      - name: author
        db_field: author_id
        kind: { reference: { target: User, autosave: true } }
      - name: reviewers
        kind: { list: { reference: { target: User, id_check: false } } }
      - name: address
        kind: { embedded: Address }
  - name: User
    dynamic: true
    fields:
      - name: name
        kind: string
  - name: Address
    fields:
      - name: city
        kind: string
"#;

    #[test]
    fn test_from_yaml() {
        let reg = MemorySchemaRegistry::from_yaml_str(YAML).unwrap();
        assert_eq!(reg.len(), 3);

        let article = reg.schema("Article").unwrap();
        assert!(!article.dynamic);
        let names: Vec<_> = article.fields.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            ["title", "published", "author", "reviewers", "address"]
        );

        let author = article.descriptor("author").unwrap();
        assert_eq!(author.wire_name(true), "author_id");
        assert_eq!(author.wire_name(false), "author");
        assert_eq!(
            author.kind,
            FieldKind::Reference(ReferenceSpec::new("User").with_autosave(true))
        );

        let reviewers = article.descriptor("reviewers").unwrap();
        assert_eq!(
            reviewers.kind,
            FieldKind::list_of(FieldKind::Reference(
                ReferenceSpec::new("User").with_id_check(false)
            ))
        );
        assert_eq!(
            article.descriptor("published").unwrap().kind,
            FieldKind::Scalar(ScalarKind::DateTime)
        );
        assert!(reg.schema("User").unwrap().dynamic);
    }

    #[test]
    fn test_unknown_scalar_kind_rejected() {
        let yaml = r#"
documents:
  - name: Thing
    fields:
      - name: shape
        kind: polygon
"#;
        let err = MemorySchemaRegistry::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedScalarKind { ref kind, .. } if kind == "polygon"));
        assert_eq!(err.to_string(), "Thing.shape: unsupported scalar kind `polygon`");
    }

    #[test]
    fn test_unknown_target_rejected() {
        let yaml = r#"
documents:
  - name: Thing
    fields:
      - name: owner
        kind: { reference: { target: Ghost } }
"#;
        let err = MemorySchemaRegistry::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("unknown target type `Ghost`"));
    }

    #[test]
    fn test_reserved_field_names_rejected() {
        let mut reg = MemorySchemaRegistry::new();
        let err = reg
            .register(DocumentSchema::new("T").field("$type", FieldKind::Scalar(ScalarKind::String)))
            .unwrap_err();
        assert!(matches!(err, CodecError::InvalidConfiguration(_)));

        let err = reg
            .register(DocumentSchema::new("T").field("_id", FieldKind::Scalar(ScalarKind::String)))
            .unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn test_duplicate_wire_names_rejected() {
        let schema = DocumentSchema::new("T")
            .field("a", FieldKind::Scalar(ScalarKind::Int))
            .with_descriptor(
                FieldDescriptor::new("b", FieldKind::Scalar(ScalarKind::Int)).with_db_field("a"),
            );
        let err = MemorySchemaRegistry::new().register(schema).unwrap_err();
        assert!(err.to_string().contains("duplicate field name `a`"));
    }

    #[test]
    fn test_fields_of_preserves_order() {
        let reg = MemorySchemaRegistry::new()
            .with(
                DocumentSchema::new("T")
                    .field("z", FieldKind::Scalar(ScalarKind::Int))
                    .field("a", FieldKind::Scalar(ScalarKind::Int)),
            )
            .unwrap();
        let names: Vec<_> = reg
            .fields_of("T")
            .unwrap()
            .iter()
            .map(|d| d.name.clone())
            .collect();
        assert_eq!(names, ["z", "a"]);
        assert!(reg.fields_of("Missing").is_none());
    }

    #[test]
    fn test_kind_display() {
        let kind = FieldKind::list_of(FieldKind::reference("User"));
        assert_eq!(kind.to_string(), "list(reference(User))");
    }
}
