use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use thiserror::Error;
use uuid::Uuid;

// ─── Object identifier ────────────────────────────────────────

/// 12-byte record identifier: 4-byte big-endian epoch seconds, 5 bytes unique
/// to this process, 3-byte big-endian counter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid object id `{0}`: expected 24 hex characters")]
pub struct ParseObjectIdError(pub String);

static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

impl ObjectId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        let secs = Utc::now().timestamp() as u32;
        let unique = PROCESS_UNIQUE.get_or_init(|| {
            let mut bytes = [0u8; 5];
            rand::thread_rng().fill(&mut bytes[..]);
            bytes
        });
        let counter = COUNTER
            .get_or_init(|| AtomicU32::new(rand::thread_rng().gen_range(0..0x00ff_ffff)))
            .fetch_add(1, Ordering::Relaxed)
            & 0x00ff_ffff;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(unique);
        bytes[9..].copy_from_slice(&counter.to_be_bytes()[1..]);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 12] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn parse_str(s: &str) -> Result<Self, ParseObjectIdError> {
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| ParseObjectIdError(s.to_string()))?;
        Ok(Self(bytes))
    }

    /// Creation time encoded in the leading four bytes.
    pub fn timestamp(&self) -> DateTime<Utc> {
        let secs = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        Utc.timestamp_opt(i64::from(secs), 0)
            .single()
            .unwrap_or_default()
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ObjectId {
    type Err = ParseObjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

// ─── Scalar kinds ─────────────────────────────────────────────

/// Closed set of scalar kinds a field may declare.
///
/// The string form is the `$type` discriminator used on the wire and the
/// spelling accepted in YAML schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Null,
    Bool,
    Int,
    Double,
    String,
    ObjectId,
    DateTime,
    Binary,
    Decimal,
    Uuid,
    Regex,
    Geometry,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 12] = [
        Self::Null,
        Self::Bool,
        Self::Int,
        Self::Double,
        Self::String,
        Self::ObjectId,
        Self::DateTime,
        Self::Binary,
        Self::Decimal,
        Self::Uuid,
        Self::Regex,
        Self::Geometry,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Double => "double",
            Self::String => "string",
            Self::ObjectId => "objectId",
            Self::DateTime => "date",
            Self::Binary => "binary",
            Self::Decimal => "decimal",
            Self::Uuid => "uuid",
            Self::Regex => "regex",
            Self::Geometry => "geometry",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// Kinds that JSON can carry without a tagged wrapper.
    pub fn is_json_native(self) -> bool {
        matches!(
            self,
            Self::Null | Self::Bool | Self::Int | Self::Double | Self::String
        )
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Scalars ──────────────────────────────────────────────────

/// GeoJSON-style geometry; positions are `[longitude, latitude]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point([f64; 2]),
    LineString(Vec<[f64; 2]>),
    Polygon(Vec<Vec<[f64; 2]>>),
}

impl Geometry {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Point(_) => "Point",
            Self::LineString(_) => "LineString",
            Self::Polygon(_) => "Polygon",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported regex option `{0}`")]
pub struct InvalidRegexOption(pub char);

/// A stored regular expression with single-letter options (`i`, `m`, `s`, `x`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegexPattern {
    pattern: String,
    options: String,
}

impl RegexPattern {
    pub const OPTIONS: &'static str = "imsx";

    pub fn new(
        pattern: impl Into<String>,
        options: impl Into<String>,
    ) -> Result<Self, InvalidRegexOption> {
        let options = options.into();
        if let Some(bad) = options.chars().find(|c| !Self::OPTIONS.contains(*c)) {
            return Err(InvalidRegexOption(bad));
        }
        Ok(Self {
            pattern: pattern.into(),
            options,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn options(&self) -> &str {
        &self.options
    }

    /// Build a matcher honouring the stored options.
    pub fn compile(&self) -> Result<regex::Regex, regex::Error> {
        regex::RegexBuilder::new(&self.pattern)
            .case_insensitive(self.options.contains('i'))
            .multi_line(self.options.contains('m'))
            .dot_matches_new_line(self.options.contains('s'))
            .ignore_whitespace(self.options.contains('x'))
            .build()
    }
}

/// Engine-internal scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    ObjectId(ObjectId),
    /// UTC instant; the wire keeps millisecond precision.
    DateTime(DateTime<Utc>),
    Binary { subtype: u8, bytes: Vec<u8> },
    Decimal(Decimal),
    Uuid(Uuid),
    Regex(RegexPattern),
    Geometry(Geometry),
}

impl Scalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Self::Null => ScalarKind::Null,
            Self::Bool(_) => ScalarKind::Bool,
            Self::Int(_) => ScalarKind::Int,
            Self::Double(_) => ScalarKind::Double,
            Self::String(_) => ScalarKind::String,
            Self::ObjectId(_) => ScalarKind::ObjectId,
            Self::DateTime(_) => ScalarKind::DateTime,
            Self::Binary { .. } => ScalarKind::Binary,
            Self::Decimal(_) => ScalarKind::Decimal,
            Self::Uuid(_) => ScalarKind::Uuid,
            Self::Regex(_) => ScalarKind::Regex,
            Self::Geometry(_) => ScalarKind::Geometry,
        }
    }
}

// ─── Records and values ───────────────────────────────────────

/// A reference field's payload: a bare pointer, or the referenced record itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    Id(ObjectId),
    Resolved(Box<Record>),
}

impl Reference {
    /// Identifier of the referent, if it has one.
    pub fn id(&self) -> Option<ObjectId> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Resolved(record) => record.id(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Id(_) => None,
            Self::Resolved(record) => Some(record),
        }
    }
}

impl From<Record> for Reference {
    fn from(record: Record) -> Self {
        Self::Resolved(Box::new(record))
    }
}

/// Value held by one record field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    List(Vec<Value>),
    Embedded(Record),
    Reference(Reference),
    /// Plain nested object with no declared schema (dynamic fields only).
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn null() -> Self {
        Self::Scalar(Scalar::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Scalar(Scalar::Null))
    }

    pub fn reference_to(id: ObjectId) -> Self {
        Self::Reference(Reference::Id(id))
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Self::Reference(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Short shape name used in mismatch diagnostics.
    pub(crate) fn shape(&self) -> String {
        match self {
            Self::Scalar(s) => s.kind().to_string(),
            Self::List(_) => "list".to_string(),
            Self::Embedded(r) => format!("embedded {}", r.doc_type()),
            Self::Reference(_) => "reference".to_string(),
            Self::Map(_) => "map".to_string(),
        }
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Self::Scalar(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Scalar(Scalar::String(s.to_string()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Scalar(Scalar::String(s))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Scalar(Scalar::Int(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Scalar(Scalar::Double(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Scalar(Scalar::Bool(b))
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::Scalar(Scalar::DateTime(dt))
    }
}

impl From<Reference> for Value {
    fn from(r: Reference) -> Self {
        Self::Reference(r)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

/// A typed document: a named type, an optional identifier (absent = unsaved)
/// and its field values keyed by field name.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    doc_type: String,
    id: Option<ObjectId>,
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(doc_type: impl Into<String>) -> Self {
        Self {
            doc_type: doc_type.into(),
            id: None,
            fields: BTreeMap::new(),
        }
    }

    /// Builder: set the identifier.
    pub fn with_id(mut self, id: ObjectId) -> Self {
        self.id = Some(id);
        self
    }

    /// Builder: set a field.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    pub fn id(&self) -> Option<ObjectId> {
        self.id
    }

    pub fn set_id(&mut self, id: ObjectId) {
        self.id = Some(id);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_hex_round_trip() {
        let id = ObjectId::new();
        let parsed: ObjectId = id.to_hex().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.bytes(), id.bytes());
    }

    #[test]
    fn object_id_rejects_bad_hex() {
        assert!(ObjectId::parse_str("xyz").is_err());
        assert!(ObjectId::parse_str("0123456789abcdef0123456").is_err());
        assert!(ObjectId::parse_str("0123456789abcdef01234567").is_ok());
    }

    #[test]
    fn object_ids_are_unique_and_timestamped() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
        let age = Utc::now() - a.timestamp();
        assert!(age.num_seconds() < 60);
    }

    #[test]
    fn scalar_kind_names_round_trip() {
        for kind in ScalarKind::ALL {
            assert_eq!(ScalarKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ScalarKind::parse("polygon"), None);
    }

    #[test]
    fn regex_options_validated() {
        assert!(RegexPattern::new("^a", "im").is_ok());
        assert_eq!(
            RegexPattern::new("^a", "iq").unwrap_err(),
            InvalidRegexOption('q')
        );
    }

    #[test]
    fn regex_compile_honours_case_option() {
        let re = RegexPattern::new("^hello$", "i").unwrap().compile().unwrap();
        assert!(re.is_match("HeLLo"));
        let strict = RegexPattern::new("^hello$", "").unwrap().compile().unwrap();
        assert!(!strict.is_match("HeLLo"));
    }

    #[test]
    fn reference_id_prefers_attached_record() {
        let id = ObjectId::new();
        assert_eq!(Reference::Id(id).id(), Some(id));
        let resolved = Reference::from(Record::new("User").with_id(id));
        assert_eq!(resolved.id(), Some(id));
        assert!(resolved.is_resolved());
        assert_eq!(Reference::from(Record::new("User")).id(), None);
    }

    #[test]
    fn record_builder() {
        let rec = Record::new("Article")
            .with("title", "Hello")
            .with("views", 3i64);
        assert_eq!(rec.doc_type(), "Article");
        assert_eq!(rec.len(), 2);
        assert_eq!(rec.get("title"), Some(&Value::from("Hello")));
        assert!(rec.id().is_none());
    }
}
