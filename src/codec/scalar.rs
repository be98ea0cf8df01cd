//! Scalar codec: engine scalars to and from JSON-legal values.
//!
//! JSON-native kinds (`null`, `bool`, `int`, `double`, `string`) are written
//! as plain JSON. Every other kind becomes a tagged object carrying the
//! reserved `$type` discriminator plus the kind's payload keys:
//!
//! ```text
//! {"$type": "objectId", "value": "5f1d7c0e9b1e8a3c4d2f0a11"}
//! {"$type": "date",     "value": 1591050020711}
//! {"$type": "binary",   "value": "aGVsbG8=", "subtype": 0}
//! {"$type": "decimal",  "value": "12.50"}
//! {"$type": "uuid",     "value": "67e55044-10b1-426f-9247-bb680e5fe0c8"}
//! {"$type": "regex",    "pattern": "^ab", "options": "i"}
//! {"$type": "geometry", "geometry": "Point", "coordinates": [13.4, 52.5]}
//! {"$type": "double",   "value": "NaN"}
//! ```
//!
//! Decoding never fails: a value that does not structurally match a tagged
//! shape comes back [`Decoded::Unmatched`], which is the common case for
//! plain nested objects.

use crate::config::DateFormat;
use crate::error::{CodecError, FieldPath, Result};
use crate::types::{Geometry, ObjectId, RegexPattern, Scalar, ScalarKind};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Map, Number, Value as Json};
use std::str::FromStr;
use uuid::Uuid;

/// Discriminator key of every tagged scalar object.
pub const TYPE_KEY: &str = "$type";

/// Outcome of [`decode_scalar`]. `Unmatched` hands the input back untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<'a> {
    Matched(Scalar),
    Unmatched(&'a Json),
}

impl Decoded<'_> {
    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched(_))
    }

    pub fn into_scalar(self) -> Option<Scalar> {
        match self {
            Self::Matched(s) => Some(s),
            Self::Unmatched(_) => None,
        }
    }
}

// ─── Encoding ─────────────────────────────────────────────────

/// Encode `value` as declared `kind`.
///
/// `Null` is accepted for every kind and an `Int` widens into a `double`
/// position; any other disagreement is a `TypeMismatch`.
pub fn encode_scalar(value: &Scalar, kind: ScalarKind, format: DateFormat) -> Result<Json> {
    encode_scalar_at(value, kind, format, &FieldPath::root())
}

pub(crate) fn encode_scalar_at(
    value: &Scalar,
    kind: ScalarKind,
    format: DateFormat,
    path: &FieldPath,
) -> Result<Json> {
    match (value, kind) {
        (Scalar::Null, _) => Ok(Json::Null),
        (Scalar::Int(n), ScalarKind::Double) => Ok(encode_double(*n as f64)),
        (v, k) if v.kind() != k => Err(CodecError::mismatch(path, k.as_str(), v.kind().as_str())),
        (Scalar::Bool(b), _) => Ok(Json::Bool(*b)),
        (Scalar::Int(n), _) => Ok(Json::from(*n)),
        (Scalar::Double(n), _) => Ok(encode_double(*n)),
        (Scalar::String(s), _) => Ok(Json::String(s.clone())),
        (Scalar::ObjectId(id), _) => Ok(tagged(kind, json!(id.to_hex()))),
        (Scalar::DateTime(dt), _) => Ok(tagged(kind, encode_datetime(dt, format))),
        (Scalar::Binary { subtype, bytes }, _) => Ok(json!({
            TYPE_KEY: kind.as_str(),
            "value": STANDARD.encode(bytes),
            "subtype": subtype,
        })),
        (Scalar::Decimal(d), _) => Ok(tagged(kind, json!(d.to_string()))),
        (Scalar::Uuid(u), _) => Ok(tagged(kind, json!(u.hyphenated().to_string()))),
        (Scalar::Regex(re), _) => Ok(json!({
            TYPE_KEY: kind.as_str(),
            "pattern": re.pattern(),
            "options": re.options(),
        })),
        (Scalar::Geometry(g), _) => encode_geometry(g, path),
    }
}

fn tagged(kind: ScalarKind, value: Json) -> Json {
    json!({ TYPE_KEY: kind.as_str(), "value": value })
}

fn encode_double(n: f64) -> Json {
    match Number::from_f64(n) {
        Some(num) => Json::Number(num),
        None => {
            let text = if n.is_nan() {
                "NaN"
            } else if n.is_sign_positive() {
                "Infinity"
            } else {
                "-Infinity"
            };
            tagged(ScalarKind::Double, json!(text))
        }
    }
}

fn encode_datetime(dt: &DateTime<Utc>, format: DateFormat) -> Json {
    match format {
        DateFormat::EpochMillis => json!(dt.timestamp_millis()),
        DateFormat::Iso8601 => json!(dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
    }
}

fn encode_geometry(g: &Geometry, path: &FieldPath) -> Result<Json> {
    let finite = |p: &[f64; 2]| p.iter().all(|c| c.is_finite());
    let ok = match g {
        Geometry::Point(p) => finite(p),
        Geometry::LineString(line) => line.iter().all(finite),
        Geometry::Polygon(rings) => rings.iter().flatten().all(finite),
    };
    if !ok {
        return Err(CodecError::mismatch(
            path,
            "finite coordinates",
            "non-finite coordinate",
        ));
    }
    let coordinates = match g {
        Geometry::Point(p) => json!(p),
        Geometry::LineString(line) => json!(line),
        Geometry::Polygon(rings) => json!(rings),
    };
    Ok(json!({
        TYPE_KEY: ScalarKind::Geometry.as_str(),
        "geometry": g.type_name(),
        "coordinates": coordinates,
    }))
}

// ─── Decoding ─────────────────────────────────────────────────

/// Inspect a JSON value and decode it if it is a scalar shape.
///
/// Native JSON scalars always match; tagged objects match only when their key
/// set is exactly the kind's key set and the payload parses. Arrays and every
/// other object are returned unmatched.
pub fn decode_scalar(json: &Json) -> Decoded<'_> {
    let scalar = match json {
        Json::Null => Some(Scalar::Null),
        Json::Bool(b) => Some(Scalar::Bool(*b)),
        Json::Number(n) => n
            .as_i64()
            .map(Scalar::Int)
            .or_else(|| n.as_f64().map(Scalar::Double)),
        Json::String(s) => Some(Scalar::String(s.clone())),
        Json::Array(_) => None,
        Json::Object(map) => match_tagged(map),
    };
    match scalar {
        Some(s) => Decoded::Matched(s),
        None => Decoded::Unmatched(json),
    }
}

fn has_exactly(map: &Map<String, Json>, keys: &[&str]) -> bool {
    map.len() == keys.len() && keys.iter().all(|k| map.contains_key(*k))
}

fn match_tagged(map: &Map<String, Json>) -> Option<Scalar> {
    let kind = ScalarKind::parse(map.get(TYPE_KEY)?.as_str()?)?;
    let value_str = || map.get("value").and_then(Json::as_str);
    match kind {
        ScalarKind::ObjectId if has_exactly(map, &[TYPE_KEY, "value"]) => {
            ObjectId::parse_str(value_str()?).ok().map(Scalar::ObjectId)
        }
        ScalarKind::DateTime if has_exactly(map, &[TYPE_KEY, "value"]) => {
            datetime_from_json(map.get("value")?).map(Scalar::DateTime)
        }
        ScalarKind::Decimal if has_exactly(map, &[TYPE_KEY, "value"]) => {
            Decimal::from_str(value_str()?).ok().map(Scalar::Decimal)
        }
        ScalarKind::Uuid if has_exactly(map, &[TYPE_KEY, "value"]) => {
            Uuid::parse_str(value_str()?).ok().map(Scalar::Uuid)
        }
        ScalarKind::Double if has_exactly(map, &[TYPE_KEY, "value"]) => {
            let n = match value_str()? {
                "NaN" => f64::NAN,
                "Infinity" => f64::INFINITY,
                "-Infinity" => f64::NEG_INFINITY,
                _ => return None,
            };
            Some(Scalar::Double(n))
        }
        ScalarKind::Binary if has_exactly(map, &[TYPE_KEY, "value", "subtype"]) => {
            let bytes = STANDARD.decode(value_str()?).ok()?;
            let subtype = u8::try_from(map.get("subtype")?.as_u64()?).ok()?;
            Some(Scalar::Binary { subtype, bytes })
        }
        ScalarKind::Regex if has_exactly(map, &[TYPE_KEY, "pattern", "options"]) => {
            let pattern = map.get("pattern")?.as_str()?;
            let options = map.get("options")?.as_str()?;
            RegexPattern::new(pattern, options).ok().map(Scalar::Regex)
        }
        ScalarKind::Geometry if has_exactly(map, &[TYPE_KEY, "geometry", "coordinates"]) => {
            geometry_from_json(map.get("geometry")?.as_str()?, map.get("coordinates")?)
                .map(Scalar::Geometry)
        }
        _ => None,
    }
}

fn datetime_from_json(v: &Json) -> Option<DateTime<Utc>> {
    match v {
        Json::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single(),
        Json::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

fn position(v: &Json) -> Option<[f64; 2]> {
    match v.as_array()?.as_slice() {
        [x, y] => Some([x.as_f64()?, y.as_f64()?]),
        _ => None,
    }
}

fn positions(v: &Json) -> Option<Vec<[f64; 2]>> {
    v.as_array()?.iter().map(position).collect()
}

fn geometry_from_json(type_name: &str, coordinates: &Json) -> Option<Geometry> {
    match type_name {
        "Point" => position(coordinates).map(Geometry::Point),
        "LineString" => positions(coordinates).map(Geometry::LineString),
        "Polygon" => coordinates
            .as_array()?
            .iter()
            .map(positions)
            .collect::<Option<Vec<_>>>()
            .map(Geometry::Polygon),
        _ => None,
    }
}

// ─── Declared-kind coercion ───────────────────────────────────

/// Route a decoded scalar to the field's declared kind.
///
/// Accepts the relaxed spellings a hand-written document tends to use: a hex
/// string for an `objectId`, an integer or RFC 3339 string for a `date`, a
/// string for a `uuid` or `decimal`, an integer for a `double`.
pub fn coerce(scalar: Scalar, kind: ScalarKind, path: &FieldPath) -> Result<Scalar> {
    let found = scalar.kind();
    let coerced = match (scalar, kind) {
        (Scalar::Null, _) => Some(Scalar::Null),
        (s, k) if s.kind() == k => Some(s),
        (Scalar::String(s), ScalarKind::ObjectId) => {
            ObjectId::parse_str(&s).ok().map(Scalar::ObjectId)
        }
        (Scalar::String(s), ScalarKind::DateTime) => {
            datetime_from_json(&Json::String(s)).map(Scalar::DateTime)
        }
        (Scalar::Int(ms), ScalarKind::DateTime) => {
            Utc.timestamp_millis_opt(ms).single().map(Scalar::DateTime)
        }
        (Scalar::String(s), ScalarKind::Uuid) => Uuid::parse_str(&s).ok().map(Scalar::Uuid),
        (Scalar::String(s), ScalarKind::Decimal) => {
            Decimal::from_str(&s).ok().map(Scalar::Decimal)
        }
        (Scalar::Int(n), ScalarKind::Decimal) => Some(Scalar::Decimal(Decimal::from(n))),
        (Scalar::Int(n), ScalarKind::Double) => Some(Scalar::Double(n as f64)),
        _ => None,
    };
    coerced.ok_or_else(|| CodecError::mismatch(path, kind.as_str(), found.as_str()))
}
