//! Call-level options for the encode and decode passes.
//!
//! Options deserialize from YAML with per-field defaults, or from
//! `REFJSON_*` environment variables.

use crate::error::{CodecError, Result};
use serde::Deserialize;

/// Upper bound accepted for `max_depth`.
pub const MAX_DEPTH_CEILING: u32 = 64;

const DEFAULT_MAX_DEPTH: u32 = 3;

/// Wire representation of datetime scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    /// Integer milliseconds since the Unix epoch.
    #[default]
    EpochMillis,
    /// RFC 3339 string with millisecond precision.
    Iso8601,
}

impl DateFormat {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "epoch_millis" | "millis" => Some(Self::EpochMillis),
            "iso8601" | "iso" => Some(Self::Iso8601),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub follow_reference: bool,
    pub max_depth: u32,
    /// Use storage-side field names (`db_field`, `_id`) on the wire.
    pub use_db_field: bool,
    pub date_format: DateFormat,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            follow_reference: false,
            max_depth: DEFAULT_MAX_DEPTH,
            use_db_field: true,
            date_format: DateFormat::EpochMillis,
        }
    }
}

impl EncodeOptions {
    pub fn following(max_depth: u32) -> Self {
        Self {
            follow_reference: true,
            max_depth,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_depth < 1 {
            return Err(CodecError::InvalidConfiguration(format!(
                "max_depth must be at least 1, got {}",
                self.max_depth
            )));
        }
        if self.max_depth > MAX_DEPTH_CEILING {
            return Err(CodecError::InvalidConfiguration(format!(
                "max_depth {} exceeds ceiling {MAX_DEPTH_CEILING}",
                self.max_depth
            )));
        }
        Ok(())
    }

    /// Parse options from YAML; absent keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw: EncodeOptionsYaml = serde_yaml::from_str(yaml)?;
        let defaults = Self::default();
        let options = Self {
            follow_reference: raw.follow_reference.unwrap_or(defaults.follow_reference),
            max_depth: match raw.max_depth {
                Some(depth) => depth_from_i64(depth)?,
                None => defaults.max_depth,
            },
            use_db_field: raw.use_db_field.unwrap_or(defaults.use_db_field),
            date_format: raw.date_format.unwrap_or(defaults.date_format),
        };
        options.validate()?;
        Ok(options)
    }

    /// Read `REFJSON_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build options from an arbitrary key lookup; unset keys keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut options = Self::default();
        if let Some(v) = lookup("REFJSON_FOLLOW_REFERENCE") {
            options.follow_reference = parse_bool("REFJSON_FOLLOW_REFERENCE", &v)?;
        }
        if let Some(v) = lookup("REFJSON_MAX_DEPTH") {
            let depth: i64 = v.trim().parse().map_err(|_| {
                CodecError::InvalidConfiguration(format!(
                    "REFJSON_MAX_DEPTH must be an integer, got `{v}`"
                ))
            })?;
            options.max_depth = depth_from_i64(depth)?;
        }
        if let Some(v) = lookup("REFJSON_USE_DB_FIELD") {
            options.use_db_field = parse_bool("REFJSON_USE_DB_FIELD", &v)?;
        }
        if let Some(v) = lookup("REFJSON_DATE_FORMAT") {
            options.date_format = DateFormat::parse(v.trim()).ok_or_else(|| {
                CodecError::InvalidConfiguration(format!("unknown REFJSON_DATE_FORMAT `{v}`"))
            })?;
        }
        options.validate()?;
        Ok(options)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Wire key used for the record identifier when reading (`_id` or `id`).
    /// Both spellings are accepted; this one wins if both are present.
    pub use_db_field: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self { use_db_field: true }
    }
}

// YAML form of EncodeOptions. `max_depth` is signed so that a negative
// depth is reported as InvalidConfiguration rather than a parse error.
#[derive(Debug, Deserialize)]
struct EncodeOptionsYaml {
    follow_reference: Option<bool>,
    max_depth: Option<i64>,
    use_db_field: Option<bool>,
    date_format: Option<DateFormat>,
}

fn depth_from_i64(depth: i64) -> Result<u32> {
    u32::try_from(depth).map_err(|_| {
        CodecError::InvalidConfiguration(format!("max_depth must be at least 1, got {depth}"))
    })
}

fn parse_bool(key: &str, v: &str) -> Result<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CodecError::InvalidConfiguration(format!(
            "{key} must be a boolean, got `{v}`"
        ))),
    }
}
