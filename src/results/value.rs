//! Typed scalar values decoded from result rows.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};
use crate::warehouse::FieldSchema;

/// The types a caller can expect a column to decode to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    String,
    /// 32-bit integer; wider values are a mismatch.
    Integer,
    Long,
    Float,
    Bool,
    Timestamp,
    Bytes,
}

impl ScalarType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Long => "long",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Timestamp => "timestamp",
            Self::Bytes => "bytes",
        }
    }

    /// Returns true if a column of the given wire type can decode to this type.
    pub fn accepts(&self, wire: WireType) -> bool {
        match self {
            Self::String => wire.is_textual(),
            Self::Integer | Self::Long => wire == WireType::Integer,
            Self::Float => matches!(wire, WireType::Float | WireType::Numeric),
            Self::Bool => wire == WireType::Boolean,
            Self::Timestamp => wire == WireType::Timestamp,
            Self::Bytes => wire == WireType::Bytes,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScalarType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" => Ok(Self::String),
            "integer" | "int" => Ok(Self::Integer),
            "long" | "int64" => Ok(Self::Long),
            "float" | "float64" | "double" => Ok(Self::Float),
            "bool" | "boolean" => Ok(Self::Bool),
            "timestamp" => Ok(Self::Timestamp),
            "bytes" => Ok(Self::Bytes),
            _ => Err(format!(
                "Invalid type: {s}. Expected: string, integer, long, float, bool, timestamp or bytes"
            )),
        }
    }
}

/// Column types as reported by the remote result schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    String,
    Bytes,
    Integer,
    Float,
    Numeric,
    BigNumeric,
    Boolean,
    Timestamp,
    Date,
    Time,
    Datetime,
    Geography,
    Json,
    Interval,
    Record,
    Repeated,
    Unknown,
}

impl WireType {
    /// Classifies a schema field, treating REPEATED mode as its own type.
    pub fn of(field: &FieldSchema) -> Self {
        if field.is_repeated() {
            return Self::Repeated;
        }
        match field.field_type.to_uppercase().as_str() {
            "STRING" => Self::String,
            "BYTES" => Self::Bytes,
            "INTEGER" | "INT64" => Self::Integer,
            "FLOAT" | "FLOAT64" => Self::Float,
            "NUMERIC" => Self::Numeric,
            "BIGNUMERIC" => Self::BigNumeric,
            "BOOLEAN" | "BOOL" => Self::Boolean,
            "TIMESTAMP" => Self::Timestamp,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "DATETIME" => Self::Datetime,
            "GEOGRAPHY" => Self::Geography,
            "JSON" => Self::Json,
            "INTERVAL" => Self::Interval,
            "RECORD" | "STRUCT" => Self::Record,
            _ => Self::Unknown,
        }
    }

    /// Types whose wire value is best kept as text.
    fn is_textual(&self) -> bool {
        matches!(
            self,
            Self::String
                | Self::Numeric
                | Self::BigNumeric
                | Self::Date
                | Self::Time
                | Self::Datetime
                | Self::Geography
                | Self::Json
                | Self::Interval
        )
    }

    /// The scalar type to use when the caller gave no expectation.
    pub fn inferred(&self) -> ScalarType {
        match self {
            Self::Integer => ScalarType::Long,
            Self::Float => ScalarType::Float,
            Self::Boolean => ScalarType::Bool,
            Self::Timestamp => ScalarType::Timestamp,
            Self::Bytes => ScalarType::Bytes,
            _ => ScalarType::String,
        }
    }
}

/// A single decoded value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    #[default]
    Null,
    String(String),
    Integer(i32),
    Long(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Bytes(Vec<u8>),
}

impl Scalar {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns integer values widened to i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(i64::from(*i)),
            Self::Long(l) => Some(*l),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Renders the value for tabular output.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::String(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Long(l) => l.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S%.f UTC").to_string(),
            Self::Bytes(b) => format!("<{} bytes>", b.len()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl<T> From<Option<T>> for Scalar
where
    T: Into<Scalar>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Decodes one wire cell into the requested scalar type.
///
/// Scalars arrive as JSON strings (numbers and booleans included); nested
/// values (RECORD, REPEATED) are kept as their JSON text.
pub fn decode_cell(column: &str, raw: &serde_json::Value, target: ScalarType) -> Result<Scalar> {
    let text = match raw {
        serde_json::Value::Null => return Ok(Scalar::Null),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        nested => {
            if target == ScalarType::String {
                return Ok(Scalar::String(nested.to_string()));
            }
            return Err(ReportError::type_mismatch(column, target.as_str(), "nested value"));
        }
    };

    let bad_value =
        |text: &str| ReportError::type_mismatch(column, target.as_str(), format!("value '{text}'"));

    match target {
        ScalarType::String => Ok(Scalar::String(text)),
        ScalarType::Long => text.parse().map(Scalar::Long).map_err(|_| bad_value(&text)),
        ScalarType::Integer => {
            let wide: i64 = text.parse().map_err(|_| bad_value(&text))?;
            i32::try_from(wide).map(Scalar::Integer).map_err(|_| {
                ReportError::type_mismatch(column, "integer", format!("out-of-range value {wide}"))
            })
        }
        ScalarType::Float => text.parse().map(Scalar::Float).map_err(|_| bad_value(&text)),
        ScalarType::Bool => match text.to_lowercase().as_str() {
            "true" => Ok(Scalar::Bool(true)),
            "false" => Ok(Scalar::Bool(false)),
            _ => Err(bad_value(&text)),
        },
        ScalarType::Timestamp => parse_epoch_timestamp(&text).ok_or_else(|| bad_value(&text)),
        ScalarType::Bytes => BASE64
            .decode(text.as_bytes())
            .map(Scalar::Bytes)
            .map_err(|_| bad_value(&text)),
    }
}

/// Parses TIMESTAMP wire values: fractional epoch seconds such as
/// `1.6535232E9`, or an RFC 3339 string from emulators.
fn parse_epoch_timestamp(text: &str) -> Option<Scalar> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(Scalar::Timestamp(ts.with_timezone(&Utc)));
    }

    let seconds: f64 = text.parse().ok()?;
    if !seconds.is_finite() {
        return None;
    }
    let micros = (seconds * 1_000_000.0).round() as i64;
    DateTime::from_timestamp_micros(micros).map(Scalar::Timestamp)
}
