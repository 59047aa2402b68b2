//! The typed value model.
//!
//! Every field slot in an output record holds exactly one `Value`. The
//! variants cover the full range of types the field-resolution engine can
//! produce: text and numerics from document attributes, calendar values from
//! date coercion, and two sentinels — `Null` for anything unresolvable and
//! `Unresolved` for a foreign key with more than one candidate, which must
//! stay distinguishable from a plain missing value until reconciliation.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Text(String),
    Int32(i32),
    Int64(i64),
    Float(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// Ambiguous foreign key: more than one candidate was available and no
    /// guess was made. Distinct from `Null` so downstream reconciliation can
    /// tell "nothing there" from "deferred".
    Unresolved,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true for values that carry actual data (neither `Null` nor
    /// the ambiguous-FK sentinel).
    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::Null | Self::Unresolved)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// The calendar date carried by this value, if any. A `DateTime`
    /// contributes its date component.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            Self::DateTime(dt) => Some(dt.date()),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Text(_) => "text",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::Float(_) => "float",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
            Self::Unresolved => "unresolved",
        }
    }

    /// Rendering used when values are concatenated into surrogate-key hash
    /// input. Matches the stringification of the SQL-side pipelines that
    /// reproduce these keys: nulls render as `None`, datetimes with a space
    /// separator.
    pub fn hash_repr(&self) -> String {
        match self {
            Self::Null | Self::Unresolved => "None".to_string(),
            Self::DateTime(v) => v.format("%Y-%m-%d %H:%M:%S").to_string(),
            other => other.to_string(),
        }
    }

    /// Kind-tagged rendering used for exact-match deduplication keys.
    /// Distinguishes `Null` from empty text and `Int64(1)` from `Text("1")`.
    pub fn key_repr(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Unresolved => "unresolved".to_string(),
            other => format!("{}:{}", other.kind_name(), other),
        }
    }
}

impl fmt::Display for Value {
    /// Plain stringification, used for hash-input concatenation and logs.
    /// Sentinels render empty.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null | Self::Unresolved => Ok(()),
            Self::Text(v) => f.write_str(v),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Self::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl<T> From<Option<T>> for Value
where
    Value: From<T>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Value::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_not_usable() {
        assert!(!Value::Null.is_usable());
        assert!(!Value::Unresolved.is_usable());
        assert!(Value::Text(String::new()).is_usable());
        assert!(Value::Int64(0).is_usable());
    }

    #[test]
    fn key_repr_distinguishes_kinds() {
        assert_ne!(Value::Null.key_repr(), Value::Text(String::new()).key_repr());
        assert_ne!(Value::Int64(1).key_repr(), Value::Text("1".into()).key_repr());
        assert_ne!(Value::Null.key_repr(), Value::Unresolved.key_repr());
    }

    #[test]
    fn datetime_contributes_date_component() {
        let dt = NaiveDate::from_ymd_opt(2020, 1, 2)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(
            Value::DateTime(dt).as_date(),
            NaiveDate::from_ymd_opt(2020, 1, 2)
        );
    }

    #[test]
    fn hash_repr_matches_sql_stringification() {
        assert_eq!(Value::Null.hash_repr(), "None");
        assert_eq!(Value::Unresolved.hash_repr(), "None");
        let dt = NaiveDate::from_ymd_opt(2020, 1, 2)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(Value::DateTime(dt).hash_repr(), "2020-01-02 10:30:00");
        assert_eq!(Value::Int64(7).hash_repr(), "7");
    }

    #[test]
    fn display_formats_dates_iso() {
        let d = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        assert_eq!(Value::Date(d).to_string(), "2020-01-02");
        let dt = d.and_hms_opt(10, 30, 0).unwrap();
        assert_eq!(Value::DateTime(dt).to_string(), "2020-01-02T10:30:00");
    }
}
