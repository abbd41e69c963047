//! Generic row representation.
//!
//! A [`RowRecord`] is the intermediate form every raw Parquet row is decoded
//! into before partition values are injected and the record is handed to a
//! [`RecordDecoder`](crate::decode::RecordDecoder). Columns keep the order in
//! which they were set; nested groups are [`Value::Record`]s.

use anyhow::{Result, bail};
use std::cmp::Ordering;
use std::fmt;

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    /// Days since the Unix epoch.
    Date(i32),
    /// Microseconds since the Unix epoch, UTC.
    Timestamp(i64),
    Decimal { unscaled: i128, scale: i8 },
    List(Vec<Value>),
    Record(RowRecord),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view used for cross-type comparisons.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(f64::from(*v)),
            #[allow(clippy::cast_precision_loss)]
            Self::Long(v) => Some(*v as f64),
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            #[allow(clippy::cast_precision_loss)]
            Self::Decimal { unscaled, scale } => {
                Some(*unscaled as f64 / 10f64.powi(i32::from(*scale)))
            }
            _ => None,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Compare two values, promoting numerics and parsing strings against
    /// numbers. Returns `None` when either side is null or the values are not
    /// comparable.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Binary(a), Self::Binary(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) | (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::String(s), n) if n.as_f64().is_some() => {
                Self::parse_numeric(s)?.compare(n)
            }
            (n, Self::String(s)) if n.as_f64().is_some() => {
                n.compare(&Self::parse_numeric(s)?)
            }
            (Self::String(s), Self::Boolean(b)) => s.parse::<bool>().ok().map(|a| a.cmp(b)),
            (Self::Boolean(b), Self::String(s)) => s.parse::<bool>().ok().map(|a| b.cmp(&a)),
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
            },
        }
    }

    fn parse_numeric(s: &str) -> Option<Self> {
        s.parse::<i64>()
            .map(Self::Long)
            .ok()
            .or_else(|| s.parse::<f64>().ok().map(Self::Double))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Binary(v) => write!(f, "<{} bytes>", v.len()),
            Self::Date(v) => write!(f, "date({v})"),
            Self::Timestamp(v) => write!(f, "timestamp({v})"),
            Self::Decimal { unscaled, scale } => write!(f, "{unscaled}e-{scale}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Record(r) => write!(f, "{r}"),
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Self::$variant(v.into())
            }
        })*
    };
}

value_from! {
    bool => Boolean,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    u8 => Int,
    u16 => Int,
    i64 => Long,
    u32 => Long,
    f32 => Float,
    f64 => Double,
    String => String,
    &str => String,
    Vec<u8> => Binary,
    RowRecord => Record,
}

impl From<chrono::NaiveDate> for Value {
    fn from(d: chrono::NaiveDate) -> Self {
        Self::Date(crate::codec::days_since_epoch(d))
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A dotted column path such as `address.city`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnPath(Vec<String>);

impl ColumnPath {
    /// Split `path` on `.`; empty segments are rejected.
    ///
    /// # Errors
    /// Returns an error if the path or any of its segments is empty.
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            bail!("empty column path");
        }
        let segments: Vec<String> = path.split('.').map(str::to_owned).collect();
        if segments.iter().any(String::is_empty) {
            bail!("column path `{path}` has an empty segment");
        }
        Ok(Self(segments))
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The top-level column this path starts at.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.0[0]
    }
}

impl fmt::Display for ColumnPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Column-name keyed row, preserving insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowRecord {
    fields: Vec<(String, Value)>,
}

impl RowRecord {
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    #[must_use]
    pub fn with_capacity(n: usize) -> Self {
        Self {
            fields: Vec::with_capacity(n),
        }
    }

    /// Append a top-level column without checking for duplicates.
    ///
    /// Used by row decoders that build a record from a schema whose names are
    /// already unique.
    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.fields.push((name.into(), value));
    }

    /// Return this record with the column at `path` set to `value`.
    ///
    /// Intermediate groups are created when missing and replaced when they
    /// hold a non-record value. An existing column keeps its position.
    #[must_use]
    pub fn with_value(mut self, path: &ColumnPath, value: Value) -> Self {
        self.set(path.segments(), value);
        self
    }

    fn set(&mut self, segments: &[String], value: Value) {
        let Some((head, rest)) = segments.split_first() else {
            return;
        };
        let idx = self
            .fields
            .iter()
            .position(|(name, _)| name == head)
            .unwrap_or_else(|| {
                self.fields.push((head.clone(), Value::Null));
                self.fields.len() - 1
            });
        let slot = &mut self.fields[idx].1;
        if rest.is_empty() {
            *slot = value;
            return;
        }
        if !matches!(slot, Value::Record(_)) {
            *slot = Value::Record(Self::new());
        }
        if let Value::Record(child) = slot {
            child.set(rest, value);
        }
    }

    /// Look up a top-level column.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find_map(|(n, v)| (n == name).then_some(v))
    }

    /// Look up a possibly nested column.
    #[must_use]
    pub fn get_path(&self, path: &ColumnPath) -> Option<&Value> {
        let (head, rest) = path.segments().split_first()?;
        let mut current = self.get(head)?;
        for segment in rest {
            match current {
                Value::Record(r) => current = r.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }
}

impl IntoIterator for RowRecord {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RowRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (k, v) in iter {
            record.push(k, v.into());
        }
        record
    }
}

impl fmt::Display for RowRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> ColumnPath {
        ColumnPath::parse(p).unwrap()
    }

    #[test]
    fn with_value_overwrites_in_place() {
        let rec: RowRecord = [("a", Value::Long(1)), ("b", Value::Long(2))]
            .into_iter()
            .collect();
        let rec = rec.with_value(&path("a"), Value::from("x"));
        let names: Vec<_> = rec.column_names().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(rec.get("a"), Some(&Value::String("x".into())));
    }

    #[test]
    fn with_value_creates_nested_groups() {
        let rec = RowRecord::new()
            .with_value(&path("addr.city"), Value::from("Oslo"))
            .with_value(&path("addr.zip"), Value::from("0150"));
        assert_eq!(
            rec.get_path(&path("addr.city")),
            Some(&Value::String("Oslo".into()))
        );
        let Some(Value::Record(addr)) = rec.get("addr") else {
            panic!("addr should be a record");
        };
        assert_eq!(addr.len(), 2);
    }

    #[test]
    fn nested_set_replaces_scalar() {
        let rec: RowRecord = [("a", Value::Long(1))].into_iter().collect();
        let rec = rec.with_value(&path("a.b"), Value::Boolean(true));
        assert_eq!(rec.get_path(&path("a.b")), Some(&Value::Boolean(true)));
    }

    #[test]
    fn column_path_rejects_empty_segments() {
        assert!(ColumnPath::parse("").is_err());
        assert!(ColumnPath::parse("a..b").is_err());
        assert_eq!(path("a.b").root(), "a");
    }

    #[test]
    fn compare_promotes_numbers_and_strings() {
        assert_eq!(Value::Int(3).compare(&Value::Long(3)), Some(Ordering::Equal));
        assert_eq!(Value::Long(2).compare(&Value::Double(2.5)), Some(Ordering::Less));
        assert_eq!(
            Value::from("2021").compare(&Value::Int(2021)),
            Some(Ordering::Equal)
        );
        assert_eq!(Value::from("abc").compare(&Value::Int(1)), None);
        assert_eq!(Value::Null.compare(&Value::Null), None);
        assert_eq!(
            Value::from("true").compare(&Value::Boolean(true)),
            Some(Ordering::Equal)
        );
    }
}
