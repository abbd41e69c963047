//! Value encoding for partition strings and JSON rendering for decoders.

use crate::options::{PartitionEncoding, ReadOptions};
use crate::value::{RowRecord, Value};
use arrow::datatypes::{DataType, Schema, TimeUnit};
use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Offset, SecondsFormat, TimeZone, Utc,
};
use serde_json::{Map, Number};
use std::collections::HashMap;
use tracing::warn;

/// Directory value Hive writes for a null partition column.
pub const HIVE_DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Days between the Unix epoch and `date`.
#[must_use]
pub fn days_since_epoch(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

/// Codec settings resolved once per read call.
#[derive(Debug, Clone)]
pub struct ValueCodecConfiguration {
    encoding: PartitionEncoding,
    date_format: String,
    timestamp_format: String,
    offset: FixedOffset,
    /// Column-wide types of the partition columns, once discovery has run.
    partition_types: HashMap<String, DataType>,
}

impl Default for ValueCodecConfiguration {
    fn default() -> Self {
        Self::from_options(&ReadOptions::default())
    }
}

impl ValueCodecConfiguration {
    #[must_use]
    pub fn from_options(options: &ReadOptions) -> Self {
        let codec = &options.codec;
        let offset = FixedOffset::east_opt(codec.utc_offset_secs).unwrap_or_else(|| {
            warn!(
                offset = codec.utc_offset_secs,
                "utc offset out of range, using UTC"
            );
            Utc.fix()
        });
        Self {
            encoding: codec.partition_encoding,
            date_format: codec.date_format.clone(),
            timestamp_format: codec.timestamp_format.clone(),
            offset,
            partition_types: HashMap::new(),
        }
    }

    /// Pin each of `columns` to its type in `schema`, so every value of a
    /// partition column is encoded the same way.
    #[must_use]
    pub fn with_partition_types(mut self, schema: &Schema, columns: &[&str]) -> Self {
        for column in columns {
            if let Ok(field) = schema.field_with_name(column) {
                self.partition_types
                    .insert((*column).to_owned(), field.data_type().clone());
            }
        }
        self
    }

    /// Type pinned for a partition column, if any.
    #[must_use]
    pub fn partition_type(&self, column: &str) -> Option<&DataType> {
        self.partition_types.get(column)
    }

    #[must_use]
    pub const fn encoding(&self) -> PartitionEncoding {
        self.encoding
    }

    #[must_use]
    pub const fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Turn a raw partition string into a typed value.
    #[must_use]
    pub fn encode_partition_value(&self, raw: &str) -> Value {
        if raw == HIVE_DEFAULT_PARTITION {
            return Value::Null;
        }
        match self.encoding {
            PartitionEncoding::Raw => Value::String(raw.to_owned()),
            PartitionEncoding::Infer => self.infer(raw),
        }
    }

    /// Encode `raw` as a value of `data_type`, the type resolved for its
    /// column. `Utf8` keeps the text as is; `Float64` widens integers.
    #[must_use]
    pub fn encode_partition_value_as(&self, raw: &str, data_type: &DataType) -> Value {
        match (self.encode_partition_value(raw), data_type) {
            (Value::Null, _) => Value::Null,
            (_, DataType::Utf8) => Value::String(raw.to_owned()),
            (Value::Long(_), DataType::Float64) => raw
                .parse::<f64>()
                .map_or_else(|_| Value::String(raw.to_owned()), Value::Double),
            (v, _) => v,
        }
    }

    /// Encode a value of partition column `column`, using its pinned type
    /// when there is one.
    #[must_use]
    pub fn encode_partition_column(&self, column: &str, raw: &str) -> Value {
        match self.partition_types.get(column) {
            Some(data_type) => self.encode_partition_value_as(raw, data_type),
            None => self.encode_partition_value(raw),
        }
    }

    /// One type for all `raws` of a column. Nulls are ignored, integers and
    /// floats widen to `Float64`, and any other disagreement widens to `Utf8`.
    #[must_use]
    pub fn resolve_partition_type<'a>(
        &self,
        raws: impl IntoIterator<Item = &'a str>,
    ) -> DataType {
        let mut resolved: Option<DataType> = None;
        for raw in raws {
            let value = self.encode_partition_value(raw);
            if value.is_null() {
                continue;
            }
            let data_type = partition_data_type(&value);
            resolved = Some(match resolved {
                None => data_type,
                Some(current) if current == data_type => current,
                Some(DataType::Int64 | DataType::Float64)
                    if matches!(data_type, DataType::Int64 | DataType::Float64) =>
                {
                    DataType::Float64
                }
                Some(_) => return DataType::Utf8,
            });
        }
        resolved.unwrap_or(DataType::Utf8)
    }

    fn infer(&self, raw: &str) -> Value {
        if let Ok(b) = raw.parse::<bool>() {
            return Value::Boolean(b);
        }
        // keep zero-padded codes such as "007" as text
        let digits = raw.trim_start_matches('-');
        let padded = digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.");
        if !padded {
            if let Ok(v) = raw.parse::<i64>() {
                return Value::Long(v);
            }
            if raw.contains('.')
                && let Ok(v) = raw.parse::<f64>()
                && v.is_finite()
            {
                return Value::Double(v);
            }
        }
        if let Ok(d) = NaiveDate::parse_from_str(raw, &self.date_format) {
            return Value::Date(days_since_epoch(d));
        }
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, &self.timestamp_format)
            && let Some(local) = self.offset.from_local_datetime(&ts).single()
        {
            return Value::Timestamp(local.timestamp_micros());
        }
        Value::String(raw.to_owned())
    }

    /// Render a record as a JSON object for serde-based decoding.
    #[must_use]
    pub fn record_to_json(&self, record: RowRecord) -> serde_json::Value {
        let mut map = Map::with_capacity(record.len());
        for (name, value) in record {
            map.insert(name, self.value_to_json(value));
        }
        serde_json::Value::Object(map)
    }

    /// Render one value as JSON.
    ///
    /// Dates and timestamps become ISO-8601 strings, decimals become numbers,
    /// and binary becomes an array of bytes.
    #[must_use]
    pub fn value_to_json(&self, value: Value) -> serde_json::Value {
        use serde_json::Value as J;
        match value {
            Value::Null => J::Null,
            Value::Boolean(b) => J::Bool(b),
            Value::Int(v) => J::from(v),
            Value::Long(v) => J::from(v),
            Value::Float(v) => Number::from_f64(f64::from(v)).map_or(J::Null, J::Number),
            Value::Double(v) => Number::from_f64(v).map_or(J::Null, J::Number),
            Value::String(s) => J::String(s),
            Value::Binary(bytes) => J::Array(bytes.into_iter().map(J::from).collect()),
            Value::Date(days) => days
                .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
                .and_then(NaiveDate::from_num_days_from_ce_opt)
                .map_or(J::Null, |d| J::String(d.format("%Y-%m-%d").to_string())),
            Value::Timestamp(micros) => DateTime::from_timestamp_micros(micros).map_or(J::Null, |dt| {
                J::String(
                    dt.with_timezone(&self.offset)
                        .to_rfc3339_opts(SecondsFormat::AutoSi, true),
                )
            }),
            v @ Value::Decimal { .. } => v
                .as_f64()
                .and_then(Number::from_f64)
                .map_or(J::Null, J::Number),
            Value::List(items) => {
                J::Array(items.into_iter().map(|v| self.value_to_json(v)).collect())
            }
            Value::Record(r) => self.record_to_json(r),
        }
    }
}

/// Arrow type a partition value is exposed as in the dataset schema.
#[must_use]
pub fn partition_data_type(value: &Value) -> DataType {
    match value {
        Value::Boolean(_) => DataType::Boolean,
        Value::Int(_) => DataType::Int32,
        Value::Long(_) => DataType::Int64,
        Value::Float(_) => DataType::Float32,
        Value::Double(_) => DataType::Float64,
        Value::Date(_) => DataType::Date32,
        Value::Timestamp(_) => DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        _ => DataType::Utf8,
    }
}
