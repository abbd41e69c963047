//! Record decoders.
//!
//! A [`RecordDecoder`] turns a fully injected [`RowRecord`] into the caller's
//! element type. The stream hands each record to the decoder by value, so a
//! decoder never sees a record twice.

use crate::codec::ValueCodecConfiguration;
use crate::value::RowRecord;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;

/// Converts records into `T`.
pub trait RecordDecoder<T>: Send + Sync {
    /// # Errors
    /// Returns an error if the record does not fit `T`.
    fn decode(&self, record: RowRecord, codec: &ValueCodecConfiguration) -> Result<T>;
}

/// Decodes through serde, using the record's JSON rendering.
///
/// Dates and timestamps arrive as ISO-8601 strings, so `T` can use chrono
/// types or plain `String`s for them.
pub struct SerdeDecoder<T>(PhantomData<fn() -> T>);

impl<T> SerdeDecoder<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for SerdeDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SerdeDecoder<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SerdeDecoder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerdeDecoder<{}>", std::any::type_name::<T>())
    }
}

impl<T: DeserializeOwned> RecordDecoder<T> for SerdeDecoder<T> {
    fn decode(&self, record: RowRecord, codec: &ValueCodecConfiguration) -> Result<T> {
        serde_json::from_value(codec.record_to_json(record))
            .with_context(|| format!("deserialize {}", std::any::type_name::<T>()))
    }
}

/// Passes records through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowRecordDecoder;

impl RecordDecoder<RowRecord> for RowRecordDecoder {
    fn decode(&self, record: RowRecord, _: &ValueCodecConfiguration) -> Result<RowRecord> {
        Ok(record)
    }
}

/// Adapts a closure into a decoder.
#[derive(Clone)]
pub struct FnDecoder<F>(pub F);

impl<T, F> RecordDecoder<T> for FnDecoder<F>
where
    F: Fn(RowRecord, &ValueCodecConfiguration) -> Result<T> + Send + Sync,
{
    fn decode(&self, record: RowRecord, codec: &ValueCodecConfiguration) -> Result<T> {
        (self.0)(record, codec)
    }
}
