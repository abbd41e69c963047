//! Low-level record readers.
//!
//! A [`ReaderFactory`] opens one [`RecordReader`] per data file. Readers pull
//! rows on demand and must release their file handle in [`RecordReader::close`].
//! The Parquet implementation lives in [`parquet`]; conversion of Arrow
//! batches into [`RowRecord`]s in [`convert`]; compilation of residual filters
//! into Arrow row filters in [`pushdown`].

use crate::error::ReadError;
use crate::filter::PushdownPredicate;
use crate::options::ReadOptions;
use crate::value::RowRecord;
use anyhow::Result;
use arrow::datatypes::SchemaRef;
use std::path::Path;

pub mod convert;
pub mod parquet;
pub mod pushdown;

/// A pull-based cursor over the raw rows of one file.
pub trait RecordReader: Send {
    /// Next row, or `Ok(None)` at end of data.
    ///
    /// # Errors
    /// Returns an error if the underlying file cannot be read or decoded.
    fn read_next(&mut self) -> Result<Option<RowRecord>>;

    /// Release the underlying file.
    ///
    /// # Errors
    /// Returns an error if releasing the file fails.
    fn close(&mut self) -> Result<()>;
}

/// Opens record readers for data files.
pub trait ReaderFactory: Send + Sync {
    /// Open a reader over `path` that applies `pushdown` and, when given,
    /// reads only the columns of `projection`.
    ///
    /// `projection` never contains partition columns.
    ///
    /// # Errors
    /// Returns [`ReadError::ReaderOpen`] if the file cannot be opened and
    /// [`ReadError::FilterCompilation`] if `pushdown` does not fit its schema.
    fn open(
        &self,
        path: &Path,
        pushdown: &PushdownPredicate,
        projection: Option<&SchemaRef>,
        options: &ReadOptions,
    ) -> Result<Box<dyn RecordReader>, ReadError>;
}
