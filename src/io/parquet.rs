//! Parquet-backed record readers.
//!
//! This module provides:
//! - [`read_parquet_schema`] to inspect a file's Arrow schema from its footer
//! - [`ParquetReaderFactory`], the default [`ReaderFactory`], which opens a
//!   `ParquetRecordBatchReader` per file with
//!   - a `ProjectionMask` selecting only the projected root columns, and
//!   - a `RowFilter` compiled from the residual pushdown predicate
//! - [`ParquetRecordReader`], which walks the Arrow batches row by row and
//!   yields [`RowRecord`]s without holding more than one batch in memory.

use crate::error::ReadError;
use crate::filter::PushdownPredicate;
use crate::io::convert::RowBatch;
use crate::io::pushdown::compile_row_filter;
use crate::io::{ReaderFactory, RecordReader};
use crate::options::ReadOptions;
use crate::value::RowRecord;
use anyhow::{Context, Result};
use arrow::datatypes::SchemaRef;
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Read the Arrow schema stored in a Parquet file's footer.
///
/// # Errors
/// Returns an error if the file cannot be opened or its footer is invalid.
pub fn read_parquet_schema(path: impl AsRef<Path>) -> Result<SchemaRef> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("read parquet footer of {}", path.display()))?;
    Ok(SchemaRef::clone(builder.schema()))
}

/// Opens [`ParquetRecordReader`]s on local files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParquetReaderFactory;

impl ParquetReaderFactory {
    fn builder(
        path: &Path,
        projection: Option<&SchemaRef>,
        options: &ReadOptions,
    ) -> Result<ParquetRecordBatchReaderBuilder<File>> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let mut builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .context("open ParquetRecordBatchReader")?
            .with_batch_size(options.fs.batch_size.max(1));

        if let Some(projection) = projection {
            let file_schema = SchemaRef::clone(builder.schema());
            let roots = projection
                .fields()
                .iter()
                .map(|field| {
                    file_schema
                        .index_of(field.name())
                        .with_context(|| format!("projected column `{}` not in file", field.name()))
                })
                .collect::<Result<Vec<usize>>>()?;
            let mask = ProjectionMask::roots(builder.parquet_schema(), roots);
            builder = builder.with_projection(mask);
        }
        Ok(builder)
    }
}

impl ReaderFactory for ParquetReaderFactory {
    fn open(
        &self,
        path: &Path,
        pushdown: &PushdownPredicate,
        projection: Option<&SchemaRef>,
        options: &ReadOptions,
    ) -> Result<Box<dyn RecordReader>, ReadError> {
        let mut builder =
            Self::builder(path, projection, options).map_err(|e| ReadError::reader_open(path, e))?;

        if let Some(filter) = pushdown.filter() {
            let row_filter = compile_row_filter(filter, builder.schema(), builder.parquet_schema())
                .with_context(|| format!("pushdown `{filter}` for {}", path.display()))
                .map_err(ReadError::filter_compilation)?;
            builder = builder.with_row_filter(row_filter);
        }

        let reader = builder
            .build()
            .context("build ParquetRecordBatchReader")
            .map_err(|e| ReadError::reader_open(path, e))?;
        Ok(Box::new(ParquetRecordReader::new(path, reader)))
    }
}

/// Row cursor over one Parquet file.
pub struct ParquetRecordReader {
    path: PathBuf,
    reader: Option<ParquetRecordBatchReader>,
    batch: Option<RowBatch>,
    row: usize,
}

impl ParquetRecordReader {
    fn new(path: &Path, reader: ParquetRecordBatchReader) -> Self {
        Self {
            path: path.to_path_buf(),
            reader: Some(reader),
            batch: None,
            row: 0,
        }
    }
}

impl RecordReader for ParquetRecordReader {
    fn read_next(&mut self) -> Result<Option<RowRecord>> {
        loop {
            if let Some(batch) = &self.batch
                && self.row < batch.num_rows()
            {
                let record = batch.row(self.row)?;
                self.row += 1;
                return Ok(Some(record));
            }
            let Some(reader) = self.reader.as_mut() else {
                return Ok(None);
            };
            match reader.next().transpose().context("read next batch")? {
                Some(batch) => {
                    trace!(path = %self.path.display(), rows = batch.num_rows(), "batch");
                    self.batch = Some(RowBatch::try_new(&batch)?);
                    self.row = 0;
                }
                None => {
                    self.batch = None;
                    return Ok(None);
                }
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.batch = None;
        self.reader = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::col;
    use crate::testing::write_parquet_vec;
    use crate::value::Value;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    #[derive(Serialize, Deserialize)]
    struct Row {
        id: i64,
        name: String,
    }

    fn rows(n: i64) -> Vec<Row> {
        (0..n)
            .map(|id| Row {
                id,
                name: format!("n{id}"),
            })
            .collect()
    }

    fn drain(reader: &mut dyn RecordReader) -> Result<Vec<RowRecord>> {
        let mut out = Vec::new();
        while let Some(r) = reader.read_next()? {
            out.push(r);
        }
        Ok(out)
    }

    #[test]
    fn reads_rows_across_batches() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("rows.parquet");
        write_parquet_vec(&path, &rows(5))?;

        let opts = ReadOptions::new().with_batch_size(2);
        let mut reader = ParquetReaderFactory.open(&path, &PushdownPredicate::AcceptAll, None, &opts)?;
        let out = drain(reader.as_mut())?;
        assert_eq!(out.len(), 5);
        assert_eq!(out[3].get("id"), Some(&Value::Long(3)));
        assert_eq!(out[3].get("name"), Some(&Value::String("n3".into())));
        assert!(reader.read_next()?.is_none());
        reader.close()?;
        assert!(reader.read_next()?.is_none());
        Ok(())
    }

    #[test]
    fn applies_pushdown_and_projection() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("rows.parquet");
        write_parquet_vec(&path, &rows(10))?;

        let schema = read_parquet_schema(&path)?;
        let projection = Arc::new(schema.project(&[schema.index_of("id")?])?);
        let pushdown = PushdownPredicate::Residual(col("id").gt_eq(7));
        let mut reader =
            ParquetReaderFactory.open(&path, &pushdown, Some(&projection), &ReadOptions::default())?;
        let out = drain(reader.as_mut())?;
        let ids: Vec<_> = out.iter().map(|r| r.get("id").cloned()).collect();
        assert_eq!(
            ids,
            vec![Some(Value::Long(7)), Some(Value::Long(8)), Some(Value::Long(9))]
        );
        assert!(out.iter().all(|r| r.get("name").is_none()));
        Ok(())
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let err = ParquetReaderFactory
            .open(
                Path::new("/no/such/file.parquet"),
                &PushdownPredicate::AcceptAll,
                None,
                &ReadOptions::default(),
            )
            .err()
            .expect("open should fail");
        assert_eq!(err.kind(), crate::error::ErrorKind::ReaderOpen);
    }

    #[test]
    fn bad_pushdown_is_a_compilation_error() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("rows.parquet");
        write_parquet_vec(&path, &rows(1))?;
        let err = ParquetReaderFactory
            .open(
                &path,
                &PushdownPredicate::Residual(col("missing").eq(1)),
                None,
                &ReadOptions::default(),
            )
            .err()
            .expect("open should fail");
        assert_eq!(err.kind(), crate::error::ErrorKind::FilterCompilation);
        Ok(())
    }
}
