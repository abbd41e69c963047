//! Scoped per-partition readers.
//!
//! [`open_partition_reader`] binds one low-level [`RecordReader`] to a
//! [`PartitionedPath`]. The returned [`PartitionCursor`] owns the reader and
//! releases it exactly once: on [`PartitionCursor::close`], or in `Drop` when
//! the cursor is abandoned.

use crate::discovery::PartitionedPath;
use crate::error::ReadError;
use crate::filter::PushdownPredicate;
use crate::io::{ReaderFactory, RecordReader};
use crate::options::ReadOptions;
use crate::value::RowRecord;
use arrow::datatypes::SchemaRef;
use std::fmt;
use tracing::{debug, warn};

/// Open a reader for one partition.
///
/// `projection` must not contain partition columns; those are injected
/// afterwards.
///
/// # Errors
/// Returns whatever [`ReaderFactory::open`] reports; the acquisition is not
/// retried.
pub fn open_partition_reader(
    factory: &dyn ReaderFactory,
    options: &ReadOptions,
    pushdown: &PushdownPredicate,
    partition: &PartitionedPath,
    projection: Option<&SchemaRef>,
) -> Result<PartitionCursor, ReadError> {
    let reader = factory.open(partition.path(), pushdown, projection, options)?;
    debug!(path = %partition.path().display(), ?pushdown, "opened reader");
    Ok(PartitionCursor {
        partition: partition.clone(),
        reader: Some(reader),
    })
}

/// Owns the open reader of a single partition.
pub struct PartitionCursor {
    partition: PartitionedPath,
    reader: Option<Box<dyn RecordReader>>,
}

impl PartitionCursor {
    #[must_use]
    pub fn partition(&self) -> &PartitionedPath {
        &self.partition
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Next record of this partition, or `None` once the file is drained or
    /// the cursor has been closed.
    ///
    /// # Errors
    /// Returns [`ReadError::Read`] if the underlying reader fails.
    pub fn next_record(&mut self) -> Result<Option<RowRecord>, ReadError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        reader
            .read_next()
            .map_err(|e| ReadError::read(self.partition.path(), e))
    }

    /// Release the reader. Later calls are no-ops.
    ///
    /// # Errors
    /// Returns [`ReadError::Read`] if the reader fails to close; it is
    /// considered released either way.
    pub fn close(&mut self) -> Result<(), ReadError> {
        let Some(mut reader) = self.reader.take() else {
            return Ok(());
        };
        debug!(path = %self.partition.path().display(), "closing reader");
        reader
            .close()
            .map_err(|e| ReadError::read(self.partition.path(), e))
    }
}

impl Drop for PartitionCursor {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "reader failed to close on drop");
        }
    }
}

impl fmt::Debug for PartitionCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionCursor")
            .field("partition", &self.partition)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingReaderFactory, ReaderCounters};
    use crate::value::Value;
    use anyhow::{Result, anyhow};
    use std::path::Path;

    /// Yields `n` records, then optionally fails.
    struct Scripted {
        left: usize,
        fail_at_end: bool,
    }

    impl RecordReader for Scripted {
        fn read_next(&mut self) -> Result<Option<RowRecord>> {
            if self.left == 0 {
                return if self.fail_at_end {
                    Err(anyhow!("truncated page"))
                } else {
                    Ok(None)
                };
            }
            self.left -= 1;
            Ok(Some(RowRecord::from_iter([("n", Value::Long(i64::try_from(self.left)?))])))
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct ScriptedFactory {
        rows: usize,
        fail_at_end: bool,
    }

    impl ReaderFactory for ScriptedFactory {
        fn open(
            &self,
            _: &Path,
            _: &PushdownPredicate,
            _: Option<&SchemaRef>,
            _: &ReadOptions,
        ) -> Result<Box<dyn RecordReader>, ReadError> {
            Ok(Box::new(Scripted {
                left: self.rows,
                fail_at_end: self.fail_at_end,
            }))
        }
    }

    fn counted(rows: usize, fail_at_end: bool) -> (CountingReaderFactory, ReaderCounters) {
        let factory = CountingReaderFactory::new(ScriptedFactory { rows, fail_at_end });
        let counters = factory.counters();
        (factory, counters)
    }

    fn open(factory: &CountingReaderFactory) -> Result<PartitionCursor> {
        let partition = PartitionedPath::new("/d/year=2021/a.parquet", vec![]);
        Ok(open_partition_reader(
            factory,
            &ReadOptions::default(),
            &PushdownPredicate::AcceptAll,
            &partition,
            None,
        )?)
    }

    #[test]
    fn close_is_idempotent() -> Result<()> {
        let (factory, counters) = counted(2, false);
        let mut cursor = open(&factory)?;
        assert!(cursor.next_record()?.is_some());
        cursor.close()?;
        cursor.close()?;
        assert!(!cursor.is_open());
        assert!(cursor.next_record()?.is_none());
        drop(cursor);
        assert_eq!(counters.opened(), 1);
        assert_eq!(counters.closed(), 1);
        Ok(())
    }

    #[test]
    fn drop_releases_abandoned_reader() -> Result<()> {
        let (factory, counters) = counted(5, false);
        {
            let mut cursor = open(&factory)?;
            cursor.next_record()?;
            assert_eq!(counters.open_now(), 1);
        }
        assert_eq!(counters.open_now(), 0);
        assert_eq!(counters.closed(), 1);
        Ok(())
    }

    #[test]
    fn read_failure_names_the_file() -> Result<()> {
        let (factory, _) = counted(1, true);
        let mut cursor = open(&factory)?;
        assert!(cursor.next_record()?.is_some());
        let err = cursor.next_record().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Read);
        assert!(err.to_string().contains("a.parquet"));
        Ok(())
    }
}
