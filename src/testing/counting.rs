//! Reader factories that count acquisitions and releases.

use crate::error::ReadError;
use crate::filter::PushdownPredicate;
use crate::io::parquet::ParquetReaderFactory;
use crate::io::{ReaderFactory, RecordReader};
use crate::options::ReadOptions;
use crate::value::RowRecord;
use anyhow::Result;
use arrow::datatypes::SchemaRef;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Shared view of a [`CountingReaderFactory`]'s counters.
#[derive(Debug, Clone, Default)]
pub struct ReaderCounters {
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    max_open: Arc<AtomicUsize>,
    paths: Arc<Mutex<Vec<PathBuf>>>,
}

impl ReaderCounters {
    #[must_use]
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of `close` calls; a reader closed twice counts twice.
    #[must_use]
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn open_now(&self) -> usize {
        self.opened().saturating_sub(self.closed())
    }

    /// Highest number of readers open at the same time.
    #[must_use]
    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    /// Files opened, in order.
    #[must_use]
    pub fn opened_paths(&self) -> Vec<PathBuf> {
        self.paths.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

/// Wraps a factory and counts what it opens and what gets closed.
pub struct CountingReaderFactory {
    inner: Box<dyn ReaderFactory>,
    counters: ReaderCounters,
}

impl CountingReaderFactory {
    pub fn new(inner: impl ReaderFactory + 'static) -> Self {
        Self {
            inner: Box::new(inner),
            counters: ReaderCounters::default(),
        }
    }

    /// Counting wrapper around the Parquet factory.
    #[must_use]
    pub fn parquet() -> Self {
        Self::new(ParquetReaderFactory)
    }

    #[must_use]
    pub fn counters(&self) -> ReaderCounters {
        self.counters.clone()
    }
}

impl ReaderFactory for CountingReaderFactory {
    fn open(
        &self,
        path: &Path,
        pushdown: &PushdownPredicate,
        projection: Option<&SchemaRef>,
        options: &ReadOptions,
    ) -> Result<Box<dyn RecordReader>, ReadError> {
        let inner = self.inner.open(path, pushdown, projection, options)?;
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        self.counters
            .max_open
            .fetch_max(self.counters.open_now(), Ordering::SeqCst);
        if let Ok(mut paths) = self.counters.paths.lock() {
            paths.push(path.to_path_buf());
        }
        Ok(Box::new(CountingReader {
            inner,
            counters: self.counters.clone(),
        }))
    }
}

struct CountingReader {
    inner: Box<dyn RecordReader>,
    counters: ReaderCounters,
}

impl RecordReader for CountingReader {
    fn read_next(&mut self) -> Result<Option<RowRecord>> {
        self.inner.read_next()
    }

    fn close(&mut self) -> Result<()> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }
}
