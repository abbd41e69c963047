//! Lazy partitioned streams.
//!
//! [`ReadBuilder`] captures everything a read needs (options, filter,
//! projection and the discovery/reader collaborators) and produces a
//! [`PartitionedStream`] per call. The stream does no work until it is first
//! pulled; it then discovers the dataset, resolves the projection, prunes
//! partitions and reads them one at a time, in discovery order.
//!
//! # Example
//!
//! ```no_run
//! use hivequet::{ReadBuilder, col};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Event {
//!     id: i64,
//!     year: i64,
//! }
//!
//! let events = ReadBuilder::new()
//!     .filter(col("year").eq(2021))
//!     .read_as::<Event>("data/events")
//!     .collect_vec()?;
//! # Ok::<(), hivequet::ReadError>(())
//! ```
//!
//! A stream ends after its first error: discovery, projection and filter
//! failures surface on the first pull with no records before them, and
//! failures inside a partition surface after the records already yielded.

use crate::codec::ValueCodecConfiguration;
use crate::decode::{RecordDecoder, RowRecordDecoder, SerdeDecoder};
use crate::discovery::{LocalDiscovery, PartitionDiscovery, PartitionedDirectory, PartitionedPath};
use crate::error::ReadError;
use crate::filter::{Filter, PushdownPredicate, partition_filter};
use crate::inject::inject;
use crate::io::ReaderFactory;
use crate::io::parquet::ParquetReaderFactory;
use crate::options::ReadOptions;
use crate::reader::{PartitionCursor, open_partition_reader};
use crate::schema::{ColumnProjection, SchemaResolver, TypedProjection};
use crate::value::RowRecord;
use arrow::datatypes::{Schema, SchemaRef};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::fmt;
use std::iter::FusedIterator;
use std::sync::Arc;
use tracing::{debug, warn};

/// Reusable description of a partitioned read.
///
/// Cloning is cheap; every `read*` call produces an independent stream.
#[derive(Clone)]
pub struct ReadBuilder {
    options: Arc<ReadOptions>,
    filter: Filter,
    projection: Option<Arc<dyn SchemaResolver>>,
    discovery: Arc<dyn PartitionDiscovery>,
    factory: Arc<dyn ReaderFactory>,
}

impl Default for ReadBuilder {
    fn default() -> Self {
        Self {
            options: Arc::new(ReadOptions::default()),
            filter: Filter::Noop,
            projection: None,
            discovery: Arc::new(LocalDiscovery),
            factory: Arc::new(ParquetReaderFactory),
        }
    }
}

impl fmt::Debug for ReadBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadBuilder")
            .field("options", &self.options)
            .field("filter", &self.filter)
            .field("projection", &self.projection.is_some())
            .finish_non_exhaustive()
    }
}

impl ReadBuilder {
    /// Local Parquet reads with default options and no filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn options(mut self, options: ReadOptions) -> Self {
        self.options = Arc::new(options);
        self
    }

    /// Row filter; combined with any previously set filter by `AND`.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = std::mem::take(&mut self.filter).and(filter);
        self
    }

    #[must_use]
    pub fn projection(mut self, resolver: impl SchemaResolver + 'static) -> Self {
        self.projection = Some(Arc::new(resolver));
        self
    }

    /// Read only the named top-level columns.
    #[must_use]
    pub fn columns<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection(ColumnProjection::new(columns))
    }

    /// Read only the columns `T` deserializes.
    #[must_use]
    pub fn project_as<T: DeserializeOwned + 'static>(self) -> Self {
        self.projection(TypedProjection::<T>::new())
    }

    #[must_use]
    pub fn discovery(mut self, discovery: impl PartitionDiscovery + 'static) -> Self {
        self.discovery = Arc::new(discovery);
        self
    }

    #[must_use]
    pub fn reader_factory(mut self, factory: impl ReaderFactory + 'static) -> Self {
        self.factory = Arc::new(factory);
        self
    }

    /// Stream raw records.
    pub fn read(&self, path: impl Into<String>) -> PartitionedStream<RowRecord> {
        self.read_with(path, RowRecordDecoder)
    }

    /// Stream records deserialized into `T`.
    ///
    /// Unless a projection was set, only the columns a struct `T` names are
    /// read, and a field of `T` missing from the dataset fails the read with
    /// [`ReadError::SchemaResolution`]. Types without fixed fields, such as
    /// maps, read every column.
    pub fn read_as<T>(&self, path: impl Into<String>) -> PartitionedStream<T>
    where
        T: DeserializeOwned + 'static,
    {
        let builder = match &self.projection {
            Some(_) => self.clone(),
            None if TypedProjection::<T>::traced_fields().is_ok() => {
                self.clone().project_as::<T>()
            }
            None => {
                debug!(
                    target_type = std::any::type_name::<T>(),
                    "type has no fixed fields, reading every column"
                );
                self.clone()
            }
        };
        builder.read_with(path, SerdeDecoder::<T>::new())
    }

    /// Stream records through a custom decoder.
    pub fn read_with<T, D>(&self, path: impl Into<String>, decoder: D) -> PartitionedStream<T>
    where
        D: RecordDecoder<T> + 'static,
    {
        PartitionedStream {
            path: path.into(),
            codec: ValueCodecConfiguration::from_options(&self.options),
            config: self.clone(),
            decoder: Box::new(decoder),
            state: State::NotStarted,
            stats: ReadStats::default(),
        }
    }
}

/// Deserialize every record under `path` into `T` with default options.
pub fn read_partitioned<T>(path: impl Into<String>) -> PartitionedStream<T>
where
    T: DeserializeOwned + 'static,
{
    ReadBuilder::new().read_as(path)
}

/// Counters of one stream's progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReadStats {
    pub partitions_discovered: usize,
    pub partitions_pruned: usize,
    pub partitions_opened: usize,
    pub partitions_closed: usize,
    pub records_yielded: usize,
}

/// Observable lifecycle of a [`PartitionedStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    NotStarted,
    Streaming,
    DiscoveryFailed,
    Failed,
    Exhausted,
}

impl StreamState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::DiscoveryFailed | Self::Failed | Self::Exhausted)
    }
}

struct Streaming {
    pending: VecDeque<(PushdownPredicate, PartitionedPath)>,
    /// Resolved projection minus partition columns.
    file_projection: Option<SchemaRef>,
    cursor: Option<PartitionCursor>,
}

enum State {
    NotStarted,
    Streaming(Streaming),
    DiscoveryFailed,
    Failed,
    Exhausted,
}

/// Lazy, fused iterator over the records of a partitioned dataset.
///
/// At most one file reader is open at a time; dropping the stream releases
/// it.
pub struct PartitionedStream<T> {
    path: String,
    config: ReadBuilder,
    codec: ValueCodecConfiguration,
    decoder: Box<dyn RecordDecoder<T>>,
    state: State,
    stats: ReadStats,
}

impl<T> PartitionedStream<T> {
    #[must_use]
    pub const fn state(&self) -> StreamState {
        match self.state {
            State::NotStarted => StreamState::NotStarted,
            State::Streaming(_) => StreamState::Streaming,
            State::DiscoveryFailed => StreamState::DiscoveryFailed,
            State::Failed => StreamState::Failed,
            State::Exhausted => StreamState::Exhausted,
        }
    }

    #[must_use]
    pub const fn stats(&self) -> &ReadStats {
        &self.stats
    }

    /// Root path this stream reads.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Drain the stream, stopping at the first error.
    ///
    /// # Errors
    /// Returns the error that terminated the stream.
    pub fn collect_vec(self) -> Result<Vec<T>, ReadError> {
        self.collect()
    }

    fn start(&mut self) -> Result<(), ReadError> {
        let directory = match self.config.discovery.discover(&self.path, &self.config.options) {
            Ok(directory) => directory,
            Err(e) => {
                self.state = State::DiscoveryFailed;
                return Err(ReadError::discovery(&self.path, e));
            }
        };
        self.stats.partitions_discovered = directory.partitions().len();
        self.codec = self
            .codec
            .clone()
            .with_partition_types(directory.schema(), &directory.partition_columns());

        match self.plan(&directory) {
            Ok(streaming) => {
                self.stats.partitions_pruned =
                    self.stats.partitions_discovered - streaming.pending.len();
                debug!(
                    path = %self.path,
                    admitted = streaming.pending.len(),
                    pruned = self.stats.partitions_pruned,
                    "stream planned"
                );
                self.state = State::Streaming(streaming);
                Ok(())
            }
            Err(e) => {
                self.state = State::Failed;
                Err(e)
            }
        }
    }

    fn plan(&self, directory: &PartitionedDirectory) -> Result<Streaming, ReadError> {
        // nothing to read, so nothing to resolve against
        if directory.partitions().is_empty() {
            return Ok(Streaming {
                pending: VecDeque::new(),
                file_projection: None,
                cursor: None,
            });
        }

        let file_projection = match &self.config.projection {
            Some(resolver) => {
                let resolved = resolver
                    .resolve(directory.schema())
                    .map_err(ReadError::schema_resolution)?;
                let partition_columns = directory.partition_columns();
                let fields: Vec<_> = resolved
                    .fields()
                    .iter()
                    .filter(|f| !partition_columns.contains(&f.name().as_str()))
                    .cloned()
                    .collect();
                Some(Arc::new(Schema::new(fields)))
            }
            None => None,
        };

        let admitted = partition_filter(&self.config.filter, &self.codec, directory)
            .map_err(ReadError::filter_compilation)?;
        Ok(Streaming {
            pending: admitted.into(),
            file_projection,
            cursor: None,
        })
    }

    /// Next decoded record, opening partitions as earlier ones drain.
    fn advance(&mut self) -> Result<Option<T>, ReadError> {
        let State::Streaming(streaming) = &mut self.state else {
            return Ok(None);
        };
        loop {
            if let Some(cursor) = streaming.cursor.as_mut() {
                if let Some(record) = cursor.next_record()? {
                    let partition = cursor.partition();
                    let record = inject(partition, record, &self.codec)?;
                    let value = self
                        .decoder
                        .decode(record, &self.codec)
                        .map_err(|e| ReadError::decode(partition.path(), e))?;
                    self.stats.records_yielded += 1;
                    return Ok(Some(value));
                }
                if let Some(mut drained) = streaming.cursor.take() {
                    self.stats.partitions_closed += 1;
                    drained.close()?;
                }
            }

            let Some((pushdown, partition)) = streaming.pending.pop_front() else {
                return Ok(None);
            };
            let cursor = open_partition_reader(
                self.config.factory.as_ref(),
                &self.config.options,
                &pushdown,
                &partition,
                streaming.file_projection.as_ref(),
            )?;
            self.stats.partitions_opened += 1;
            streaming.cursor = Some(cursor);
        }
    }

    /// Move to `terminal`, releasing any open reader.
    fn finish(&mut self, terminal: State) {
        if let State::Streaming(streaming) = std::mem::replace(&mut self.state, terminal)
            && let Some(mut cursor) = streaming.cursor
        {
            self.stats.partitions_closed += 1;
            if let Err(e) = cursor.close() {
                warn!(error = %e, "reader failed to close after stream error");
            }
        }
    }
}

impl<T> Iterator for PartitionedStream<T> {
    type Item = Result<T, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if matches!(self.state, State::NotStarted)
            && let Err(e) = self.start()
        {
            debug!(path = %self.path, error = %e, "stream failed to start");
            return Some(Err(e));
        }
        if !matches!(self.state, State::Streaming(_)) {
            return None;
        }
        match self.advance() {
            Ok(Some(value)) => Some(Ok(value)),
            Ok(None) => {
                self.finish(State::Exhausted);
                debug!(path = %self.path, stats = ?self.stats, "stream exhausted");
                None
            }
            Err(e) => {
                self.finish(State::Failed);
                debug!(path = %self.path, error = %e, "stream failed");
                Some(Err(e))
            }
        }
    }
}

impl<T> FusedIterator for PartitionedStream<T> {}

impl<T> fmt::Debug for PartitionedStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionedStream")
            .field("path", &self.path)
            .field("state", &self.state())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::col;
    use crate::io::RecordReader;
    use crate::testing::CountingReaderFactory;
    use crate::value::Value;
    use anyhow::{Result, anyhow};
    use arrow::datatypes::{DataType, Field};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Two partitions of `rows` records each, without touching the disk.
    struct FakeDiscovery {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl PartitionDiscovery for FakeDiscovery {
        fn discover(&self, path: &str, _: &ReadOptions) -> Result<PartitionedDirectory> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("no such directory {path}"));
            }
            let schema = Arc::new(Schema::new(vec![
                Field::new("n", DataType::Int64, false),
                Field::new("year", DataType::Int64, true),
            ]));
            PartitionedDirectory::new(
                schema,
                vec![
                    PartitionedPath::new("/d/year=2020/a", vec![("year".into(), "2020".into())]),
                    PartitionedPath::new("/d/year=2021/a", vec![("year".into(), "2021".into())]),
                ],
            )
        }
    }

    struct Counter(i64);

    impl RecordReader for Counter {
        fn read_next(&mut self) -> Result<Option<RowRecord>> {
            if self.0 == 0 {
                return Ok(None);
            }
            self.0 -= 1;
            Ok(Some(RowRecord::from_iter([("n", self.0)])))
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct CounterFactory(i64);

    impl ReaderFactory for CounterFactory {
        fn open(
            &self,
            _: &Path,
            _: &PushdownPredicate,
            _: Option<&SchemaRef>,
            _: &ReadOptions,
        ) -> Result<Box<dyn RecordReader>, ReadError> {
            Ok(Box::new(Counter(self.0)))
        }
    }

    fn builder(calls: &Arc<AtomicUsize>, fail: bool) -> (ReadBuilder, crate::testing::ReaderCounters) {
        let factory = CountingReaderFactory::new(CounterFactory(2));
        let counters = factory.counters();
        let builder = ReadBuilder::new()
            .discovery(FakeDiscovery {
                calls: Arc::clone(calls),
                fail,
            })
            .reader_factory(factory);
        (builder, counters)
    }

    #[test]
    fn discovery_is_deferred_to_first_pull() -> Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let (builder, _) = builder(&calls, false);
        let mut stream = builder.read("/d");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(stream.state(), StreamState::NotStarted);
        assert!(stream.next().transpose()?.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(stream.state(), StreamState::Streaming);
        Ok(())
    }

    #[test]
    fn concatenates_partitions_and_injects_values() -> Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let (builder, counters) = builder(&calls, false);
        let mut stream = builder.read("/d");
        let records: Vec<RowRecord> = stream.by_ref().collect::<Result<_, _>>()?;
        let pairs: Vec<_> = records
            .iter()
            .map(|r| (r.get("year").cloned(), r.get("n").cloned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (Some(Value::Long(2020)), Some(Value::Long(1))),
                (Some(Value::Long(2020)), Some(Value::Long(0))),
                (Some(Value::Long(2021)), Some(Value::Long(1))),
                (Some(Value::Long(2021)), Some(Value::Long(0))),
            ]
        );
        assert_eq!(stream.state(), StreamState::Exhausted);
        assert_eq!(
            *stream.stats(),
            ReadStats {
                partitions_discovered: 2,
                partitions_pruned: 0,
                partitions_opened: 2,
                partitions_closed: 2,
                records_yielded: 4,
            }
        );
        assert_eq!(counters.opened(), 2);
        assert_eq!(counters.closed(), 2);
        Ok(())
    }

    #[test]
    fn pruned_partitions_are_never_opened() -> Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let (builder, counters) = builder(&calls, false);
        let mut stream = builder.filter(col("year").eq(2021)).read("/d");
        assert_eq!(stream.by_ref().count(), 2);
        assert_eq!(stream.stats().partitions_pruned, 1);
        assert_eq!(counters.opened(), 1);
        Ok(())
    }

    #[test]
    fn discovery_failure_is_yielded_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (builder, counters) = builder(&calls, true);
        let mut stream = builder.read("/missing");
        let err = stream.next().and_then(Result::err).map(|e| e.kind());
        assert_eq!(err, Some(crate::error::ErrorKind::Discovery));
        assert!(stream.next().is_none());
        assert!(stream.next().is_none());
        assert_eq!(stream.state(), StreamState::DiscoveryFailed);
        assert_eq!(counters.opened(), 0);
    }

    #[test]
    fn decode_failure_terminates_and_releases_reader() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (builder, counters) = builder(&calls, false);
        let failing = crate::decode::FnDecoder(|r: RowRecord, _: &ValueCodecConfiguration| {
            match r.get("n") {
                Some(Value::Long(0)) => Err(anyhow!("zero is not allowed")),
                _ => Ok(()),
            }
        });
        let results: Vec<_> = builder.read_with("/d", failing).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert_eq!(
            results[1].as_ref().err().map(ReadError::kind),
            Some(crate::error::ErrorKind::Decode)
        );
        assert_eq!(counters.opened(), 1);
        assert_eq!(counters.closed(), 1);
    }

    #[test]
    fn dropping_mid_partition_closes_the_reader() -> Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let (builder, counters) = builder(&calls, false);
        let mut stream = builder.read("/d");
        stream.next().transpose()?;
        assert_eq!(counters.open_now(), 1);
        drop(stream);
        assert_eq!(counters.open_now(), 0);
        assert_eq!(counters.opened(), 1);
        Ok(())
    }
}
