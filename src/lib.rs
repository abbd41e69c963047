//! # Hivequet
//!
//! A **lazy, partition-aware reader** for Hive-style Parquet datasets.
//!
//! Hivequet reads a dataset laid out as `root/column=value/.../file.parquet`
//! as one ordered stream of records. Partition values encoded in directory
//! names are typed and injected into each record, filters prune whole
//! partitions before any file is opened, and the remaining predicate is
//! pushed down into the Parquet reader.
//!
//! ## Key Features
//!
//! - **Lazy streams** - nothing is listed or opened until the first pull
//! - **Partition pruning** - filters on partition columns drop directories up front
//! - **Pushdown** - residual filters become Parquet row filters; projections
//!   become column masks
//! - **Bounded resources** - at most one file reader open at a time, released
//!   exactly once on exhaustion, error or drop
//! - **Typed output** - stream [`RowRecord`]s or any `serde` type
//!
//! ## Quick Start
//!
//! ```no_run
//! use hivequet::{ReadBuilder, ReadOptions, col};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Sale {
//!     id: i64,
//!     amount: f64,
//!     year: i64,
//! }
//!
//! # fn main() -> Result<(), hivequet::ReadError> {
//! let sales = ReadBuilder::new()
//!     .options(ReadOptions::new().with_batch_size(1024))
//!     .filter(col("year").eq(2021) & col("amount").gt(100.0))
//!     .read_as::<Sale>("data/sales");
//!
//! for sale in sales {
//!     println!("{:?}", sale?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Discovery
//!
//! A [`PartitionDiscovery`] lists the data files under a root and the
//! `(column, value)` pairs each one's location implies. [`LocalDiscovery`]
//! walks the local filesystem in lexicographic order, which fixes the output
//! order of every read.
//!
//! ### Filters
//!
//! A [`Filter`] built with [`col`] is split per partition: conjuncts decided by
//! the partition's values are folded away, and whatever still depends on file
//! columns is handed to the reader as a [`PushdownPredicate`].
//!
//! ### Streams
//!
//! [`PartitionedStream`] is a fused `Iterator<Item = Result<T, ReadError>>`.
//! The first error ends it. Discovery failures are reported on the first pull;
//! a filter that excludes every partition simply yields nothing.
//!
//! ## Logging
//!
//! The crate emits `tracing` events (`debug` for discovery, planning and
//! reader lifecycle, `trace` for pruned partitions and batches). Install any
//! subscriber to see them.

pub mod codec;
pub mod decode;
pub mod discovery;
pub mod error;
pub mod filter;
pub mod inject;
pub mod io;
pub mod options;
pub mod reader;
pub mod schema;
pub mod stream;
pub mod testing;
pub mod value;

pub use codec::ValueCodecConfiguration;
pub use decode::{FnDecoder, RecordDecoder, RowRecordDecoder, SerdeDecoder};
pub use discovery::{LocalDiscovery, PartitionDiscovery, PartitionedDirectory, PartitionedPath};
pub use error::{ErrorKind, ReadError};
pub use filter::{CompareOp, Filter, PushdownPredicate, col, partition_filter};
pub use io::parquet::ParquetReaderFactory;
pub use io::{ReaderFactory, RecordReader};
pub use options::{CodecOptions, FileSystemConfig, PartitionEncoding, ReadOptions};
pub use reader::{PartitionCursor, open_partition_reader};
pub use schema::{ColumnProjection, ExplicitSchema, SchemaResolver, TypedProjection};
pub use stream::{PartitionedStream, ReadBuilder, ReadStats, StreamState, read_partitioned};
pub use value::{ColumnPath, RowRecord, Value};
