//! Test support for partitioned reads.
//!
//! - [`HiveFixture`] builds Hive-style `column=value` trees of Parquet files
//!   in a temporary directory.
//! - [`CountingReaderFactory`] wraps any [`ReaderFactory`](crate::io::ReaderFactory)
//!   and counts opened and closed readers, so tests can assert that every
//!   reader is released exactly once.
//!
//! # Quick Start
//!
//! ```no_run
//! use hivequet::ReadBuilder;
//! use hivequet::testing::{CountingReaderFactory, HiveFixture};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Row {
//!     id: i64,
//! }
//!
//! # fn main() -> anyhow::Result<()> {
//! let fixture = HiveFixture::new()?;
//! fixture.write_partition(&[("year", "2021")], "part-0.parquet", &[Row { id: 1 }])?;
//!
//! let factory = CountingReaderFactory::parquet();
//! let counters = factory.counters();
//! let rows = ReadBuilder::new()
//!     .reader_factory(factory)
//!     .read(fixture.uri())
//!     .collect_vec()?;
//! assert_eq!(rows.len(), 1);
//! assert_eq!(counters.opened(), counters.closed());
//! # Ok(())
//! # }
//! ```

pub mod counting;
pub mod fixtures;

pub use counting::*;
pub use fixtures::*;
