//! Temporary Hive-style datasets.

use anyhow::{Context, Result};
use arrow::datatypes::FieldRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_arrow::schema::{SchemaLike, TracingOptions};
use serde_arrow::to_record_batch;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Characters escaped in partition directory names.
const PARTITION_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b':')
    .add(b'=')
    .add(b'?')
    .add(b'\\');

/// Write `rows` to a single-row-group Parquet file, with the schema inferred
/// from `T`. Works for zero rows.
///
/// # Errors
/// Returns an error if the schema cannot be inferred or the file cannot be
/// written.
pub fn write_parquet_vec<T: Serialize + DeserializeOwned>(
    path: impl AsRef<Path>,
    rows: &[T],
) -> Result<usize> {
    let path = path.as_ref();
    let fields: Vec<FieldRef> = Vec::<FieldRef>::from_type::<T>(TracingOptions::default())
        .context("infer Arrow schema from type T")?;
    let batch = to_record_batch(&fields, &rows).context("convert rows to RecordBatch")?;
    write_batch(path, &batch)?;
    Ok(rows.len())
}

/// Write one Arrow batch as a Parquet file.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_batch(path: impl AsRef<Path>, batch: &RecordBatch) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let props = WriterProperties::builder().build();
    let mut writer =
        ArrowWriter::try_new(file, batch.schema(), Some(props)).context("create ArrowWriter")?;
    writer.write(batch).context("write batch to parquet")?;
    writer.close().context("close ArrowWriter")?;
    Ok(())
}

/// A dataset root in a temporary directory, removed on drop.
pub struct HiveFixture {
    dir: TempDir,
}

impl HiveFixture {
    /// # Errors
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new().context("create fixture directory")?,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Root as a `file://` URI.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("file://{}", self.root().display())
    }

    /// Directory for `partitions`, e.g. `root/year=2021/region=eu`, with
    /// values escaped the way Hive escapes them.
    #[must_use]
    pub fn partition_dir(&self, partitions: &[(&str, &str)]) -> PathBuf {
        partitions
            .iter()
            .fold(self.root().to_path_buf(), |dir, (column, value)| {
                dir.join(format!(
                    "{}={}",
                    utf8_percent_encode(column, PARTITION_ESCAPES),
                    utf8_percent_encode(value, PARTITION_ESCAPES)
                ))
            })
    }

    /// Write `rows` as `file_name` inside the partition directory.
    ///
    /// # Errors
    /// Returns an error if the directory or the file cannot be written.
    pub fn write_partition<T: Serialize + DeserializeOwned>(
        &self,
        partitions: &[(&str, &str)],
        file_name: &str,
        rows: &[T],
    ) -> Result<PathBuf> {
        let dir = self.partition_dir(partitions);
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        let path = dir.join(file_name);
        write_parquet_vec(&path, rows)?;
        Ok(path)
    }

    /// Write `rows` at a path relative to the root.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write_file<T: Serialize + DeserializeOwned>(
        &self,
        relative: impl AsRef<Path>,
        rows: &[T],
    ) -> Result<PathBuf> {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        write_parquet_vec(&path, rows)?;
        Ok(path)
    }

    /// Write raw bytes at a path relative to the root, e.g. a `_SUCCESS`
    /// marker or a corrupt data file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write_bytes(&self, relative: impl AsRef<Path>, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, bytes).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}
