//! Partition discovery over a local directory tree.
//!
//! A dataset root is either a single data file or a directory. Directories are
//! walked in lexicographic order; subdirectories must be Hive-style
//! `column=value` segments, and every level must use a single column name.
//! Each data file found becomes one [`PartitionedPath`] carrying the
//! `(column, value)` pairs collected on the way down.
//!
//! # Example
//!
//! ```no_run
//! use hivequet::discovery::{LocalDiscovery, PartitionDiscovery};
//! use hivequet::ReadOptions;
//!
//! let dir = LocalDiscovery.discover("data/events", &ReadOptions::default())?;
//! for p in dir.partitions() {
//!     println!("{} {:?}", p.path().display(), p.partitions());
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::codec::ValueCodecConfiguration;
use crate::io::parquet::read_parquet_schema;
use crate::options::ReadOptions;
use anyhow::{Context, Result, bail, ensure};
use arrow::datatypes::{Field, Schema, SchemaRef};
use percent_encoding::percent_decode_str;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A data file and the partition values implied by its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionedPath {
    path: PathBuf,
    partitions: Vec<(String, String)>,
}

impl PartitionedPath {
    pub fn new(path: impl Into<PathBuf>, partitions: Vec<(String, String)>) -> Self {
        Self {
            path: path.into(),
            partitions,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `(column, raw value)` pairs, outermost directory first.
    #[must_use]
    pub fn partitions(&self) -> &[(String, String)] {
        &self.partitions
    }

    /// Raw value of a partition column, if this path has it.
    #[must_use]
    pub fn value_of(&self, column: &str) -> Option<&str> {
        self.partitions
            .iter()
            .rev()
            .find_map(|(c, v)| (c == column).then_some(v.as_str()))
    }

    fn columns(&self) -> impl Iterator<Item = &str> {
        self.partitions.iter().map(|(c, _)| c.as_str())
    }
}

/// Result of discovery: the dataset schema and its data files in read order.
#[derive(Debug, Clone)]
pub struct PartitionedDirectory {
    schema: SchemaRef,
    partitions: Vec<PartitionedPath>,
}

impl PartitionedDirectory {
    /// Build a directory, checking that every entry uses the same partition
    /// columns in the same order.
    ///
    /// # Errors
    /// Returns an error if two entries disagree on their partition columns.
    pub fn new(schema: SchemaRef, partitions: Vec<PartitionedPath>) -> Result<Self> {
        if let Some(first) = partitions.first() {
            let expected: Vec<&str> = first.columns().collect();
            for p in &partitions[1..] {
                let got: Vec<&str> = p.columns().collect();
                ensure!(
                    got == expected,
                    "inconsistent partition columns: {} has {:?} but {} has {:?}",
                    first.path().display(),
                    expected,
                    p.path().display(),
                    got
                );
            }
        }
        Ok(Self { schema, partitions })
    }

    /// Base schema: file columns followed by partition columns.
    #[must_use]
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    #[must_use]
    pub fn partitions(&self) -> &[PartitionedPath] {
        &self.partitions
    }

    /// Names of the partition columns shared by every entry.
    #[must_use]
    pub fn partition_columns(&self) -> Vec<&str> {
        self.partitions
            .first()
            .map(|p| p.columns().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_partitioned(&self) -> bool {
        !self.partition_columns().is_empty()
    }

    pub fn into_partitions(self) -> Vec<PartitionedPath> {
        self.partitions
    }
}

/// Finds the data files of a dataset and the partition values of each.
pub trait PartitionDiscovery: Send + Sync {
    /// Discover the dataset rooted at `path`.
    ///
    /// # Errors
    /// Returns an error if the root cannot be read or is inconsistently
    /// partitioned.
    fn discover(&self, path: &str, options: &ReadOptions) -> Result<PartitionedDirectory>;
}

/// Discovery over the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDiscovery;

impl PartitionDiscovery for LocalDiscovery {
    fn discover(&self, path: &str, options: &ReadOptions) -> Result<PartitionedDirectory> {
        let root = resolve_local_path(path)?;
        let meta = fs::metadata(&root).with_context(|| format!("stat {}", root.display()))?;

        let mut found = Vec::new();
        if meta.is_file() {
            found.push(PartitionedPath::new(root.clone(), Vec::new()));
        } else {
            walk(&root, &mut Vec::new(), options, &mut found)?;
        }

        let schema = match found.first() {
            Some(first) => {
                let file_schema = read_parquet_schema(first.path())?;
                with_partition_fields(&file_schema, &found, options)
            }
            None => Arc::new(Schema::empty()),
        };
        let directory = PartitionedDirectory::new(schema, found)?;
        debug!(
            root = %root.display(),
            files = directory.partitions().len(),
            columns = ?directory.partition_columns(),
            "discovered dataset"
        );
        Ok(directory)
    }
}

/// Accept plain paths and `file://` URIs.
fn resolve_local_path(path: &str) -> Result<PathBuf> {
    match path.split_once("://") {
        None => Ok(PathBuf::from(path)),
        Some(("file", rest)) => Ok(PathBuf::from(rest)),
        Some((scheme, _)) => bail!("unsupported filesystem scheme `{scheme}` in {path}"),
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('_') || name.starts_with('.')
}

fn walk(
    dir: &Path,
    prefix: &mut Vec<(String, String)>,
    options: &ReadOptions,
    out: &mut Vec<PartitionedPath>,
) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("list {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("list {}", dir.display()))?;
    entries.sort_by_key(fs::DirEntry::file_name);

    let mut files = Vec::new();
    let mut subdirs = Vec::new();
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if options.fs.skip_hidden && is_hidden(&name) {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            subdirs.push((name, path));
        } else if options
            .fs
            .file_extension
            .as_deref()
            .is_none_or(|ext| path.extension().is_some_and(|e| e == ext))
        {
            files.push(path);
        }
    }

    ensure!(
        files.is_empty() || subdirs.is_empty(),
        "{} mixes data files and subdirectories",
        dir.display()
    );

    for file in files {
        out.push(PartitionedPath::new(file, prefix.clone()));
    }

    let mut level_column: Option<String> = None;
    for (name, path) in subdirs {
        let (column, value) = parse_segment(&name)
            .with_context(|| format!("in {}", dir.display()))?;
        match &level_column {
            Some(expected) if *expected != column => bail!(
                "inconsistent partition columns under {}: `{expected}` and `{column}`",
                dir.display()
            ),
            Some(_) => {}
            None => {
                ensure!(
                    prefix.iter().all(|(c, _)| *c != column),
                    "partition column `{column}` repeats below {}",
                    dir.display()
                );
                level_column = Some(column.clone());
            }
        }
        prefix.push((column, value));
        let walked = walk(&path, prefix, options, out);
        prefix.pop();
        walked?;
    }
    Ok(())
}

/// Split a `column=value` directory name, percent-decoding both halves.
fn parse_segment(name: &str) -> Result<(String, String)> {
    let Some((column, value)) = name.split_once('=') else {
        bail!("directory `{name}` is not a `column=value` partition");
    };
    ensure!(!column.is_empty(), "directory `{name}` has an empty partition column");
    let decode = |s: &str| -> Result<String> {
        Ok(percent_decode_str(s)
            .decode_utf8()
            .with_context(|| format!("partition segment `{name}` is not valid UTF-8"))?
            .into_owned())
    };
    Ok((decode(column)?, decode(value)?))
}

/// Append one field per partition column, typed over the values of every
/// entry rather than just the first.
fn with_partition_fields(
    file_schema: &Schema,
    found: &[PartitionedPath],
    options: &ReadOptions,
) -> SchemaRef {
    let codec = ValueCodecConfiguration::from_options(options);
    let mut fields: Vec<Field> = file_schema
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect();
    let columns: Vec<&str> = found
        .first()
        .map(|p| p.columns().collect())
        .unwrap_or_default();
    for column in columns {
        if fields.iter().any(|f| f.name() == column) {
            continue;
        }
        let data_type =
            codec.resolve_partition_type(found.iter().filter_map(|p| p.value_of(column)));
        fields.push(Field::new(column, data_type, true));
    }
    Arc::new(Schema::new_with_metadata(
        fields,
        file_schema.metadata().clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::DataType;

    #[test]
    fn parses_and_decodes_segments() -> Result<()> {
        assert_eq!(
            parse_segment("year=2021")?,
            ("year".to_owned(), "2021".to_owned())
        );
        assert_eq!(
            parse_segment("ts=2021-01-01%2010%3A00%3A00")?,
            ("ts".to_owned(), "2021-01-01 10:00:00".to_owned())
        );
        assert_eq!(parse_segment("a=b=c")?, ("a".to_owned(), "b=c".to_owned()));
        assert!(parse_segment("plain").is_err());
        assert!(parse_segment("=x").is_err());
        Ok(())
    }

    #[test]
    fn resolves_schemes() -> Result<()> {
        assert_eq!(resolve_local_path("/a/b")?, PathBuf::from("/a/b"));
        assert_eq!(resolve_local_path("file:///a/b")?, PathBuf::from("/a/b"));
        assert!(resolve_local_path("s3://bucket/key").is_err());
        Ok(())
    }

    #[test]
    fn directory_rejects_mismatched_columns() {
        let a = PartitionedPath::new("/d/x=1/f", vec![("x".into(), "1".into())]);
        let b = PartitionedPath::new("/d/y=1/f", vec![("y".into(), "1".into())]);
        assert!(PartitionedDirectory::new(Arc::new(Schema::empty()), vec![a, b]).is_err());
    }

    #[test]
    fn value_of_is_last_write_wins() {
        let p = PartitionedPath::new(
            "/d/f",
            vec![("x".into(), "1".into()), ("x".into(), "2".into())],
        );
        assert_eq!(p.value_of("x"), Some("2"));
        assert_eq!(p.value_of("y"), None);
    }

    #[test]
    fn partition_types_span_every_entry() {
        let file_schema = Schema::new(vec![Field::new("id", DataType::Int64, false)]);
        let found = vec![
            PartitionedPath::new("/d/code=007/f", vec![("code".into(), "007".into())]),
            PartitionedPath::new("/d/code=123/f", vec![("code".into(), "123".into())]),
        ];
        let schema = with_partition_fields(&file_schema, &found, &ReadOptions::default());
        assert_eq!(
            schema.field_with_name("code").map(|f| f.data_type().clone()).ok(),
            Some(DataType::Utf8)
        );
    }

    #[test]
    fn missing_root_fails() {
        let err = LocalDiscovery
            .discover("/definitely/not/here", &ReadOptions::default())
            .unwrap_err();
        assert!(format!("{err:#}").contains("/definitely/not/here"));
    }
}
