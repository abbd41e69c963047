//! Read configuration.
//!
//! A [`ReadOptions`] bundle applies uniformly to every partition of one read
//! call. It is plain data: build it with the `with_*` methods or load it from
//! JSON, then hand it to a [`ReadBuilder`](crate::ReadBuilder).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Filesystem-facing settings used by discovery and the file readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSystemConfig {
    /// Rows per Arrow batch pulled from a Parquet file.
    pub batch_size: usize,
    /// Skip files and directories whose name starts with `_` or `.`.
    pub skip_hidden: bool,
    /// Only treat files with this extension (without the dot) as data files.
    pub file_extension: Option<String>,
}

impl Default for FileSystemConfig {
    fn default() -> Self {
        Self {
            batch_size: 8192,
            skip_hidden: true,
            file_extension: None,
        }
    }
}

/// How raw partition strings from directory names become typed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionEncoding {
    /// Recognize booleans, integers, decimals, dates and timestamps.
    #[default]
    Infer,
    /// Keep every partition value as a string.
    Raw,
}

/// Settings that affect value encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecOptions {
    pub partition_encoding: PartitionEncoding,
    /// `chrono` format used to recognize date partition values.
    pub date_format: String,
    /// `chrono` format used to recognize timestamp partition values.
    pub timestamp_format: String,
    /// Offset east of UTC, in seconds, for timestamps that carry no zone.
    pub utc_offset_secs: i32,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            partition_encoding: PartitionEncoding::Infer,
            date_format: "%Y-%m-%d".to_owned(),
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_owned(),
            utc_offset_secs: 0,
        }
    }
}

/// Immutable configuration for one read call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    pub fs: FileSystemConfig,
    pub codec: CodecOptions,
}

impl ReadOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from JSON; missing keys keep their defaults.
    ///
    /// # Errors
    /// Returns an error if `json` is not a valid options document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("parse read options")
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.fs.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_skip_hidden(mut self, skip: bool) -> Self {
        self.fs.skip_hidden = skip;
        self
    }

    #[must_use]
    pub fn with_file_extension(mut self, extension: impl Into<String>) -> Self {
        self.fs.file_extension = Some(extension.into());
        self
    }

    #[must_use]
    pub fn with_partition_encoding(mut self, encoding: PartitionEncoding) -> Self {
        self.codec.partition_encoding = encoding;
        self
    }

    #[must_use]
    pub fn with_timestamp_format(mut self, format: impl Into<String>) -> Self {
        self.codec.timestamp_format = format.into();
        self
    }

    #[must_use]
    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.codec.date_format = format.into();
        self
    }

    #[must_use]
    pub fn with_utc_offset_secs(mut self, secs: i32) -> Self {
        self.codec.utc_offset_secs = secs;
        self
    }
}
