//! Error type surfaced by partitioned streams.
//!
//! Every failure of a read call ends up as one [`ReadError`] yielded by the
//! stream, after which the stream is terminated. Collaborators work with
//! [`anyhow::Result`] internally and are classified into a variant at the
//! boundary of the component that called them.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Terminal failure of a partitioned read.
#[derive(Error, Debug)]
pub enum ReadError {
    /// Root path is missing, unreadable, or inconsistently partitioned.
    #[error("partition discovery failed for {path}: {source:#}")]
    Discovery {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    /// Requested projection cannot be resolved against the dataset schema.
    #[error("schema resolution failed: {source:#}")]
    SchemaResolution {
        #[source]
        source: anyhow::Error,
    },

    /// Filter references unknown columns or cannot be compiled for pushdown.
    #[error("filter compilation failed: {source:#}")]
    FilterCompilation {
        #[source]
        source: anyhow::Error,
    },

    /// A partition's file reader could not be opened.
    #[error("cannot open reader for {}: {source:#}", path.display())]
    ReaderOpen {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Pulling rows from an already opened reader failed.
    #[error("read failed in {}: {source:#}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// A partition value could not be set on a record.
    #[error("cannot inject partition column `{column}` for {}: {source:#}", path.display())]
    Injection {
        path: PathBuf,
        column: String,
        #[source]
        source: anyhow::Error,
    },

    /// A record could not be converted into the requested type.
    #[error("cannot decode record from {}: {source:#}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

/// Coarse classification of a [`ReadError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Discovery,
    SchemaResolution,
    FilterCompilation,
    ReaderOpen,
    Read,
    Injection,
    Decode,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl ReadError {
    pub fn discovery(path: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Discovery {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn schema_resolution(source: impl Into<anyhow::Error>) -> Self {
        Self::SchemaResolution {
            source: source.into(),
        }
    }

    pub fn filter_compilation(source: impl Into<anyhow::Error>) -> Self {
        Self::FilterCompilation {
            source: source.into(),
        }
    }

    pub fn reader_open(path: impl AsRef<Path>, source: impl Into<anyhow::Error>) -> Self {
        Self::ReaderOpen {
            path: path.as_ref().to_path_buf(),
            source: source.into(),
        }
    }

    pub fn read(path: impl AsRef<Path>, source: impl Into<anyhow::Error>) -> Self {
        Self::Read {
            path: path.as_ref().to_path_buf(),
            source: source.into(),
        }
    }

    pub fn decode(path: impl AsRef<Path>, source: impl Into<anyhow::Error>) -> Self {
        Self::Decode {
            path: path.as_ref().to_path_buf(),
            source: source.into(),
        }
    }

    /// The kind of failure, useful for matching without destructuring.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Discovery { .. } => ErrorKind::Discovery,
            Self::SchemaResolution { .. } => ErrorKind::SchemaResolution,
            Self::FilterCompilation { .. } => ErrorKind::FilterCompilation,
            Self::ReaderOpen { .. } => ErrorKind::ReaderOpen,
            Self::Read { .. } => ErrorKind::Read,
            Self::Injection { .. } => ErrorKind::Injection,
            Self::Decode { .. } => ErrorKind::Decode,
        }
    }
}
