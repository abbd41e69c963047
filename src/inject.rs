//! Partition value injection.

use crate::codec::ValueCodecConfiguration;
use crate::discovery::PartitionedPath;
use crate::error::ReadError;
use crate::value::{ColumnPath, RowRecord};

/// Set every partition column of `partition` on `record`.
///
/// Pairs are applied in path order, so a column repeated deeper in the tree
/// wins. Dotted names address nested records. Values are encoded with the
/// column types pinned on `codec`, so a column has one type in every record.
///
/// # Errors
/// Returns [`ReadError::Injection`] if a column name is not a valid path.
pub fn inject(
    partition: &PartitionedPath,
    record: RowRecord,
    codec: &ValueCodecConfiguration,
) -> Result<RowRecord, ReadError> {
    partition
        .partitions()
        .iter()
        .try_fold(record, |record, (column, raw)| {
            let path = ColumnPath::parse(column).map_err(|source| ReadError::Injection {
                path: partition.path().to_path_buf(),
                column: column.clone(),
                source,
            })?;
            Ok(record.with_value(&path, codec.encode_partition_column(column, raw)))
        })
}
