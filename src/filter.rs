//! Filter expressions and partition pruning.
//!
//! A [`Filter`] is evaluated twice. First, [`partition_filter`] checks it
//! against every partition's directory values: predicates on partition columns
//! are decided right away, which either drops the partition or removes them
//! from the expression. Whatever remains refers only to columns stored in the
//! files and becomes that partition's [`PushdownPredicate`], applied by the
//! file reader while rows are decoded.
//!
//! ```
//! use hivequet::filter::{col, Filter};
//!
//! let f = col("year").eq(2021) & col("score").gt_eq(10.0);
//! assert_eq!(f.columns().len(), 2);
//! assert_eq!(Filter::Noop.and(col("a").is_null()), col("a").is_null());
//! assert_eq!(!Filter::Noop, Filter::Literal(Some(false)));
//! ```
//!
//! Null partition values follow SQL three-valued logic: a comparison against
//! null is unknown, `not unknown` is still unknown, and a partition whose
//! filter ends up unknown is pruned.

use crate::codec::{ValueCodecConfiguration, partition_data_type};
use crate::discovery::{PartitionedDirectory, PartitionedPath};
use crate::value::Value;
use anyhow::{Result, bail, ensure};
use arrow::datatypes::DataType;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use tracing::{debug, trace};

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    fn holds(self, ord: Ordering) -> bool {
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::NotEq => ord != Ordering::Equal,
            Self::Lt => ord == Ordering::Less,
            Self::LtEq => ord != Ordering::Greater,
            Self::Gt => ord == Ordering::Greater,
            Self::GtEq => ord != Ordering::Less,
        }
    }

    const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
        }
    }
}

/// A row filter over named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    /// Admits every row and contributes no pushdown predicate.
    #[default]
    Noop,
    /// A constant truth value; `None` is unknown and admits nothing.
    Literal(Option<bool>),
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
    },
    IsNull(String),
    IsNotNull(String),
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::Noop, f) | (f, Self::Noop) => f,
            (a, b) => Self::And(Box::new(a), Box::new(b)),
        }
    }

    /// Disjunction. `Noop` admits everything, so it absorbs the other side.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match (self, other) {
            (Self::Noop, _) | (_, Self::Noop) => Self::Noop,
            (a, b) => Self::Or(Box::new(a), Box::new(b)),
        }
    }

    #[must_use]
    pub const fn is_noop(&self) -> bool {
        matches!(self, Self::Noop)
    }

    /// Every column name the filter references.
    #[must_use]
    pub fn columns(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Self::Noop | Self::Literal(_) => {}
            Self::Compare { column, .. } | Self::In { column, .. } => {
                out.insert(column);
            }
            Self::IsNull(column) | Self::IsNotNull(column) => {
                out.insert(column);
            }
            Self::And(a, b) | Self::Or(a, b) => {
                a.collect_columns(out);
                b.collect_columns(out);
            }
            Self::Not(f) => f.collect_columns(out),
        }
    }
}

impl BitAnd for Filter {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.and(rhs)
    }
}

impl BitOr for Filter {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.or(rhs)
    }
}

impl Not for Filter {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            Self::Noop => Self::Literal(Some(false)),
            Self::Literal(v) => Self::Literal(v.map(|b| !b)),
            Self::Not(inner) => *inner,
            f => Self::Not(Box::new(f)),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Noop | Self::Literal(Some(true)) => f.write_str("true"),
            Self::Literal(Some(false)) => f.write_str("false"),
            Self::Literal(None) => f.write_str("null"),
            Self::Compare { column, op, value } => {
                write!(f, "{column} {} {value}", op.symbol())
            }
            Self::In { column, values } => {
                write!(f, "{column} in (")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str(")")
            }
            Self::IsNull(c) => write!(f, "{c} is null"),
            Self::IsNotNull(c) => write!(f, "{c} is not null"),
            Self::And(a, b) => write!(f, "({a} and {b})"),
            Self::Or(a, b) => write!(f, "({a} or {b})"),
            Self::Not(inner) => write!(f, "not {inner}"),
        }
    }
}

/// Column handle used to build predicates.
#[derive(Debug, Clone)]
pub struct Column(String);

/// Start a predicate on `name`.
pub fn col(name: impl Into<String>) -> Column {
    Column(name.into())
}

impl Column {
    fn compare(self, op: CompareOp, value: impl Into<Value>) -> Filter {
        Filter::Compare {
            column: self.0,
            op,
            value: value.into(),
        }
    }

    pub fn eq(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Eq, value)
    }

    pub fn not_eq(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::NotEq, value)
    }

    pub fn lt(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Lt, value)
    }

    pub fn lt_eq(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::LtEq, value)
    }

    pub fn gt(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Gt, value)
    }

    pub fn gt_eq(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::GtEq, value)
    }

    pub fn is_in<I, V>(self, values: I) -> Filter
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::In {
            column: self.0,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn is_null(self) -> Filter {
        Filter::IsNull(self.0)
    }

    #[must_use]
    pub fn is_not_null(self) -> Filter {
        Filter::IsNotNull(self.0)
    }
}

/// Predicate handed to a file reader.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PushdownPredicate {
    #[default]
    AcceptAll,
    /// Residual filter over stored columns only.
    Residual(Filter),
}

impl PushdownPredicate {
    #[must_use]
    pub const fn is_accept_all(&self) -> bool {
        matches!(self, Self::AcceptAll)
    }

    #[must_use]
    pub const fn filter(&self) -> Option<&Filter> {
        match self {
            Self::AcceptAll => None,
            Self::Residual(f) => Some(f),
        }
    }
}

/// Outcome of evaluating a filter against one partition's values.
#[derive(Debug, Clone, PartialEq)]
enum Reduced {
    Always,
    Never,
    /// Depends on a null partition value.
    Unknown,
    Residual(Filter),
}

/// `residual AND unknown` or `residual OR unknown`, left for the reader.
fn with_unknown(residual: Filter, join: fn(Box<Filter>, Box<Filter>) -> Filter) -> Reduced {
    Reduced::Residual(join(Box::new(residual), Box::new(Filter::Literal(None))))
}

fn reduce(filter: &Filter, values: &HashMap<&str, Value>) -> Reduced {
    let decided = |b: bool| if b { Reduced::Always } else { Reduced::Never };
    match filter {
        Filter::Noop | Filter::Literal(Some(true)) => Reduced::Always,
        Filter::Literal(Some(false)) => Reduced::Never,
        Filter::Literal(None) => Reduced::Unknown,
        Filter::Compare { column, op, value } => match values.get(column.as_str()) {
            Some(actual) if actual.is_null() || value.is_null() => Reduced::Unknown,
            Some(actual) => decided(
                actual
                    .compare(value)
                    .map_or(*op == CompareOp::NotEq, |ord| op.holds(ord)),
            ),
            None => Reduced::Residual(filter.clone()),
        },
        Filter::In { column, values: set } => match values.get(column.as_str()) {
            Some(actual) if actual.is_null() => Reduced::Unknown,
            Some(actual) => {
                if set.iter().any(|v| actual.compare(v) == Some(Ordering::Equal)) {
                    Reduced::Always
                } else if set.iter().any(Value::is_null) {
                    Reduced::Unknown
                } else {
                    Reduced::Never
                }
            }
            None => Reduced::Residual(filter.clone()),
        },
        Filter::IsNull(column) => values
            .get(column.as_str())
            .map_or_else(|| Reduced::Residual(filter.clone()), |v| decided(v.is_null())),
        Filter::IsNotNull(column) => values
            .get(column.as_str())
            .map_or_else(|| Reduced::Residual(filter.clone()), |v| decided(!v.is_null())),
        Filter::And(a, b) => match (reduce(a, values), reduce(b, values)) {
            (Reduced::Never, _) | (_, Reduced::Never) => Reduced::Never,
            (Reduced::Always, r) | (r, Reduced::Always) => r,
            (Reduced::Unknown, Reduced::Unknown) => Reduced::Unknown,
            (Reduced::Unknown, Reduced::Residual(r)) | (Reduced::Residual(r), Reduced::Unknown) => {
                with_unknown(r, Filter::And)
            }
            (Reduced::Residual(x), Reduced::Residual(y)) => {
                Reduced::Residual(Filter::And(Box::new(x), Box::new(y)))
            }
        },
        Filter::Or(a, b) => match (reduce(a, values), reduce(b, values)) {
            (Reduced::Always, _) | (_, Reduced::Always) => Reduced::Always,
            (Reduced::Never, r) | (r, Reduced::Never) => r,
            (Reduced::Unknown, Reduced::Unknown) => Reduced::Unknown,
            (Reduced::Unknown, Reduced::Residual(r)) | (Reduced::Residual(r), Reduced::Unknown) => {
                with_unknown(r, Filter::Or)
            }
            (Reduced::Residual(x), Reduced::Residual(y)) => {
                Reduced::Residual(Filter::Or(Box::new(x), Box::new(y)))
            }
        },
        Filter::Not(inner) => match reduce(inner, values) {
            Reduced::Always => Reduced::Never,
            Reduced::Never => Reduced::Always,
            Reduced::Unknown => Reduced::Unknown,
            Reduced::Residual(r) => Reduced::Residual(Filter::Not(Box::new(r))),
        },
    }
}

/// True if `filter` is false or unknown for every row, whatever the columns
/// hold.
fn never_true(filter: &Filter) -> bool {
    match filter {
        Filter::Literal(v) => *v != Some(true),
        Filter::And(a, b) => never_true(a) || never_true(b),
        Filter::Or(a, b) => never_true(a) && never_true(b),
        _ => false,
    }
}

/// Parse string literals compared against typed partition columns with the
/// partition codec, so `day == "2021-03-04"` matches a date partition.
fn coerce_literals(filter: &Filter, codec: &ValueCodecConfiguration) -> Result<Filter> {
    let coerce = |column: &str, value: &Value| -> Result<Value> {
        let (Value::String(raw), Some(data_type)) = (value, codec.partition_type(column)) else {
            return Ok(value.clone());
        };
        let typed = codec.encode_partition_value_as(raw, data_type);
        let fits = match data_type {
            DataType::Utf8 => true,
            DataType::Boolean
            | DataType::Int64
            | DataType::Float64
            | DataType::Date32
            | DataType::Timestamp(..) => {
                typed.is_null() || partition_data_type(&typed) == *data_type
            }
            _ => !matches!(typed, Value::String(_)),
        };
        ensure!(
            fits,
            "literal \"{raw}\" cannot be read as {data_type} for partition column `{column}`"
        );
        Ok(typed)
    };
    Ok(match filter {
        Filter::Compare { column, op, value } => Filter::Compare {
            column: column.clone(),
            op: *op,
            value: coerce(column, value)?,
        },
        Filter::In { column, values } => Filter::In {
            column: column.clone(),
            values: values
                .iter()
                .map(|v| coerce(column, v))
                .collect::<Result<_>>()?,
        },
        Filter::And(a, b) => Filter::And(
            Box::new(coerce_literals(a, codec)?),
            Box::new(coerce_literals(b, codec)?),
        ),
        Filter::Or(a, b) => Filter::Or(
            Box::new(coerce_literals(a, codec)?),
            Box::new(coerce_literals(b, codec)?),
        ),
        Filter::Not(inner) => Filter::Not(Box::new(coerce_literals(inner, codec)?)),
        f => f.clone(),
    })
}

fn check_columns(filter: &Filter, directory: &PartitionedDirectory) -> Result<()> {
    let partition_columns = directory.partition_columns();
    for column in filter.columns() {
        if partition_columns.contains(&column) {
            continue;
        }
        if column.contains('.') {
            bail!("nested column `{column}` cannot be used in a filter");
        }
        if directory.schema().field_with_name(column).is_err() {
            bail!("filter references unknown column `{column}`");
        }
    }
    Ok(())
}

/// Prune `directory` with `filter`.
///
/// Returns the admitted partitions, in discovery order, each paired with the
/// predicate its reader must apply. Partitions whose directory values cannot
/// satisfy the filter are dropped. Partition values are typed with the column
/// types of the directory schema, and string literals compared against them
/// are parsed the same way.
///
/// # Errors
/// Returns an error if the filter references a column that is neither a
/// partition column nor a top-level column of the dataset schema, or compares
/// a typed partition column with a string that does not parse as its type.
pub fn partition_filter(
    filter: &Filter,
    codec: &ValueCodecConfiguration,
    directory: &PartitionedDirectory,
) -> Result<Vec<(PushdownPredicate, PartitionedPath)>> {
    if directory.partitions().is_empty() {
        return Ok(Vec::new());
    }
    check_columns(filter, directory)?;
    let codec = codec
        .clone()
        .with_partition_types(directory.schema(), &directory.partition_columns());
    let coerced = coerce_literals(filter, &codec)?;

    let mut admitted = Vec::with_capacity(directory.partitions().len());
    for partition in directory.partitions() {
        let values: HashMap<&str, Value> = partition
            .partitions()
            .iter()
            .map(|(c, raw)| (c.as_str(), codec.encode_partition_column(c, raw)))
            .collect();
        match reduce(&coerced, &values) {
            Reduced::Never | Reduced::Unknown => {
                trace!(path = %partition.path().display(), "partition pruned");
            }
            Reduced::Residual(residual) if never_true(&residual) => {
                trace!(path = %partition.path().display(), "partition pruned");
            }
            Reduced::Always => admitted.push((PushdownPredicate::AcceptAll, partition.clone())),
            Reduced::Residual(residual) => {
                admitted.push((PushdownPredicate::Residual(residual), partition.clone()));
            }
        }
    }
    debug!(
        filter = %filter,
        admitted = admitted.len(),
        pruned = directory.partitions().len() - admitted.len(),
        "partition filter applied"
    );
    Ok(admitted)
}
