//! Projected schema resolution.
//!
//! A [`SchemaResolver`] turns a caller's projection request into a concrete
//! Arrow schema that is a narrowing of the dataset's base schema (file columns
//! followed by partition columns). The resolved schema only selects columns;
//! their types always come from the base schema.

use anyhow::{Context, Result, bail, ensure};
use arrow::datatypes::{FieldRef, Schema, SchemaRef};
use serde::de::DeserializeOwned;
use serde_arrow::schema::{SchemaLike, TracingOptions};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Resolves a requested projection against a base schema.
pub trait SchemaResolver: Send + Sync {
    /// Produce the read schema.
    ///
    /// # Errors
    /// Returns an error if the request names a column the base schema lacks,
    /// or is otherwise not a narrowing of it.
    fn resolve(&self, base: &Schema) -> Result<SchemaRef>;
}

fn select(base: &Schema, names: &[&str]) -> Result<SchemaRef> {
    ensure!(!names.is_empty(), "projection selects no columns");
    let fields = names
        .iter()
        .map(|name| {
            base.field_with_name(name)
                .map(|f| Arc::new(f.clone()))
                .with_context(|| format!("column `{name}` not found in dataset schema"))
        })
        .collect::<Result<Vec<FieldRef>>>()?;
    Ok(Arc::new(Schema::new(fields)))
}

/// Projection given as an ordered list of top-level column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnProjection {
    columns: Vec<String>,
}

impl ColumnProjection {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl SchemaResolver for ColumnProjection {
    fn resolve(&self, base: &Schema) -> Result<SchemaRef> {
        let names: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        select(base, &names)
    }
}

/// Projection derived from the fields of a serde type, in base-schema order.
pub struct TypedProjection<T>(PhantomData<fn() -> T>);

impl<T> TypedProjection<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for TypedProjection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TypedProjection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypedProjection<{}>", std::any::type_name::<T>())
    }
}

impl<T: DeserializeOwned> TypedProjection<T> {
    /// Fields `T` deserializes. Fails for types without a fixed set of named
    /// fields, such as maps or `serde_json::Value`.
    ///
    /// # Errors
    /// Returns an error if serde_arrow cannot trace `T` as a struct.
    pub fn traced_fields() -> Result<Vec<FieldRef>> {
        Vec::<FieldRef>::from_type::<T>(TracingOptions::default())
            .with_context(|| format!("infer fields of {}", std::any::type_name::<T>()))
    }
}

impl<T: DeserializeOwned> SchemaResolver for TypedProjection<T> {
    fn resolve(&self, base: &Schema) -> Result<SchemaRef> {
        let traced = Self::traced_fields()?;
        for field in &traced {
            ensure!(
                base.field_with_name(field.name()).is_ok(),
                "column `{}` required by {} not found in dataset schema",
                field.name(),
                std::any::type_name::<T>()
            );
        }
        let names: Vec<&str> = base
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .filter(|name| traced.iter().any(|t| t.name() == *name))
            .collect();
        select(base, &names)
    }
}

/// A caller-built schema that must be a narrowing of the base schema.
#[derive(Debug, Clone)]
pub struct ExplicitSchema(pub SchemaRef);

impl SchemaResolver for ExplicitSchema {
    fn resolve(&self, base: &Schema) -> Result<SchemaRef> {
        for field in self.0.fields() {
            let Ok(found) = base.field_with_name(field.name()) else {
                bail!("column `{}` not found in dataset schema", field.name());
            };
            ensure!(
                found.data_type() == field.data_type(),
                "column `{}` is {} in the dataset but {} was requested",
                field.name(),
                found.data_type(),
                field.data_type()
            );
        }
        Ok(Arc::clone(&self.0))
    }
}
