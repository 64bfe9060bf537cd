//! Cached, per-shape projections.

use std::any::{Any, TypeId};
use std::fmt::{self, Write as _};
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::{column_error, value_class, write_value, Conversion, Materializer};
use crate::descriptor::{PropertyType, Record};
use crate::error::{Error, Result};
use crate::execution::{RowCursor, ShapeSignature};
use crate::value::{SqlType, SqlValue};

#[derive(Debug, Clone)]
struct Step {
    column: usize,
    column_name: String,
    property: usize,
    target: PropertyType,
    nullable: bool,
    source: SqlType,
    // None when the column type is unknown and each value picks its own
    conversion: Option<Conversion>,
    check_null: bool,
}

/// The planned mapping from one result shape onto one record type.
pub struct CompiledProjection<T> {
    steps: Vec<Step>,
    source_text: String,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> CompiledProjection<T> {
    /// Plans the projection of `shape` onto `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Compile`] carrying the rendered plan when a column of
    /// known type cannot be converted into its property.
    pub fn compile(shape: &ShapeSignature) -> Result<Self> {
        let descriptor = T::descriptor();
        let mut steps = Vec::new();
        let mut source_text = format!("projection {} <- (", descriptor.type_name());
        for (i, field) in shape.fields().iter().enumerate() {
            if i > 0 {
                source_text.push_str(", ");
            }
            let _ = write!(source_text, "{} {}", field.name, field.sql_type);
            if !field.nullable {
                source_text.push_str(" not null");
            }
        }
        source_text.push_str(")\n");

        let mut failure = None;
        for (column, field) in shape.fields().iter().enumerate() {
            let Some((property, target)) = descriptor.find_by_column(&field.name) else {
                let _ = writeln!(source_text, "  [{column}] {} -> (ignored)", field.name);
                continue;
            };
            let source = value_class(field.sql_type);
            let conversion = (source != SqlType::Unknown)
                .then(|| Conversion::plan(source, target.property_type));
            let check_null = field.nullable;
            let _ = writeln!(
                source_text,
                "  [{column}] {} -> {}: {}{}",
                field.name,
                target.path,
                conversion.map_or_else(|| "by value".to_string(), |c| format!("{c:?}")),
                if check_null { "" } else { " (no null check)" }
            );
            if conversion == Some(Conversion::Unsupported) && failure.is_none() {
                failure = Some(Error::Mapping(format!(
                    "column '{}' of type {} cannot be read into '{}' ({})",
                    field.name, field.sql_type, target.path, target.property_type
                )));
            }
            steps.push(Step {
                column,
                column_name: field.name.clone(),
                property,
                target: target.property_type,
                nullable: target.nullable,
                source,
                conversion,
                check_null,
            });
        }

        if let Some(cause) = failure {
            return Err(Error::Compile {
                source_text,
                cause: Box::new(cause),
            });
        }
        Ok(Self {
            steps,
            source_text,
            _record: PhantomData,
        })
    }

    /// The rendered plan.
    #[must_use]
    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    /// Builds one record from the current row of `cursor`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mapping`] for values that cannot be converted.
    pub fn project(&self, cursor: &dyn RowCursor) -> Result<T> {
        let properties = T::descriptor().properties();
        let mut item = T::default();
        for step in &self.steps {
            let value = cursor.get_value(step.column);
            if step.check_null && value.is_null() {
                if step.nullable {
                    item.write_property(step.property, SqlValue::Null)?;
                }
                continue;
            }
            match step.conversion {
                Some(conversion) if value_class(value.sql_type()) == step.source => {
                    let converted = conversion.apply(value, step.target).map_err(|err| {
                        column_error(&step.column_name, &properties[step.property], &err)
                    })?;
                    item.write_property(step.property, converted)?;
                }
                // the provider reported a value of another type than the shape
                _ => write_value(
                    &mut item,
                    step.property,
                    &properties[step.property],
                    &step.column_name,
                    value,
                )?,
            }
        }
        item.accept_changes();
        Ok(item)
    }
}

impl<T> fmt::Debug for CompiledProjection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledProjection")
            .field("steps", &self.steps.len())
            .field("source_text", &self.source_text)
            .finish()
    }
}

type ProjectionKey = (TypeId, ShapeSignature);

/// Replays cached projections keyed by record type and result shape.
///
/// Concurrent first use of the same key may plan twice; only the first
/// stored projection is kept and handed to every caller.
#[derive(Default)]
pub struct CompiledMaterializer {
    projections: DashMap<ProjectionKey, Arc<dyn Any + Send + Sync>>,
}

impl CompiledMaterializer {
    /// Creates an empty projection cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the projection of `shape` onto `T`, planning it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Compile`] when the projection cannot be planned.
    pub fn projection<T: Record>(
        &self,
        shape: &ShapeSignature,
    ) -> Result<Arc<CompiledProjection<T>>> {
        let key = (TypeId::of::<T>(), shape.clone());
        if let Some(cached) = self.projections.get(&key) {
            if let Ok(projection) = Arc::clone(cached.value()).downcast::<CompiledProjection<T>>() {
                return Ok(projection);
            }
        }

        let compiled = CompiledProjection::<T>::compile(shape)?;
        debug!(
            record = T::descriptor().type_name(),
            fields = shape.len(),
            "Compiled projection"
        );
        let compiled: Arc<dyn Any + Send + Sync> = Arc::new(compiled);
        let retained = Arc::clone(self.projections.entry(key).or_insert(compiled).value());
        retained
            .downcast::<CompiledProjection<T>>()
            .map_err(|_| Error::Mapping("projection cache entry has the wrong type".to_string()))
    }

    /// Number of cached projections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.projections.len()
    }

    /// Returns whether no projection has been planned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projections.is_empty()
    }
}

impl fmt::Debug for CompiledMaterializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledMaterializer")
            .field("projections", &self.projections.len())
            .finish()
    }
}

impl Materializer for CompiledMaterializer {
    fn name(&self) -> &'static str {
        "compiled"
    }

    fn materialize<T: Record>(
        &self,
        cursor: &mut dyn RowCursor,
        limit: Option<usize>,
    ) -> Result<Vec<T>> {
        let projection = self.projection::<T>(cursor.shape())?;
        let mut items = Vec::new();
        while limit.is_none_or(|limit| items.len() < limit) && cursor.next_row() {
            items.push(projection.project(cursor)?);
        }
        Ok(items)
    }
}
