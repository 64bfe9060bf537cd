//! Descriptor-driven materialization, resolved per value.

use super::{write_value, Materializer};
use crate::descriptor::Record;
use crate::error::Result;
use crate::execution::RowCursor;

/// Resolves every column against the record descriptor for each row.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReflectiveMaterializer;

impl ReflectiveMaterializer {
    /// Creates the materializer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Materializer for ReflectiveMaterializer {
    fn name(&self) -> &'static str {
        "reflective"
    }

    fn materialize<T: Record>(
        &self,
        cursor: &mut dyn RowCursor,
        limit: Option<usize>,
    ) -> Result<Vec<T>> {
        let descriptor = T::descriptor();
        let mut items = Vec::new();
        while limit.is_none_or(|limit| items.len() < limit) && cursor.next_row() {
            let mut item = T::default();
            for column in 0..cursor.field_count() {
                let name = cursor.name(column);
                let Some((index, property)) = descriptor.find_by_column(name) else {
                    continue;
                };
                write_value(&mut item, index, property, name, cursor.get_value(column))?;
            }
            item.accept_changes();
            items.push(item);
        }
        Ok(items)
    }
}
