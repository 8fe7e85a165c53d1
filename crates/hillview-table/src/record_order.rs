//! Multi-column row orderings.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use hillview_types::error::Result;

use crate::column::Column;
use crate::schema::{ColumnDescription, Schema};
use crate::table::Table;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSortOrientation {
    pub column: ColumnDescription,
    pub ascending: bool,
}

/// Lexicographic order over a list of columns. Missing values sort after
/// present ones; a descending column inverts its whole comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordOrder {
    orientations: Vec<ColumnSortOrientation>,
}

impl RecordOrder {
    pub fn new() -> Self {
        RecordOrder::default()
    }

    pub fn append(&mut self, column: ColumnDescription, ascending: bool) {
        self.orientations.push(ColumnSortOrientation { column, ascending });
    }

    /// Ascending order over every column of `schema`.
    pub fn ascending(schema: &Schema) -> Self {
        RecordOrder {
            orientations: schema
                .columns()
                .iter()
                .map(|c| ColumnSortOrientation {
                    column: c.clone(),
                    ascending: true,
                })
                .collect(),
        }
    }

    pub fn orientations(&self) -> &[ColumnSortOrientation] {
        &self.orientations
    }

    /// The columns this order reads, in order.
    pub fn schema(&self) -> Result<Schema> {
        Schema::from_columns(self.orientations.iter().map(|o| o.column.clone()).collect())
    }

    fn resolve(&self, table: &Table) -> Result<Vec<(Arc<dyn Column>, bool)>> {
        self.orientations
            .iter()
            .map(|o| Ok((table.column(&o.column.name)?.clone(), o.ascending)))
            .collect()
    }

    /// Comparator over row indices of one table.
    pub fn comparator<'a>(
        &self,
        table: &'a Table,
    ) -> Result<impl Fn(usize, usize) -> Ordering + 'a> {
        let columns = self.resolve(table)?;
        Ok(move |a: usize, b: usize| compare(&columns, a, &columns, b))
    }

    /// Comparator between rows of two tables sharing the ordered columns.
    pub fn cross_comparator<'a>(
        &self,
        left: &'a Table,
        right: &'a Table,
    ) -> Result<impl Fn(usize, usize) -> Ordering + 'a> {
        let l = self.resolve(left)?;
        let r = self.resolve(right)?;
        Ok(move |a: usize, b: usize| compare(&l, a, &r, b))
    }
}

fn compare(
    left: &[(Arc<dyn Column>, bool)],
    a: usize,
    right: &[(Arc<dyn Column>, bool)],
    b: usize,
) -> Ordering {
    for ((lc, ascending), (rc, _)) in left.iter().zip(right) {
        let ord = lc.value(a).cmp(&rc.value(b));
        let ord = if *ascending { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
