//! Linear projections of numeric columns into new Double columns.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use hillview_dataset::api::Map;
use hillview_table::column::{ArrayColumn, Column};
use hillview_table::schema::ColumnDescription;
use hillview_table::table::Table;
use hillview_types::error::{HillviewError, Result};
use hillview_types::kind::ContentsKind;
use hillview_types::value::Value;

/// Appends one Double column per projection vector: the inner product of
/// each row's values in `column_names` with that vector. Rows with a
/// missing input get a missing projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearProjectionMap {
    column_names: Vec<String>,
    projections: Vec<Vec<f64>>,
    new_names: Vec<String>,
}

impl LinearProjectionMap {
    /// New columns are named `{prefix}0`, `{prefix}1`, ...
    pub fn new(
        column_names: Vec<String>,
        projections: Vec<Vec<f64>>,
        prefix: &str,
    ) -> Result<Self> {
        let new_names = (0..projections.len())
            .map(|i| format!("{}{}", prefix, i))
            .collect();
        Self::with_names(column_names, projections, new_names)
    }

    pub fn with_names(
        column_names: Vec<String>,
        projections: Vec<Vec<f64>>,
        new_names: Vec<String>,
    ) -> Result<Self> {
        if let Some(p) = projections.iter().find(|p| p.len() != column_names.len()) {
            return Err(HillviewError::Config(format!(
                "Projection vector of length {} over {} columns",
                p.len(),
                column_names.len()
            )));
        }
        if new_names.len() != projections.len() {
            return Err(HillviewError::Config(format!(
                "{} names for {} projections",
                new_names.len(),
                projections.len()
            )));
        }
        Ok(LinearProjectionMap {
            column_names,
            projections,
            new_names,
        })
    }

    pub fn new_names(&self) -> &[String] {
        &self.new_names
    }
}

impl Map<Table, Table> for LinearProjectionMap {
    fn apply(&self, table: &Table) -> Result<Table> {
        let inputs = self
            .column_names
            .iter()
            .map(|c| table.column(c))
            .collect::<Result<Vec<_>>>()?;
        let size = table.members().max();
        let mut outputs: Vec<Vec<Value>> = vec![vec![Value::Missing; size]; self.projections.len()];
        let mut row_values = vec![0.0; inputs.len()];
        for row in table.row_iter() {
            for (slot, column) in row_values.iter_mut().zip(&inputs) {
                *slot = column.as_double(row, None)?;
            }
            for (out, weights) in outputs.iter_mut().zip(&self.projections) {
                let v: f64 = weights.iter().zip(&row_values).map(|(w, x)| w * x).sum();
                if !v.is_nan() {
                    out[row] = Value::Double(v);
                }
            }
        }
        let mut result = table.clone();
        for (name, values) in self.new_names.iter().zip(outputs) {
            let column = ArrayColumn::from_values(
                ColumnDescription::new(name.as_str(), ContentsKind::Double),
                values,
            )?;
            result = result.append_column(Arc::new(column) as Arc<dyn Column>)?;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_appends_columns() {
        let t = Table::from_columns(vec![
            Arc::new(ArrayColumn::from_ints("x", vec![1, 2, 3])) as Arc<dyn Column>,
            Arc::new(ArrayColumn::from_values(
                ColumnDescription::new("y", ContentsKind::Double),
                vec![Value::Double(0.5), Value::Missing, Value::Double(-1.0)],
            )
            .unwrap()),
        ])
        .unwrap();
        let map = LinearProjectionMap::new(
            vec!["x".into(), "y".into()],
            vec![vec![1.0, 2.0], vec![0.0, 1.0]],
            "P",
        )
        .unwrap();
        let out = map.apply(&t.filter(|r| r != 0)).unwrap();
        assert_eq!(out.schema().column_names(), vec!["x", "y", "P0", "P1"]);
        let p0 = out.column("P0").unwrap();
        assert!(p0.is_missing(0));
        assert!(p0.is_missing(1));
        assert_eq!(p0.get_double(2).unwrap(), Some(1.0));
        assert_eq!(out.column("P1").unwrap().get_double(2).unwrap(), Some(-1.0));
        assert_eq!(out.num_rows(), 2);
    }

    #[test]
    fn test_shape_checked() {
        assert!(LinearProjectionMap::new(vec!["x".into()], vec![vec![1.0, 2.0]], "P").is_err());
    }
}
