//! Tables: a schema, a set of equally-sized columns, and a membership set.
//!
//! A `Table` is an immutable view. Filtering and sampling return a new
//! table that shares the column data and carries a narrower membership
//! set; `compress` materialises the member rows into fresh columns.

use std::sync::Arc;

use hillview_types::error::{HillviewError, Result};

use crate::column::{ArrayColumn, Column};
use crate::membership::MembershipSet;
use crate::record_order::RecordOrder;
use crate::schema::Schema;

#[derive(Debug, Clone)]
pub struct Table {
    schema: Arc<Schema>,
    columns: Vec<Arc<dyn Column>>,
    members: MembershipSet,
}

impl Table {
    /// Build a table over `columns`, all of which must have
    /// `members.max()` rows.
    pub fn new(columns: Vec<Arc<dyn Column>>, members: MembershipSet) -> Result<Self> {
        let schema = Schema::from_columns(
            columns.iter().map(|c| c.description().clone()).collect(),
        )?;
        for c in &columns {
            if c.size_in_rows() != members.max() {
                return Err(HillviewError::Format(format!(
                    "Column {} has {} rows, expected {}",
                    c.name(),
                    c.size_in_rows(),
                    members.max()
                )));
            }
        }
        Ok(Table {
            schema: Arc::new(schema),
            columns,
            members,
        })
    }

    /// A table in which every row is a member.
    pub fn from_columns(columns: Vec<Arc<dyn Column>>) -> Result<Self> {
        let size = columns.first().map_or(0, |c| c.size_in_rows());
        Table::new(columns, MembershipSet::full(size))
    }

    pub fn empty() -> Self {
        Table {
            schema: Arc::new(Schema::new()),
            columns: Vec::new(),
            members: MembershipSet::full(0),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Number of member rows.
    pub fn num_rows(&self) -> usize {
        self.members.size()
    }

    pub fn members(&self) -> &MembershipSet {
        &self.members
    }

    pub fn columns(&self) -> &[Arc<dyn Column>] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Result<&Arc<dyn Column>> {
        self.schema
            .position(name)
            .map(|i| &self.columns[i])
            .ok_or_else(|| HillviewError::MissingColumn(name.to_string()))
    }

    /// Member row indices in increasing order.
    pub fn row_iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.members.iter()
    }

    /// Same columns, different membership. The set must range over the
    /// same underlying rows.
    pub fn with_membership(&self, members: MembershipSet) -> Result<Table> {
        if members.max() != self.members.max() {
            return Err(HillviewError::Format(format!(
                "Membership over {} rows applied to table of {} rows",
                members.max(),
                self.members.max()
            )));
        }
        Ok(Table {
            schema: self.schema.clone(),
            columns: self.columns.clone(),
            members,
        })
    }

    pub fn filter(&self, predicate: impl FnMut(usize) -> bool) -> Table {
        Table {
            schema: self.schema.clone(),
            columns: self.columns.clone(),
            members: self.members.filter(predicate),
        }
    }

    pub fn sample(&self, rate: f64, seed: u64) -> Table {
        Table {
            schema: self.schema.clone(),
            columns: self.columns.clone(),
            members: self.members.sample(rate, seed),
        }
    }

    pub fn sample_random(&self, rate: f64) -> Table {
        Table {
            schema: self.schema.clone(),
            columns: self.columns.clone(),
            members: self.members.sample_random(rate),
        }
    }

    /// Restrict to the columns of `schema`, keeping shared data.
    pub fn project(&self, schema: &Schema) -> Result<Table> {
        let columns = schema
            .columns()
            .iter()
            .map(|d| self.column(&d.name).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(Table {
            schema: Arc::new(self.schema.project(&schema.column_names())?),
            columns,
            members: self.members.clone(),
        })
    }

    /// Materialise the member rows of the `schema` columns into a dense
    /// table, optionally sorted by `order`.
    pub fn compress(&self, schema: &Schema, order: Option<&RecordOrder>) -> Result<Table> {
        let mut rows: Vec<usize> = self.members.iter().collect();
        if let Some(order) = order {
            let cmp = order.comparator(self)?;
            rows.sort_by(|&a, &b| cmp(a, b));
        }
        let mut columns: Vec<Arc<dyn Column>> = Vec::with_capacity(schema.len());
        for d in schema.columns() {
            let source = self.column(&d.name)?;
            let column = ArrayColumn::from_values(
                source.description().clone(),
                rows.iter().map(|&r| source.value(r)),
            )?;
            columns.push(Arc::new(column));
        }
        Table::new(columns, MembershipSet::full(rows.len()))
    }

    /// A new table with `column` added after the existing ones.
    pub fn append_column(&self, column: Arc<dyn Column>) -> Result<Table> {
        let mut columns = self.columns.clone();
        columns.push(column);
        Table::new(columns, self.members.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnDescription;
    use hillview_types::kind::ContentsKind;
    use hillview_types::value::Value;
    use pretty_assertions::assert_eq;

    fn table() -> Table {
        Table::from_columns(vec![
            Arc::new(ArrayColumn::from_ints("id", vec![5, 3, 9, 1, 7])) as Arc<dyn Column>,
            Arc::new(ArrayColumn::from_doubles("v", vec![0.5, 1.5, 2.5, 3.5, 4.5])),
        ])
        .unwrap()
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let err = Table::from_columns(vec![
            Arc::new(ArrayColumn::from_ints("a", vec![1, 2])) as Arc<dyn Column>,
            Arc::new(ArrayColumn::from_ints("b", vec![1])),
        ]);
        assert!(matches!(err, Err(HillviewError::Format(_))));
    }

    #[test]
    fn test_filter_shares_columns() {
        let t = table();
        let f = t.filter(|r| r % 2 == 0);
        assert_eq!(f.num_rows(), 3);
        assert_eq!(f.row_iter().collect::<Vec<_>>(), vec![0, 2, 4]);
        assert!(Arc::ptr_eq(&t.columns()[0], &f.columns()[0]));
    }

    #[test]
    fn test_sample_keeps_schema() {
        let t = table();
        let rows = |t: &Table| t.row_iter().collect::<Vec<_>>();
        assert_eq!(rows(&t.sample(0.5, 3)), rows(&t.sample(0.5, 3)));
        let all = t.sample_random(1.0);
        assert_eq!(all.num_rows(), 5);
        assert_eq!(all.schema(), t.schema());
        assert_eq!(t.sample_random(0.0).num_rows(), 0);
    }

    #[test]
    fn test_compress_sorted() {
        let t = table().filter(|r| r != 2);
        let mut order = RecordOrder::new();
        order.append(ColumnDescription::new("id", ContentsKind::Integer), true);
        let schema = t.schema().project(&["v"]).unwrap();
        let c = t.compress(&schema, Some(&order)).unwrap();
        assert_eq!(c.num_rows(), 4);
        assert_eq!(c.schema().column_names(), vec!["v"]);
        let v = c.column("v").unwrap();
        let values: Vec<Value> = c.row_iter().map(|r| v.value(r)).collect();
        assert_eq!(
            values,
            vec![
                Value::Double(3.5),
                Value::Double(1.5),
                Value::Double(0.5),
                Value::Double(4.5)
            ]
        );
    }

    #[test]
    fn test_append_and_project() {
        let t = table();
        let t2 = t
            .append_column(Arc::new(ArrayColumn::from_ints("x", vec![0; 5])))
            .unwrap();
        assert_eq!(t2.schema().len(), 3);
        assert!(t
            .append_column(Arc::new(ArrayColumn::from_ints("y", vec![0; 4])))
            .is_err());
        let p = t2
            .project(&Schema::from_columns(vec![ColumnDescription::new("x", ContentsKind::Integer)]).unwrap())
            .unwrap();
        assert_eq!(p.columns().len(), 1);
        assert!(matches!(t.column("nope"), Err(HillviewError::MissingColumn(_))));
    }

    #[test]
    fn test_with_membership_checks_range() {
        let t = table();
        assert!(t.with_membership(MembershipSet::full(4)).is_err());
        let s = t.with_membership(MembershipSet::from_rows(5, vec![1])).unwrap();
        assert_eq!(s.num_rows(), 1);
    }
}
