//! Columnar tables for Hillview: schemas, typed columns, membership sets
//! and row snapshots.

pub mod column;
pub mod list_column;
pub mod membership;
pub mod record_order;
pub mod row_snapshot;
pub mod schema;
pub mod table;

pub use column::{ArrayColumn, Column, SortedStringsConverter, StringConverter};
pub use membership::MembershipSet;
pub use record_order::RecordOrder;
pub use row_snapshot::{RowSnapshot, RowSnapshotMap, RowView, VirtualRowSnapshot};
pub use schema::{ColumnDescription, Schema};
pub use table::Table;
