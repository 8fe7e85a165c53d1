//! Growable, segmented column used by loaders and row builders.
//!
//! Values live in segments of `1 << LOG_SEGMENT_SIZE` rows so that
//! appending never moves existing data. A column is sealed once loading
//! finishes; sealed columns reject further appends.

use hillview_types::bitset::DenseBitset;
use hillview_types::error::{HillviewError, Result};
use hillview_types::value::Value;

use crate::column::{Column, ColumnValues};
use crate::schema::ColumnDescription;

pub const LOG_SEGMENT_SIZE: usize = 20;
pub const SEGMENT_SIZE: usize = 1 << LOG_SEGMENT_SIZE;
const SEGMENT_MASK: usize = SEGMENT_SIZE - 1;

#[derive(Debug)]
struct Segment {
    values: ColumnValues,
    missing: DenseBitset,
}

#[derive(Debug)]
pub struct ListColumn {
    description: ColumnDescription,
    segments: Vec<Segment>,
    size: usize,
    sealed: bool,
}

impl ListColumn {
    pub fn new(description: ColumnDescription) -> Self {
        ListColumn {
            description,
            segments: Vec::new(),
            size: 0,
            sealed: false,
        }
    }

    pub fn append(&mut self, value: &Value) -> Result<()> {
        if self.sealed {
            return Err(HillviewError::Format(format!(
                "Column {} is sealed",
                self.description.name
            )));
        }
        let missing = value.is_missing();
        if missing && !self.description.allow_missing {
            return Err(HillviewError::Config(format!(
                "Column {} does not allow missing values",
                self.description.name
            )));
        }
        let index = self.size >> LOG_SEGMENT_SIZE;
        if index == self.segments.len() {
            self.segments.push(Segment {
                values: ColumnValues::with_capacity(self.description.kind, 1024),
                missing: DenseBitset::default(),
            });
        }
        let segment = &mut self.segments[index];
        segment.values.push(value)?;
        segment.missing.push(missing);
        self.size += 1;
        Ok(())
    }

    pub fn append_missing(&mut self) -> Result<()> {
        self.append(&Value::Missing)
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    fn locate(&self, row: usize) -> (&Segment, usize) {
        (
            &self.segments[row >> LOG_SEGMENT_SIZE],
            row & SEGMENT_MASK,
        )
    }
}

impl Column for ListColumn {
    fn description(&self) -> &ColumnDescription {
        &self.description
    }

    fn size_in_rows(&self) -> usize {
        self.size
    }

    fn is_missing(&self, row: usize) -> bool {
        let (segment, offset) = self.locate(row);
        segment.missing.get(offset)
    }

    fn value(&self, row: usize) -> Value {
        let (segment, offset) = self.locate(row);
        if segment.missing.get(offset) {
            Value::Missing
        } else {
            segment.values.get(offset)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hillview_types::kind::ContentsKind;

    #[test]
    fn test_append_and_read() {
        let mut c = ListColumn::new(ColumnDescription::new("x", ContentsKind::Double));
        c.append(&Value::Double(1.5)).unwrap();
        c.append_missing().unwrap();
        c.append(&Value::Int(3)).unwrap();
        c.seal();
        assert_eq!(c.size_in_rows(), 3);
        assert_eq!(c.value(0), Value::Double(1.5));
        assert!(c.is_missing(1));
        assert_eq!(c.get_double(2).unwrap(), Some(3.0));
    }

    #[test]
    fn test_sealed_rejects_append() {
        let mut c = ListColumn::new(ColumnDescription::new("s", ContentsKind::String));
        c.append(&Value::from("a")).unwrap();
        c.seal();
        assert!(matches!(
            c.append(&Value::from("b")),
            Err(HillviewError::Format(_))
        ));
    }

    #[test]
    fn test_non_nullable_and_kind_checks() {
        let mut c = ListColumn::new(ColumnDescription::non_nullable("i", ContentsKind::Integer));
        assert!(matches!(c.append_missing(), Err(HillviewError::Config(_))));
        assert!(matches!(
            c.append(&Value::from("x")),
            Err(HillviewError::Type(_))
        ));
        assert_eq!(c.size_in_rows(), 0);
    }

    #[test]
    fn test_crosses_segment_boundary() {
        let mut c = ListColumn::new(ColumnDescription::new("i", ContentsKind::Integer));
        for i in 0..(SEGMENT_SIZE + 5) {
            c.append(&Value::Int(i as i32)).unwrap();
        }
        assert_eq!(c.value(SEGMENT_SIZE - 1), Value::Int(SEGMENT_SIZE as i32 - 1));
        assert_eq!(c.value(SEGMENT_SIZE + 4), Value::Int(SEGMENT_SIZE as i32 + 4));
    }
}
