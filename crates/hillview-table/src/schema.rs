//! Table schemas: ordered, name-unique column descriptions.

use serde::{Deserialize, Serialize};

use hillview_types::error::{HillviewError, Result};
use hillview_types::kind::ContentsKind;

/// Name, kind, and nullability of one column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDescription {
    pub name: String,
    pub kind: ContentsKind,
    pub allow_missing: bool,
}

impl ColumnDescription {
    pub fn new(name: impl Into<String>, kind: ContentsKind) -> Self {
        ColumnDescription {
            name: name.into(),
            kind,
            allow_missing: true,
        }
    }

    /// A description whose column rejects missing values.
    pub fn non_nullable(name: impl Into<String>, kind: ContentsKind) -> Self {
        ColumnDescription {
            name: name.into(),
            kind,
            allow_missing: false,
        }
    }
}

/// Ordered set of column descriptions. Order matters for row comparison
/// and serialization; names are unique.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<ColumnDescription>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    /// Build a schema, rejecting duplicate names.
    pub fn from_columns(columns: Vec<ColumnDescription>) -> Result<Self> {
        let mut schema = Schema::new();
        for c in columns {
            schema.append(c)?;
        }
        Ok(schema)
    }

    pub fn append(&mut self, desc: ColumnDescription) -> Result<()> {
        if self.contains(&desc.name) {
            return Err(HillviewError::Format(format!(
                "Column {} already exists in schema",
                desc.name
            )));
        }
        self.columns.push(desc);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn description(&self, name: &str) -> Result<&ColumnDescription> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| HillviewError::MissingColumn(name.to_string()))
    }

    pub fn kind(&self, name: &str) -> Result<ContentsKind> {
        Ok(self.description(name)?.kind)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn columns(&self) -> &[ColumnDescription] {
        &self.columns
    }

    /// Sub-schema with the named columns, in the order given.
    pub fn project(&self, names: &[impl AsRef<str>]) -> Result<Schema> {
        let mut result = Schema::new();
        for n in names {
            result.append(self.description(n.as_ref())?.clone())?;
        }
        Ok(result)
    }
}
