use serde::{Deserialize, Serialize};

use crate::error::{HillviewError, Result};

/// Logical kind of the values stored in a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ContentsKind {
    Integer = 0,
    Double = 1,
    String = 2,
    Category = 3,
    Json = 4,
    Date = 5,
    Duration = 6,
}

impl ContentsKind {
    /// Integer and Double columns; the only kinds numeric sketches accept.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ContentsKind::Integer | ContentsKind::Double)
    }

    pub fn is_string(&self) -> bool {
        matches!(
            self,
            ContentsKind::String | ContentsKind::Category | ContentsKind::Json
        )
    }

    /// Kinds that `as_double` can project without a converter.
    pub fn is_double_convertible(&self) -> bool {
        !self.is_string()
    }
}

impl TryFrom<u8> for ContentsKind {
    type Error = HillviewError;
    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Integer),
            1 => Ok(Self::Double),
            2 => Ok(Self::String),
            3 => Ok(Self::Category),
            4 => Ok(Self::Json),
            5 => Ok(Self::Date),
            6 => Ok(Self::Duration),
            _ => Err(HillviewError::Type(format!(
                "Unknown contents kind value: {}",
                value
            ))),
        }
    }
}

impl std::fmt::Display for ContentsKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer => write!(f, "Integer"),
            Self::Double => write!(f, "Double"),
            Self::String => write!(f, "String"),
            Self::Category => write!(f, "Category"),
            Self::Json => write!(f, "Json"),
            Self::Date => write!(f, "Date"),
            Self::Duration => write!(f, "Duration"),
        }
    }
}
