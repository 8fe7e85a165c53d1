use thiserror::Error;

#[derive(Error, Debug)]
pub enum HillviewError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Type error: {0}")]
    Type(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("No column named {0}")]
    MissingColumn(String),

    /// A worker was asked for a handle it does not hold (never created,
    /// expired, or deleted).
    #[error("Dataset {index} is missing on {address}")]
    DatasetMissing { index: usize, address: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A computation task panicked or was torn down by the runtime.
    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<bincode::Error> for HillviewError {
    fn from(e: bincode::Error) -> Self {
        HillviewError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HillviewError>;
