use thiserror::Error;

pub type DatabaseResult<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    // io
    #[error("provided path is not a directory: {0}")]
    InvalidFilePath(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    // catalog
    #[error("table {0} not found")]
    TableNotFound(String),
    #[error("table {0} already exists")]
    TableExists(String),
    #[error("invalid table or column name {0:?}")]
    InvalidName(String),
    #[error("index on {table}.{column} not found")]
    IndexNotFound { table: String, column: String },

    // internal
    #[error(transparent)]
    Storage(#[from] crate::storage::Error),
    #[error(transparent)]
    Query(#[from] crate::query::Error),
    #[error(transparent)]
    Concurrency(#[from] crate::concurrency::Error),
    #[error(transparent)]
    UtilsError(#[from] crate::utils::Error),
}
