use thiserror::Error;

pub mod bytes;
pub mod debug_table;
pub mod io;

/// Utilities `Result` type.
pub type Result<T> = std::result::Result<T, Error>;

/// Utilities `Error`.
#[derive(Debug, Error)]
pub enum Error {
    // bytes
    #[error("attempted to read {wanted} bytes but only {remaining} remain")]
    OutOfBytes { wanted: usize, remaining: usize },
    #[error("invalid utf-8 string")]
    InvalidString(#[from] std::string::FromUtf8Error),
}
