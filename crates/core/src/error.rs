//! Error types for the core crate.

use thiserror::Error;

/// Core error type.
///
/// These cover normalization failures at the ingestion boundary. Callers
/// typically log and drop the offending row rather than aborting a batch;
/// upstream data noise is expected.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoreError {
    /// A value could not be parsed as a 20-byte hex address.
    #[error("Invalid address: {0:?}")]
    InvalidAddress(String),

    /// A value could not be parsed as a decimal token amount.
    #[error("Invalid amount: {0:?}")]
    InvalidAmount(String),

    /// A query result did not contain an expected column.
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// A row value had an unexpected shape for its column.
    #[error("Malformed value in column {column}: {value}")]
    MalformedValue {
        /// Column the value was read from.
        column: String,
        /// Display form of the offending value.
        value: String,
    },
}

/// Result type alias for CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;
