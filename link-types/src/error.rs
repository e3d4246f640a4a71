//! Error types for the link data model.

use thiserror::Error;

/// Errors raised while parsing data model values.
#[derive(Debug, Error)]
pub enum TypesError {
    /// Serial number is not a non-negative integer
    #[error("invalid serial number: {0:?}")]
    InvalidSerial(String),

    /// Device family tag not recognised
    #[error("unknown device family: {0:?}")]
    UnknownFamily(String),

    /// Module kind not recognised
    #[error("unknown module kind: {0:?}")]
    UnknownModuleKind(String),

    /// Run identifier contains characters unsafe for file names
    #[error("invalid run id: {0:?}")]
    InvalidRunId(String),

    /// Action column could not be parsed
    #[error("invalid action status: {0:?}")]
    InvalidActionStatus(String),
}
