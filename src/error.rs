//! Errors returned by `CombinedEstimator` and its tier containers.

use std::io;

use thiserror::Error;

/// Estimator error
#[derive(Debug, Error)]
pub enum EstimatorError {
    /// An internal invariant was violated. The estimator must not be used afterwards.
    #[error("logical error: {0}")]
    Logical(&'static str),
    /// Serialized tier tag is not one of the known container types.
    #[error("unknown container type tag {0}")]
    UnknownContainerType(u8),
    /// Serialized tier holds more elements than the tier can accommodate.
    #[error("serialized container holds {len} elements, capacity is {capacity}")]
    TooManyElements { len: u64, capacity: usize },
    /// Variable-length integer does not terminate within 10 bytes.
    #[error("malformed varint")]
    MalformedVarint,
    /// Serialized container is internally inconsistent.
    #[error("malformed container: {0}")]
    Malformed(&'static str),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl EstimatorError {
    /// Return whether error signals a broken invariant rather than bad input.
    pub fn is_logical(&self) -> bool {
        matches!(self, EstimatorError::Logical(_))
    }
}

pub type Result<T> = std::result::Result<T, EstimatorError>;
