//! # Errors
//!
//! Every fallible operation in teppan returns [`Result`]. All variants are
//! fatal to the batch that produced them: a batch operates on one unified
//! buffer, so there is no per-request recovery once an error surfaces. The
//! serving layer is expected to turn a batch-level failure into per-request
//! error responses.

use crate::memory::MemoryLocation;

/// Errors raised while marshalling a batch.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two requests disagree on a non-batch dimension of the same input.
    #[error("incompatible shapes for input '{name}': request {request_index} has {found:?}, expected {expected:?}")]
    IncompatibleShape {
        name: String,
        request_index: usize,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// A gathered input landed somewhere the compute stage cannot read.
    #[error("data for '{name}' collected in wrong location: expected {expected}, found {found}")]
    UnexpectedDataLocation {
        name: String,
        expected: MemoryLocation,
        found: MemoryLocation,
    },

    /// A buffer or response could not be allocated.
    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    /// The caller used a batch outside of its documented lifecycle.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// A request does not carry the named input.
    #[error("request {request_index} has no input named '{name}'")]
    MissingInput { name: String, request_index: usize },

    /// The model metadata has no output with this name.
    #[error("model has no output named '{0}'")]
    UnknownOutput(String),

    /// A buffer's byte length disagrees with the shape it is supposed to hold.
    #[error("size mismatch for '{name}': expected {expected} bytes, found {found}")]
    SizeMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    /// The batch holds more examples than the model accepts.
    #[error("batch size {batch_size} exceeds model maximum of {max_batch_size}")]
    BatchTooLarge {
        batch_size: usize,
        max_batch_size: usize,
    },

    /// A byte range reaches past the end of a buffer.
    #[error("range {offset}..{end} out of bounds for buffer of {len} bytes")]
    OutOfBounds {
        offset: usize,
        end: usize,
        len: usize,
    },

    /// The stream could not accept or complete work.
    #[error("stream error: {0}")]
    Stream(String),

    /// Configuration could not be read.
    #[error("invalid configuration value for {key}: '{value}'")]
    Config { key: &'static str, value: String },

    #[cfg(feature = "candle")]
    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
