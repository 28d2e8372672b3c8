//! ContainerError: unified error type for mesh-bp public APIs
//!
//! Every fallible operation in the crate returns this error. Variants are
//! grouped by kind: protocol-order mistakes, type mismatches, missing data
//! that breaks an invariant, and transport failures.

use crate::container::types::ContainerType;
use thiserror::Error;

/// Unified error type for container, codec and coordinator operations.
#[derive(Debug, Error)]
pub enum ContainerError {
    // --- protocol order ---------------------------------------------------
    /// A `define_*` call arrived after the first step was opened.
    #[error("unable to declare `{0}` after writing has started")]
    DefineAfterWrite(String),
    /// The same variable path was declared twice.
    #[error("variable `{0}` is already defined")]
    DuplicateDefinition(String),
    /// A write targeted a path that was never declared.
    #[error("variable `{0}` was not defined before writing")]
    UndefinedVariable(String),
    /// The handle already owns an open container.
    #[error("a container is already open on this handle: {0}")]
    AlreadyOpen(String),
    /// The operation needs an open container.
    #[error("no container is open on this handle")]
    NotOpen,
    /// A write was issued outside of an `open`/`close` bracket.
    #[error("no step is open; call `open` before writing `{0}`")]
    StepNotOpen(String),
    /// A pending object was finalized before its reads were performed.
    #[error("values of `{0}` were not transferred; perform the scheduled reads first")]
    ReadsPending(String),
    /// Re-initialization with a different communicator.
    #[error("subsystem already initialized with a different communicator")]
    AlreadyInitialized,
    // --- type mismatch ----------------------------------------------------
    /// Requested host type disagrees with the recorded element type.
    #[error("type mismatch for `{path}`: requested {expected:?}, stored {found:?}")]
    TypeMismatch {
        path: String,
        expected: ContainerType,
        found: ContainerType,
    },

    // --- missing data that violates an invariant ---------------------------
    /// Array lookup by name failed.
    #[error("array `{0}` not found")]
    ArrayNotFound(String),
    /// Array lookup by id failed.
    #[error("no array with id {0}")]
    ArrayIdNotFound(usize),
    /// A named dimension does not resolve to a written integer scalar.
    #[error("dimension `{dim}` of `{path}` is not an integer scalar written in this step")]
    MissingDimension { path: String, dim: String },
    /// Buffer length disagrees with the declared/resolved shape.
    #[error("shape mismatch for `{path}`: expected {expected} elements, got {actual}")]
    ShapeMismatch {
        path: String,
        expected: usize,
        actual: usize,
    },
    /// A count is too large for the integer type it is stored as.
    #[error("count {count} of `{path}` does not fit its stored integer type")]
    CountOverflow { path: String, count: usize },
    /// Declared dimensionality does not suit the operation.
    #[error("invalid dimensionality for `{0}`")]
    InvalidDimensionality(String),
    /// Step index outside the available range.
    #[error("step {step} of `{path}` is out of range")]
    StepOutOfRange { path: String, step: usize },
    /// Block index not written for the requested step.
    #[error("block {block} of `{path}` at step {step} does not exist")]
    BlockOutOfRange {
        path: String,
        step: usize,
        block: usize,
    },
    /// Element type without a storable representation.
    #[error("element type of `{0}` cannot be stored")]
    UnsupportedType(String),

    // --- transport ----------------------------------------------------------
    /// Underlying file I/O failure.
    #[error("container I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Corrupt or foreign container bytes.
    #[error("container format error: {0}")]
    Format(String),
    /// Collective communication failure.
    #[error("communication error: {0}")]
    Comm(String),
    /// Backend or transport name that cannot be served.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
}

impl From<bincode::Error> for ContainerError {
    fn from(e: bincode::Error) -> Self {
        ContainerError::Format(e.to_string())
    }
}
