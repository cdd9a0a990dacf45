//! Typed blocks of time series samples.
//!
//! A [`TypedArray`] holds parallel timestamp and value columns for a single
//! value type. It is encoded into, and decoded from, an opaque block of bytes
//! by the per-type encoders in [`encoders`]. Blocks do not describe their own
//! value type; the caller supplies it through the array's type parameter.

mod array;
pub mod encoders;

use std::{collections::TryReserveError, fmt};

use thiserror::Error;

pub use array::{BlockValue, TypedArray};
pub use encoders::EncodingError;

/// The value type held by a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    Float,
    Integer,
    Unsigned,
    Bool,
    Str,
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Float => "float",
            Self::Integer => "integer",
            Self::Unsigned => "unsigned",
            Self::Bool => "boolean",
            Self::Str => "string",
        })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Room for the requested number of samples could not be reserved. The
    /// array involved is left empty.
    #[error("failed to allocate {block_type} array for {size} samples: {source}")]
    AllocationFailed {
        block_type: BlockType,
        size: usize,
        source: TryReserveError,
    },

    /// The block encoder rejected the array.
    #[error("failed to encode {block_type} block: {source}")]
    Encoding {
        block_type: BlockType,
        source: EncodingError,
    },

    /// The block is malformed.
    #[error("failed to decode {block_type} block: {source}")]
    Decoding {
        block_type: BlockType,
        source: EncodingError,
    },

    /// Timestamp and value columns of different lengths were supplied or
    /// decoded.
    #[error("{block_type} block has {timestamps} timestamps but {values} values")]
    LengthMismatch {
        block_type: BlockType,
        timestamps: usize,
        values: usize,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
