use std::fmt::Debug;

use crate::{
    BlockType, Error, Result,
    encoders::{self, EncodingError, get_varint, put_varint},
};

/// A scalar that can be stored in a block.
///
/// Implemented for every supported value type, each backed by the matching
/// byte-level encoder in [`encoders`].
pub trait BlockValue: Clone + Debug + PartialEq + Send + Sync + 'static {
    const BLOCK_TYPE: BlockType;

    /// Append the encoded form of `src` to `dst`.
    fn encode_values(src: &[Self], dst: &mut Vec<u8>) -> Result<(), EncodingError>;

    /// Append the values encoded in `src` to `dst`.
    fn decode_values(src: &[u8], dst: &mut Vec<Self>) -> Result<(), EncodingError>;
}

macro_rules! block_value {
    ($t:ty, $block_type:ident, $encoder:ident) => {
        impl BlockValue for $t {
            const BLOCK_TYPE: BlockType = BlockType::$block_type;

            fn encode_values(src: &[Self], dst: &mut Vec<u8>) -> Result<(), EncodingError> {
                encoders::$encoder::encode(src, dst)
            }

            fn decode_values(src: &[u8], dst: &mut Vec<Self>) -> Result<(), EncodingError> {
                encoders::$encoder::decode(src, dst)
            }
        }
    };
}

block_value!(f64, Float, float);
block_value!(i64, Integer, integer);
block_value!(u64, Unsigned, unsigned);
block_value!(bool, Bool, boolean);
block_value!(String, Str, string);

/// Parallel timestamp and value columns of a single value type.
///
/// Both columns always have the same length, including after a failed
/// operation, which leaves the array either unchanged or empty.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedArray<T> {
    timestamps: Vec<i64>,
    values: Vec<T>,
}

impl<T> Default for TypedArray<T> {
    fn default() -> Self {
        Self {
            timestamps: Vec::new(),
            values: Vec::new(),
        }
    }
}

impl<T: BlockValue> TypedArray<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty array with room for `size` samples in both columns.
    ///
    /// Either both columns are allocated or neither is.
    pub fn with_size(size: usize) -> Result<Self> {
        let mut array = Self::new();
        array.reserve_exact(size)?;
        Ok(array)
    }

    /// Build an array from its columns, which must be of equal length.
    pub fn from_parts(timestamps: Vec<i64>, values: Vec<T>) -> Result<Self> {
        if timestamps.len() != values.len() {
            return Err(Error::LengthMismatch {
                block_type: T::BLOCK_TYPE,
                timestamps: timestamps.len(),
                values: values.len(),
            });
        }
        Ok(Self { timestamps, values })
    }

    pub fn into_parts(self) -> (Vec<i64>, Vec<T>) {
        (self.timestamps, self.values)
    }

    pub fn push(&mut self, timestamp: i64, value: T) {
        self.timestamps.push(timestamp);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// The number of samples the array can hold without reallocating.
    pub fn capacity(&self) -> usize {
        self.timestamps.capacity().min(self.values.capacity())
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &T)> {
        self.timestamps.iter().copied().zip(self.values.iter())
    }

    /// Remove all samples, retaining the allocated capacity.
    pub fn clear(&mut self) {
        self.timestamps.clear();
        self.values.clear();
    }

    fn reserve_exact(&mut self, additional: usize) -> Result<()> {
        self.timestamps
            .try_reserve_exact(additional)
            .and_then(|()| self.values.try_reserve_exact(additional))
            .map_err(|source| {
                self.clear();
                Error::AllocationFailed {
                    block_type: T::BLOCK_TYPE,
                    size: additional,
                    source,
                }
            })
    }

    /// Encode the array as a block, appending it to `dst`.
    ///
    /// On error `dst` is restored to its original length and the encoder's
    /// error is returned.
    pub fn encode(&self, dst: &mut Vec<u8>) -> Result<()> {
        let start = dst.len();
        self.encode_block(dst).map_err(|source| {
            dst.truncate(start);
            Error::Encoding {
                block_type: T::BLOCK_TYPE,
                source,
            }
        })
    }

    fn encode_block(&self, dst: &mut Vec<u8>) -> Result<(), EncodingError> {
        let mut ts = Vec::new();
        encoders::integer::encode(&self.timestamps, &mut ts)?;
        put_varint(dst, u64::try_from(ts.len())?);
        dst.extend_from_slice(&ts);
        T::encode_values(&self.values, dst)
    }

    /// Replace the contents of this array with the samples of `block`,
    /// reusing the existing allocations.
    ///
    /// On error the array is left empty.
    pub fn decode(&mut self, block: &[u8]) -> Result<()> {
        self.clear();
        let res = self.decode_block(block);
        if res.is_err() {
            self.clear();
        }
        res
    }

    fn decode_block(&mut self, block: &[u8]) -> Result<()> {
        let decoding = |source: EncodingError| Error::Decoding {
            block_type: T::BLOCK_TYPE,
            source,
        };

        let (ts_len, n) = get_varint::<u64>(block).map_err(decoding)?;
        let ts_end = usize::try_from(ts_len)
            .ok()
            .and_then(|len| n.checked_add(len))
            .filter(|&end| end <= block.len())
            .ok_or_else(|| decoding("timestamp column exceeds block".into()))?;

        encoders::integer::decode(&block[n..ts_end], &mut self.timestamps).map_err(decoding)?;
        T::decode_values(&block[ts_end..], &mut self.values).map_err(decoding)?;

        if self.timestamps.len() != self.values.len() {
            return Err(Error::LengthMismatch {
                block_type: T::BLOCK_TYPE,
                timestamps: self.timestamps.len(),
                values: self.values.len(),
            });
        }
        Ok(())
    }

    /// Copy all samples into `dst`, replacing its contents.
    ///
    /// The storage of `dst` is truncated and extended in place, so a single
    /// destination can be reused across many sources without reallocating
    /// once it has grown large enough. If room cannot be made, `dst` is left
    /// empty.
    pub fn copy_to(&self, dst: &mut Self) -> Result<()> {
        let n = self.len();
        dst.timestamps.truncate(n);
        dst.values.truncate(n);
        dst.reserve_exact(n - dst.len())?;

        dst.timestamps.clone_from(&self.timestamps);
        dst.values.clone_from(&self.values);
        Ok(())
    }
}
