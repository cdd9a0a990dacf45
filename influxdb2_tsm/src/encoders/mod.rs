//! Byte-level block encoders, one per value type.
//!
//! Every encoder appends to the destination buffer and emits nothing for an
//! empty input. Every decoder appends to the destination vector, consumes the
//! whole source slice and accepts an empty slice as zero values.

pub mod boolean;
pub mod float;
pub mod integer;
pub mod string;
pub mod unsigned;

use integer_encoding::VarInt;

/// Errors raised by the byte-level encoders.
pub type EncodingError = Box<dyn std::error::Error + Send + Sync>;

/// Maximum number of bytes needed to varint encode a 64-bit value.
pub(crate) const MAX_VAR_INT_64: usize = 10;

pub(crate) fn put_varint<V: VarInt>(dst: &mut Vec<u8>, v: V) {
    let mut buf = [0_u8; MAX_VAR_INT_64];
    let n = v.encode_var(&mut buf);
    dst.extend_from_slice(&buf[..n]);
}

/// Read one varint from the front of `src`, returning it together with the
/// number of bytes consumed.
pub(crate) fn get_varint<V: VarInt>(src: &[u8]) -> Result<(V, usize), EncodingError> {
    V::decode_var(src).ok_or_else(|| "invalid or truncated varint".into())
}

/// Decode a stream of varints until `src` is exhausted.
pub(crate) fn decode_varints<V: VarInt>(
    src: &[u8],
    mut f: impl FnMut(V),
) -> Result<(), EncodingError> {
    let mut i = 0;
    while i < src.len() {
        let (v, n) = get_varint::<V>(&src[i..])?;
        f(v);
        i += n;
    }
    Ok(())
}
