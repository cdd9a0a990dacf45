//! Signed integers, also used for timestamp columns: the first value followed
//! by the deltas between consecutive values, each zigzag varint encoded.

use super::{EncodingError, decode_varints, put_varint};

pub fn encode(src: &[i64], dst: &mut Vec<u8>) -> Result<(), EncodingError> {
    let mut prev = 0_i64;
    for &v in src {
        // i64 varints are zigzag encoded
        put_varint(dst, v.wrapping_sub(prev));
        prev = v;
    }
    Ok(())
}

pub fn decode(src: &[u8], dst: &mut Vec<i64>) -> Result<(), EncodingError> {
    let mut prev = 0_i64;
    decode_varints::<i64>(src, |delta| {
        prev = prev.wrapping_add(delta);
        dst.push(prev);
    })
}
