//! Floats: the bits of each value XORed with the bits of its predecessor,
//! varint encoded. Runs of equal values encode to a single byte each.

use super::{EncodingError, decode_varints, put_varint};

pub fn encode(src: &[f64], dst: &mut Vec<u8>) -> Result<(), EncodingError> {
    let mut prev = 0_u64;
    for v in src {
        let bits = v.to_bits();
        put_varint(dst, bits ^ prev);
        prev = bits;
    }
    Ok(())
}

pub fn decode(src: &[u8], dst: &mut Vec<f64>) -> Result<(), EncodingError> {
    let mut prev = 0_u64;
    decode_varints::<u64>(src, |xor| {
        prev ^= xor;
        dst.push(f64::from_bits(prev));
    })
}
