//! Unsigned integers: the first value followed by the wrapping deltas between
//! consecutive values, each varint encoded.

use super::{EncodingError, decode_varints, put_varint};

pub fn encode(src: &[u64], dst: &mut Vec<u8>) -> Result<(), EncodingError> {
    let mut prev = 0_u64;
    for &v in src {
        put_varint(dst, v.wrapping_sub(prev));
        prev = v;
    }
    Ok(())
}

pub fn decode(src: &[u8], dst: &mut Vec<u64>) -> Result<(), EncodingError> {
    let mut prev = 0_u64;
    decode_varints::<u64>(src, |delta| {
        prev = prev.wrapping_add(delta);
        dst.push(prev);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapping_deltas() {
        let src = vec![u64::MAX, 0, 5, 3, u64::MAX];
        let mut dst = vec![];
        encode(&src, &mut dst).unwrap();

        let mut got = vec![];
        decode(&dst, &mut got).unwrap();
        assert_eq!(got, src);
    }

    #[test]
    fn increasing_counters_are_compact() {
        let src: Vec<u64> = (0..10).map(|i| (1 << 40) | i).collect();
        let mut dst = vec![];
        encode(&src, &mut dst).unwrap();
        assert_eq!(dst.len(), 6 + 9);
    }
}
