//! Booleans: a varint count followed by the values packed eight to a byte,
//! most significant bit first.

use super::{EncodingError, get_varint, put_varint};

pub fn encode(src: &[bool], dst: &mut Vec<u8>) -> Result<(), EncodingError> {
    if src.is_empty() {
        return Ok(());
    }

    put_varint(dst, u64::try_from(src.len())?);
    for chunk in src.chunks(8) {
        let byte = chunk
            .iter()
            .enumerate()
            .filter(|(_, v)| **v)
            .fold(0_u8, |acc, (i, _)| acc | (0x80 >> i));
        dst.push(byte);
    }
    Ok(())
}

pub fn decode(src: &[u8], dst: &mut Vec<bool>) -> Result<(), EncodingError> {
    if src.is_empty() {
        return Ok(());
    }

    let (count, n) = get_varint::<u64>(src)?;
    let count = usize::try_from(count)?;
    let packed = &src[n..];
    if packed.len() != count.div_ceil(8) {
        return Err(format!(
            "boolean block holds {} bytes for {count} values",
            packed.len()
        )
        .into());
    }

    dst.reserve(count);
    dst.extend((0..count).map(|i| packed[i / 8] & (0x80 >> (i % 8)) != 0));
    Ok(())
}
