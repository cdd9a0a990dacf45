//! Strings: each value prefixed with its varint length, with the whole run
//! compressed using Snappy. Snappy is the only available string compression
//! format at this time.

use super::{EncodingError, MAX_VAR_INT_64, get_varint, put_varint};

/// A compressed encoding using Snappy compression.
const STRING_COMPRESSED_SNAPPY: u8 = 1;
/// The header consists of one byte whose high nibble is the compression type.
const HEADER_LEN: usize = 1;

pub fn encode(src: &[String], dst: &mut Vec<u8>) -> Result<(), EncodingError> {
    if src.is_empty() {
        return Ok(());
    }

    let source_size: usize = src.iter().map(|s| MAX_VAR_INT_64 + s.len()).sum();
    let mut data = Vec::with_capacity(source_size);
    for s in src {
        put_varint(&mut data, u64::try_from(s.len())?);
        data.extend_from_slice(s.as_bytes());
    }

    let max_encoded_len = snap::raw::max_compress_len(data.len());
    if max_encoded_len == 0 {
        return Err("source length too large".into());
    }

    let start = dst.len();
    dst.resize(start + HEADER_LEN + max_encoded_len, 0);
    dst[start] = STRING_COMPRESSED_SNAPPY << 4;

    match snap::raw::Encoder::new().compress(&data, &mut dst[start + HEADER_LEN..]) {
        Ok(n) => {
            dst.truncate(start + HEADER_LEN + n);
            Ok(())
        }
        Err(e) => {
            dst.truncate(start);
            Err(e.into())
        }
    }
}

pub fn decode(src: &[u8], dst: &mut Vec<String>) -> Result<(), EncodingError> {
    let Some((&header, compressed)) = src.split_first() else {
        return Ok(());
    };
    if header >> 4 != STRING_COMPRESSED_SNAPPY {
        return Err(format!("unsupported string compression type {}", header >> 4).into());
    }

    let decoded = snap::raw::Decoder::new().decompress_vec(compressed)?;

    let mut i = 0;
    while i < decoded.len() {
        let (length, n) = get_varint::<u64>(&decoded[i..])?;
        let length = usize::try_from(length)?;

        let lower = i + n;
        let upper = lower.checked_add(length).ok_or("length overflow")?;
        if upper > decoded.len() {
            return Err("short buffer".into());
        }

        dst.push(String::from_utf8(decoded[lower..upper].to_vec())?);
        i = upper;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn encode_no_values() {
        let mut dst = vec![];
        encode(&[], &mut dst).unwrap();
        assert!(dst.is_empty());
    }

    #[test]
    fn encode_single() {
        let mut dst = vec![];
        encode(&strings(&["v1"]), &mut dst).unwrap();
        assert_eq!(dst, vec![16, 3, 8, 2, 118, 49]);
    }

    #[test]
    fn encode_appends() {
        let mut dst = vec![7, 7];
        encode(&strings(&["v1"]), &mut dst).unwrap();
        assert_eq!(dst, vec![7, 7, 16, 3, 8, 2, 118, 49]);
    }

    #[test]
    fn multiple_values() {
        let src = strings(&["", "v1", "a much longer string value", "v1", "üñíçødé"]);
        let mut dst = vec![];
        encode(&src, &mut dst).unwrap();

        let mut got = vec![];
        decode(&dst, &mut got).unwrap();
        assert_eq!(got, src);
    }

    #[test]
    fn unknown_compression_type() {
        let mut got = vec![];
        let err = decode(&[0x20, 0, 0], &mut got).unwrap_err();
        assert_eq!(err.to_string(), "unsupported string compression type 2");
    }

    #[test]
    fn corrupt_payload() {
        let mut got = vec![];
        assert!(decode(&[16, 3, 8, 9, 118, 49], &mut got).is_err());
    }
}
