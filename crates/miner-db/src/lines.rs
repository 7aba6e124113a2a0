//! Compact storage format for owned line indices
//!
//! Layout: one format byte followed by the `bincode` encoding of the
//! delta-encoded, sorted line indices. Large sets are zstd-compressed.
//!
//!   format 1: plain bincode payload
//!   format 2: zstd(bincode payload)

use crate::error::{DbError, DbResult};

const FORMAT_PLAIN: u8 = 1;
const FORMAT_ZSTD: u8 = 2;
const ZSTD_LEVEL: i32 = 3;

/// Encodes a set of 0-based line indices.
///
/// Sets with more than `compress_threshold` entries are compressed.
pub fn encode(lines: &[u32], compress_threshold: usize) -> DbResult<Vec<u8>> {
    let mut sorted = lines.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut prev = 0u32;
    let deltas: Vec<u32> = sorted
        .iter()
        .map(|&line| {
            let delta = line - prev;
            prev = line;
            delta
        })
        .collect();

    let payload =
        bincode::serialize(&deltas).map_err(|e| DbError::Codec(format!("serialize: {}", e)))?;

    if sorted.len() > compress_threshold {
        let compressed = zstd::encode_all(payload.as_slice(), ZSTD_LEVEL)
            .map_err(|e| DbError::Codec(format!("compress: {}", e)))?;
        let mut out = Vec::with_capacity(compressed.len() + 1);
        out.push(FORMAT_ZSTD);
        out.extend_from_slice(&compressed);
        Ok(out)
    } else {
        let mut out = Vec::with_capacity(payload.len() + 1);
        out.push(FORMAT_PLAIN);
        out.extend_from_slice(&payload);
        Ok(out)
    }
}

/// Decodes a line set written by [`encode`]
pub fn decode(bytes: &[u8]) -> DbResult<Vec<u32>> {
    let (&format, body) = bytes
        .split_first()
        .ok_or_else(|| DbError::Codec("empty line set".to_string()))?;

    let payload = match format {
        FORMAT_PLAIN => body.to_vec(),
        FORMAT_ZSTD => {
            zstd::decode_all(body).map_err(|e| DbError::Codec(format!("decompress: {}", e)))?
        }
        other => return Err(DbError::Codec(format!("unknown line set format {}", other))),
    };

    let deltas: Vec<u32> = bincode::deserialize(&payload)
        .map_err(|e| DbError::Codec(format!("deserialize: {}", e)))?;

    let mut acc = 0u32;
    deltas
        .into_iter()
        .map(|delta| -> DbResult<u32> {
            acc = acc
                .checked_add(delta)
                .ok_or_else(|| DbError::Codec("line index overflows u32".to_string()))?;
            Ok(acc)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_sets_stay_plain() -> DbResult<()> {
        let bytes = encode(&[0, 1, 2, 10], 64)?;
        assert_eq!(bytes[0], FORMAT_PLAIN);
        assert_eq!(decode(&bytes)?, vec![0, 1, 2, 10]);
        Ok(())
    }

    #[test]
    fn test_large_sets_are_compressed_and_smaller() -> DbResult<()> {
        let lines: Vec<u32> = (0..5000).collect();
        let bytes = encode(&lines, 64)?;
        assert_eq!(bytes[0], FORMAT_ZSTD);
        assert!(bytes.len() < lines.len());
        assert_eq!(decode(&bytes)?, lines);
        Ok(())
    }

    #[test]
    fn test_unsorted_input_is_normalised() -> DbResult<()> {
        let bytes = encode(&[9, 3, 3, 1], 64)?;
        assert_eq!(decode(&bytes)?, vec![1, 3, 9]);
        Ok(())
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        assert!(matches!(decode(&[42, 0, 0]), Err(DbError::Codec(_))));
        assert!(matches!(decode(&[]), Err(DbError::Codec(_))));
    }

    #[test]
    fn test_overflowing_deltas_are_rejected() {
        let mut bytes = vec![FORMAT_PLAIN];
        bytes.extend(bincode::serialize(&vec![u32::MAX, 1u32]).unwrap());
        assert!(matches!(decode(&bytes), Err(DbError::Codec(_))));
    }
}
