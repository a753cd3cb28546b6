//! Channel-RLE decoder used by the GF texture codec (spec §4.1, §4.5).
//!
//! Per channel, independently: a designated "repeat byte" signals that the
//! following two bytes are `(value, count)`, meaning "emit `value` `count`
//! times"; any other byte is emitted verbatim. Decoding stops once
//! `pixel_count` bytes have been produced for that channel, even mid-run.

use crate::error::{HypeError, Result};

/// Decodes a single RLE-compressed channel stream, producing exactly
/// `pixel_count` bytes (spec §8 scenario c).
pub fn decode_channel(input: &[u8], repeat_byte: u8, pixel_count: usize) -> Result<Vec<u8>> {
    Ok(decode_channel_with_len(input, repeat_byte, pixel_count)?.0)
}

/// Same as [`decode_channel`] but also returns how many compressed bytes of
/// `input` were consumed, so callers chaining multiple channel streams back
/// to back (spec §4.5) don't need to re-scan to find the next plane.
pub fn decode_channel_with_len(
    input: &[u8],
    repeat_byte: u8,
    pixel_count: usize,
) -> Result<(Vec<u8>, usize)> {
    let mut out = Vec::with_capacity(pixel_count);
    let mut cursor = 0usize;

    while out.len() < pixel_count {
        let Some(&byte) = input.get(cursor) else {
            return Err(HypeError::MalformedFile(
                "RLE stream exhausted before pixel_count was reached".into(),
            ));
        };
        cursor += 1;

        if byte == repeat_byte {
            let value = *input.get(cursor).ok_or_else(|| {
                HypeError::MalformedFile("RLE run truncated before value byte".into())
            })?;
            cursor += 1;
            let count = *input.get(cursor).ok_or_else(|| {
                HypeError::MalformedFile("RLE run truncated before count byte".into())
            })? as usize;
            cursor += 1;

            let remaining = pixel_count - out.len();
            let take = count.min(remaining);
            out.extend(std::iter::repeat(value).take(take));
        } else {
            out.push(byte);
        }
    }

    Ok((out, cursor))
}

/// Encodes `data` with the given repeat byte, choosing it such that it does
/// not literally occur in `data` (used only by tests to exercise the
/// decoder's own encoder counterpart — spec §8 property 5 round trip).
#[cfg(test)]
fn encode_channel(data: &[u8], repeat_byte: u8) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let byte = data[i];
        let mut run = 1;
        while i + run < data.len() && data[i + run] == byte && run < 255 {
            run += 1;
        }
        if run >= 3 || byte == repeat_byte {
            out.push(repeat_byte);
            out.push(byte);
            out.push(run as u8);
        } else {
            for _ in 0..run {
                out.push(byte);
            }
        }
        i += run;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// spec §8 scenario (c): literal worked example.
    #[test]
    fn scenario_c_literal_example() {
        let repeat_byte = 0xAB;
        let input = [0x01, 0xAB, 0x02, 0x03, 0x04];
        let decoded = decode_channel(&input, repeat_byte, 4).unwrap();
        assert_eq!(decoded, vec![0x01, 0x02, 0x02, 0x02]);
    }

    #[test]
    fn round_trip_any_payload() {
        let repeat_byte = 0x00;
        let data: Vec<u8> = (1u8..=250).chain(1u8..=120).collect(); // no zero byte present
        let encoded = encode_channel(&data, repeat_byte);
        let decoded = decode_channel(&encoded, repeat_byte, data.len()).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn round_trip_all_same_byte() {
        let repeat_byte = 0xFF;
        let data = vec![7u8; 1000];
        let encoded = encode_channel(&data, repeat_byte);
        let decoded = decode_channel(&encoded, repeat_byte, data.len()).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn truncated_stream_errors() {
        let result = decode_channel(&[0xAB, 0x02], 0xAB, 10);
        assert!(result.is_err());
    }
}
