//! Adler-32 variant checksum (spec §4.1, §8 property 5 / scenario b).
//!
//! The modulus (`0xFFF1` = 65521) and the 5552-byte blocked accumulation
//! are exactly the classic zlib Adler-32 construction, so this wraps the
//! `adler` crate rather than re-deriving the block-unrolling by hand —
//! the result is bit-identical to the reference Python implementation
//! (`sum1 | (sum2 << 16)`, blocked mod `0xFFF1`) for any input.

/// Computes the checksum used to verify compressed and decompressed
/// payloads (spec §4.1). Mismatch against a stored value is fatal to the
/// current block (spec §7, `ChecksumMismatch`).
pub fn adler32_variant(data: &[u8]) -> u32 {
    adler::adler32_slice(data)
}

/// Verifies `data` against an expected checksum, returning the
/// `ChecksumMismatch` error variant on disagreement.
pub fn verify(data: &[u8], expected: u32) -> crate::error::Result<()> {
    let actual = adler32_variant(data);
    if actual == expected {
        Ok(())
    } else {
        Err(crate::error::HypeError::ChecksumMismatch { expected, actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// spec §8 scenario (b): 256 ascending bytes, parity with the
    /// reference blocked/unrolled Python implementation.
    #[test]
    fn checksum_vector_256_bytes() {
        let data: Vec<u8> = (0u8..=255).collect();

        // Reference implementation transcribed directly from spec §8(b):
        // sum1/sum2 accumulated mod 0xFFF1, blocked by 5552 bytes.
        let mut sum1: u32 = 1;
        let mut sum2: u32 = 0;
        const MOD: u32 = 0xFFF1;
        const NMAX: usize = 5552;
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + NMAX).min(data.len());
            for &b in &data[offset..end] {
                sum1 += b as u32;
                sum2 += sum1;
            }
            sum1 %= MOD;
            sum2 %= MOD;
            offset = end;
        }
        let reference = sum1 | (sum2 << 16);

        assert_eq!(adler32_variant(&data), reference);
    }

    #[test]
    fn checksum_empty_is_one() {
        assert_eq!(adler32_variant(&[]), 1);
    }

    #[test]
    fn verify_detects_mismatch() {
        let data = b"payload";
        let good = adler32_variant(data);
        assert!(verify(data, good).is_ok());
        assert!(matches!(
            verify(data, good ^ 1),
            Err(crate::error::HypeError::ChecksumMismatch { .. })
        ));
    }
}
