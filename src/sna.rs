//! SNA block table decoder (spec §4.3).
//!
//! After outer XOR-unmasking, an SNA file is a stream of block records. A
//! Montreal block record carries its own virtual base address and a
//! compressed-envelope payload; a sentinel record (`base_in_memory == -1`)
//! terminates the table.

use crate::codec;
use crate::error::{HypeError, Result};
use std::io::{Cursor, Read};

/// A contiguous decompressed byte region that lived at `base_in_memory` in
/// the original process (spec §3, "Block").
#[derive(Debug, Clone)]
pub struct Block {
    pub module: u8,
    pub id: u8,
    pub base_in_memory: i32,
    pub payload: Vec<u8>,
    /// Byte offset of this block's envelope within the source SNA file.
    pub file_position: usize,
}

impl Block {
    pub fn key(&self) -> (u8, u8) {
        (self.module, self.id)
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Half-open virtual address range `[base, base + len)`.
    pub fn covers(&self, addr: u32) -> bool {
        if self.base_in_memory < 0 {
            return false;
        }
        let base = self.base_in_memory as u32;
        let end = base.saturating_add(self.payload.len() as u32);
        addr >= base && addr < end
    }
}

fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8> {
    let mut buf = [0u8; 1];
    cursor.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32> {
    let mut buf = [0u8; 4];
    cursor.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32(cursor: &mut Cursor<&[u8]>) -> Result<i32> {
    Ok(read_u32(cursor)? as i32)
}

/// Decodes the block-record stream of an already outer-XOR-decoded SNA
/// buffer. Malformed size fields truncate the stream (prior blocks are
/// retained); a bad envelope checksum is fatal only to that one block
/// (spec §4.3 error policy).
pub fn read_blocks(data: &[u8]) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut cursor = Cursor::new(data);

    loop {
        let record_start = cursor.position() as usize;

        let module = match read_u8(&mut cursor) {
            Ok(v) => v,
            Err(_) => break,
        };
        let id = match read_u8(&mut cursor) {
            Ok(v) => v,
            Err(_) => break,
        };
        let _unk1 = match read_u8(&mut cursor) {
            Ok(v) => v,
            Err(_) => break,
        };
        let base_in_memory = match read_i32(&mut cursor) {
            Ok(v) => v,
            Err(_) => break,
        };

        if base_in_memory == -1 {
            break; // sentinel terminator
        }

        let header_rest = (|| -> Result<(u32, u32, u32, u32)> {
            let _unk2 = read_u32(&mut cursor)?;
            let _unk3 = read_u32(&mut cursor)?;
            let _max_pos_minus_9 = read_u32(&mut cursor)?;
            let size = read_u32(&mut cursor)?;
            Ok((_unk2, _unk3, _max_pos_minus_9, size))
        })();

        let (_, _, _, size) = match header_rest {
            Ok(v) => v,
            Err(_) => break,
        };

        let remaining = data.len().saturating_sub(cursor.position() as usize);
        if size as usize > remaining {
            log::warn!(
                "SNA block ({module}:{id}) claims size {size} but only {remaining} bytes remain; truncating stream"
            );
            break;
        }

        let envelope_start = cursor.position() as usize;
        let envelope_end = envelope_start + size as usize;
        let envelope_bytes = &data[envelope_start..envelope_end];

        match codec::decode_envelope(envelope_bytes) {
            Ok((payload, _consumed)) => {
                blocks.push(Block {
                    module,
                    id,
                    base_in_memory,
                    payload,
                    file_position: record_start,
                });
            }
            Err(err) => {
                log::warn!("SNA block ({module}:{id}) rejected: {err}");
            }
        }

        cursor.set_position(envelope_end as u64);
    }

    blocks
}

/// Validates that no two blocks overlap in virtual address space (spec §3
/// invariant, §8 property 1).
pub fn assert_no_overlap(blocks: &[Block]) -> Result<()> {
    let mut sorted: Vec<&Block> = blocks
        .iter()
        .filter(|b| b.base_in_memory >= 0)
        .collect();
    sorted.sort_by_key(|b| b.base_in_memory);
    for pair in sorted.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let a_end = a.base_in_memory as i64 + a.payload.len() as i64;
        if a_end > b.base_in_memory as i64 {
            return Err(HypeError::InvariantViolation(format!(
                "block ({}:{}) [{:#x}, {:#x}) overlaps block ({}:{}) at {:#x}",
                a.module, a.id, a.base_in_memory, a_end, b.module, b.id, b.base_in_memory
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::checksum::adler32_variant;

    fn build_envelope(payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&adler32_variant(payload).to_le_bytes());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&adler32_variant(payload).to_le_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    fn build_block_record(module: u8, id: u8, base: i32, payload: &[u8]) -> Vec<u8> {
        let envelope = build_envelope(payload);
        let mut rec = Vec::new();
        rec.push(module);
        rec.push(id);
        rec.push(0); // unk1
        rec.extend_from_slice(&base.to_le_bytes());
        rec.extend_from_slice(&0u32.to_le_bytes()); // unk2
        rec.extend_from_slice(&0u32.to_le_bytes()); // unk3
        rec.extend_from_slice(&0u32.to_le_bytes()); // max_pos_minus_9
        rec.extend_from_slice(&(envelope.len() as u32).to_le_bytes()); // size
        rec.extend_from_slice(&envelope);
        rec
    }

    fn terminator() -> Vec<u8> {
        let mut rec = vec![0u8, 0u8, 0u8];
        rec.extend_from_slice(&(-1i32).to_le_bytes());
        rec
    }

    #[test]
    fn reads_multiple_blocks_until_sentinel() {
        let mut data = Vec::new();
        data.extend(build_block_record(0x10, 0x01, 0x0010_0000, b"block one payload"));
        data.extend(build_block_record(0x20, 0x02, 0x0020_0000, b"block two payload!!"));
        data.extend(terminator());

        let blocks = read_blocks(&data);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].key(), (0x10, 0x01));
        assert_eq!(blocks[0].payload, b"block one payload");
        assert_eq!(blocks[1].key(), (0x20, 0x02));
    }

    #[test]
    fn truncates_on_bad_size_but_keeps_prior_blocks() {
        let mut data = Vec::new();
        data.extend(build_block_record(0x10, 0x01, 0x0010_0000, b"ok block"));
        // A second record whose declared size overruns the buffer.
        let mut bad = vec![0x30u8, 0x03u8, 0u8];
        bad.extend_from_slice(&0x0030_0000i32.to_le_bytes());
        bad.extend_from_slice(&0u32.to_le_bytes());
        bad.extend_from_slice(&0u32.to_le_bytes());
        bad.extend_from_slice(&0u32.to_le_bytes());
        bad.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        data.extend(bad);

        let blocks = read_blocks(&data);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].key(), (0x10, 0x01));
    }

    #[test]
    fn rejects_block_with_bad_checksum_but_continues() {
        let mut data = Vec::new();
        let mut envelope = build_envelope(b"corrupt me");
        let last = envelope.len() - 1;
        envelope[last] ^= 0xFF; // corrupt decompressed payload after checksum computed
        let mut rec = vec![0x40u8, 0x04u8, 0u8];
        rec.extend_from_slice(&0x0040_0000i32.to_le_bytes());
        rec.extend_from_slice(&0u32.to_le_bytes());
        rec.extend_from_slice(&0u32.to_le_bytes());
        rec.extend_from_slice(&0u32.to_le_bytes());
        rec.extend_from_slice(&(envelope.len() as u32).to_le_bytes());
        rec.extend_from_slice(&envelope);
        data.extend(rec);
        data.extend(build_block_record(0x50, 0x05, 0x0050_0000, b"fine"));
        data.extend(terminator());

        let blocks = read_blocks(&data);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].key(), (0x50, 0x05));
    }

    #[test]
    fn overlap_detection() {
        let blocks = vec![
            Block { module: 1, id: 1, base_in_memory: 0x1000, payload: vec![0u8; 0x100], file_position: 0 },
            Block { module: 1, id: 2, base_in_memory: 0x1050, payload: vec![0u8; 0x100], file_position: 0 },
        ];
        assert!(assert_no_overlap(&blocks).is_err());
    }
}
