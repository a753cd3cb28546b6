//! Relocation table decoder — RTB/RTP/RTT/RTD/RTG/RTS/RTV (spec §4.3).
//!
//! All seven table kinds share one layout: a per-source-block pointer-count
//! header followed by a compressed-envelope payload of fixed-size entries.
//! Montreal entries are 6 bytes; non-Montreal variants add two ignored tag
//! bytes per entry, which this crate does not need to support (spec §9,
//! Open Question 3 — Montreal only).

use crate::codec;
use crate::error::Result;
use std::collections::HashMap;
use std::io::{Cursor, Read};

/// A single relocation: the 32-bit word at `offset_in_memory` inside the
/// source block is itself a pointer to `(target_module, target_id)` (spec
/// §3, "Relocation entry").
#[derive(Debug, Clone, Copy)]
pub struct RelocEntry {
    pub source_module: u8,
    pub source_id: u8,
    pub offset_in_memory: u32,
    pub target_module: u8,
    pub target_id: u8,
}

/// The decoded relocation list, indexed both ways per spec §4.3: by source
/// block, and by the virtual address the pointer word itself lives at.
#[derive(Debug, Default)]
pub struct RelocationTable {
    by_source: HashMap<(u8, u8), Vec<RelocEntry>>,
    by_offset: HashMap<u32, RelocEntry>,
}

impl RelocationTable {
    /// Inserts a single entry, indexing it both ways. Exposed crate-wide so
    /// synthetic tables can be built directly in tests that live outside
    /// this module.
    pub(crate) fn insert(&mut self, entry: RelocEntry) {
        self.by_offset.insert(entry.offset_in_memory, entry);
        self.by_source
            .entry((entry.source_module, entry.source_id))
            .or_default()
            .push(entry);
    }

    pub fn entries_for(&self, module: u8, id: u8) -> &[RelocEntry] {
        self.by_source
            .get(&(module, id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn entry_at(&self, offset_in_memory: u32) -> Option<&RelocEntry> {
        self.by_offset.get(&offset_in_memory)
    }

    pub fn len(&self) -> usize {
        self.by_offset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_offset.is_empty()
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

const ENTRY_SIZE: usize = 6; // offset_in_memory:u32, target_module:u8, target_id:u8

/// Decodes a Montreal relocation table (any of RTB/RTP/RTT/RTD/RTG/RTS/RTV
/// — they're byte-identical aside from which pointer role they cover).
pub fn read_relocation_table(data: &[u8]) -> Result<RelocationTable> {
    let mut table = RelocationTable::default();
    let mut cursor = Cursor::new(data);

    let block_count = read_u8(&mut cursor)?;

    for _ in 0..block_count {
        let source_module = read_u8(&mut cursor)?;
        let source_id = read_u8(&mut cursor)?;
        let pointer_count = read_u32(&mut cursor)?;

        if pointer_count == 0 {
            continue;
        }

        let envelope_start = cursor.position() as usize;
        let (payload, consumed) = codec::decode_envelope(&data[envelope_start..])?;
        cursor.set_position((envelope_start + consumed) as u64);

        let mut entry_cursor = Cursor::new(payload.as_slice());
        let mut entries = Vec::with_capacity(pointer_count as usize);
        for _ in 0..pointer_count {
            let offset_in_memory = read_u32(&mut entry_cursor)?;
            let target_module = read_u8(&mut entry_cursor)?;
            let target_id = read_u8(&mut entry_cursor)?;
            let entry = RelocEntry {
                source_module,
                source_id,
                offset_in_memory,
                target_module,
                target_id,
            };
            entries.push(entry);
            table.insert(entry);
        }
        debug_assert_eq!(entries.len() * ENTRY_SIZE, payload.len());
    }

    Ok(table)
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

    #[test]
    fn decodes_single_block_single_entry() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&0x0010_0020u32.to_le_bytes());
        payload.push(0x20); // target_module
        payload.push(0x02); // target_id
        let envelope = build_envelope(&payload);

        let mut data = Vec::new();
        data.push(1u8); // block_count
        data.push(0x10); // source_module
        data.push(0x01); // source_id
        data.extend_from_slice(&1u32.to_le_bytes()); // pointer_count
        data.extend_from_slice(&envelope);

        let table = read_relocation_table(&data).unwrap();
        assert_eq!(table.len(), 1);
        let entry = table.entry_at(0x0010_0020).unwrap();
        assert_eq!(entry.target_module, 0x20);
        assert_eq!(entry.target_id, 0x02);
        assert_eq!(table.entries_for(0x10, 0x01).len(), 1);
    }

    #[test]
    fn zero_pointer_count_block_is_skipped_cleanly() {
        let mut data = Vec::new();
        data.push(1u8);
        data.push(0x10);
        data.push(0x01);
        data.extend_from_slice(&0u32.to_le_bytes());

        let table = read_relocation_table(&data).unwrap();
        assert!(table.is_empty());
    }
}
