//! Memory Context: reconstructs a virtual address space from the SNA block
//! table and pairs it with one relocation table (spec §4.4). Every typed
//! walker reads exclusively through this — it is the sole owner of the
//! decompressed block payloads (spec §3, "Ownership").

use crate::error::{HypeError, Result};
use crate::reloc::RelocationTable;
use crate::sna::Block;

/// A resolved virtual address: which block it falls in, and the byte
/// offset within that block's payload.
#[derive(Debug, Clone, Copy)]
pub struct Location {
    pub block_index: usize,
    pub offset: usize,
}

pub struct MemoryContext {
    blocks: Vec<Block>,
    reloc: RelocationTable,
}

impl MemoryContext {
    pub fn new(blocks: Vec<Block>, reloc: RelocationTable) -> Result<Self> {
        crate::sna::assert_no_overlap(&blocks)?;
        Ok(Self { blocks, reloc })
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, index: usize) -> &Block {
        &self.blocks[index]
    }

    pub fn block_by_key(&self, module: u8, id: u8) -> Option<(usize, &Block)> {
        self.blocks
            .iter()
            .enumerate()
            .find(|(_, b)| b.module == module && b.id == id)
    }

    pub fn relocations(&self) -> &RelocationTable {
        &self.reloc
    }

    /// Locate(addr): finds the unique block whose half-open range covers
    /// `addr`, returning its index and the byte offset within its payload.
    /// Returns `UnmappedAddress` otherwise (spec §3, §4.4).
    pub fn locate(&self, addr: u32) -> Result<Location> {
        for (index, block) in self.blocks.iter().enumerate() {
            if block.covers(addr) {
                let offset = addr as i64 - block.base_in_memory as i64;
                return Ok(Location {
                    block_index: index,
                    offset: offset as usize,
                });
            }
        }
        Err(HypeError::UnmappedAddress(addr))
    }

    /// Read(addr, n): a zero-copy slice starting at `Locate(addr)`. Fails if
    /// the slice would cross a block boundary.
    pub fn read(&self, addr: u32, n: usize) -> Result<&[u8]> {
        let loc = self.locate(addr)?;
        let block = &self.blocks[loc.block_index];
        let end = loc.offset
            .checked_add(n)
            .ok_or_else(|| HypeError::UnmappedAddress(addr))?;
        block.payload.get(loc.offset..end).ok_or_else(|| {
            HypeError::InvariantViolation(format!(
                "read of {n} bytes at {addr:#010x} crosses block ({}:{}) boundary",
                block.module, block.id
            ))
        })
    }

    /// A stateful little-endian cursor positioned at `Locate(addr)`.
    /// Advances within a single block only — callers needing to cross
    /// blocks must `follow_pointer` and re-seat the cursor.
    pub fn cursor_at(&self, addr: u32) -> Result<Cursor<'_>> {
        let loc = self.locate(addr)?;
        Ok(Cursor {
            ctx: self,
            block_index: loc.block_index,
            offset: loc.offset,
        })
    }

    /// FollowPointer(addr): reads a `u32` at `addr`; if a relocation entry
    /// declares that word a pointer, returns its (verified) target address.
    /// Otherwise, in scan mode, dereferences optimistically iff the raw
    /// value happens to resolve to some mapped address (spec §4.4).
    pub fn follow_pointer(&self, addr: u32) -> Result<u32> {
        let raw = u32::from_le_bytes(self.read(addr, 4)?.try_into().unwrap());

        if let Some(entry) = self.reloc.entry_at(addr) {
            // Invariant (spec §3 / §8 property 2): the word resolves to a
            // byte within the declared target block.
            let loc = self.locate(raw)?;
            let target = &self.blocks[loc.block_index];
            if target.module != entry.target_module || target.id != entry.target_id {
                return Err(HypeError::InvariantViolation(format!(
                    "relocation at {addr:#010x} declares target ({}:{}) but value {raw:#010x} resolves to ({}:{})",
                    entry.target_module, entry.target_id, target.module, target.id
                )));
            }
            return Ok(raw);
        }

        // No table entry: optimistic scan-mode dereference.
        if self.locate(raw).is_ok() {
            Ok(raw)
        } else {
            Err(HypeError::UnmappedAddress(raw))
        }
    }
}

/// Stateful little-endian reader over one block's payload (spec §4.4).
pub struct Cursor<'a> {
    ctx: &'a MemoryContext,
    block_index: usize,
    offset: usize,
}

impl<'a> Cursor<'a> {
    /// Current virtual address of the cursor's read position.
    pub fn addr(&self) -> u32 {
        let block = &self.ctx.blocks[self.block_index];
        (block.base_in_memory as i64 + self.offset as i64) as u32
    }

    fn payload(&self) -> &'a [u8] {
        &self.ctx.blocks[self.block_index].payload
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let payload = self.payload();
        let end = self.offset.checked_add(n).filter(|&e| e <= payload.len());
        match end {
            Some(end) => {
                let slice = &payload[self.offset..end];
                self.offset = end;
                Ok(slice)
            }
            None => {
                let block = &self.ctx.blocks[self.block_index];
                Err(HypeError::InvariantViolation(format!(
                    "cursor read of {n} bytes overruns block ({}:{})",
                    block.module, block.id
                )))
            }
        }
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn i8(&mut self) -> Result<i8> {
        Ok(self.u8()? as i8)
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn i16(&mut self) -> Result<i16> {
        Ok(self.u16()? as i16)
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(self.u32()? as i32)
    }

    pub fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn slice(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reloc::RelocEntry;

    fn two_block_context() -> MemoryContext {
        let mut a_payload = vec![0u8; 0x30];
        a_payload[0x20..0x24].copy_from_slice(&0x0020_0008u32.to_le_bytes());
        let block_a = Block {
            module: 0x10,
            id: 0x01,
            base_in_memory: 0x0010_0000,
            payload: a_payload,
            file_position: 0,
        };
        let block_b = Block {
            module: 0x20,
            id: 0x02,
            base_in_memory: 0x0020_0000,
            payload: vec![0u8; 16],
            file_position: 0,
        };

        let mut reloc = RelocationTable::default();
        reloc.insert(RelocEntry {
            source_module: 0x10,
            source_id: 0x01,
            offset_in_memory: 0x0010_0020,
            target_module: 0x20,
            target_id: 0x02,
        });

        MemoryContext::new(vec![block_a, block_b], reloc).unwrap()
    }

    /// spec §8 scenario (e).
    #[test]
    fn scenario_e_pointer_resolution() {
        let ctx = two_block_context();
        let target = ctx.follow_pointer(0x0010_0020).unwrap();
        assert_eq!(target, 0x0020_0008);
        let loc = ctx.locate(target).unwrap();
        assert_eq!(loc.block_index, 1);
        assert_eq!(loc.offset, 8);
    }

    #[test]
    fn locate_is_partial_function() {
        let ctx = two_block_context();
        assert!(ctx.locate(0x0015_0000).is_err()); // gap between blocks
        assert!(ctx.locate(0x0010_0000).is_ok());
        assert!(ctx.locate(0x0010_002F).is_ok()); // last byte of block a
        assert!(ctx.locate(0x0010_0030).is_err()); // one past the end
    }

    #[test]
    fn cursor_reads_within_one_block() {
        let ctx = two_block_context();
        let mut cursor = ctx.cursor_at(0x0010_0020).unwrap();
        assert_eq!(cursor.u32().unwrap(), 0x0020_0008);
    }

    #[test]
    fn read_across_boundary_fails() {
        let ctx = two_block_context();
        assert!(ctx.read(0x0010_002E, 8).is_err());
    }
}
