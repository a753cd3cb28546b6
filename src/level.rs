//! Full-level assembly: ties the SNA block table, one relocation table and
//! a GPT seed address into a ready-to-walk [`MemoryContext`] + [`SceneGraph`]
//! pair (spec §2 "Data flow", §4.4-§4.6).
//!
//! Everything below the block-record stream is format-agnostic file bytes;
//! this module is the one place that knows how a level's three files
//! (`.sna`, its relocation table, and the GPT) compose into one address
//! space, so the CLI doesn't have to re-derive that wiring per subcommand.

use crate::codec::xor;
use crate::error::{HypeError, Result};
use crate::memory::MemoryContext;
use crate::reloc::{self, RelocationTable};
use crate::scene::{self, SceneGraph};
use crate::sna::{self, Block};

/// Which outer XOR scheme, if any, a raw file needs unmasked before its
/// block-record or relocation-record stream can be parsed (spec §4.1).
#[derive(Debug, Clone, Copy)]
pub enum OuterXor {
    /// Mask seed is the file's own first 4 bytes (the common case).
    NumberMaskHeader,
    /// Fixed initial mask, no header bytes consumed.
    NumberMaskFixed,
    /// 10-byte sliding window key.
    Window,
    /// Not masked at the container level.
    None,
}

pub fn unmask(data: &[u8], scheme: OuterXor) -> Result<Vec<u8>> {
    match scheme {
        OuterXor::NumberMaskHeader => xor::number_mask_decode_with_header(data),
        OuterXor::NumberMaskFixed => Ok(xor::number_mask_decode_fixed(data)),
        OuterXor::Window => Ok(xor::window_mode_decode(data)),
        OuterXor::None => Ok(data.to_vec()),
    }
}

/// A fully decoded level: its address space plus the SuperObject tree
/// rooted at the GPT.
pub struct Level {
    pub memory: MemoryContext,
    pub scene: SceneGraph,
}

/// Loads the blocks in `sna_data` and the relocation entries in
/// `reloc_data`, builds the combined [`MemoryContext`], then walks the
/// scene graph from `gpt_addr`.
pub fn load_level(
    sna_data: &[u8],
    sna_xor: OuterXor,
    reloc_data: &[u8],
    reloc_xor: OuterXor,
    gpt_addr: u32,
    cancel: &crate::error::CancelToken,
) -> Result<Level> {
    if cancel.is_cancelled() {
        return Err(HypeError::Cancelled);
    }
    let sna_plain = unmask(sna_data, sna_xor)?;
    let blocks: Vec<Block> = sna::read_blocks(&sna_plain);

    if cancel.is_cancelled() {
        return Err(HypeError::Cancelled);
    }
    let reloc_plain = unmask(reloc_data, reloc_xor)?;
    let reloc_table: RelocationTable = reloc::read_relocation_table(&reloc_plain)?;

    let memory = MemoryContext::new(blocks, reloc_table)?;
    let scene = scene::build_scene_graph(&memory, gpt_addr)?;
    Ok(Level { memory, scene })
}

/// Loads a level whose GPT seed lives in its own `.gpt` file rather than a
/// known address literal. A GPT file is block-table-shaped like the SNA
/// itself (SPEC_FULL §3: "three consecutive u32 virtual addresses ... in
/// the GPT block's payload, read through the same Memory Context cursor as
/// everything else") — its blocks are merged into the same address space as
/// the SNA's, and the seed address is the first GPT block's own mapped
/// base, not a value taken directly from the file's raw bytes.
pub fn load_level_with_gpt_file(
    sna_data: &[u8],
    sna_xor: OuterXor,
    reloc_data: &[u8],
    reloc_xor: OuterXor,
    gpt_data: &[u8],
    gpt_xor: OuterXor,
    cancel: &crate::error::CancelToken,
) -> Result<Level> {
    if cancel.is_cancelled() {
        return Err(HypeError::Cancelled);
    }
    let sna_plain = unmask(sna_data, sna_xor)?;
    let mut blocks: Vec<Block> = sna::read_blocks(&sna_plain);

    let gpt_plain = unmask(gpt_data, gpt_xor)?;
    let gpt_blocks = sna::read_blocks(&gpt_plain);
    let gpt_addr = gpt_blocks
        .first()
        .map(|b| b.base_in_memory as u32)
        .ok_or_else(|| HypeError::MalformedFile("GPT file contains no blocks".into()))?;
    blocks.extend(gpt_blocks);

    if cancel.is_cancelled() {
        return Err(HypeError::Cancelled);
    }
    let reloc_plain = unmask(reloc_data, reloc_xor)?;
    let reloc_table: RelocationTable = reloc::read_relocation_table(&reloc_plain)?;

    let memory = MemoryContext::new(blocks, reloc_table)?;
    let scene = scene::build_scene_graph(&memory, gpt_addr)?;
    Ok(Level { memory, scene })
}

/// Loads only the address space, without requiring a GPT seed — used by
/// subcommands (`meshes` in scan mode, `scripts`) that search every block
/// directly rather than walking the scene graph (spec §4.9, "heuristic
/// scanning").
pub fn load_memory(
    sna_data: &[u8],
    sna_xor: OuterXor,
    reloc_data: &[u8],
    reloc_xor: OuterXor,
) -> Result<MemoryContext> {
    let sna_plain = unmask(sna_data, sna_xor)?;
    let blocks = sna::read_blocks(&sna_plain);
    let reloc_plain = unmask(reloc_data, reloc_xor)?;
    let reloc_table = reloc::read_relocation_table(&reloc_plain)?;
    MemoryContext::new(blocks, reloc_table)
}
