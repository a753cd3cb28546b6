//! Family / State / AnimationMontreal walker: character mesh-part tables
//! and compressed skeletal animation (spec §4.8).
//!
//! A Family is the shared graphics template referenced by one or more
//! Perso instances: a linked list of States (named animation states) and
//! a linked list of ObjectLists (the character's mesh-part table). A
//! State's `anim_ref` leads to an AnimationMontreal, whose frames carry
//! per-channel compressed transforms.

use crate::error::{HypeError, Result};
use crate::geometry::{resolve_geometric_object_via_physical_object, GeometricObject};
use crate::memory::{Cursor, MemoryContext};

const STATE_NAME_LEN: usize = 0x50;
/// Hard bound on linked-list walks, guarding against cyclic/corrupt chains
/// the way the scene walker's visited-set guards SuperObject children.
const MAX_CHAIN_LEN: usize = 10_000;

#[derive(Debug, Clone)]
pub struct State {
    pub addr: u32,
    /// Inline name from the fixed 0x50-byte buffer; `None` when the buffer
    /// starts with a null byte (spec §3, "optional inline name").
    pub name: Option<String>,
    pub anim_ref: u32,
    pub speed: u8,
}

#[derive(Debug, Clone)]
pub struct ObjectListEntry {
    pub scale_ptr: u32,
    pub physical_object_ptr: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectList {
    pub entries: Vec<ObjectListEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct Family {
    pub states: Vec<State>,
    pub object_lists: Vec<ObjectList>,
}

fn read_state(ctx: &MemoryContext, addr: u32) -> Result<(State, u32)> {
    let mut cursor = ctx.cursor_at(addr)?;
    let next = cursor.u32()?;

    let mut name_bytes = [0u8; STATE_NAME_LEN];
    for slot in &mut name_bytes {
        *slot = cursor.u8()?;
    }
    let anim_ref = cursor.u32()?;
    let speed = cursor.u8()?;

    let name = match name_bytes.iter().position(|&b| b == 0) {
        Some(0) | None => None,
        Some(end) => Some(String::from_utf8_lossy(&name_bytes[..end]).to_string()),
    };

    Ok((State { addr, name, anim_ref, speed }, next))
}

fn read_object_list(ctx: &MemoryContext, addr: u32) -> Result<(ObjectList, u32)> {
    let mut cursor = ctx.cursor_at(addr)?;
    let next = cursor.u32()?;
    let entry_count = cursor.u32()?;
    let entries_ptr = cursor.u32()?;

    let mut entries = Vec::with_capacity(entry_count as usize);
    for i in 0..entry_count {
        let mut entry_cursor = ctx.cursor_at(entries_ptr + i * 8)?;
        let scale_ptr = entry_cursor.u32()?;
        let physical_object_ptr = entry_cursor.u32()?;
        entries.push(ObjectListEntry { scale_ptr, physical_object_ptr });
    }

    Ok((ObjectList { entries }, next))
}

/// Walks the States and ObjectLists linked lists hanging off a Family
/// record (spec §4.8).
pub fn read_family(ctx: &MemoryContext, states_head: u32, object_lists_head: u32) -> Result<Family> {
    let mut states = Vec::new();
    let mut addr = states_head;
    while addr != 0 {
        let (state, next) = read_state(ctx, addr)?;
        states.push(state);
        addr = next;
        if states.len() > MAX_CHAIN_LEN {
            return Err(HypeError::InvariantViolation(
                "Family state chain exceeds sane bound; likely cyclic".into(),
            ));
        }
    }

    let mut object_lists = Vec::new();
    let mut addr = object_lists_head;
    while addr != 0 {
        let (list, next) = read_object_list(ctx, addr)?;
        object_lists.push(list);
        addr = next;
        if object_lists.len() > MAX_CHAIN_LEN {
            return Err(HypeError::InvariantViolation(
                "Family object-list chain exceeds sane bound; likely cyclic".into(),
            ));
        }
    }

    Ok(Family { states, object_lists })
}

/// Resolves an ObjectListEntry's mesh part through the PhysicalObject ->
/// VisualSet -> LOD[0] chain (spec §4.6, §4.8).
pub fn resolve_mesh_part(ctx: &MemoryContext, entry: &ObjectListEntry) -> Result<GeometricObject> {
    resolve_geometric_object_via_physical_object(ctx, entry.physical_object_ptr)
}

/// A rigid transform plus optional scale, decoded from one of the
/// type-byte-selected compressed matrix layouts (spec §4.8).
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedMatrix {
    pub translation: [f32; 3],
    /// WXYZ quaternion; identity is `(1, 0, 0, 0)`.
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Default for CompressedMatrix {
    fn default() -> Self {
        Self {
            translation: [0.0; 3],
            rotation: [1.0, 0.0, 0.0, 0.0],
            scale: [1.0; 3],
        }
    }
}

#[derive(Debug, Clone)]
pub enum ChannelTransform {
    /// Channel word `0`: no transform for this frame.
    None,
    /// Channel word `1`: identity transform.
    Identity,
    Matrix(CompressedMatrix),
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub transform: ChannelTransform,
    /// Selects which ObjectList entry is rendered on this channel this
    /// frame; `-1` means invisible (spec §4.8, "Object switching").
    pub object_index: i32,
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub channels: Vec<Channel>,
    /// `hierarchy[i]` is channel `i`'s parent channel index, or `-1` for a
    /// root. Only the first frame's hierarchy is treated as canonical
    /// (spec §9, Open Question 1).
    pub hierarchy: Vec<i16>,
}

#[derive(Debug, Clone)]
pub struct AnimationMontreal {
    pub num_frames: u8,
    pub speed: u8,
    pub num_channels: u8,
    pub speed_matrix: [f32; 16],
    pub frames: Vec<Frame>,
    pub skeleton_parents: Vec<i16>,
}

/// Reads translation as on-disk `(x, z, y)` i16 triple scaled by `1/512`,
/// emitted `(x, y, z)` — the same axis swap convention as vertex data
/// (spec §4.7, §8 scenario f).
fn read_translation_i16x3(cursor: &mut Cursor<'_>) -> Result<[f32; 3]> {
    let x = cursor.i16()? as f32;
    let z = cursor.i16()? as f32;
    let y = cursor.i16()? as f32;
    Ok([x / 512.0, y / 512.0, z / 512.0])
}

fn read_rotation_quat_i16x4(cursor: &mut Cursor<'_>) -> Result<[f32; 4]> {
    let w = cursor.i16()? as f32 / 32767.0;
    let x = cursor.i16()? as f32 / 32767.0;
    let y = cursor.i16()? as f32 / 32767.0;
    let z = cursor.i16()? as f32 / 32767.0;
    Ok([w, x, y, z])
}

fn decode_compressed_matrix(ctx: &MemoryContext, addr: u32) -> Result<CompressedMatrix> {
    let mut cursor = ctx.cursor_at(addr)?;
    let type_byte = cursor.u8()?;
    let _pad = cursor.u8()?;
    let kind = type_byte & 0xF;

    let mut out = CompressedMatrix::default();

    match kind {
        1 => {
            out.translation = read_translation_i16x3(&mut cursor)?;
        }
        2 => {
            out.rotation = read_rotation_quat_i16x4(&mut cursor)?;
        }
        3 => {
            out.translation = read_translation_i16x3(&mut cursor)?;
            out.rotation = read_rotation_quat_i16x4(&mut cursor)?;
        }
        7 => {
            out.translation = read_translation_i16x3(&mut cursor)?;
            out.rotation = read_rotation_quat_i16x4(&mut cursor)?;
            let s = cursor.i16()? as f32 / 256.0;
            out.scale = [s, s, s];
        }
        11 => {
            out.translation = read_translation_i16x3(&mut cursor)?;
            out.rotation = read_rotation_quat_i16x4(&mut cursor)?;
            out.scale = [
                cursor.i16()? as f32 / 256.0,
                cursor.i16()? as f32 / 256.0,
                cursor.i16()? as f32 / 256.0,
            ];
        }
        15 => {
            out.translation = read_translation_i16x3(&mut cursor)?;
            out.rotation = read_rotation_quat_i16x4(&mut cursor)?;
            // 3x2 scale matrix: 6 values. Only the diagonal (per-axis
            // scale) is modeled; the off-diagonal shear terms are read
            // and discarded since no consumer in this crate uses shear.
            let diag = [
                cursor.i16()? as f32 / 256.0,
                cursor.i16()? as f32 / 256.0,
                cursor.i16()? as f32 / 256.0,
            ];
            let _shear = [cursor.i16()?, cursor.i16()?, cursor.i16()?];
            out.scale = diag;
        }
        other => {
            return Err(HypeError::UnsupportedVariant(format!(
                "unknown compressed-matrix type {other:#x}"
            )));
        }
    }

    Ok(out)
}

fn read_frame(ctx: &MemoryContext, addr: u32, num_channels: u32) -> Result<Frame> {
    let mut cursor = ctx.cursor_at(addr)?;
    let channels_ptr = cursor.u32()?;
    let _mat_ptr = cursor.u32()?;
    let _vec_ptr = cursor.u32()?;
    let hierarchies_ptr = cursor.u32()?;

    let mut channels = Vec::with_capacity(num_channels as usize);
    for i in 0..num_channels {
        let mut c = ctx.cursor_at(channels_ptr + i * 8)?;
        let transform_word = c.u32()?;
        let object_index = c.i32()?;
        let transform = match transform_word {
            0 => ChannelTransform::None,
            1 => ChannelTransform::Identity,
            matrix_addr => ChannelTransform::Matrix(decode_compressed_matrix(ctx, matrix_addr)?),
        };
        channels.push(Channel { transform, object_index });
    }

    let mut hierarchy = Vec::with_capacity(num_channels as usize);
    for i in 0..num_channels {
        let mut h = ctx.cursor_at(hierarchies_ptr + i * 2)?;
        hierarchy.push(h.i16()?);
    }

    Ok(Frame { channels, hierarchy })
}

/// Decodes an AnimationMontreal record (spec §4.8).
pub fn read_animation(ctx: &MemoryContext, addr: u32) -> Result<AnimationMontreal> {
    let mut cursor = ctx.cursor_at(addr)?;
    let off_frames = cursor.u32()?;
    let num_frames = cursor.u8()?;
    let speed = cursor.u8()?;
    let num_channels = cursor.u8()?;
    let _pad = cursor.u8()?;
    let _off_unk = cursor.u32()?;
    let _unk0 = cursor.u32()?;
    let _unk1 = cursor.u32()?;

    let mut speed_matrix = [0f32; 16];
    for slot in &mut speed_matrix {
        *slot = cursor.f32()?;
    }

    if num_frames == 0 {
        return Err(HypeError::InvariantViolation(
            "AnimationMontreal declares zero frames".into(),
        ));
    }

    let frames_addr = addr.wrapping_add(off_frames);
    let mut frames = Vec::with_capacity(num_frames as usize);
    for i in 0..num_frames as u32 {
        frames.push(read_frame(ctx, frames_addr + i * 16, num_channels as u32)?);
    }

    let skeleton_parents = frames.first().map(|f| f.hierarchy.clone()).unwrap_or_default();

    Ok(AnimationMontreal {
        num_frames,
        speed,
        num_channels,
        speed_matrix,
        frames,
        skeleton_parents,
    })
}
