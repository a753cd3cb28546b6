//! Geometry walker: GeometricObject + Element records, and the material
//! resolver that joins them to extracted texture files by name (spec §4.7).

use crate::error::{HypeError, Result};
use crate::memory::MemoryContext;

pub const GEOMETRIC_OBJECT_SIZE: u32 = 0x40;
const TEXTURE_INFO_NAME_OFFSET: u32 = 0x0C;
const MAX_NAME_LEN: usize = 256;

#[derive(Debug, Clone)]
pub struct ResolvedTexture {
    pub info_addr: u32,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedMaterial {
    pub flags: u32,
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub base: [f32; 4],
    pub textures: Vec<ResolvedTexture>,
}

#[derive(Debug, Clone)]
pub struct Element {
    pub material: Option<ResolvedMaterial>,
    /// Triangle vertex indices, one triple per triangle.
    pub triangles: Vec<[i16; 3]>,
    /// UV coordinates, already GPU-unflipped (`v' = 1 - v`).
    pub uvs: Vec<[f32; 2]>,
    /// For each triangle corner (`num_tri * 3` entries), the index into
    /// `uvs` to use — allows UV sharing across triangles (spec §4.7).
    pub uv_map: Vec<u16>,
}

#[derive(Debug, Clone)]
pub struct GeometricObject {
    pub num_vertices: u32,
    /// `(x, y, z)`, already re-ordered from the on-disk `(x, z, y)` layout.
    pub vertices: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub elements: Vec<Element>,
    pub sphere_radius: f32,
    pub sphere_center: [f32; 3],
}

fn read_vec3_xzy(ctx: &MemoryContext, addr: u32, index: usize) -> Result<[f32; 3]> {
    let mut cursor = ctx.cursor_at(addr + index as u32 * 12)?;
    let x = cursor.f32()?;
    let z = cursor.f32()?;
    let y = cursor.f32()?;
    Ok([x, y, z])
}

fn read_cstring(ctx: &MemoryContext, addr: u32) -> Result<String> {
    let mut cursor = ctx.cursor_at(addr)?;
    let mut bytes = Vec::new();
    for _ in 0..MAX_NAME_LEN {
        let b = cursor.u8()?;
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

fn resolve_texture(ctx: &MemoryContext, texture_ref_addr: u32) -> Result<ResolvedTexture> {
    let info_addr = {
        let mut cursor = ctx.cursor_at(texture_ref_addr)?;
        cursor.u32()?
    };
    let name = read_cstring(ctx, info_addr + TEXTURE_INFO_NAME_OFFSET)?;
    Ok(ResolvedTexture { info_addr, name })
}

/// GameMaterial is a single indirection to VisualMaterial (spec §4.7,
/// "dereferences through GameMaterial -> VisualMaterial").
fn resolve_visual_material_ptr(ctx: &MemoryContext, game_material_addr: u32) -> Result<u32> {
    let mut cursor = ctx.cursor_at(game_material_addr)?;
    cursor.u32()
}

fn resolve_material(ctx: &MemoryContext, material_addr: u32) -> Result<Option<ResolvedMaterial>> {
    if material_addr == 0 {
        return Ok(None);
    }

    let visual_addr = resolve_visual_material_ptr(ctx, material_addr)?;
    if visual_addr == 0 {
        return Ok(None);
    }

    let mut cursor = ctx.cursor_at(visual_addr)?;
    let flags = cursor.u32()?;
    let mut read_vec4 = |cursor: &mut crate::memory::Cursor<'_>| -> Result<[f32; 4]> {
        Ok([cursor.f32()?, cursor.f32()?, cursor.f32()?, cursor.f32()?])
    };
    let ambient = read_vec4(&mut cursor)?;
    let diffuse = read_vec4(&mut cursor)?;
    let specular = read_vec4(&mut cursor)?;
    let base = read_vec4(&mut cursor)?;
    let texture_count = cursor.u32()?;
    let texture_refs_ptr = cursor.u32()?;

    let mut textures = Vec::with_capacity(texture_count as usize);
    for i in 0..texture_count {
        let texture_ref_addr = texture_refs_ptr + i * 4;
        if let Ok(texture) = resolve_texture(ctx, texture_ref_addr) {
            textures.push(texture);
        }
    }

    Ok(Some(ResolvedMaterial {
        flags,
        ambient,
        diffuse,
        specular,
        base,
        textures,
    }))
}

fn read_element(ctx: &MemoryContext, addr: u32) -> Result<Element> {
    let mut cursor = ctx.cursor_at(addr)?;
    let material_ptr = cursor.u32()?;
    let num_tri = cursor.u16()?;
    let num_uv = cursor.u16()?;
    let tri_ptr = cursor.u32()?;
    let uv_map_ptr = cursor.u32()?;
    let _normals_ptr = cursor.u32()?;
    let uvs_ptr = cursor.u32()?;
    let _skip0 = cursor.u32()?;
    let _vertex_indices_ptr = cursor.u32()?;
    let _num_vertex_indices = cursor.u16()?;
    let _parallel_box = cursor.u16()?;
    let _skip1 = cursor.u32()?;

    let mut triangles = Vec::with_capacity(num_tri as usize);
    for i in 0..num_tri as u32 {
        let mut tri_cursor = ctx.cursor_at(tri_ptr + i * 6)?;
        let a = tri_cursor.i16()?;
        let b = tri_cursor.i16()?;
        let c = tri_cursor.i16()?;
        triangles.push([a, b, c]);
    }

    let mut uvs = Vec::with_capacity(num_uv as usize);
    for i in 0..num_uv as u32 {
        let mut uv_cursor = ctx.cursor_at(uvs_ptr + i * 8)?;
        let u = uv_cursor.f32()?;
        let v = uv_cursor.f32()?;
        uvs.push([u, 1.0 - v]);
    }

    let corner_count = num_tri as u32 * 3;
    let mut uv_map = Vec::with_capacity(corner_count as usize);
    for i in 0..corner_count {
        let mut map_cursor = ctx.cursor_at(uv_map_ptr + i * 2)?;
        uv_map.push(map_cursor.u16()?);
    }

    let material = match resolve_material(ctx, material_ptr) {
        Ok(material) => material,
        Err(err) => {
            log::warn!("element at {addr:#010x}: material {material_ptr:#010x} unresolved: {err}");
            None
        }
    };

    Ok(Element {
        material,
        triangles,
        uvs,
        uv_map,
    })
}

/// Decodes a GeometricObject header plus all of its triangle elements
/// (spec §4.7).
pub fn read_geometric_object(ctx: &MemoryContext, addr: u32) -> Result<GeometricObject> {
    let mut cursor = ctx.cursor_at(addr)?;
    let num_vertices = cursor.u32()?;
    let vertices_ptr = cursor.u32()?;
    let normals_ptr = cursor.u32()?;
    let _materials_ptr = cursor.u32()?;
    let element_types_ptr = cursor.u32()?;
    let elements_ptr = cursor.u32()?;
    let num_elements = cursor.u32()?;
    let _unk0 = cursor.u32()?;
    let _unk1 = cursor.u32()?;
    let _unk2 = cursor.u32()?;
    let _unk3 = cursor.u32()?;
    let sphere_radius = cursor.f32()?;
    let center_x = cursor.f32()?;
    let center_z = cursor.f32()?;
    let center_y = cursor.f32()?;

    if !(3..=10_000).contains(&num_vertices) {
        return Err(HypeError::InvariantViolation(format!(
            "GeometricObject at {addr:#010x} declares num_vertices {num_vertices} out of range"
        )));
    }
    if !(1..=1_000).contains(&num_elements) {
        return Err(HypeError::InvariantViolation(format!(
            "GeometricObject at {addr:#010x} declares num_elements {num_elements} out of range"
        )));
    }

    let mut vertices = Vec::with_capacity(num_vertices as usize);
    let mut normals = Vec::with_capacity(num_vertices as usize);
    for i in 0..num_vertices as usize {
        vertices.push(read_vec3_xzy(ctx, vertices_ptr, i)?);
        if normals_ptr != 0 {
            normals.push(read_vec3_xzy(ctx, normals_ptr, i)?);
        }
    }
    if !normals.is_empty() && normals.len() != vertices.len() {
        return Err(HypeError::InvariantViolation(format!(
            "GeometricObject at {addr:#010x} has {} normals but {} vertices",
            normals.len(),
            vertices.len()
        )));
    }

    let mut elements = Vec::with_capacity(num_elements as usize);
    for i in 0..num_elements {
        let mut type_cursor = ctx.cursor_at(element_types_ptr + i * 2)?;
        let element_type = type_cursor.u16()?;
        if element_type != 1 {
            continue; // only triangle submeshes are modeled (spec §4.7)
        }
        let mut ptr_cursor = ctx.cursor_at(elements_ptr + i * 4)?;
        let element_ptr = ptr_cursor.u32()?;
        elements.push(read_element(ctx, element_ptr)?);
    }

    Ok(GeometricObject {
        num_vertices,
        vertices,
        normals,
        elements,
        sphere_radius,
        sphere_center: [center_x, center_y, center_z],
    })
}

/// Resolves a PhysicalObject's displayable mesh: `visual_set_ptr` gives a
/// VisualSet's LOD array, and `LOD[0]`'s `geometric_object_ptr` is the mesh
/// (spec §4.6, "A PhysicalObject carries..."). Shared by the scene walker
/// (IPO SuperObjects) and the Family walker (character mesh parts, §4.8).
pub fn resolve_geometric_object_via_physical_object(
    ctx: &MemoryContext,
    physical_object_addr: u32,
) -> Result<GeometricObject> {
    let mut cursor = ctx.cursor_at(physical_object_addr)?;
    let visual_set_ptr = cursor.u32()?;
    let _collide_set_ptr = cursor.u32()?;

    if visual_set_ptr == 0 {
        return Err(HypeError::UnmappedAddress(0));
    }

    let mut vs_cursor = ctx.cursor_at(visual_set_ptr)?;
    let lod_count = vs_cursor.u32()?;
    let lods_ptr = vs_cursor.u32()?;
    if lod_count == 0 {
        return Err(HypeError::InvariantViolation(format!(
            "VisualSet at {visual_set_ptr:#010x} declares zero LODs"
        )));
    }

    let mut lod0_cursor = ctx.cursor_at(lods_ptr)?;
    let geometric_object_ptr = lod0_cursor.u32()?;
    read_geometric_object(ctx, geometric_object_ptr)
}

/// Scan-mode fallback (spec §4.7): when no relocation table covers a block
/// containing geometry, enumerate candidate header offsets and keep the
/// ones that satisfy all five structural filters.
pub fn scan_for_geometric_objects(ctx: &MemoryContext, block_index: usize) -> Vec<(u32, GeometricObject)> {
    let block = ctx.block(block_index);
    if block.base_in_memory < 0 {
        return Vec::new();
    }
    let base = block.base_in_memory as u32;
    let len = block.len() as u32;
    let mut found = Vec::new();

    let mut offset = 0u32;
    while offset + GEOMETRIC_OBJECT_SIZE <= len {
        let addr = base + offset;
        if let Ok(candidate) = read_geometric_object(ctx, addr) {
            if passes_scan_filters(&candidate) {
                found.push((addr, candidate));
            }
        }
        offset += 4; // candidate offsets are 4-byte aligned
    }

    found
}

fn passes_scan_filters(object: &GeometricObject) -> bool {
    if !(3..=10_000).contains(&object.num_vertices) {
        return false;
    }
    if !(1..=1_000).contains(&object.elements.len()) {
        return false;
    }
    if object
        .vertices
        .iter()
        .any(|v| v.iter().any(|c| !c.is_finite() || c.abs() > 1.0e5))
    {
        return false;
    }

    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for v in &object.vertices {
        for axis in 0..3 {
            min[axis] = min[axis].min(v[axis]);
            max[axis] = max[axis].max(v[axis]);
        }
    }
    (0..3).any(|axis| max[axis] - min[axis] > 0.01)
}
