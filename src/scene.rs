//! Scene-graph walker: SuperObject tree, seeded from the Global Pointer
//! Table (spec §4.6).
//!
//! The graph is an arena: one `Vec<SuperObject>` owned by `SceneGraph`,
//! with `parent`/`children` as indices into that vector rather than
//! pointers, since SuperObjects link both up and sideways (spec §9,
//! "Cyclic parent/child pointers").

use crate::error::Result;
use crate::memory::MemoryContext;
use std::collections::HashSet;

pub const SUPER_OBJECT_SIZE: u32 = 0x38;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuperObjectType {
    World,
    Perso,
    Sector,
    Ipo,
    Ipo2,
    Unknown(u32),
}

impl SuperObjectType {
    fn from_code(code: u32) -> Self {
        match code {
            0 => SuperObjectType::World,
            4 => SuperObjectType::Perso,
            8 => SuperObjectType::Sector,
            0x0D => SuperObjectType::Ipo,
            0x15 => SuperObjectType::Ipo2,
            other => SuperObjectType::Unknown(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SuperObject {
    pub addr: u32,
    pub type_code: SuperObjectType,
    pub data_ptr: u32,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub matrix_ptr: u32,
    pub static_matrix_ptr: u32,
    pub global_matrix_token: u32,
    pub draw_flags: u32,
    pub flags: u32,
    pub bounding_volume_ptr: u32,

    children_head: u32,
    children_count: u32,
    sibling_next: u32,
}

#[derive(Debug, Default)]
pub struct SceneGraph {
    pub nodes: Vec<SuperObject>,
    pub roots: Vec<usize>,
}

impl SceneGraph {
    pub fn node(&self, index: usize) -> &SuperObject {
        &self.nodes[index]
    }
}

/// Reads a `[f32; 16]` transform matrix at `addr` (spec §4.6, "Transforms").
pub fn read_matrix(ctx: &MemoryContext, addr: u32) -> Result<[f32; 16]> {
    let mut cursor = ctx.cursor_at(addr)?;
    let mut matrix = [0f32; 16];
    for slot in &mut matrix {
        *slot = cursor.f32()?;
    }
    Ok(matrix)
}

/// Reads the Global Pointer Table's three entry-point addresses
/// (actual-world, dynamic-world, father-sector), skipping sentinel
/// `0`/`-1` entries (spec §3, "Global Pointer Table record layout").
pub fn read_gpt_roots(ctx: &MemoryContext, gpt_addr: u32) -> Result<Vec<u32>> {
    let mut cursor = ctx.cursor_at(gpt_addr)?;
    let mut roots = Vec::new();
    for _ in 0..3 {
        let raw = cursor.u32()?;
        if raw != 0 && raw != 0xFFFF_FFFF {
            roots.push(raw);
        }
    }
    Ok(roots)
}

fn parse_node(ctx: &MemoryContext, addr: u32) -> Result<SuperObject> {
    let mut cursor = ctx.cursor_at(addr)?;
    let type_code = cursor.u32()?;
    let data_ptr = cursor.u32()?;
    let children_head = cursor.u32()?;
    let _children_tail = cursor.u32()?;
    let children_count = cursor.u32()?;
    let sibling_next = cursor.u32()?;
    let _sibling_prev = cursor.u32()?;
    let _parent_ptr = cursor.u32()?;
    let matrix_ptr = cursor.u32()?;
    let static_matrix_ptr = cursor.u32()?;
    let global_matrix_token = cursor.u32()?;
    let draw_flags = cursor.u32()?;
    let flags = cursor.u32()?;
    let bounding_volume_ptr = cursor.u32()?;

    Ok(SuperObject {
        addr,
        type_code: SuperObjectType::from_code(type_code),
        data_ptr,
        parent: None,
        children: Vec::new(),
        matrix_ptr,
        static_matrix_ptr,
        global_matrix_token,
        draw_flags,
        flags,
        bounding_volume_ptr,
        children_head,
        children_count,
        sibling_next,
    })
}

/// Walks the sibling chain starting at `first_child_addr`, recursing into
/// each child's own children. A child whose record can't be read, or whose
/// declared `children_count` doesn't match what's actually on its sibling
/// chain, is logged and skipped rather than aborting the walk: one bad
/// pointer in the middle of a level's scene graph must not take down every
/// other SuperObject in it (spec §7, "fatal for the current record only").
fn walk_children(
    ctx: &MemoryContext,
    first_child_addr: u32,
    expected_count: u32,
    parent_index: usize,
    visited: &mut HashSet<u32>,
    nodes: &mut Vec<SuperObject>,
) -> Vec<usize> {
    let mut indices = Vec::new();
    let mut addr = first_child_addr;

    while addr != 0 {
        if !visited.insert(addr) {
            log::warn!("scene graph revisit guard triggered at {addr:#010x}; stopping child walk");
            break;
        }

        let mut node = match parse_node(ctx, addr) {
            Ok(node) => node,
            Err(err) => {
                log::warn!("skipping super-object at {addr:#010x}: {err}");
                break;
            }
        };
        node.parent = Some(parent_index);
        let child_children_head = node.children_head;
        let child_children_count = node.children_count;
        let next_sibling = node.sibling_next;

        let index = nodes.len();
        nodes.push(node);

        let grandchildren = walk_children(
            ctx,
            child_children_head,
            child_children_count,
            index,
            visited,
            nodes,
        );
        nodes[index].children = grandchildren;

        indices.push(index);
        addr = next_sibling;
    }

    if indices.len() as u32 != expected_count {
        log::warn!(
            "super-object child chain from {first_child_addr:#010x} yielded {} nodes, expected {expected_count}",
            indices.len()
        );
    }

    indices
}

/// Builds the full scene graph, seeded from the GPT's root addresses
/// (spec §4.6). A root whose record can't be read is logged and skipped;
/// the rest of the GPT's roots, and every other root's subtree, still
/// decode (spec §7).
pub fn build_scene_graph(ctx: &MemoryContext, gpt_addr: u32) -> Result<SceneGraph> {
    let root_addrs = read_gpt_roots(ctx, gpt_addr)?;
    let mut nodes = Vec::new();
    let mut roots = Vec::new();
    let mut visited = HashSet::new();

    for root_addr in root_addrs {
        if !visited.insert(root_addr) {
            continue;
        }
        let mut node = match parse_node(ctx, root_addr) {
            Ok(node) => node,
            Err(err) => {
                log::warn!("skipping GPT root super-object at {root_addr:#010x}: {err}");
                continue;
            }
        };
        let children_head = node.children_head;
        let children_count = node.children_count;
        node.parent = None;

        let index = nodes.len();
        nodes.push(node);

        let children = walk_children(ctx, children_head, children_count, index, &mut visited, &mut nodes);
        nodes[index].children = children;
        roots.push(index);
    }

    Ok(SceneGraph { nodes, roots })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reloc::RelocationTable;
    use crate::sna::Block;

    /// Lays out one SuperObject record at `addr` inside `payload` at
    /// `payload_offset`, relative to `block_base`.
    #[allow(clippy::too_many_arguments)]
    fn write_node(
        payload: &mut [u8],
        payload_offset: usize,
        type_code: u32,
        data_ptr: u32,
        children_head: u32,
        children_count: u32,
        sibling_next: u32,
    ) {
        let mut w = payload_offset;
        let mut put = |bytes: &[u8], w: &mut usize| {
            payload[*w..*w + bytes.len()].copy_from_slice(bytes);
            *w += bytes.len();
        };
        put(&type_code.to_le_bytes(), &mut w);
        put(&data_ptr.to_le_bytes(), &mut w);
        put(&children_head.to_le_bytes(), &mut w);
        put(&0u32.to_le_bytes(), &mut w); // children_tail
        put(&children_count.to_le_bytes(), &mut w);
        put(&sibling_next.to_le_bytes(), &mut w);
        put(&0u32.to_le_bytes(), &mut w); // sibling_prev
        put(&0u32.to_le_bytes(), &mut w); // parent
        put(&0u32.to_le_bytes(), &mut w); // matrix_ptr
        put(&0u32.to_le_bytes(), &mut w); // static_matrix_ptr
        put(&0u32.to_le_bytes(), &mut w); // global_matrix_token
        put(&0u32.to_le_bytes(), &mut w); // draw_flags
        put(&0u32.to_le_bytes(), &mut w); // flags
        put(&0u32.to_le_bytes(), &mut w); // bounding_volume_ptr
    }

    fn build_context() -> (MemoryContext, u32) {
        const BASE: i32 = 0x0010_0000;
        let mut payload = vec![0u8; 0x200];

        // GPT at offset 0: one live root, two sentinels.
        payload[0..4].copy_from_slice(&(BASE as u32 + 0x40).to_le_bytes());
        payload[4..8].copy_from_slice(&0u32.to_le_bytes());
        payload[8..12].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());

        // Root (World) at +0x40 with two children at +0x80 and +0xB8.
        write_node(&mut payload, 0x40, 0, 0, (BASE as u32) + 0x80, 2, 0);
        // Child 1 (Perso) at +0x80, no children, sibling -> child 2.
        write_node(&mut payload, 0x80, 4, 0, 0, 0, (BASE as u32) + 0xB8);
        // Child 2 (Sector) at +0xB8, no children, end of chain.
        write_node(&mut payload, 0xB8, 8, 0, 0, 0, 0);

        let block = Block {
            module: 0x01,
            id: 0x01,
            base_in_memory: BASE,
            payload,
            file_position: 0,
        };
        let ctx = MemoryContext::new(vec![block], RelocationTable::default()).unwrap();
        (ctx, BASE as u32)
    }

    #[test]
    fn builds_root_with_two_children() {
        let (ctx, base) = build_context();
        let graph = build_scene_graph(&ctx, base).unwrap();

        assert_eq!(graph.roots.len(), 1);
        let root = graph.node(graph.roots[0]);
        assert_eq!(root.type_code, SuperObjectType::World);
        assert_eq!(root.children.len(), 2);

        let child_a = graph.node(root.children[0]);
        assert_eq!(child_a.type_code, SuperObjectType::Perso);
        let child_b = graph.node(root.children[1]);
        assert_eq!(child_b.type_code, SuperObjectType::Sector);
    }

    #[test]
    fn gpt_skips_sentinels() {
        let (ctx, base) = build_context();
        let roots = read_gpt_roots(&ctx, base).unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0], base + 0x40);
    }

    #[test]
    fn mismatched_children_count_yields_whatever_was_actually_found() {
        const BASE: i32 = 0x0020_0000;
        let mut payload = vec![0u8; 0x100];
        // Root declares children_count = 2 but only one child exists.
        write_node(&mut payload, 0, 0, 0, (BASE as u32) + 0x40, 2, 0);
        write_node(&mut payload, 0x40, 4, 0, 0, 0, 0);
        let block = Block {
            module: 2,
            id: 1,
            base_in_memory: BASE,
            payload,
            file_position: 0,
        };
        let ctx = MemoryContext::new(vec![block], RelocationTable::default()).unwrap();

        let mut visited = HashSet::new();
        let mut nodes = Vec::new();
        let root = parse_node(&ctx, BASE as u32).unwrap();
        nodes.push(root);
        let indices = walk_children(&ctx, BASE as u32 + 0x40, 2, 0, &mut visited, &mut nodes);
        assert_eq!(indices.len(), 1);
    }

    #[test]
    fn unreadable_root_is_skipped_but_other_roots_still_decode() {
        const BASE: i32 = 0x0030_0000;
        let mut payload = vec![0u8; 0x100];

        // GPT: one good root at +0x40, one root pointing well outside the
        // block's mapped range.
        payload[0..4].copy_from_slice(&(BASE as u32 + 0x40).to_le_bytes());
        payload[4..8].copy_from_slice(&0xDEAD_0000u32.to_le_bytes());
        payload[8..12].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());

        write_node(&mut payload, 0x40, 0, 0, 0, 0, 0);

        let block = Block {
            module: 3,
            id: 1,
            base_in_memory: BASE,
            payload,
            file_position: 0,
        };
        let ctx = MemoryContext::new(vec![block], RelocationTable::default()).unwrap();

        let graph = build_scene_graph(&ctx, BASE as u32).unwrap();
        assert_eq!(graph.roots.len(), 1);
        assert_eq!(graph.node(graph.roots[0]).type_code, SuperObjectType::World);
    }

    #[test]
    fn unreadable_child_does_not_abort_the_root() {
        const BASE: i32 = 0x0040_0000;
        let mut payload = vec![0u8; 0x100];

        payload[0..4].copy_from_slice(&(BASE as u32).to_le_bytes());
        payload[4..8].copy_from_slice(&0u32.to_le_bytes());
        payload[8..12].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());

        // Root's only declared child points outside the mapped block.
        write_node(&mut payload, 0, 0, 0, 0xDEAD_0000, 1, 0);

        let block = Block {
            module: 4,
            id: 1,
            base_in_memory: BASE,
            payload,
            file_position: 0,
        };
        let ctx = MemoryContext::new(vec![block], RelocationTable::default()).unwrap();

        let graph = build_scene_graph(&ctx, BASE as u32).unwrap();
        assert_eq!(graph.roots.len(), 1);
        let root = graph.node(graph.roots[0]);
        assert_eq!(root.children.len(), 0);
    }
}
