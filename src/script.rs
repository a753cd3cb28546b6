//! AI script reader and S-expression emitter (spec §4.9).
//!
//! A Script is a flat array of 8-byte nodes carrying an indent level; the
//! tree is implicit in the indent sequence (a node at indent `k+1` is a
//! child of the nearest preceding node at indent `k`). Node `type` bytes
//! are looked up against per-game tables bundled as JSON resources.

use crate::error::{HypeError, Result};
use crate::memory::MemoryContext;
use serde::Deserialize;

const NODE_SIZE: u32 = 8;

#[derive(Debug, Clone, Copy)]
pub struct RawNode {
    pub param: u32,
    pub indent: u8,
    pub type_code: u8,
}

fn read_nodes(ctx: &MemoryContext, addr: u32) -> Result<Vec<RawNode>> {
    let mut header = ctx.cursor_at(addr)?;
    let node_count = header.u32()?;
    let nodes_ptr = header.u32()?;

    let mut nodes = Vec::with_capacity(node_count as usize);
    for i in 0..node_count {
        let mut cursor = ctx.cursor_at(nodes_ptr + i * NODE_SIZE)?;
        let param = cursor.u32()?;
        let _pad = cursor.u16()?;
        let indent = cursor.u8()?;
        let type_code = cursor.u8()?;
        nodes.push(RawNode { param, indent, type_code });
    }
    Ok(nodes)
}

/// Checks the two acceptance properties shared by normal decode and
/// scan-mode discovery (spec §4.9, §8 property 3): non-empty, last node's
/// indent is 0, and the indent sequence never jumps up by more than 1.
pub fn is_well_formed(nodes: &[RawNode]) -> bool {
    if nodes.is_empty() {
        return false;
    }
    if nodes.last().unwrap().indent != 0 {
        return false;
    }
    for window in nodes.windows(2) {
        if window[1].indent > window[0].indent + 1 {
            return false;
        }
    }
    true
}

#[derive(Debug, Clone)]
pub struct ScriptNode {
    pub param: u32,
    pub type_code: u8,
    pub children: Vec<ScriptNode>,
}

/// Builds the implicit tree from a well-formed flat node list: a node at
/// indent `k` owns every immediately following run of indent `k+1` nodes,
/// recursively, until indent drops back to `k` or below.
fn build_tree(nodes: &[RawNode]) -> Vec<ScriptNode> {
    fn collect(nodes: &[RawNode], pos: &mut usize, indent: u8) -> Vec<ScriptNode> {
        let mut siblings = Vec::new();
        while *pos < nodes.len() && nodes[*pos].indent == indent {
            let node = nodes[*pos];
            *pos += 1;
            let children = if *pos < nodes.len() && nodes[*pos].indent == indent + 1 {
                collect(nodes, pos, indent + 1)
            } else {
                Vec::new()
            };
            siblings.push(ScriptNode {
                param: node.param,
                type_code: node.type_code,
                children,
            });
        }
        siblings
    }

    let mut pos = 0;
    let root_indent = nodes.first().map(|n| n.indent).unwrap_or(0);
    collect(nodes, &mut pos, root_indent)
}

/// Reads and validates a Script at `addr`, returning its reconstructed
/// tree. Rejects ill-formed scripts per spec §4.9/§8 property 3.
pub fn read_script(ctx: &MemoryContext, addr: u32) -> Result<Vec<ScriptNode>> {
    let nodes = read_nodes(ctx, addr)?;
    if !is_well_formed(&nodes) {
        return Err(HypeError::InvariantViolation(format!(
            "script at {addr:#010x} is not well-formed (empty, or indent sequence invalid)"
        )));
    }
    Ok(build_tree(&nodes))
}

/// Scan-mode fallback (spec §4.9, "heuristic scanning"): when no
/// relocation table covers a block containing scripts, enumerate candidate
/// header offsets and keep the ones whose node list is well-formed *and*
/// whose every `type_code` resolves in `tables` — the same two-property
/// acceptance test normal decode and scan mode both rely on.
pub fn scan_for_scripts(
    ctx: &MemoryContext,
    block_index: usize,
    tables: &TypeTables,
) -> Vec<(u32, Vec<ScriptNode>)> {
    let block = ctx.block(block_index);
    if block.base_in_memory < 0 {
        return Vec::new();
    }
    let base = block.base_in_memory as u32;
    let len = block.len() as u32;
    let mut found = Vec::new();

    let mut offset = 0u32;
    while offset + NODE_SIZE <= len {
        let addr = base + offset;
        if let Ok(nodes) = read_nodes(ctx, addr) {
            if is_well_formed(&nodes) && nodes.iter().all(|n| tables.is_valid(n.type_code)) {
                found.push((addr, build_tree(&nodes)));
            }
        }
        offset += 4;
    }

    found
}

/// How a node's raw `param` word should be rendered in the S-expression.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Int,
    Float,
    DsgVar,
    Text,
    Pointer,
}

impl Default for ParamKind {
    fn default() -> Self {
        ParamKind::Int
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Keyword,
    Condition,
    Operator,
    Function,
    Procedure,
    MetaAction,
    Field,
}

impl Category {
    fn symbol_prefix(self) -> &'static str {
        match self {
            Category::Keyword => "kw-",
            Category::Condition => "cond-",
            Category::Operator => "op-",
            Category::Function => "func-",
            Category::Procedure => "proc-",
            Category::MetaAction => "meta-",
            Category::Field => "field-",
        }
    }
}

#[derive(Debug, Deserialize)]
struct TableEntry {
    code: u8,
    name: String,
    #[serde(default)]
    param_kind: ParamKind,
}

#[derive(Debug, Default)]
struct TypeTable {
    by_code: std::collections::HashMap<u8, TableEntry>,
}

impl TypeTable {
    fn load(json: &str) -> Result<Self> {
        let entries: Vec<TableEntry> = serde_json::from_str(json).map_err(|e| {
            HypeError::MalformedFile(format!("script type table is not valid JSON: {e}"))
        })?;
        let mut by_code = std::collections::HashMap::new();
        for entry in entries {
            by_code.insert(entry.code, entry);
        }
        Ok(Self { by_code })
    }
}

/// The seven per-game node-type tables (spec §4.9: "finite and provided as
/// a data resource"), loaded once from the bundled JSON resources and
/// looked up by `type` byte in a fixed category-priority order.
pub struct TypeTables {
    tables: Vec<(Category, TypeTable)>,
}

macro_rules! embed_table {
    ($name:literal) => {
        include_str!(concat!("../resources/script_tables/", $name, ".json"))
    };
}

impl TypeTables {
    /// Loads the bundled default tables for this title.
    pub fn load_default() -> Result<Self> {
        Ok(Self {
            tables: vec![
                (Category::Keyword, TypeTable::load(embed_table!("keyword"))?),
                (Category::Condition, TypeTable::load(embed_table!("condition"))?),
                (Category::Operator, TypeTable::load(embed_table!("operator"))?),
                (Category::Function, TypeTable::load(embed_table!("function"))?),
                (Category::Procedure, TypeTable::load(embed_table!("procedure"))?),
                (Category::MetaAction, TypeTable::load(embed_table!("meta_action"))?),
                (Category::Field, TypeTable::load(embed_table!("field"))?),
            ],
        })
    }

    /// Loads from explicit strings, for tests and alternate game variants.
    pub fn from_tables(tables: Vec<(Category, String)>) -> Result<Self> {
        let mut loaded = Vec::with_capacity(tables.len());
        for (category, json) in tables {
            loaded.push((category, TypeTable::load(&json)?));
        }
        Ok(Self { tables: loaded })
    }

    /// `true` iff `type_code` is present in some table (spec §4.9/§8
    /// property 3's scan-mode "type valid in the target table" clause).
    pub fn is_valid(&self, type_code: u8) -> bool {
        self.lookup(type_code).is_some()
    }

    fn lookup(&self, type_code: u8) -> Option<(Category, &TableEntry)> {
        self.tables
            .iter()
            .find_map(|(category, table)| table.by_code.get(&type_code).map(|e| (*category, e)))
    }

    fn render_param(&self, kind: ParamKind, param: u32) -> String {
        match kind {
            ParamKind::Int => format!("{}", param as i32),
            ParamKind::Float => format!("{}", f32::from_bits(param)),
            ParamKind::DsgVar => format!("dsgvar_{param}"),
            ParamKind::Text => format!("text_{param}"),
            ParamKind::Pointer => format!("{param:#010x}"),
        }
    }

    fn render_node(&self, node: &ScriptNode, out: &mut String) {
        let (symbol, param_text) = match self.lookup(node.type_code) {
            Some((category, entry)) => (
                format!("{}{}", category.symbol_prefix(), entry.name),
                self.render_param(entry.param_kind, node.param),
            ),
            None => (
                format!("unk-{}", node.type_code),
                self.render_param(ParamKind::Int, node.param),
            ),
        };

        if node.children.is_empty() {
            out.push_str(&format!("({symbol} {param_text})"));
        } else {
            out.push_str(&format!("({symbol} {param_text}"));
            for child in &node.children {
                out.push(' ');
                self.render_node(child, out);
            }
            out.push(')');
        }
    }

    /// Emits a script's forest of top-level nodes as S-expression text,
    /// one top-level form per line (spec §4.9).
    pub fn emit(&self, forest: &[ScriptNode]) -> String {
        let mut out = String::new();
        for (i, node) in forest.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            self.render_node(node, &mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reloc::RelocationTable;
    use crate::sna::Block;

    fn raw(indent: u8) -> RawNode {
        RawNode { param: 0, indent, type_code: 0 }
    }

    /// spec §8 scenario (d).
    #[test]
    fn scenario_d_indent_validation() {
        let seq = |indents: &[u8]| indents.iter().map(|&i| raw(i)).collect::<Vec<_>>();
        assert!(is_well_formed(&seq(&[1, 2, 3, 2, 3, 0])));
        assert!(!is_well_formed(&seq(&[1, 3])));
        assert!(is_well_formed(&seq(&[1, 2, 1, 0])));
        assert!(is_well_formed(&seq(&[0])));
        assert!(!is_well_formed(&[]));
    }

    #[test]
    fn builds_nested_tree_from_indents() {
        let nodes = vec![raw(1), raw(2), raw(3), raw(2), raw(3), raw(0)];
        let tree = build_tree(&nodes);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children.len(), 2);
        assert_eq!(tree[0].children[0].children.len(), 1);
        assert_eq!(tree[0].children[1].children.len(), 1);
    }

    fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
        buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    #[test]
    fn reads_script_from_memory() {
        const BASE: i32 = 0x00A0_0000;
        let mut payload = vec![0u8; 0x100];
        put_u32(&mut payload, 0, 2); // node_count
        put_u32(&mut payload, 4, (BASE as u32) + 0x40); // nodes_ptr

        // node 0 at +0x40: indent 1, type 5, param 7
        let node0 = 0x40usize;
        put_u32(&mut payload, node0, 7);
        payload[node0 + 6] = 1; // indent
        payload[node0 + 7] = 5; // type

        // node 1 at +0x48: indent 0, type 9, param 0
        let node1 = 0x48usize;
        put_u32(&mut payload, node1, 0);
        payload[node1 + 6] = 0; // indent
        payload[node1 + 7] = 9; // type

        let block = Block {
            module: 5,
            id: 1,
            base_in_memory: BASE,
            payload,
            file_position: 0,
        };
        let ctx = MemoryContext::new(vec![block], RelocationTable::default()).unwrap();

        // Node 1's indent of 0 closes the script; it terminates the node
        // stream but is never itself collected into a sibling list.
        let forest = read_script(&ctx, BASE as u32).unwrap();
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].type_code, 5);
        assert_eq!(forest[0].param, 7);
    }

    fn sample_tables() -> TypeTables {
        TypeTables::from_tables(vec![
            (Category::Procedure, r#"[{"code":1,"name":"goto_state"}]"#.to_string()),
            (
                Category::Condition,
                r#"[{"code":2,"name":"is_visible","param_kind":"dsgvar"}]"#.to_string(),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn emits_s_expression_with_prefix_and_param_kind() {
        let tables = sample_tables();
        let tree = vec![ScriptNode {
            param: 3,
            type_code: 1,
            children: vec![ScriptNode {
                param: 42,
                type_code: 2,
                children: vec![],
            }],
        }];
        let text = tables.emit(&tree);
        assert_eq!(text, "(proc-goto_state 3 (cond-is_visible dsgvar_42))");
    }

    #[test]
    fn unknown_type_renders_as_unk() {
        let tables = sample_tables();
        let tree = vec![ScriptNode { param: 0, type_code: 99, children: vec![] }];
        assert_eq!(tables.emit(&tree), "(unk-99 0)");
    }

    #[test]
    fn is_valid_checks_across_all_tables() {
        let tables = sample_tables();
        assert!(tables.is_valid(1));
        assert!(tables.is_valid(2));
        assert!(!tables.is_valid(3));
    }

    #[test]
    fn scan_mode_finds_well_formed_script_with_valid_types() {
        const BASE: i32 = 0x00B0_0000;
        let mut payload = vec![0u8; 0x100];
        put_u32(&mut payload, 0, 1); // node_count
        put_u32(&mut payload, 4, (BASE as u32) + 0x40); // nodes_ptr

        let node0 = 0x40usize;
        put_u32(&mut payload, node0, 3); // param
        payload[node0 + 6] = 0; // indent 0
        payload[node0 + 7] = 1; // type_code matches sample_tables' procedure

        let block = Block {
            module: 7,
            id: 1,
            base_in_memory: BASE,
            payload,
            file_position: 0,
        };
        let ctx = MemoryContext::new(vec![block], RelocationTable::default()).unwrap();
        let tables = sample_tables();

        let found = scan_for_scripts(&ctx, 0, &tables);
        assert!(found.iter().any(|(addr, _)| *addr == BASE as u32));
    }
}
