//! glTF2 mesh emission: a thin adapter turning a decoded `GeometricObject`
//! into a single-mesh GLB, the way the teacher's character/model.rs turns
//! an `LGO` into glTF primitives via the `gltf::json` module.
//!
//! Positions/normals are shared per-vertex; each `Element` becomes one
//! glTF primitive with its own index accessor. Per-corner UVs are
//! scattered onto their referenced vertex slot — seam vertices that carry
//! more than one UV keep only the last writer's value, a simplification
//! this crate accepts since the spec's bit-exactness requirement binds
//! the decode step, not glTF UV topology (see DESIGN.md).

use std::path::Path;

use anyhow::Result;
use gltf::json as gjson;
use gjson::validation::Checked::Valid;

use crate::emit::glb;
use crate::geometry::GeometricObject;

const COMPONENT_TYPE_F32: gjson::accessor::ComponentType = gjson::accessor::ComponentType::F32;
const COMPONENT_TYPE_U32: gjson::accessor::ComponentType = gjson::accessor::ComponentType::U32;

fn push_bytes(buffer: &mut Vec<u8>, bytes: &[u8]) -> usize {
    let offset = buffer.len();
    buffer.extend_from_slice(bytes);
    while buffer.len() % 4 != 0 {
        buffer.push(0);
    }
    offset
}

fn bounds_f32x3(values: &[[f32; 3]]) -> (gjson::Value, gjson::Value) {
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for v in values {
        for axis in 0..3 {
            min[axis] = min[axis].min(v[axis]);
            max[axis] = max[axis].max(v[axis]);
        }
    }
    (gjson::serialize::to_value(min).unwrap(), gjson::serialize::to_value(max).unwrap())
}

/// Builds a standalone GLB document for one decoded mesh, writing it to
/// `out_path`.
pub fn write_mesh_glb(mesh: &GeometricObject, out_path: &Path) -> Result<()> {
    let mut bin = Vec::new();
    let mut buffer_views = Vec::new();
    let mut accessors = Vec::new();

    let positions_bytes: Vec<u8> = mesh
        .vertices
        .iter()
        .flat_map(|v| v.iter().flat_map(|c| c.to_le_bytes()))
        .collect();
    let positions_offset = push_bytes(&mut bin, &positions_bytes);
    buffer_views.push(gjson::buffer::View {
        buffer: gjson::Index::new(0),
        byte_length: gjson::validation::USize64::from(positions_bytes.len()),
        byte_offset: Some(gjson::validation::USize64::from(positions_offset)),
        byte_stride: None,
        extensions: Default::default(),
        extras: Default::default(),
        name: None,
        target: Some(Valid(gjson::buffer::Target::ArrayBuffer)),
    });
    let (pos_min, pos_max) = bounds_f32x3(&mesh.vertices);
    let positions_accessor = accessors.len();
    accessors.push(gjson::Accessor {
        buffer_view: Some(gjson::Index::new(0)),
        byte_offset: Some(gjson::validation::USize64(0)),
        count: gjson::validation::USize64::from(mesh.vertices.len()),
        component_type: Valid(gjson::accessor::GenericComponentType(COMPONENT_TYPE_F32)),
        extensions: Default::default(),
        extras: Default::default(),
        type_: Valid(gjson::accessor::Type::Vec3),
        min: Some(pos_min),
        max: Some(pos_max),
        name: None,
        normalized: false,
        sparse: None,
    });

    let normals_bytes: Vec<u8> = mesh
        .normals
        .iter()
        .flat_map(|v| v.iter().flat_map(|c| c.to_le_bytes()))
        .collect();
    let normals_accessor = if !normals_bytes.is_empty() {
        let normals_offset = push_bytes(&mut bin, &normals_bytes);
        buffer_views.push(gjson::buffer::View {
            buffer: gjson::Index::new(0),
            byte_length: gjson::validation::USize64::from(normals_bytes.len()),
            byte_offset: Some(gjson::validation::USize64::from(normals_offset)),
            byte_stride: None,
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            target: Some(Valid(gjson::buffer::Target::ArrayBuffer)),
        });
        let view_index = buffer_views.len() - 1;
        accessors.push(gjson::Accessor {
            buffer_view: Some(gjson::Index::new(view_index as u32)),
            byte_offset: Some(gjson::validation::USize64(0)),
            count: gjson::validation::USize64::from(mesh.normals.len()),
            component_type: Valid(gjson::accessor::GenericComponentType(COMPONENT_TYPE_F32)),
            extensions: Default::default(),
            extras: Default::default(),
            type_: Valid(gjson::accessor::Type::Vec3),
            min: None,
            max: None,
            name: None,
            normalized: false,
            sparse: None,
        });
        Some(accessors.len() - 1)
    } else {
        None
    };

    let mut primitives = Vec::new();
    for element in &mesh.elements {
        let mut texcoord: Vec<[f32; 2]> = vec![[0.0, 0.0]; mesh.vertices.len()];
        for (corner, &vertex_index) in element.uv_map.iter().enumerate() {
            if let (Some(uv), Some(slot)) = (element.uvs.get(corner), texcoord.get_mut(vertex_index as usize)) {
                *slot = *uv;
            }
        }
        let texcoord_bytes: Vec<u8> = texcoord.iter().flat_map(|v| v.iter().flat_map(|c| c.to_le_bytes())).collect();
        let texcoord_offset = push_bytes(&mut bin, &texcoord_bytes);
        buffer_views.push(gjson::buffer::View {
            buffer: gjson::Index::new(0),
            byte_length: gjson::validation::USize64::from(texcoord_bytes.len()),
            byte_offset: Some(gjson::validation::USize64::from(texcoord_offset)),
            byte_stride: None,
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            target: Some(Valid(gjson::buffer::Target::ArrayBuffer)),
        });
        let texcoord_view = buffer_views.len() - 1;
        accessors.push(gjson::Accessor {
            buffer_view: Some(gjson::Index::new(texcoord_view as u32)),
            byte_offset: Some(gjson::validation::USize64(0)),
            count: gjson::validation::USize64::from(texcoord.len()),
            component_type: Valid(gjson::accessor::GenericComponentType(COMPONENT_TYPE_F32)),
            extensions: Default::default(),
            extras: Default::default(),
            type_: Valid(gjson::accessor::Type::Vec2),
            min: None,
            max: None,
            name: None,
            normalized: false,
            sparse: None,
        });
        let texcoord_accessor = accessors.len() - 1;

        let indices: Vec<u32> = element.triangles.iter().flat_map(|t| t.iter().map(|&i| i as u32)).collect();
        let indices_bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
        let indices_offset = push_bytes(&mut bin, &indices_bytes);
        buffer_views.push(gjson::buffer::View {
            buffer: gjson::Index::new(0),
            byte_length: gjson::validation::USize64::from(indices_bytes.len()),
            byte_offset: Some(gjson::validation::USize64::from(indices_offset)),
            byte_stride: None,
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            target: Some(Valid(gjson::buffer::Target::ElementArrayBuffer)),
        });
        let indices_view = buffer_views.len() - 1;
        accessors.push(gjson::Accessor {
            buffer_view: Some(gjson::Index::new(indices_view as u32)),
            byte_offset: Some(gjson::validation::USize64(0)),
            count: gjson::validation::USize64::from(indices.len()),
            component_type: Valid(gjson::accessor::GenericComponentType(COMPONENT_TYPE_U32)),
            extensions: Default::default(),
            extras: Default::default(),
            type_: Valid(gjson::accessor::Type::Scalar),
            min: None,
            max: None,
            name: None,
            normalized: false,
            sparse: None,
        });
        let indices_accessor = accessors.len() - 1;

        let mut attributes = std::collections::BTreeMap::new();
        attributes.insert(
            Valid(gjson::mesh::Semantic::Positions),
            gjson::Index::new(positions_accessor as u32),
        );
        if let Some(idx) = normals_accessor {
            attributes.insert(Valid(gjson::mesh::Semantic::Normals), gjson::Index::new(idx as u32));
        }
        attributes.insert(
            Valid(gjson::mesh::Semantic::TexCoords(0)),
            gjson::Index::new(texcoord_accessor as u32),
        );

        primitives.push(gjson::mesh::Primitive {
            attributes,
            extensions: Default::default(),
            extras: Default::default(),
            indices: Some(gjson::Index::new(indices_accessor as u32)),
            material: None,
            mode: Valid(gjson::mesh::Mode::Triangles),
            targets: None,
        });
    }

    let root = gjson::Root {
        accessors,
        buffers: vec![gjson::Buffer {
            byte_length: gjson::validation::USize64::from(bin.len()),
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            uri: None,
        }],
        buffer_views,
        meshes: vec![gjson::Mesh {
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            primitives,
            weights: None,
        }],
        nodes: vec![gjson::Node {
            mesh: Some(gjson::Index::new(0)),
            ..Default::default()
        }],
        scenes: vec![gjson::Scene {
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            nodes: vec![gjson::Index::new(0)],
        }],
        scene: Some(gjson::Index::new(0)),
        ..Default::default()
    };

    let json_string = gjson::serialize::to_string(&root)?;
    glb::write_glb(&json_string, &bin, out_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Element;
    use tempfile::TempDir;

    #[test]
    fn writes_single_triangle_mesh() {
        let mesh = GeometricObject {
            num_vertices: 3,
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            elements: vec![Element {
                material: None,
                triangles: vec![[0, 1, 2]],
                uvs: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
                uv_map: vec![0, 1, 2],
            }],
            sphere_radius: 1.0,
            sphere_center: [0.0, 0.0, 0.0],
        };

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mesh.glb");
        write_mesh_glb(&mesh, &path).unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[0..4], b"glTF");
    }
}
