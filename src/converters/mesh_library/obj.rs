//! Wavefront OBJ/MTL through `tobj`

use std::path::Path;

use glam::{Vec2, Vec3};

use super::MeshError;
use crate::converters::source::{Primvar, SourceMaterial, SourceMesh, SourceNode, SourceScene};

/// MTL statements `tobj` keeps only as unknown parameters
const PASSTHROUGH_PARAMS: [&str; 3] = ["Tr", "disp", "Ke"];

pub fn load(path: &Path) -> Result<SourceScene, MeshError> {
    let options = tobj::LoadOptions {
        single_index: false,
        triangulate: false,
        ignore_points: true,
        ignore_lines: true,
        ..Default::default()
    };
    let (models, materials) = tobj::load_obj(path, &options)?;

    let mut scene = SourceScene::new();
    match materials {
        Ok(materials) => scene.materials = materials.iter().map(convert_material).collect(),
        Err(e) => log::warn!("Could not load MTL for {}: {}", path.display(), e),
    }

    for (i, model) in models.iter().enumerate() {
        let mesh = convert_mesh(&model.mesh);
        if mesh.face_vertex_counts.is_empty() {
            log::debug!("Skipping OBJ object {} without faces", model.name);
            continue;
        }
        let name = if model.name.is_empty() {
            format!("Mesh_{}", i)
        } else {
            model.name.clone()
        };
        let material = model.mesh.material_id.filter(|&id| id < scene.materials.len());
        scene.nodes.push(SourceNode::mesh(name, mesh).with_material(material));
    }
    Ok(scene)
}

fn triples(values: &[f32]) -> Vec<Vec3> {
    values.chunks_exact(3).map(Vec3::from_slice).collect()
}

fn convert_mesh(mesh: &tobj::Mesh) -> SourceMesh {
    let points = triples(&mesh.positions);
    let face_vertex_counts = if mesh.face_arities.is_empty() {
        vec![3; mesh.indices.len() / 3]
    } else {
        mesh.face_arities.iter().map(|&n| n as i32).collect()
    };

    let normal_table = triples(&mesh.normals);
    let normals = if !mesh.normal_indices.is_empty() && mesh.normal_indices.len() == mesh.indices.len() {
        let values: Option<Vec<Vec3>> = mesh
            .normal_indices
            .iter()
            .map(|&i| normal_table.get(i as usize).copied())
            .collect();
        values.map(Primvar::face_varying)
    } else if !normal_table.is_empty() && normal_table.len() == points.len() {
        Some(Primvar::vertex(normal_table))
    } else {
        None
    };

    let uv_table: Vec<Vec2> = mesh.texcoords.chunks_exact(2).map(Vec2::from_slice).collect();
    let uvs = if !mesh.texcoord_indices.is_empty() && mesh.texcoord_indices.len() == mesh.indices.len() {
        let values: Option<Vec<Vec2>> = mesh
            .texcoord_indices
            .iter()
            .map(|&i| uv_table.get(i as usize).copied())
            .collect();
        values.map(Primvar::face_varying)
    } else if !uv_table.is_empty() && uv_table.len() == points.len() {
        Some(Primvar::vertex(uv_table))
    } else {
        None
    };

    let color_table = triples(&mesh.vertex_color);
    let colors = (!color_table.is_empty() && color_table.len() == points.len()).then(|| Primvar::vertex(color_table));

    SourceMesh {
        points,
        face_vertex_counts,
        face_vertex_indices: mesh.indices.iter().map(|&i| i as i32).collect(),
        normals,
        uvs,
        colors,
        point_samples: Vec::new(),
    }
}

fn convert_material(material: &tobj::Material) -> SourceMaterial {
    let mut out = SourceMaterial::new(&material.name, "obj");
    let colors = [
        ("Kd", material.diffuse),
        ("Ks", material.specular),
        ("Ka", material.ambient),
    ];
    for (key, color) in colors {
        if let Some(color) = color {
            out.insert(key, color.to_vec());
        }
    }
    if let Some(ns) = material.shininess {
        out.insert("Ns", ns);
    }
    if let Some(d) = material.dissolve {
        out.insert("d", d);
    }

    let textures = [
        ("map_Kd", &material.diffuse_texture),
        ("map_Ks", &material.specular_texture),
        ("map_Ka", &material.ambient_texture),
        ("map_Bump", &material.normal_texture),
        ("map_d", &material.dissolve_texture),
    ];
    for (key, texture) in textures {
        if let Some(texture) = texture {
            out.insert(key, texture.as_str());
        }
    }

    for key in PASSTHROUGH_PARAMS {
        let Some(raw) = material.unknown_param.get(key) else {
            continue;
        };
        match raw.trim().parse::<f64>() {
            Ok(value) => out.insert(key, value),
            Err(_) if key == "disp" => out.insert(key, raw.trim()),
            Err(_) => {
                let parts: Vec<f64> = raw.split_whitespace().filter_map(|p| p.parse().ok()).collect();
                if !parts.is_empty() {
                    out.insert(key, parts);
                }
            }
        }
    }
    out
}
