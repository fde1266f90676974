//! glTF 2.0 and GLB through the `gltf` crate

use std::path::Path;

use glam::{DMat4, Vec2, Vec3};
use gltf::camera::Projection;
use gltf::khr_lights_punctual::Kind;
use gltf::mesh::Mode;
use serde_json::{json, Map, Value};

use crate::constants::camera::{DEFAULT_HORIZONTAL_APERTURE, DEFAULT_VERTICAL_APERTURE};
use crate::converters::source::{
    LightKind, NodeContent, Primvar, SourceCamera, SourceLight, SourceMaterial, SourceMesh, SourceNode, SourceScene,
};
use crate::converters::strategy::{ConversionJob, ConversionStrategy};
use crate::converters::writer::SceneWriter;
use crate::error::ConversionError;
use crate::progress::Progress;

/// Reads the default scene of a `.gltf` or `.glb` file
pub fn load(path: &Path) -> Result<SourceScene, gltf::Error> {
    let gltf::Gltf { document, blob } = gltf::Gltf::open(path)?;
    let buffers = gltf::import_buffers(&document, path.parent(), blob)?;
    let reader = Reader {
        buffers: &buffers,
    };

    let mut scene = SourceScene::new();
    scene.materials = document.materials().map(|m| read_material(&m)).collect();

    let Some(root) = document.default_scene().or_else(|| document.scenes().next()) else {
        return Ok(scene);
    };
    for node in root.nodes() {
        scene.nodes.push(reader.node(&node, DMat4::IDENTITY));
    }
    Ok(scene)
}

struct Reader<'a> {
    buffers: &'a [gltf::buffer::Data],
}

impl Reader<'_> {
    fn node(&self, node: &gltf::Node, parent_world: DMat4) -> SourceNode {
        let local = DMat4::from_cols_array_2d(&node.transform().matrix().map(|c| c.map(f64::from)));
        let world = parent_world * local;
        let name = node
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Node_{}", node.index()));

        let mut out = SourceNode::new(&name, NodeContent::Group).with_transform(world);
        if let Some(mesh) = node.mesh() {
            let mut primitives: Vec<(SourceMesh, Option<usize>)> = mesh
                .primitives()
                .filter_map(|p| Some((self.primitive(&p)?, p.material().index())))
                .collect();
            if primitives.len() == 1 {
                let (mesh, material) = primitives.remove(0);
                out.content = NodeContent::Mesh(mesh);
                out.material = material;
            } else {
                for (i, (mesh, material)) in primitives.into_iter().enumerate() {
                    out.children.push(
                        SourceNode::mesh(format!("{}_{}", name, i), mesh)
                            .with_transform(world)
                            .with_material(material),
                    );
                }
            }
        } else if let Some(camera) = node.camera() {
            out.content = NodeContent::Camera(read_camera(&camera));
        } else if let Some(light) = node.light() {
            out.content = NodeContent::Light(read_light(&light));
        }

        for child in node.children() {
            out.children.push(self.node(&child, world));
        }
        out
    }

    fn primitive(&self, primitive: &gltf::Primitive) -> Option<SourceMesh> {
        if primitive.mode() != Mode::Triangles {
            log::debug!("Skipping glTF primitive with mode {:?}", primitive.mode());
            return None;
        }
        let reader = primitive.reader(|buffer| self.buffers.get(buffer.index()).map(|d| &d.0[..]));
        let points: Vec<Vec3> = reader.read_positions()?.map(Vec3::from_array).collect();
        let indices: Vec<i32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().map(|i| i as i32).collect(),
            None => (0..points.len() as i32).collect(),
        };

        let count = points.len();
        let normals = reader
            .read_normals()
            .map(|n| n.map(Vec3::from_array).collect::<Vec<_>>())
            .filter(|n| n.len() == count)
            .map(Primvar::vertex);
        // glTF puts the texture origin top left
        let uvs = reader
            .read_tex_coords(0)
            .map(|t| t.into_f32().map(|[u, v]| Vec2::new(u, 1.0 - v)).collect::<Vec<_>>())
            .filter(|t| t.len() == count)
            .map(Primvar::vertex);
        let colors = reader
            .read_colors(0)
            .map(|c| c.into_rgb_f32().map(Vec3::from_array).collect::<Vec<_>>())
            .filter(|c| c.len() == count)
            .map(Primvar::vertex);

        let mesh = SourceMesh {
            points,
            face_vertex_counts: vec![3; indices.len() / 3],
            face_vertex_indices: indices,
            normals,
            uvs,
            colors,
            point_samples: Vec::new(),
        };
        mesh.is_consistent().then_some(mesh)
    }
}

fn read_camera(camera: &gltf::Camera) -> SourceCamera {
    let mut out = SourceCamera::default();
    match camera.projection() {
        Projection::Perspective(perspective) => {
            out.vertical_aperture = DEFAULT_VERTICAL_APERTURE;
            out.focal_length = (DEFAULT_VERTICAL_APERTURE / 2.0) / (perspective.yfov() / 2.0).tan();
            out.horizontal_aperture = perspective
                .aspect_ratio()
                .map(|aspect| DEFAULT_VERTICAL_APERTURE * aspect)
                .unwrap_or(DEFAULT_HORIZONTAL_APERTURE);
            out.clipping_range = Some((perspective.znear(), perspective.zfar().unwrap_or(1.0e6)));
        }
        Projection::Orthographic(orthographic) => {
            log::debug!("Orthographic glTF camera written with default lens");
            out.clipping_range = Some((orthographic.znear(), orthographic.zfar()));
        }
    }
    out
}

fn read_light(light: &gltf::khr_lights_punctual::Light) -> SourceLight {
    let kind = match light.kind() {
        Kind::Directional => LightKind::Directional,
        Kind::Point => LightKind::Point,
        Kind::Spot { .. } => LightKind::Spot,
    };
    SourceLight {
        kind,
        color: Vec3::from_array(light.color()),
        intensity: light.intensity(),
    }
}

/// `{uri}` for external images, otherwise `{index}`
fn texture_json(texture: &gltf::Texture) -> Value {
    match texture.source().source() {
        gltf::image::Source::Uri { uri, .. } if !uri.starts_with("data:") => json!({ "uri": uri }),
        _ => json!({ "index": texture.index() }),
    }
}

/// Re-expresses the material in glTF JSON shape for the normalizer
fn read_material(material: &gltf::Material) -> SourceMaterial {
    let name = material
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("Material_{}", material.index().unwrap_or(0)));
    let pbr = material.pbr_metallic_roughness();

    let mut pbr_json = Map::new();
    pbr_json.insert("baseColorFactor".into(), json!(pbr.base_color_factor()));
    pbr_json.insert("metallicFactor".into(), json!(pbr.metallic_factor()));
    pbr_json.insert("roughnessFactor".into(), json!(pbr.roughness_factor()));
    if let Some(info) = pbr.base_color_texture() {
        pbr_json.insert("baseColorTexture".into(), texture_json(&info.texture()));
    }
    if let Some(info) = pbr.metallic_roughness_texture() {
        pbr_json.insert("metallicRoughnessTexture".into(), texture_json(&info.texture()));
    }

    let mut out = SourceMaterial::new(name, "gltf").with("pbrMetallicRoughness", Value::Object(pbr_json));
    if let Some(normal) = material.normal_texture() {
        out.insert("normalTexture", texture_json(&normal.texture()));
    }
    if let Some(occlusion) = material.occlusion_texture() {
        out.insert("occlusionTexture", texture_json(&occlusion.texture()));
    }
    if let Some(info) = material.emissive_texture() {
        out.insert("emissiveTexture", texture_json(&info.texture()));
    }
    let emissive = material.emissive_factor();
    if emissive.iter().any(|&c| c > 0.0) {
        out.insert("emissiveFactor", json!(emissive));
    }

    let mut extensions = Map::new();
    if let Some(strength) = material.emissive_strength() {
        extensions.insert(
            "KHR_materials_emissive_strength".into(),
            json!({ "emissiveStrength": strength }),
        );
    }
    if let Some(transmission) = material.transmission() {
        extensions.insert(
            "KHR_materials_transmission".into(),
            json!({ "transmissionFactor": transmission.transmission_factor() }),
        );
    }
    if let Some(specular) = material.specular() {
        extensions.insert(
            "KHR_materials_specular".into(),
            json!({
                "specularFactor": specular.specular_factor(),
                "specularColorFactor": specular.specular_color_factor(),
            }),
        );
    }
    if !extensions.is_empty() {
        out.insert("extensions", Value::Object(extensions));
    }
    out
}

/// Loads with the `gltf` crate and writes the scene
pub struct GltfStrategy;

impl ConversionStrategy for GltfStrategy {
    fn name(&self) -> &str {
        "glTF library"
    }

    fn convert(&self, job: &ConversionJob, progress: &mut Progress) -> Result<(), ConversionError> {
        progress.report(20, "Loading glTF...");
        let scene = load(job.input).map_err(|e| ConversionError::strategy(self.name(), e.to_string()))?;
        if scene.mesh_count() == 0 {
            return Err(ConversionError::strategy(self.name(), "no triangle geometry found"));
        }

        progress.report(40, "Building USD scene...");
        SceneWriter::new(job.options, job.backend.supports_materialx()).write_job(job, &scene, progress)
    }
}
