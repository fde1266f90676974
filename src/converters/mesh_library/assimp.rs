//! STL, PLY, Collada and 3DS through the Open Asset Import Library

use std::path::Path;

use glam::{DMat4, Mat4, Vec2, Vec3};
use russimp::camera::Camera as RCamera;
use russimp::light::{Light as RLight, LightSourceType};
use russimp::material::{Material as RMaterial, PropertyTypeInfo, TextureType};
use russimp::mesh::Mesh as RMesh;
use russimp::node::Node as RNode;
use russimp::scene::{PostProcess, Scene as RScene};
use russimp::Matrix4x4;

use super::MeshError;
use crate::converters::source::{
    LightKind, NodeContent, Primvar, SourceCamera, SourceLight, SourceMaterial, SourceMesh, SourceNode, SourceScene,
};

/// Extensions routed through assimp
pub const EXTENSIONS: [&str; 4] = ["stl", "ply", "dae", "3ds"];

/// Polygons are kept as authored; points and lines land in their own meshes
/// and are dropped.
fn post_process() -> Vec<PostProcess> {
    vec![PostProcess::JoinIdenticalVertices, PostProcess::SortByPrimitiveType]
}

pub fn load(path: &Path) -> Result<SourceScene, MeshError> {
    std::fs::metadata(path).map_err(|source| MeshError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let path_str = path
        .to_str()
        .ok_or_else(|| MeshError::Import(format!("path is not valid UTF-8: {}", path.display())))?;
    let scene = RScene::from_file(path_str, post_process()).map_err(|e| MeshError::Import(format!("{:?}", e)))?;
    Ok(convert_scene(&scene))
}

fn convert_scene(scene: &RScene) -> SourceScene {
    let mut out = SourceScene::new();
    out.materials = scene
        .materials
        .iter()
        .enumerate()
        .map(|(i, m)| convert_material(m, i))
        .collect();

    let Some(root) = &scene.root else {
        return out;
    };
    let root_transform = matrix(&root.transformation);
    // Importers wrap everything in a synthetic root; only keep it when it carries content
    if root.meshes.is_empty() && find_camera(scene, &root.name).is_none() && find_light(scene, &root.name).is_none() {
        for child in root.children.borrow().iter() {
            out.nodes.push(convert_node(scene, child, root_transform));
        }
    } else {
        out.nodes.push(convert_node(scene, root, DMat4::IDENTITY));
    }
    out
}

/// assimp matrices are row-major with the translation in the fourth column
pub(crate) fn matrix(m: &Matrix4x4) -> DMat4 {
    #[rustfmt::skip]
    let cols = [
        m.a1, m.b1, m.c1, m.d1,
        m.a2, m.b2, m.c2, m.d2,
        m.a3, m.b3, m.c3, m.d3,
        m.a4, m.b4, m.c4, m.d4,
    ];
    Mat4::from_cols_array(&cols).as_dmat4()
}

fn find_camera<'a>(scene: &'a RScene, name: &str) -> Option<&'a RCamera> {
    scene.cameras.iter().find(|c| !name.is_empty() && c.name == name)
}

fn find_light<'a>(scene: &'a RScene, name: &str) -> Option<&'a RLight> {
    scene.lights.iter().find(|l| !name.is_empty() && l.name == name)
}

fn convert_node(scene: &RScene, node: &RNode, parent_world: DMat4) -> SourceNode {
    let world = parent_world * matrix(&node.transformation);
    let name = if node.name.is_empty() { "Node" } else { node.name.as_str() };

    let content = if let Some(camera) = find_camera(scene, &node.name) {
        NodeContent::Camera(convert_camera(camera))
    } else if let Some(light) = find_light(scene, &node.name) {
        NodeContent::Light(convert_light(light))
    } else {
        NodeContent::Group
    };

    let mut meshes: Vec<(SourceMesh, Option<usize>)> = node
        .meshes
        .iter()
        .filter_map(|&i| scene.meshes.get(i as usize))
        .filter_map(|m| convert_mesh(m).map(|mesh| (mesh, Some(m.material_index as usize))))
        .collect();

    // A lone mesh becomes the node itself; several hang below it
    let mut out = if matches!(content, NodeContent::Group) && meshes.len() == 1 {
        let (mesh, material) = meshes.remove(0);
        SourceNode::mesh(name, mesh).with_material(material)
    } else {
        let mut out = SourceNode::new(name, content);
        for (i, (mesh, material)) in meshes.into_iter().enumerate() {
            out.children.push(
                SourceNode::mesh(format!("{}_{}", name, i), mesh)
                    .with_transform(world)
                    .with_material(material),
            );
        }
        out
    }
    .with_transform(world);

    for child in node.children.borrow().iter() {
        out.children.push(convert_node(scene, child, world));
    }
    out
}

fn convert_mesh(mesh: &RMesh) -> Option<SourceMesh> {
    let polygons: Vec<&Vec<u32>> = mesh.faces.iter().map(|f| &f.0).filter(|f| f.len() >= 3).collect();
    if polygons.is_empty() {
        return None;
    }

    let points: Vec<Vec3> = mesh.vertices.iter().map(|v| Vec3::new(v.x, v.y, v.z)).collect();
    let count = points.len();

    let normals = (!mesh.normals.is_empty() && mesh.normals.len() == count)
        .then(|| Primvar::vertex(mesh.normals.iter().map(|n| Vec3::new(n.x, n.y, n.z)).collect()));
    let uvs = mesh
        .texture_coords
        .first()
        .and_then(|channel| channel.as_ref())
        .filter(|coords| coords.len() == count)
        .map(|coords| Primvar::vertex(coords.iter().map(|c| Vec2::new(c.x, c.y)).collect()));
    let colors = mesh
        .colors
        .first()
        .and_then(|channel| channel.as_ref())
        .filter(|colors| colors.len() == count)
        .map(|colors| Primvar::vertex(colors.iter().map(|c| Vec3::new(c.r, c.g, c.b)).collect()));

    Some(SourceMesh {
        points,
        face_vertex_counts: polygons.iter().map(|f| f.len() as i32).collect(),
        face_vertex_indices: polygons.iter().flat_map(|f| f.iter().map(|&i| i as i32)).collect(),
        normals,
        uvs,
        colors,
        ..Default::default()
    })
}

/// `horizontal_fov` is the half angle
fn convert_camera(camera: &RCamera) -> SourceCamera {
    let mut out = SourceCamera::default();
    if camera.aspect > 0.0 {
        out.vertical_aperture = out.horizontal_aperture / camera.aspect;
    }
    let half_fov = camera.horizontal_fov;
    if half_fov > 0.0 && half_fov < std::f32::consts::FRAC_PI_2 {
        out.focal_length = (out.horizontal_aperture / 2.0) / half_fov.tan();
    }
    if camera.clip_plane_far > camera.clip_plane_near {
        out.clipping_range = Some((camera.clip_plane_near, camera.clip_plane_far));
    }
    out
}

/// assimp folds intensity into the colour; split it back out
fn convert_light(light: &RLight) -> SourceLight {
    let kind = match light.light_source_type {
        LightSourceType::Point => LightKind::Point,
        LightSourceType::Directional => LightKind::Directional,
        LightSourceType::Spot => LightKind::Spot,
        LightSourceType::Area => LightKind::Other("area".into()),
        _ => LightKind::Other("undefined".into()),
    };
    let color = Vec3::new(light.color_diffuse.r, light.color_diffuse.g, light.color_diffuse.b);
    let intensity = color.max_element();
    let (color, intensity) = if intensity > 0.0 {
        (color / intensity, intensity)
    } else {
        (Vec3::ONE, 1.0)
    };
    SourceLight { kind, color, intensity }
}

fn float_property(material: &RMaterial, key: &str) -> Option<Vec<f32>> {
    material.properties.iter().find(|p| p.key == key).and_then(|p| match &p.data {
        PropertyTypeInfo::FloatArray(values) if !values.is_empty() => Some(values.clone()),
        _ => None,
    })
}

fn string_property(material: &RMaterial, key: &str) -> Option<String> {
    material.properties.iter().find(|p| p.key == key).and_then(|p| match &p.data {
        PropertyTypeInfo::String(value) if !value.is_empty() => Some(value.clone()),
        _ => None,
    })
}

fn texture(material: &RMaterial, kinds: &[TextureType]) -> Option<String> {
    kinds.iter().find_map(|kind| {
        let texture = material.textures.get(kind)?;
        let filename = texture.borrow().filename.clone();
        (!filename.is_empty()).then_some(filename)
    })
}

fn rgb(values: &[f32]) -> Option<Vec<f64>> {
    (values.len() >= 3).then(|| values[..3].iter().map(|&v| v as f64).collect())
}

fn convert_material(material: &RMaterial, index: usize) -> SourceMaterial {
    let name = string_property(material, "?mat.name").unwrap_or_else(|| format!("Material_{}", index));
    let mut out = SourceMaterial::new(name, "generic");

    if let Some(color) = float_property(material, "$clr.base")
        .or_else(|| float_property(material, "$clr.diffuse"))
        .and_then(|c| rgb(&c))
    {
        out.insert("baseColor", color);
    }
    if let Some(color) = float_property(material, "$clr.emissive").and_then(|c| rgb(&c)) {
        if color.iter().any(|&c| c > 0.0) {
            out.insert("emissiveColor", color);
        }
    }
    if let Some(opacity) = float_property(material, "$mat.opacity").map(|v| v[0]) {
        if opacity < 1.0 {
            out.insert("opacity", opacity as f64);
        }
    }
    if let Some(metallic) = float_property(material, "$mat.metallicFactor").map(|v| v[0]) {
        out.insert("metallic", metallic as f64);
    }
    if let Some(roughness) = float_property(material, "$mat.roughnessFactor").map(|v| v[0]) {
        out.insert("roughness", roughness as f64);
    }

    let slots: [(&str, &[TextureType]); 8] = [
        ("baseColorTexture", &[TextureType::BaseColor, TextureType::Diffuse]),
        ("normalMap", &[TextureType::Normals, TextureType::NormalCamera, TextureType::Height]),
        ("emissiveTexture", &[TextureType::EmissionColor, TextureType::Emissive]),
        ("opacityTexture", &[TextureType::Opacity]),
        ("specularTexture", &[TextureType::Specular]),
        ("metallicTexture", &[TextureType::Metalness]),
        ("roughnessTexture", &[TextureType::Roughness]),
        ("occlusionTexture", &[TextureType::AmbientOcclusion, TextureType::LightMap]),
    ];
    for (key, kinds) in slots {
        if let Some(file) = texture(material, kinds) {
            out.insert(key, file);
        }
    }
    if let Some(file) = texture(material, &[TextureType::Displacement]) {
        out.insert("displacementTexture", file);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("stagehand_assimp_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn load_text(dir: &Path, file: &str, text: &str) -> SourceScene {
        let path = dir.join(file);
        std::fs::write(&path, text).unwrap();
        load(&path).unwrap()
    }

    fn meshes(scene: &SourceScene) -> Vec<(&SourceNode, &SourceMesh)> {
        let mut found = Vec::new();
        for node in &scene.nodes {
            node.visit(&mut |n| {
                if let NodeContent::Mesh(mesh) = &n.content {
                    found.push((n, mesh));
                }
            });
        }
        found
    }

    const ASCII_QUAD: &str = "solid quad
facet normal 0 0 1
  outer loop
    vertex 0 0 0
    vertex 1 0 0
    vertex 1 1 0
  endloop
endfacet
facet normal 0 0 1
  outer loop
    vertex 0 0 0
    vertex 1 1 0
    vertex 0 1 0
  endloop
endfacet
endsolid quad
";

    const PLY_QUAD: &str = "ply
format ascii 1.0
element vertex 4
property float x
property float y
property float z
property uchar red
property uchar green
property uchar blue
element face 1
property list uchar int vertex_indices
end_header
0 0 0 255 0 0
1 0 0 255 0 0
1 1 0 255 0 0
0 1 0 255 0 0
4 0 1 2 3
";

    const COLLADA_QUAD: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <asset><up_axis>Y_UP</up_axis></asset>
  <library_effects>
    <effect id="paint-fx">
      <profile_COMMON>
        <technique sid="common">
          <lambert><diffuse><color>0.8 0.1 0.1 1</color></diffuse></lambert>
        </technique>
      </profile_COMMON>
    </effect>
  </library_effects>
  <library_materials>
    <material id="paint-mat" name="Paint"><instance_effect url="#paint-fx"/></material>
  </library_materials>
  <library_geometries>
    <geometry id="quad-mesh" name="Quad">
      <mesh>
        <source id="quad-pos">
          <float_array id="quad-pos-array" count="12">0 0 0 1 0 0 1 1 0 0 1 0</float_array>
          <technique_common>
            <accessor source="#quad-pos-array" count="4" stride="3">
              <param name="X" type="float"/><param name="Y" type="float"/><param name="Z" type="float"/>
            </accessor>
          </technique_common>
        </source>
        <vertices id="quad-vtx"><input semantic="POSITION" source="#quad-pos"/></vertices>
        <polylist material="paint-sym" count="1">
          <input semantic="VERTEX" source="#quad-vtx" offset="0"/>
          <vcount>4</vcount>
          <p>0 1 2 3</p>
        </polylist>
      </mesh>
    </geometry>
  </library_geometries>
  <library_visual_scenes>
    <visual_scene id="Scene" name="Scene">
      <node id="QuadNode" name="QuadNode">
        <translate>0 0 5</translate>
        <instance_geometry url="#quad-mesh">
          <bind_material><technique_common>
            <instance_material symbol="paint-sym" target="#paint-mat"/>
          </technique_common></bind_material>
        </instance_geometry>
      </node>
    </visual_scene>
  </library_visual_scenes>
  <scene><instance_visual_scene url="#Scene"/></scene>
</COLLADA>
"##;

    #[test]
    fn test_matrix_translation_column() {
        let m = Matrix4x4 {
            a1: 1.0, a2: 0.0, a3: 0.0, a4: 2.0,
            b1: 0.0, b2: 1.0, b3: 0.0, b4: 3.0,
            c1: 0.0, c2: 0.0, c3: 1.0, c4: 4.0,
            d1: 0.0, d2: 0.0, d3: 0.0, d4: 1.0,
        };
        let converted = matrix(&m);
        assert_eq!(converted.w_axis.truncate(), glam::DVec3::new(2.0, 3.0, 4.0));
        assert_eq!(converted.x_axis.x, 1.0);
    }

    #[test]
    fn test_ascii_stl_welds_shared_corners() {
        let dir = temp_dir("stl");
        let scene = load_text(&dir, "quad.stl", ASCII_QUAD);
        let found = meshes(&scene);
        assert_eq!(found.len(), 1);
        let mesh = found[0].1;
        assert_eq!(mesh.points.len(), 4);
        assert_eq!(mesh.face_vertex_counts, vec![3, 3]);
        assert!(mesh.is_consistent());
        let normals = mesh.normals.as_ref().unwrap();
        assert!(normals.values.iter().all(|n| (*n - Vec3::Z).length() < 1e-5));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_ply_keeps_quads_and_colors() {
        let dir = temp_dir("ply");
        let scene = load_text(&dir, "quad.ply", PLY_QUAD);
        let found = meshes(&scene);
        assert_eq!(found.len(), 1);
        let mesh = found[0].1;
        assert_eq!(mesh.face_vertex_counts, vec![4]);
        let colors = mesh.colors.as_ref().unwrap();
        assert_eq!(colors.values.len(), 4);
        assert!((colors.values[0] - Vec3::X).length() < 1e-3);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_collada_node_and_material() {
        let dir = temp_dir("dae");
        let scene = load_text(&dir, "quad.dae", COLLADA_QUAD);
        let found = meshes(&scene);
        assert_eq!(found.len(), 1);
        let (node, mesh) = found[0];
        assert_eq!(mesh.face_vertex_counts, vec![4]);
        assert!((node.world_transform.w_axis.z - 5.0).abs() < 1e-6);

        let material = &scene.materials[node.material.unwrap()];
        assert_eq!(material.format, "generic");
        let color = material.properties["baseColor"].as_array().unwrap();
        assert!((color[0].as_f64().unwrap() - 0.8).abs() < 1e-6);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unreadable_file_is_import_error() {
        let dir = temp_dir("garbage");
        let path = dir.join("broken.3ds");
        std::fs::write(&path, b"not a 3ds file").unwrap();
        assert!(matches!(load(&path), Err(MeshError::Import(_))));
        std::fs::remove_dir_all(&dir).ok();
    }
}
