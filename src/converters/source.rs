//! Intermediate scene model produced by format readers

use glam::{DMat4, Vec2, Vec3};
use serde_json::{Map, Value};

use crate::constants::camera::*;

/// How a primvar maps onto mesh topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// One value per point
    Vertex,
    /// One value per face corner
    FaceVarying,
}

impl Interpolation {
    pub fn token(&self) -> &'static str {
        match self {
            Interpolation::Vertex => "vertex",
            Interpolation::FaceVarying => "faceVarying",
        }
    }
}

/// Primvar values with their interpolation
#[derive(Debug, Clone, PartialEq)]
pub struct Primvar<T> {
    pub values: Vec<T>,
    pub interpolation: Interpolation,
}

impl<T> Primvar<T> {
    pub fn vertex(values: Vec<T>) -> Self {
        Self {
            values,
            interpolation: Interpolation::Vertex,
        }
    }

    pub fn face_varying(values: Vec<T>) -> Self {
        Self {
            values,
            interpolation: Interpolation::FaceVarying,
        }
    }
}

/// Polygon mesh with arbitrary n-gons
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMesh {
    pub points: Vec<Vec3>,
    pub face_vertex_counts: Vec<i32>,
    pub face_vertex_indices: Vec<i32>,
    pub normals: Option<Primvar<Vec3>>,
    pub uvs: Option<Primvar<Vec2>>,
    pub colors: Option<Primvar<Vec3>>,
    /// Animated point positions keyed by time code
    pub point_samples: Vec<(f64, Vec<Vec3>)>,
}

impl SourceMesh {
    /// Whether counts and indices agree and every index is in range
    pub fn is_consistent(&self) -> bool {
        let corners: i64 = self.face_vertex_counts.iter().map(|&c| c as i64).sum();
        corners == self.face_vertex_indices.len() as i64
            && self
                .face_vertex_indices
                .iter()
                .all(|&i| i >= 0 && (i as usize) < self.points.len())
    }

    /// Appends `other`, offsetting its indices; primvars survive only when both sides agree
    pub fn merge(&mut self, other: &SourceMesh) {
        let offset = self.points.len() as i32;
        let empty = self.points.is_empty();
        merge_primvar(&mut self.normals, &other.normals, empty);
        merge_primvar(&mut self.uvs, &other.uvs, empty);
        merge_primvar(&mut self.colors, &other.colors, empty);
        self.points.extend_from_slice(&other.points);
        self.face_vertex_counts.extend_from_slice(&other.face_vertex_counts);
        self.face_vertex_indices
            .extend(other.face_vertex_indices.iter().map(|i| i + offset));
        self.point_samples.clear();
    }
}

fn merge_primvar<T: Clone>(target: &mut Option<Primvar<T>>, other: &Option<Primvar<T>>, target_empty: bool) {
    match (target.as_mut(), other) {
        (Some(a), Some(b)) if a.interpolation == b.interpolation => a.values.extend_from_slice(&b.values),
        (None, Some(b)) if target_empty => *target = Some(b.clone()),
        _ => *target = None,
    }
}

/// Perspective camera, apertures in millimetres
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCamera {
    pub focal_length: f32,
    pub horizontal_aperture: f32,
    pub vertical_aperture: f32,
    pub clipping_range: Option<(f32, f32)>,
}

impl Default for SourceCamera {
    fn default() -> Self {
        Self {
            focal_length: DEFAULT_FOCAL_LENGTH,
            horizontal_aperture: DEFAULT_HORIZONTAL_APERTURE,
            vertical_aperture: DEFAULT_VERTICAL_APERTURE,
            clipping_range: None,
        }
    }
}

/// Light kinds found in source files
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LightKind {
    Point,
    Directional,
    Spot,
    Other(String),
}

impl LightKind {
    /// Maps a source light type name; unknown names are kept as `Other`
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "point" | "epoint" | "omni" => LightKind::Point,
            "directional" | "edirectional" | "distant" | "sun" => LightKind::Directional,
            "spot" | "espot" => LightKind::Spot,
            other => LightKind::Other(other.to_string()),
        }
    }

    /// Output light prim type
    pub fn usd_type(&self) -> &'static str {
        match self {
            LightKind::Point => "SphereLight",
            LightKind::Directional => "DistantLight",
            LightKind::Spot => "DiskLight",
            LightKind::Other(_) => "SphereLight",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceLight {
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for SourceLight {
    fn default() -> Self {
        Self {
            kind: LightKind::Point,
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

/// Raw material properties as the reader found them
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMaterial {
    pub name: String,
    /// Dialect for the normalizer, e.g. `obj` or `gltf`
    pub format: String,
    pub properties: Map<String, Value>,
}

impl SourceMaterial {
    pub fn new(name: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format: format.into(),
            properties: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.properties.insert(key.to_string(), value.into());
    }
}

/// What a node carries besides its transform
#[derive(Debug, Clone, PartialEq)]
pub enum NodeContent {
    Group,
    Mesh(SourceMesh),
    Camera(SourceCamera),
    Light(SourceLight),
}

/// A named node in the source hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct SourceNode {
    pub name: String,
    /// World transform, baked whole into one transform op
    pub world_transform: DMat4,
    pub content: NodeContent,
    /// Index into `SourceScene::materials`
    pub material: Option<usize>,
    pub children: Vec<SourceNode>,
}

impl SourceNode {
    pub fn new(name: impl Into<String>, content: NodeContent) -> Self {
        Self {
            name: name.into(),
            world_transform: DMat4::IDENTITY,
            content,
            material: None,
            children: Vec::new(),
        }
    }

    pub fn mesh(name: impl Into<String>, mesh: SourceMesh) -> Self {
        Self::new(name, NodeContent::Mesh(mesh))
    }

    pub fn with_transform(mut self, world_transform: DMat4) -> Self {
        self.world_transform = world_transform;
        self
    }

    pub fn with_material(mut self, material: Option<usize>) -> Self {
        self.material = material;
        self
    }

    /// Depth-first visit of this node and its descendants
    pub fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a SourceNode)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }
}

/// Everything a reader extracted from one file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceScene {
    pub nodes: Vec<SourceNode>,
    pub materials: Vec<SourceMaterial>,
    /// Animated range, when the source has one
    pub time_range: Option<(f64, f64)>,
    pub frames_per_second: Option<f64>,
}

impl SourceScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mesh_count(&self) -> usize {
        let mut count = 0;
        for node in &self.nodes {
            node.visit(&mut |n| {
                if matches!(n.content, NodeContent::Mesh(_)) {
                    count += 1;
                }
            });
        }
        count
    }

    /// Bakes every mesh into world space and merges meshes that share a
    /// material. Cameras and lights are kept, groups are dropped.
    pub fn merge_meshes(&mut self) {
        let mut merged: Vec<(Option<usize>, SourceMesh)> = Vec::new();
        let mut others = Vec::new();
        let mut stack: Vec<SourceNode> = std::mem::take(&mut self.nodes);
        while let Some(mut node) = stack.pop() {
            stack.extend(node.children.drain(..));
            match node.content {
                NodeContent::Mesh(mut mesh) => {
                    let transform = node.world_transform;
                    if transform != DMat4::IDENTITY {
                        let normal_matrix = transform.inverse().transpose();
                        for p in &mut mesh.points {
                            *p = transform.transform_point3(p.as_dvec3()).as_vec3();
                        }
                        if let Some(normals) = &mut mesh.normals {
                            for n in &mut normals.values {
                                *n = normal_matrix.transform_vector3(n.as_dvec3()).normalize_or_zero().as_vec3();
                            }
                        }
                    }
                    match merged.iter_mut().find(|(m, _)| *m == node.material) {
                        Some((_, target)) => target.merge(&mesh),
                        None => {
                            let mut target = SourceMesh::default();
                            target.merge(&mesh);
                            merged.push((node.material, target));
                        }
                    }
                }
                NodeContent::Group => {}
                content => {
                    node.content = content;
                    others.push(node);
                }
            }
        }
        self.nodes = merged
            .into_iter()
            .enumerate()
            .map(|(i, (material, mesh))| {
                let name = if i == 0 { "Merged".to_string() } else { format!("Merged_{}", i) };
                SourceNode::mesh(name, mesh).with_material(material)
            })
            .collect();
        others.reverse();
        self.nodes.extend(others);
    }
}
