//! Realizes a [`SourceScene`] as an output stage

use std::collections::HashSet;

use glam::{DMat4, DVec3, Vec2, Vec3};

use crate::constants::scene::MATERIALS_SCOPE;
use crate::converters::source::{NodeContent, Primvar, SourceCamera, SourceLight, SourceMesh, SourceNode, SourceScene};
use crate::converters::strategy::ConversionJob;
use crate::error::{ConversionError, SceneError};
use crate::materials::{bind_material, normalize, MaterialCreator, MaterialValidator, ValidationTarget};
use crate::options::{ConversionOptions, MaterialShaderType};
use crate::progress::Progress;
use crate::scene::{child_path, sanitize_name, AttributeValue, Stage, TimeCode};
use crate::stage_settings;

/// Writes source scenes into stages following the conversion options
pub struct SceneWriter<'a> {
    options: &'a ConversionOptions,
    creator: MaterialCreator,
}

impl<'a> SceneWriter<'a> {
    pub fn new(options: &'a ConversionOptions, materialx_available: bool) -> Self {
        Self {
            options,
            creator: MaterialCreator::new(options.material_shader_type, materialx_available),
        }
    }

    /// Creates the output stage, writes `scene`, applies settings and saves
    pub fn write_job(&self, job: &ConversionJob, scene: &SourceScene, progress: &mut Progress) -> Result<(), ConversionError> {
        let mut stage = job.backend.create_new(job.output)?;
        self.write(stage.as_mut(), scene, progress)?;

        progress.report(90, "Saving USD file...");
        stage
            .save()
            .map_err(|e| ConversionError::SceneWriteFailed(e.to_string()))?;

        if self.options.validate_materials && self.options.export_materials {
            self.report_validation(stage.as_ref(), progress);
        }
        Ok(())
    }

    /// Writes `scene` into an existing stage and applies stage settings
    pub fn write(&self, stage: &mut dyn Stage, scene: &SourceScene, progress: &mut Progress) -> Result<(), ConversionError> {
        let merged;
        let scene = if self.options.merge_meshes && scene.mesh_count() > 1 {
            let mut copy = scene.clone();
            copy.merge_meshes();
            merged = copy;
            &merged
        } else {
            scene
        };

        let root = self.options.root_path();
        stage.define_prim(&root, "Xform")?;
        let correction = self.options.correction_scale();
        if correction != DVec3::ONE {
            stage.set_attribute(&root, "xformOp:scale", AttributeValue::Float3(correction.as_vec3()), TimeCode::Default)?;
            stage.set_attribute(
                &root,
                "xformOpOrder",
                AttributeValue::TokenArray(vec!["xformOp:scale".to_string()]),
                TimeCode::Default,
            )?;
        }

        let material_paths = if self.options.export_materials && !scene.materials.is_empty() {
            progress.report(60, "Creating materials...");
            self.write_materials(stage, &root, scene, progress)?
        } else {
            Vec::new()
        };

        progress.report(70, "Writing geometry...");
        let mut names = HashSet::new();
        if !material_paths.is_empty() {
            names.insert(MATERIALS_SCOPE.to_string());
        }
        for node in &scene.nodes {
            self.write_node(stage, &root, &mut names, node, DMat4::IDENTITY, &material_paths)?;
        }

        stage_settings::apply(stage, self.options)?;
        if let (true, Some((start, end))) = (self.options.time_samples, scene.time_range) {
            if start != end {
                let mut metadata = stage.metadata();
                metadata.start_time_code = Some(start);
                metadata.end_time_code = Some(end);
                if scene.frames_per_second.is_some() {
                    metadata.frames_per_second = scene.frames_per_second;
                }
                stage.set_metadata(metadata)?;
            }
        }
        Ok(())
    }

    fn write_materials(
        &self,
        stage: &mut dyn Stage,
        root: &str,
        scene: &SourceScene,
        progress: &mut Progress,
    ) -> Result<Vec<Option<String>>, ConversionError> {
        let scope = child_path(root, MATERIALS_SCOPE);
        stage.define_prim(&scope, "Scope")?;

        let mut used = HashSet::new();
        let mut paths = Vec::with_capacity(scene.materials.len());
        for material in &scene.materials {
            let path = child_path(&scope, &unique_name(&mut used, &material.name));
            let canonical = normalize(&material.properties, &material.format);
            match self.creator.create_material(stage, &path, &canonical) {
                Ok(built) => {
                    for message in &built.diagnostics {
                        progress.note(&format!("{}: {}", path, message));
                    }
                    paths.push(Some(path));
                }
                Err(e) => {
                    log::warn!("Skipping material {}: {}", material.name, e);
                    paths.push(None);
                }
            }
        }
        Ok(paths)
    }

    fn write_node(
        &self,
        stage: &mut dyn Stage,
        parent: &str,
        names: &mut HashSet<String>,
        node: &SourceNode,
        parent_world: DMat4,
        material_paths: &[Option<String>],
    ) -> Result<(), SceneError> {
        let path = child_path(parent, &unique_name(names, &node.name));
        let type_name = match &node.content {
            NodeContent::Group => "Xform",
            NodeContent::Mesh(_) => "Mesh",
            NodeContent::Camera(_) => "Camera",
            NodeContent::Light(light) => light.kind.usd_type(),
        };
        stage.define_prim(&path, type_name)?;

        // Nested prims inherit their parent's transform
        let transform = if self.options.preserve_hierarchy {
            parent_world.inverse() * node.world_transform
        } else {
            node.world_transform
        };
        stage.set_attribute(&path, "xformOp:transform", AttributeValue::Matrix4d(transform), TimeCode::Default)?;
        stage.set_attribute(
            &path,
            "xformOpOrder",
            AttributeValue::TokenArray(vec!["xformOp:transform".to_string()]),
            TimeCode::Default,
        )?;

        match &node.content {
            NodeContent::Group => {}
            NodeContent::Mesh(mesh) => self.write_mesh(stage, &path, mesh)?,
            NodeContent::Camera(camera) => write_camera(stage, &path, camera)?,
            NodeContent::Light(light) => write_light(stage, &path, light)?,
        }

        if let Some(material) = node.material.and_then(|i| material_paths.get(i)).and_then(Option::as_ref) {
            bind_material(stage, &path, material)?;
        }

        let mut child_names = HashSet::new();
        for child in &node.children {
            if self.options.preserve_hierarchy {
                self.write_node(stage, &path, &mut child_names, child, node.world_transform, material_paths)?;
            } else {
                self.write_node(stage, parent, names, child, DMat4::IDENTITY, material_paths)?;
            }
        }
        Ok(())
    }

    fn write_mesh(&self, stage: &mut dyn Stage, path: &str, mesh: &SourceMesh) -> Result<(), SceneError> {
        if !mesh.is_consistent() {
            log::warn!("Mesh {} has inconsistent topology", path);
        }
        let counts = AttributeValue::IntArray(mesh.face_vertex_counts.clone());
        let indices = AttributeValue::IntArray(mesh.face_vertex_indices.clone());
        stage.set_attribute(path, "points", AttributeValue::Point3fArray(mesh.points.clone()), TimeCode::Default)?;
        stage.set_attribute(path, "faceVertexCounts", counts, TimeCode::Default)?;
        stage.set_attribute(path, "faceVertexIndices", indices, TimeCode::Default)?;
        if let Some((min, max)) = extent(&mesh.points) {
            stage.set_attribute(path, "extent", AttributeValue::Float3Array(vec![min, max]), TimeCode::Default)?;
        }
        stage.set_attribute(path, "subdivisionScheme", AttributeValue::Token("none".to_string()), TimeCode::Default)?;

        if self.options.export_normals {
            if let Some(normals) = &mesh.normals {
                write_primvar(stage, path, "normals", AttributeValue::Normal3fArray(normals.values.clone()), normals)?;
            }
        }
        if self.options.export_uvs {
            if let Some(uvs) = &mesh.uvs {
                write_primvar(stage, path, "primvars:st", AttributeValue::TexCoord2fArray(uvs.values.clone()), uvs)?;
            }
        }
        if self.options.export_colors {
            if let Some(colors) = &mesh.colors {
                write_primvar(
                    stage,
                    path,
                    "primvars:displayColor",
                    AttributeValue::Color3fArray(colors.values.clone()),
                    colors,
                )?;
            }
        }

        if self.options.time_samples {
            for (time, points) in &mesh.point_samples {
                stage.set_attribute(path, "points", AttributeValue::Point3fArray(points.clone()), TimeCode::At(*time))?;
            }
        }
        Ok(())
    }

    fn report_validation(&self, stage: &dyn Stage, progress: &mut Progress) {
        progress.report(95, "Validating materials...");
        let target = match self.options.material_shader_type {
            MaterialShaderType::Karma => ValidationTarget::Karma,
            MaterialShaderType::Nuke => ValidationTarget::Nuke,
            MaterialShaderType::Auto => ValidationTarget::Auto,
            _ => ValidationTarget::Generic,
        };
        let report = MaterialValidator::new(target).validate_scene(stage);
        for issue in report.values().flatten() {
            log::warn!("{}", issue);
            progress.note(&issue.to_string());
        }
    }
}

fn write_primvar<T>(
    stage: &mut dyn Stage,
    path: &str,
    name: &str,
    value: AttributeValue,
    primvar: &Primvar<T>,
) -> Result<(), SceneError> {
    stage.set_attribute(path, name, value, TimeCode::Default)?;
    stage.set_attribute_metadata(path, name, "interpolation", primvar.interpolation.token())
}

fn write_camera(stage: &mut dyn Stage, path: &str, camera: &SourceCamera) -> Result<(), SceneError> {
    stage.set_attribute(path, "focalLength", AttributeValue::Float(camera.focal_length), TimeCode::Default)?;
    stage.set_attribute(
        path,
        "horizontalAperture",
        AttributeValue::Float(camera.horizontal_aperture),
        TimeCode::Default,
    )?;
    stage.set_attribute(
        path,
        "verticalAperture",
        AttributeValue::Float(camera.vertical_aperture),
        TimeCode::Default,
    )?;
    if let Some((near, far)) = camera.clipping_range {
        stage.set_attribute(path, "clippingRange", AttributeValue::Float2(Vec2::new(near, far)), TimeCode::Default)?;
    }
    Ok(())
}

fn write_light(stage: &mut dyn Stage, path: &str, light: &SourceLight) -> Result<(), SceneError> {
    stage.set_attribute(path, "inputs:color", AttributeValue::Color3f(light.color), TimeCode::Default)?;
    stage.set_attribute(path, "inputs:intensity", AttributeValue::Float(light.intensity), TimeCode::Default)
}

fn extent(points: &[Vec3]) -> Option<(Vec3, Vec3)> {
    let first = *points.first()?;
    Some(points.iter().fold((first, first), |(min, max), p| (min.min(*p), max.max(*p))))
}

/// Sanitized name, suffixed until unique among `used`
fn unique_name(used: &mut HashSet<String>, name: &str) -> String {
    let base = sanitize_name(name);
    let mut candidate = base.clone();
    let mut n = 1;
    while !used.insert(candidate.clone()) {
        candidate = format!("{}_{}", base, n);
        n += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converters::source::{LightKind, SourceMaterial};
    use crate::options::UpAxis;
    use crate::progress::ProgressLog;
    use crate::scene::MemoryStage;

    fn quad_scene() -> SourceScene {
        let mesh = SourceMesh {
            points: vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y],
            face_vertex_counts: vec![4],
            face_vertex_indices: vec![0, 1, 2, 3],
            normals: Some(Primvar::face_varying(vec![Vec3::Z; 4])),
            uvs: Some(Primvar::vertex(vec![Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y])),
            ..Default::default()
        };
        let mut scene = SourceScene::new();
        scene
            .materials
            .push(SourceMaterial::new("red paint", "obj").with("Kd", vec![1.0, 0.0, 0.0]));
        let mut group = SourceNode::new("Group", NodeContent::Group)
            .with_transform(DMat4::from_translation(DVec3::new(0.0, 1.0, 0.0)));
        group.children.push(
            SourceNode::mesh("quad", mesh)
                .with_material(Some(0))
                .with_transform(DMat4::from_translation(DVec3::new(0.0, 3.0, 0.0))),
        );
        scene.nodes.push(group);
        scene.nodes.push(SourceNode::new(
            "Key Light",
            NodeContent::Light(SourceLight {
                kind: LightKind::Spot,
                ..Default::default()
            }),
        ));
        scene.nodes.push(SourceNode::new("cam", NodeContent::Camera(SourceCamera::default())));
        scene
    }

    fn write(options: &ConversionOptions, scene: &SourceScene) -> MemoryStage {
        let mut stage = MemoryStage::new("writer.usda");
        let mut log = ProgressLog::new();
        let mut callback = |p: u8, m: &str| log.record(p, m);
        SceneWriter::new(options, false)
            .write(&mut stage, scene, &mut Progress::new(&mut callback))
            .unwrap();
        stage
    }

    #[test]
    fn test_writes_hierarchy_and_content() {
        let options = ConversionOptions {
            up_axis: UpAxis::Z,
            meters_per_unit: 0.01,
            ..Default::default()
        };
        let stage = write(&options, &quad_scene());

        assert_eq!(stage.prim_type("/World/Group/quad").as_deref(), Some("Mesh"));
        assert_eq!(stage.prim_type("/World/Key_Light").as_deref(), Some("DiskLight"));
        assert_eq!(stage.prim_type("/World/cam").as_deref(), Some("Camera"));
        assert_eq!(
            stage
                .attribute("/World/Group/quad", "faceVertexCounts", TimeCode::Default)
                .unwrap()
                .as_int_array(),
            Some(&[4][..])
        );
        assert_eq!(
            stage.attribute_metadata("/World/Group/quad", "normals", "interpolation").as_deref(),
            Some("faceVarying")
        );
        assert_eq!(
            stage.attribute_metadata("/World/Group/quad", "primvars:st", "interpolation").as_deref(),
            Some("vertex")
        );

        // local transform relative to the group
        let local = stage
            .attribute("/World/Group/quad", "xformOp:transform", TimeCode::Default)
            .and_then(|v| v.as_matrix())
            .unwrap();
        assert!((local.w_axis.y - 2.0).abs() < 1e-9);

        assert_eq!(
            stage.relationship_targets("/World/Group/quad", "material:binding"),
            vec!["/World/Materials/red_paint".to_string()]
        );
        assert_eq!(
            stage
                .attribute("/World/cam", "horizontalAperture", TimeCode::Default)
                .and_then(|v| v.as_f64()),
            Some(20.955f32 as f64)
        );

        let metadata = stage.metadata();
        assert_eq!(metadata.up_axis.as_deref(), Some("Z"));
        assert_eq!(metadata.meters_per_unit, Some(0.01));
        assert_eq!(metadata.default_prim.as_deref(), Some("World"));
        assert!(!stage.has_attribute("/World", "xformOp:scale"));
    }

    #[test]
    fn test_node_named_like_material_scope() {
        let mut scene = quad_scene();
        let mesh = SourceMesh {
            points: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            face_vertex_counts: vec![3],
            face_vertex_indices: vec![0, 1, 2],
            ..Default::default()
        };
        scene.nodes.push(SourceNode::mesh("Materials", mesh));
        let stage = write(&ConversionOptions::default(), &scene);

        assert_eq!(stage.prim_type("/World/Materials").as_deref(), Some("Scope"));
        assert_eq!(stage.prim_type("/World/Materials/red_paint").as_deref(), Some("Material"));
        assert_eq!(stage.prim_type("/World/Materials_1").as_deref(), Some("Mesh"));

        let flat = write(
            &ConversionOptions {
                export_materials: false,
                ..Default::default()
            },
            &scene,
        );
        assert_eq!(flat.prim_type("/World/Materials").as_deref(), Some("Mesh"));
    }

    #[test]
    fn test_flat_output_and_correction_scale() {
        let options = ConversionOptions {
            preserve_hierarchy: false,
            flip_z: true,
            export_normals: false,
            export_materials: false,
            ..Default::default()
        };
        let stage = write(&options, &quad_scene());

        assert!(stage.has_prim("/World/quad"));
        assert!(!stage.has_attribute("/World/quad", "normals"));
        assert!(!stage.has_prim("/World/Materials"));
        let world = stage
            .attribute("/World/quad", "xformOp:transform", TimeCode::Default)
            .and_then(|v| v.as_matrix())
            .unwrap();
        assert!((world.w_axis.y - 3.0).abs() < 1e-9);
        assert_eq!(
            stage.attribute("/World", "xformOp:scale", TimeCode::Default),
            Some(AttributeValue::Float3(Vec3::new(1.0, 1.0, -1.0)))
        );
    }

    #[test]
    fn test_point_samples_follow_time_option() {
        let mut scene = SourceScene::new();
        let mut mesh = SourceMesh {
            points: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            face_vertex_counts: vec![3],
            face_vertex_indices: vec![0, 1, 2],
            ..Default::default()
        };
        mesh.point_samples = vec![(1.0, mesh.points.clone()), (2.0, vec![Vec3::ONE; 3])];
        scene.nodes.push(SourceNode::mesh("tri", mesh));

        let stage = write(&ConversionOptions::default(), &scene);
        assert_eq!(stage.time_samples("/World/tri", "points"), vec![1.0, 2.0]);

        let still = write(
            &ConversionOptions {
                time_samples: false,
                ..Default::default()
            },
            &scene,
        );
        assert!(still.time_samples("/World/tri", "points").is_empty());
    }

    #[test]
    fn test_unique_names() {
        let mut used = HashSet::new();
        assert_eq!(unique_name(&mut used, "a b"), "a_b");
        assert_eq!(unique_name(&mut used, "a-b"), "a_b_1");
        assert_eq!(unique_name(&mut used, "a.b"), "a_b_2");
    }
}
