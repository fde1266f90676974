//! Shader graph construction and material authoring
//!
//! `MaterialCreator` turns a [`CanonicalMaterial`] into a [`ShaderGraph`] for
//! one shading convention and writes it under a `Material` prim. MaterialX
//! flavoured conventions degrade to UsdPreviewSurface when the capability is
//! missing or a graph cannot be wired; the degradation is reported as a
//! diagnostic on the returned [`BuiltMaterial`].

use stagehand_core::{Connection, GraphError, MaterialOutput, ShaderGraph, ShaderNode, ShaderValue, ValueType};

use crate::constants::material::*;
use crate::error::SceneError;
use crate::materials::canonical::{keys, CanonicalMaterial};
use crate::options::MaterialShaderType;
use crate::scene::{child_path, AttributeValue, Stage, TimeCode};

const PREVIEW_SURFACE: &str = "PreviewSurface";
const PREVIEW_SURFACE_ID: &str = "UsdPreviewSurface";
const UV_TEXTURE_ID: &str = "UsdUVTexture";
const PRIMVAR_READER_ID: &str = "UsdPrimvarReader_float2";

const STANDARD_SURFACE_ID: &str = "ND_standard_surface_surfaceshader";

/// A graph together with the convention it was actually built for
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltMaterial {
    pub graph: ShaderGraph,
    pub convention: MaterialShaderType,
    /// Degradations applied while building or authoring
    pub diagnostics: Vec<String>,
}

/// Builds material graphs for one resolved shading convention
#[derive(Debug, Clone)]
pub struct MaterialCreator {
    shader_type: MaterialShaderType,
    materialx_available: bool,
}

impl MaterialCreator {
    /// `Auto` is resolved here and stays fixed for the creator's lifetime
    pub fn new(requested: MaterialShaderType, materialx_available: bool) -> Self {
        let shader_type = match requested {
            MaterialShaderType::Auto if materialx_available => MaterialShaderType::MaterialX,
            MaterialShaderType::Auto => MaterialShaderType::UsdPreviewSurface,
            other => other,
        };
        log::debug!("Material creator using {} (requested {})", shader_type, requested);
        Self {
            shader_type,
            materialx_available,
        }
    }

    pub fn shader_type(&self) -> MaterialShaderType {
        self.shader_type
    }

    /// Builds a graph; never fails, degrading to UsdPreviewSurface instead
    pub fn build(&self, canonical: &CanonicalMaterial) -> BuiltMaterial {
        let mut diagnostics = Vec::new();

        if is_standard_surface(self.shader_type) {
            if !self.materialx_available {
                diagnostics.push(format!(
                    "MaterialX unavailable, building {} material as UsdPreviewSurface",
                    self.shader_type
                ));
            } else {
                match build_standard_surface(canonical, self.shader_type, &mut diagnostics) {
                    Ok(graph) => {
                        for message in &diagnostics {
                            log::info!("{}", message);
                        }
                        return BuiltMaterial {
                            graph,
                            convention: self.shader_type,
                            diagnostics,
                        }
                    }
                    Err(e) => diagnostics.push(format!(
                        "{} graph failed ({}), falling back to UsdPreviewSurface",
                        self.shader_type, e
                    )),
                }
            }
        }

        let convention = match self.shader_type {
            MaterialShaderType::GltfPbr => MaterialShaderType::GltfPbr,
            _ => MaterialShaderType::UsdPreviewSurface,
        };
        let graph = build_preview_surface(canonical).unwrap_or_else(|e| {
            diagnostics.push(format!("UsdPreviewSurface graph failed ({}), using defaults", e));
            default_preview_graph()
        });
        for message in &diagnostics {
            log::warn!("{}", message);
        }
        BuiltMaterial {
            graph,
            convention,
            diagnostics,
        }
    }

    /// Builds and authors a material at `material_path`.
    ///
    /// Returns an error only when the `Material` prim itself cannot be
    /// defined. A graph that fails to author is replaced by a
    /// UsdPreviewSurface graph.
    pub fn create_material(
        &self,
        stage: &mut dyn Stage,
        material_path: &str,
        canonical: &CanonicalMaterial,
    ) -> Result<BuiltMaterial, SceneError> {
        stage.define_prim(material_path, "Material")?;

        let mut built = self.build(canonical);
        if let Err(e) = author_graph(stage, material_path, &built.graph) {
            built
                .diagnostics
                .push(format!("Failed to author {} graph ({}), rewriting as UsdPreviewSurface", built.convention, e));
            log::warn!("Failed to author material {}: {}", material_path, e);

            clear_material(stage, material_path);
            let graph = build_preview_surface(canonical).unwrap_or_else(|_| default_preview_graph());
            author_graph(stage, material_path, &graph)?;
            built.graph = graph;
            built.convention = MaterialShaderType::UsdPreviewSurface;
        }
        Ok(built)
    }
}

/// Binds `material_path` to `prim` through `material:binding`
pub fn bind_material(stage: &mut dyn Stage, prim: &str, material_path: &str) -> Result<(), SceneError> {
    stage.set_relationship_targets(prim, "material:binding", &[material_path.to_string()])
}

/// Writes `graph` as Shader prims under `material_path`
pub fn author_graph(stage: &mut dyn Stage, material_path: &str, graph: &ShaderGraph) -> Result<(), SceneError> {
    let output_path = |c: &Connection| format!("{}.outputs:{}", child_path(material_path, &c.node), c.output);

    for node in graph.topological_order() {
        let prim = child_path(material_path, &node.id);
        stage.define_prim(&prim, "Shader")?;
        stage.set_attribute(
            &prim,
            "info:id",
            AttributeValue::Token(node.shader_id.clone()),
            TimeCode::Default,
        )?;

        for (name, input) in &node.inputs {
            let attr = format!("inputs:{}", name);
            if let Some(value) = input.value() {
                stage.set_attribute(
                    &prim,
                    &attr,
                    AttributeValue::from_shader_value(value, input.value_type),
                    TimeCode::Default,
                )?;
            }
            if let Some(connection) = input.connection() {
                stage.set_connection(&prim, &attr, input.value_type.usd_name(), &output_path(connection))?;
            }
        }
        for (name, value_type) in &node.outputs {
            stage.declare_attribute(&prim, &format!("outputs:{}", name), value_type.usd_name())?;
        }
    }

    for (output, connection) in [
        (MaterialOutput::Surface, &graph.surface),
        (MaterialOutput::Displacement, &graph.displacement),
    ] {
        if let Some(connection) = connection {
            stage.set_connection(
                material_path,
                &format!("outputs:{}", output.name()),
                "token",
                &output_path(connection),
            )?;
        }
    }
    for (key, value) in &graph.metadata {
        stage.set_prim_metadata(material_path, key, value)?;
    }
    Ok(())
}

fn clear_material(stage: &mut dyn Stage, material_path: &str) {
    for child in stage.children(material_path) {
        if let Err(e) = stage.remove_prim(&child) {
            log::debug!("Could not remove {}: {}", child, e);
        }
    }
}

fn is_standard_surface(shader_type: MaterialShaderType) -> bool {
    matches!(
        shader_type,
        MaterialShaderType::MaterialX
            | MaterialShaderType::XMaterial
            | MaterialShaderType::Karma
            | MaterialShaderType::Nuke
            | MaterialShaderType::Blender
    )
}

// UsdPreviewSurface

/// How a texture key feeds a UsdPreviewSurface input
struct PreviewSlot {
    key: &'static str,
    input: &'static str,
    output: &'static str,
    value_type: ValueType,
    color_space: &'static str,
}

const PREVIEW_SLOTS: &[PreviewSlot] = &[
    PreviewSlot {
        key: keys::BASE_COLOR_TEXTURE,
        input: "diffuseColor",
        output: "rgb",
        value_type: ValueType::Color3,
        color_space: "sRGB",
    },
    PreviewSlot {
        key: keys::EMISSIVE_TEXTURE,
        input: "emissiveColor",
        output: "rgb",
        value_type: ValueType::Color3,
        color_space: "sRGB",
    },
    PreviewSlot {
        key: keys::SPECULAR_TEXTURE,
        input: "specularColor",
        output: "rgb",
        value_type: ValueType::Color3,
        color_space: "sRGB",
    },
    PreviewSlot {
        key: keys::METALLIC_TEXTURE,
        input: "metallic",
        output: "r",
        value_type: ValueType::Float,
        color_space: "raw",
    },
    PreviewSlot {
        key: keys::ROUGHNESS_TEXTURE,
        input: "roughness",
        output: "r",
        value_type: ValueType::Float,
        color_space: "raw",
    },
    PreviewSlot {
        key: keys::OPACITY_TEXTURE,
        input: "opacity",
        output: "r",
        value_type: ValueType::Float,
        color_space: "raw",
    },
    PreviewSlot {
        key: keys::OCCLUSION_TEXTURE,
        input: "occlusion",
        output: "r",
        value_type: ValueType::Float,
        color_space: "raw",
    },
];

/// Adds a UsdUVTexture fed by a `st` primvar reader
fn add_uv_texture(graph: &mut ShaderGraph, id: &str, file: &str, color_space: &str) -> Result<(), GraphError> {
    let reader_id = format!("{}_uv", id);
    let mut reader = ShaderNode::new(reader_id.clone(), PRIMVAR_READER_ID);
    reader
        .set_input("varname", ShaderValue::Token("st".into()))
        .add_output("result", ValueType::Float2);
    graph.add_node(reader)?;

    let mut texture = ShaderNode::new(id, UV_TEXTURE_ID);
    texture
        .set_input("file", ShaderValue::Asset(file.to_string()))
        .set_input("sourceColorSpace", ShaderValue::Token(color_space.into()))
        .set_input("wrapS", ShaderValue::Token("repeat".into()))
        .set_input("wrapT", ShaderValue::Token("repeat".into()))
        .add_output("rgb", ValueType::Float3)
        .add_output("r", ValueType::Float)
        .add_output("g", ValueType::Float)
        .add_output("b", ValueType::Float)
        .add_output("a", ValueType::Float);
    graph.add_node(texture)?;
    graph.connect(Connection::new(reader_id, "result"), id, "st", ValueType::Float2)
}

fn build_preview_surface(canonical: &CanonicalMaterial) -> Result<ShaderGraph, GraphError> {
    let mut graph = ShaderGraph::new();

    let mut surface = ShaderNode::new(PREVIEW_SURFACE, PREVIEW_SURFACE_ID);
    surface
        .set_typed_input(
            "diffuseColor",
            ValueType::Color3,
            ShaderValue::Color3(canonical.color(keys::BASE_COLOR).unwrap_or(DEFAULT_BASE_COLOR)),
        )
        .set_input(
            "metallic",
            ShaderValue::Float(canonical.scalar(keys::METALLIC).unwrap_or(DEFAULT_METALLIC)),
        )
        .set_input(
            "roughness",
            ShaderValue::Float(canonical.scalar(keys::ROUGHNESS).unwrap_or(DEFAULT_ROUGHNESS)),
        )
        .add_output("surface", ValueType::Token)
        .add_output("displacement", ValueType::Token);
    if let Some(emissive) = canonical.color(keys::EMISSIVE_COLOR) {
        surface.set_typed_input("emissiveColor", ValueType::Color3, ShaderValue::Color3(emissive));
    }
    if let Some(opacity) = canonical.scalar(keys::OPACITY) {
        surface.set_input("opacity", ShaderValue::Float(opacity));
    }
    if let Some(displacement) = canonical.scalar(keys::DISPLACEMENT) {
        surface.set_input("displacement", ShaderValue::Float(displacement));
    }
    graph.add_node(surface)?;

    for slot in PREVIEW_SLOTS {
        if let Some(file) = canonical.texture(slot.key) {
            add_uv_texture(&mut graph, slot.key, file, slot.color_space)?;
            graph.connect(Connection::new(slot.key, slot.output), PREVIEW_SURFACE, slot.input, slot.value_type)?;
        }
    }
    // MTL ambient maps stand in for occlusion when nothing better exists
    if !canonical.contains(keys::OCCLUSION_TEXTURE) {
        if let Some(file) = canonical.texture(keys::AMBIENT_TEXTURE) {
            add_uv_texture(&mut graph, keys::AMBIENT_TEXTURE, file, "raw")?;
            graph.connect(Connection::new(keys::AMBIENT_TEXTURE, "r"), PREVIEW_SURFACE, "occlusion", ValueType::Float)?;
        }
    }

    if let Some(file) = canonical.texture(keys::METALLIC_ROUGHNESS_TEXTURE) {
        let id = keys::METALLIC_ROUGHNESS_TEXTURE;
        add_uv_texture(&mut graph, id, file, "raw")?;
        if !canonical.contains(keys::METALLIC_TEXTURE) {
            graph.connect(Connection::new(id, "b"), PREVIEW_SURFACE, "metallic", ValueType::Float)?;
        }
        if !canonical.contains(keys::ROUGHNESS_TEXTURE) {
            graph.connect(Connection::new(id, "g"), PREVIEW_SURFACE, "roughness", ValueType::Float)?;
        }
    }

    if let Some(file) = canonical.texture(keys::NORMAL_MAP) {
        // Tangent-space decode from [0, 1] to [-1, 1]
        add_uv_texture(&mut graph, "normalMap", file, "raw")?;
        if let Some(node) = graph.nodes.get_mut("normalMap") {
            node.set_input("scale", ShaderValue::Float4([2.0, 2.0, 2.0, 1.0]))
                .set_input("bias", ShaderValue::Float4([-1.0, -1.0, -1.0, 0.0]));
        }
        graph.connect(Connection::new("normalMap", "rgb"), PREVIEW_SURFACE, "normal", ValueType::Normal3)?;
    }

    let has_displacement = canonical.contains(keys::DISPLACEMENT);
    if let Some(file) = canonical.texture(keys::DISPLACEMENT_TEXTURE) {
        add_uv_texture(&mut graph, "displacement", file, "raw")?;
        graph.connect(Connection::new("displacement", "r"), PREVIEW_SURFACE, "displacement", ValueType::Float)?;
    }
    if has_displacement || canonical.contains(keys::DISPLACEMENT_TEXTURE) {
        graph.set_output(MaterialOutput::Displacement, Connection::new(PREVIEW_SURFACE, "displacement"))?;
    }

    graph.set_output(MaterialOutput::Surface, Connection::new(PREVIEW_SURFACE, "surface"))?;
    Ok(graph)
}

/// A bare UsdPreviewSurface, built without any fallible wiring
fn default_preview_graph() -> ShaderGraph {
    let mut surface = ShaderNode::new(PREVIEW_SURFACE, PREVIEW_SURFACE_ID);
    surface
        .set_typed_input("diffuseColor", ValueType::Color3, ShaderValue::Color3(DEFAULT_BASE_COLOR))
        .set_input("metallic", ShaderValue::Float(DEFAULT_METALLIC))
        .set_input("roughness", ShaderValue::Float(DEFAULT_ROUGHNESS))
        .add_output("surface", ValueType::Token);

    let mut graph = ShaderGraph::new();
    graph.nodes.insert(PREVIEW_SURFACE.to_string(), surface);
    graph.surface = Some(Connection::new(PREVIEW_SURFACE, "surface"));
    graph
}

// MaterialX standard surface

fn surface_node_name(shader_type: MaterialShaderType) -> &'static str {
    match shader_type {
        MaterialShaderType::Karma => "KarmaSurface",
        MaterialShaderType::Nuke => "NukeSurface",
        MaterialShaderType::Blender => "BlenderSurface",
        _ => "MaterialXSurface",
    }
}

fn surface_metadata(shader_type: MaterialShaderType) -> &'static [(&'static str, &'static str)] {
    match shader_type {
        MaterialShaderType::Karma => &[("houdini:material", "karma")],
        MaterialShaderType::Nuke => &[("nuke:material", "mtlx_standard_surface")],
        MaterialShaderType::Blender => &[
            ("blender:material", "mtlx_standard_surface"),
            ("blender:usd_materialx", "true"),
        ],
        _ => &[],
    }
}

/// Adds an image node with its own texcoord reader
fn add_image(graph: &mut ShaderGraph, id: &str, file: &str, value_type: ValueType) -> Result<(), GraphError> {
    let shader_id = match value_type {
        ValueType::Float => "ND_image_float",
        ValueType::Vector3 => "ND_image_vector3",
        _ => "ND_image_color3",
    };
    let texcoord_id = format!("{}_uv", id);
    let mut texcoord = ShaderNode::new(texcoord_id.clone(), "ND_texcoord_vector2");
    texcoord
        .set_input("index", ShaderValue::Int(0))
        .add_output("out", ValueType::Float2);
    graph.add_node(texcoord)?;

    let mut image = ShaderNode::new(id, shader_id);
    image
        .set_input("file", ShaderValue::Asset(file.to_string()))
        .add_output("out", value_type);
    graph.add_node(image)?;
    graph.connect(Connection::new(texcoord_id, "out"), id, "texcoord", ValueType::Float2)
}

fn build_standard_surface(
    canonical: &CanonicalMaterial,
    shader_type: MaterialShaderType,
    diagnostics: &mut Vec<String>,
) -> Result<ShaderGraph, GraphError> {
    let surface_id = surface_node_name(shader_type);
    let mut graph = ShaderGraph::new();

    let mut surface = ShaderNode::new(surface_id, STANDARD_SURFACE_ID);
    surface
        .set_typed_input(
            "base_color",
            ValueType::Color3,
            ShaderValue::Color3(canonical.color(keys::BASE_COLOR).unwrap_or(DEFAULT_BASE_COLOR)),
        )
        .set_input(
            "metallic",
            ShaderValue::Float(canonical.scalar(keys::METALLIC).unwrap_or(DEFAULT_METALLIC)),
        )
        .set_input(
            "roughness",
            ShaderValue::Float(canonical.scalar(keys::ROUGHNESS).unwrap_or(DEFAULT_ROUGHNESS)),
        )
        .set_input(
            "specular",
            ShaderValue::Float(canonical.scalar(keys::SPECULAR).unwrap_or(DEFAULT_SPECULAR)),
        )
        .set_typed_input(
            "specular_color",
            ValueType::Color3,
            ShaderValue::Color3(canonical.color(keys::SPECULAR_COLOR).unwrap_or(DEFAULT_SPECULAR_COLOR)),
        )
        .set_input(
            "subsurface",
            ShaderValue::Float(canonical.scalar(keys::SUBSURFACE).unwrap_or(0.0)),
        )
        .set_typed_input(
            "opacity",
            ValueType::Color3,
            ShaderValue::Color3([canonical.scalar(keys::OPACITY).unwrap_or(1.0); 3]),
        )
        .set_input(
            "transmission",
            ShaderValue::Float(canonical.scalar(keys::TRANSMISSION).unwrap_or(0.0)),
        )
        .add_output("out", ValueType::Token);
    if let Some(emissive) = canonical.color(keys::EMISSIVE_COLOR) {
        surface
            .set_input("emission", ShaderValue::Float(1.0))
            .set_typed_input("emission_color", ValueType::Color3, ShaderValue::Color3(emissive));
    }
    if let Some(color) = canonical.color(keys::SUBSURFACE_COLOR) {
        surface.set_typed_input("subsurface_color", ValueType::Color3, ShaderValue::Color3(color));
    }
    graph.add_node(surface)?;

    let color_slots = [
        (keys::BASE_COLOR_TEXTURE, "base_color"),
        (keys::SPECULAR_TEXTURE, "specular_color"),
        (keys::OPACITY_TEXTURE, "opacity"),
    ];
    for (key, input) in color_slots {
        if let Some(file) = canonical.texture(key) {
            add_image(&mut graph, key, file, ValueType::Color3)?;
            graph.connect(Connection::new(key, "out"), surface_id, input, ValueType::Color3)?;
        }
    }
    if let Some(file) = canonical.texture(keys::EMISSIVE_TEXTURE) {
        add_image(&mut graph, keys::EMISSIVE_TEXTURE, file, ValueType::Color3)?;
        graph.connect(Connection::new(keys::EMISSIVE_TEXTURE, "out"), surface_id, "emission_color", ValueType::Color3)?;
        if let Some(node) = graph.nodes.get_mut(surface_id) {
            node.set_input("emission", ShaderValue::Float(1.0));
        }
    }

    let float_slots = [(keys::METALLIC_TEXTURE, "metallic"), (keys::ROUGHNESS_TEXTURE, "roughness")];
    for (key, input) in float_slots {
        if let Some(file) = canonical.texture(key) {
            add_image(&mut graph, key, file, ValueType::Float)?;
            graph.connect(Connection::new(key, "out"), surface_id, input, ValueType::Float)?;
        }
    }

    if let Some(file) = canonical.texture(keys::METALLIC_ROUGHNESS_TEXTURE) {
        let id = keys::METALLIC_ROUGHNESS_TEXTURE;
        add_image(&mut graph, id, file, ValueType::Vector3)?;
        let split_id = "metallic_roughness_split";
        let mut split = ShaderNode::new(split_id, "ND_separate3_vector3");
        split
            .add_output("outx", ValueType::Float)
            .add_output("outy", ValueType::Float)
            .add_output("outz", ValueType::Float);
        graph.add_node(split)?;
        graph.connect(Connection::new(id, "out"), split_id, "in", ValueType::Vector3)?;
        if !canonical.contains(keys::METALLIC_TEXTURE) {
            graph.connect(Connection::new(split_id, "outz"), surface_id, "metallic", ValueType::Float)?;
        }
        if !canonical.contains(keys::ROUGHNESS_TEXTURE) {
            graph.connect(Connection::new(split_id, "outy"), surface_id, "roughness", ValueType::Float)?;
        }
    }

    for key in [keys::OCCLUSION_TEXTURE, keys::AMBIENT_TEXTURE] {
        if canonical.contains(key) {
            diagnostics.push(format!("Standard surface has no input for {}, skipped", key));
        }
    }

    if let Some(file) = canonical.texture(keys::NORMAL_MAP) {
        add_image(&mut graph, "normalMap_image", file, ValueType::Vector3)?;
        let mut normal_map = ShaderNode::new("normalMap", "ND_normalmap");
        normal_map
            .set_input("scale", ShaderValue::Float(DEFAULT_NORMAL_SCALE))
            .add_output("out", ValueType::Vector3);
        graph.add_node(normal_map)?;
        graph.connect(Connection::new("normalMap_image", "out"), "normalMap", "in", ValueType::Vector3)?;
        graph.connect(Connection::new("normalMap", "out"), surface_id, "normal", ValueType::Vector3)?;
    }

    let displacement_value = canonical.scalar(keys::DISPLACEMENT);
    let displacement_texture = canonical.texture(keys::DISPLACEMENT_TEXTURE);
    if displacement_value.is_some() || displacement_texture.is_some() {
        let mut displacement = ShaderNode::new("displacement", "ND_displacement_float");
        displacement
            .set_input("displacement", ShaderValue::Float(displacement_value.unwrap_or(0.0)))
            .set_input("scale", ShaderValue::Float(DEFAULT_DISPLACEMENT_SCALE))
            .add_output("out", ValueType::Token);
        graph.add_node(displacement)?;
        if let Some(file) = displacement_texture {
            add_image(&mut graph, "displacement_image", file, ValueType::Float)?;
            graph.connect(
                Connection::new("displacement_image", "out"),
                "displacement",
                "displacement",
                ValueType::Float,
            )?;
        }
        graph.set_output(MaterialOutput::Displacement, Connection::new("displacement", "out"))?;
    }

    graph.set_output(MaterialOutput::Surface, Connection::new(surface_id, "out"))?;
    for (key, value) in surface_metadata(shader_type) {
        graph.metadata.insert(key.to_string(), value.to_string());
    }
    Ok(graph)
}
