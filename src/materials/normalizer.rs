//! Maps source-format material properties onto the canonical schema
//!
//! Source dictionaries arrive as JSON objects so every reader (MTL, glTF,
//! FBX SDK dumps, Collada effects) can hand over what it found without a
//! shared Rust type. Lookups are first match wins, case as given.

use serde_json::{Map, Value};

use crate::constants::material::*;
use crate::materials::canonical::{keys, CanonicalMaterial, MaterialValue};

/// Source material dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Fbx,
    Gltf,
    Obj,
    Generic,
}

impl SourceFormat {
    pub fn from_name(name: &str) -> Self {
        match name.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "fbx" => SourceFormat::Fbx,
            "gltf" | "glb" => SourceFormat::Gltf,
            "obj" | "mtl" => SourceFormat::Obj,
            _ => SourceFormat::Generic,
        }
    }
}

/// Normalizes `source` written in the dialect named by `source_format`
pub fn normalize(source: &Map<String, Value>, source_format: &str) -> CanonicalMaterial {
    match SourceFormat::from_name(source_format) {
        SourceFormat::Fbx => normalize_fbx(source),
        SourceFormat::Gltf => normalize_gltf(source),
        SourceFormat::Obj => normalize_obj(source),
        SourceFormat::Generic => normalize_generic(source),
    }
}

fn first<'a>(source: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|n| source.get(*n))
}

fn as_scalar(value: &Value) -> Option<f32> {
    match value {
        Value::Number(n) => n.as_f64().map(|v| v as f32),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Array(items) => items.first().and_then(as_scalar),
        _ => None,
    }
}

fn as_color(value: &Value) -> Option<[f32; 3]> {
    match value {
        Value::Array(items) if items.len() >= 3 => {
            let mut color = [0.0; 3];
            for (slot, item) in color.iter_mut().zip(items) {
                *slot = as_scalar(item)?;
            }
            Some(color)
        }
        Value::Number(_) => as_scalar(value).map(|v| [v; 3]),
        _ => None,
    }
}

/// A texture reference: a path, or a glTF texture info object
fn as_texture(value: &Value) -> Option<String> {
    match value {
        Value::String(path) if !path.is_empty() => Some(path.clone()),
        Value::Object(info) => match (info.get("uri"), info.get("index")) {
            (Some(Value::String(uri)), _) if !uri.is_empty() => Some(uri.clone()),
            (_, Some(Value::Number(index))) => Some(format!("gltf_texture_{}", index)),
            _ => None,
        },
        _ => None,
    }
}

fn set_color(material: &mut CanonicalMaterial, key: &str, value: Option<&Value>) {
    if let Some(color) = value.and_then(as_color) {
        material.set(key, MaterialValue::Color(color));
    }
}

fn set_scalar(material: &mut CanonicalMaterial, key: &str, value: Option<&Value>) {
    if let Some(v) = value.and_then(as_scalar) {
        material.set(key, MaterialValue::Scalar(v));
    }
}

fn set_texture(material: &mut CanonicalMaterial, key: &str, value: Option<&Value>) {
    if let Some(path) = value.and_then(as_texture) {
        material.set(key, MaterialValue::Texture(path));
    }
}

/// Looks up a value inside the material's `extensions` object
fn extension<'a>(source: &'a Map<String, Value>, pointer: &str) -> Option<&'a Value> {
    source.get("extensions").and_then(|extensions| extensions.pointer(pointer))
}

fn normalize_fbx(source: &Map<String, Value>) -> CanonicalMaterial {
    let mut material = CanonicalMaterial::new();

    let diffuse = first(source, &["DiffuseColor", "diffuseColor"]);
    material.set(
        keys::BASE_COLOR,
        MaterialValue::Color(diffuse.and_then(as_color).unwrap_or(DEFAULT_BASE_COLOR)),
    );
    material.set(
        keys::METALLIC,
        MaterialValue::Scalar(
            first(source, &["ReflectionFactor", "metallic"])
                .and_then(as_scalar)
                .unwrap_or(DEFAULT_METALLIC),
        ),
    );
    let shininess = first(source, &["Shininess", "shininess"])
        .and_then(as_scalar)
        .unwrap_or(FBX_DEFAULT_SHININESS);
    material.set(
        keys::ROUGHNESS,
        MaterialValue::Scalar((1.0 - shininess / 100.0).clamp(0.0, 1.0)),
    );
    material.set(
        keys::SPECULAR,
        MaterialValue::Scalar(
            first(source, &["SpecularFactor", "specular"])
                .and_then(as_scalar)
                .unwrap_or(DEFAULT_SPECULAR),
        ),
    );
    material.set(
        keys::SPECULAR_COLOR,
        MaterialValue::Color(
            source
                .get("SpecularColor")
                .and_then(as_color)
                .unwrap_or(DEFAULT_SPECULAR_COLOR),
        ),
    );

    set_texture(&mut material, keys::BASE_COLOR_TEXTURE, first(source, &["Diffuse", "DiffuseTexture"]));
    set_texture(&mut material, keys::NORMAL_MAP, first(source, &["NormalMap", "Bump"]));

    // `Emissive` is a colour on most exporters and a texture on some
    match source.get("Emissive") {
        Some(Value::String(_)) => set_texture(&mut material, keys::EMISSIVE_TEXTURE, source.get("Emissive")),
        other => set_color(&mut material, keys::EMISSIVE_COLOR, other),
    }
    set_texture(&mut material, keys::EMISSIVE_TEXTURE, source.get("EmissiveTexture"));

    if let Some(transparency) = source.get("TransparencyFactor").and_then(as_scalar) {
        material.set(keys::OPACITY, MaterialValue::Scalar(1.0 - transparency));
    }
    if source.contains_key("SubsurfaceColor") {
        set_color(&mut material, keys::SUBSURFACE_COLOR, source.get("SubsurfaceColor"));
        material.set(
            keys::SUBSURFACE,
            MaterialValue::Scalar(source.get("SubsurfaceFactor").and_then(as_scalar).unwrap_or(0.0)),
        );
    }
    set_scalar(&mut material, keys::DISPLACEMENT, source.get("DisplacementFactor"));
    set_texture(&mut material, keys::DISPLACEMENT_TEXTURE, source.get("DisplacementColor"));
    material
}

fn normalize_gltf(source: &Map<String, Value>) -> CanonicalMaterial {
    let mut material = CanonicalMaterial::new();
    let empty = Map::new();
    let pbr = match source.get("pbrMetallicRoughness") {
        Some(Value::Object(pbr)) => pbr,
        _ => &empty,
    };

    if let Some(Value::Array(factor)) = pbr.get("baseColorFactor") {
        set_color(&mut material, keys::BASE_COLOR, pbr.get("baseColorFactor"));
        if let Some(alpha) = factor.get(3).and_then(as_scalar) {
            if alpha < 1.0 {
                material.set(keys::OPACITY, MaterialValue::Scalar(alpha));
            }
        }
    }
    set_scalar(&mut material, keys::METALLIC, pbr.get("metallicFactor"));
    set_scalar(&mut material, keys::ROUGHNESS, pbr.get("roughnessFactor"));
    set_texture(&mut material, keys::BASE_COLOR_TEXTURE, pbr.get("baseColorTexture"));
    set_texture(&mut material, keys::METALLIC_ROUGHNESS_TEXTURE, pbr.get("metallicRoughnessTexture"));

    set_texture(&mut material, keys::NORMAL_MAP, source.get("normalTexture"));
    set_texture(&mut material, keys::EMISSIVE_TEXTURE, source.get("emissiveTexture"));
    set_texture(&mut material, keys::OCCLUSION_TEXTURE, source.get("occlusionTexture"));

    if let Some(mut emissive) = source.get("emissiveFactor").and_then(as_color) {
        let strength = extension(source, "/KHR_materials_emissive_strength/emissiveStrength")
            .and_then(as_scalar)
            .unwrap_or(1.0);
        emissive.iter_mut().for_each(|c| *c *= strength);
        material.set(keys::EMISSIVE_COLOR, MaterialValue::Color(emissive));
    }

    set_scalar(
        &mut material,
        keys::TRANSMISSION,
        extension(source, "/KHR_materials_transmission/transmissionFactor"),
    );
    set_scalar(
        &mut material,
        keys::SPECULAR,
        extension(source, "/KHR_materials_specular/specularFactor"),
    );
    set_color(
        &mut material,
        keys::SPECULAR_COLOR,
        extension(source, "/KHR_materials_specular/specularColorFactor"),
    );
    material
}

fn normalize_obj(source: &Map<String, Value>) -> CanonicalMaterial {
    let mut material = CanonicalMaterial::new();

    material.set(
        keys::BASE_COLOR,
        MaterialValue::Color(source.get("Kd").and_then(as_color).unwrap_or(OBJ_DEFAULT_DIFFUSE)),
    );
    let ks = source.get("Ks").and_then(as_color);
    let specular = ks.map(|c| (c[0] + c[1] + c[2]) / 3.0).unwrap_or(0.0);
    material.set(keys::SPECULAR, MaterialValue::Scalar(specular));
    if let Some(ks) = ks {
        material.set(keys::SPECULAR_COLOR, MaterialValue::Color(ks));
    }
    let ns = source.get("Ns").and_then(as_scalar).unwrap_or(OBJ_DEFAULT_SHININESS);
    material.set(keys::ROUGHNESS, MaterialValue::Scalar((1.0 - ns / 1000.0).clamp(0.0, 1.0)));

    set_texture(&mut material, keys::BASE_COLOR_TEXTURE, source.get("map_Kd"));
    set_texture(&mut material, keys::NORMAL_MAP, first(source, &["map_Bump", "bump"]));
    set_texture(&mut material, keys::SPECULAR_TEXTURE, source.get("map_Ks"));
    set_texture(&mut material, keys::AMBIENT_TEXTURE, source.get("map_Ka"));
    set_texture(&mut material, keys::OPACITY_TEXTURE, source.get("map_d"));
    set_texture(&mut material, keys::DISPLACEMENT_TEXTURE, source.get("disp"));

    // `Tr` is the inverse of `d` and wins when both are present
    if let Some(tr) = source.get("Tr").and_then(as_scalar) {
        material.set(keys::OPACITY, MaterialValue::Scalar(1.0 - tr));
    } else {
        set_scalar(&mut material, keys::OPACITY, source.get("d"));
    }
    material
}

fn normalize_generic(source: &Map<String, Value>) -> CanonicalMaterial {
    let mut material = CanonicalMaterial::new();

    material.set(
        keys::BASE_COLOR,
        MaterialValue::Color(
            first(source, &["baseColor", "color", "diffuse"])
                .and_then(as_color)
                .unwrap_or(DEFAULT_BASE_COLOR),
        ),
    );
    let scalar_or = |name: &str, default: f32| source.get(name).and_then(as_scalar).unwrap_or(default);
    material.set(keys::METALLIC, MaterialValue::Scalar(scalar_or("metallic", DEFAULT_METALLIC)));
    material.set(keys::ROUGHNESS, MaterialValue::Scalar(scalar_or("roughness", DEFAULT_ROUGHNESS)));
    material.set(keys::SPECULAR, MaterialValue::Scalar(scalar_or("specular", DEFAULT_SPECULAR)));

    set_texture(
        &mut material,
        keys::BASE_COLOR_TEXTURE,
        first(source, &["baseColorTexture", "diffuseTexture", "colorTexture", "albedoTexture"]),
    );
    set_texture(&mut material, keys::NORMAL_MAP, first(source, &["normalMap", "normalTexture"]));
    for (key, name) in [
        (keys::EMISSIVE_TEXTURE, "emissiveTexture"),
        (keys::OPACITY_TEXTURE, "opacityTexture"),
        (keys::SPECULAR_TEXTURE, "specularTexture"),
        (keys::METALLIC_TEXTURE, "metallicTexture"),
        (keys::ROUGHNESS_TEXTURE, "roughnessTexture"),
        (keys::OCCLUSION_TEXTURE, "occlusionTexture"),
        (keys::DISPLACEMENT_TEXTURE, "displacementTexture"),
    ] {
        set_texture(&mut material, key, source.get(name));
    }
    set_color(&mut material, keys::EMISSIVE_COLOR, first(source, &["emissiveColor", "emission"]));
    set_scalar(&mut material, keys::OPACITY, source.get("opacity"));
    set_scalar(&mut material, keys::TRANSMISSION, source.get("transmission"));
    material
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_fbx_shininess_and_diffuse() {
        let material = normalize(&map(json!({"DiffuseColor": [0.5, 0.5, 0.5], "Shininess": 100})), "fbx");
        assert_eq!(material.scalar(keys::ROUGHNESS), Some(0.0));
        assert_eq!(material.color(keys::BASE_COLOR), Some([0.5, 0.5, 0.5]));
    }

    #[test]
    fn test_fbx_defaults() {
        let material = normalize(&Map::new(), "FBX");
        assert_eq!(material.color(keys::BASE_COLOR), Some(DEFAULT_BASE_COLOR));
        assert_eq!(material.scalar(keys::ROUGHNESS), Some(0.5));
        assert_eq!(material.scalar(keys::SPECULAR), Some(0.5));
        assert_eq!(material.scalar(keys::METALLIC), Some(0.0));
        assert!(!material.contains(keys::OPACITY));
    }

    #[test]
    fn test_fbx_transparency_and_textures() {
        let material = normalize(
            &map(json!({
                "TransparencyFactor": 0.25,
                "Diffuse": "wood.png",
                "Bump": "wood_n.png",
                "Emissive": [1.0, 0.5, 0.0],
                "SubsurfaceColor": [1.0, 0.2, 0.2]
            })),
            "fbx",
        );
        assert_eq!(material.scalar(keys::OPACITY), Some(0.75));
        assert_eq!(material.texture(keys::BASE_COLOR_TEXTURE), Some("wood.png"));
        assert_eq!(material.texture(keys::NORMAL_MAP), Some("wood_n.png"));
        assert_eq!(material.color(keys::EMISSIVE_COLOR), Some([1.0, 0.5, 0.0]));
        assert_eq!(material.scalar(keys::SUBSURFACE), Some(0.0));
    }

    #[test]
    fn test_gltf_nested_pbr() {
        let material = normalize(
            &map(json!({
                "pbrMetallicRoughness": {
                    "baseColorFactor": [1.0, 0.0, 0.0, 0.5],
                    "metallicFactor": 1.0,
                    "roughnessFactor": 0.2,
                    "baseColorTexture": {"index": 3},
                    "metallicRoughnessTexture": {"index": 1, "uri": "mr.png"}
                },
                "normalTexture": {"index": 2, "uri": "normal.png"},
                "emissiveFactor": [0.5, 0.5, 0.5],
                "extensions": {"KHR_materials_emissive_strength": {"emissiveStrength": 2.0}}
            })),
            "glb",
        );
        assert_eq!(material.color(keys::BASE_COLOR), Some([1.0, 0.0, 0.0]));
        assert_eq!(material.scalar(keys::OPACITY), Some(0.5));
        assert_eq!(material.scalar(keys::METALLIC), Some(1.0));
        assert_eq!(material.texture(keys::BASE_COLOR_TEXTURE), Some("gltf_texture_3"));
        assert_eq!(material.texture(keys::METALLIC_ROUGHNESS_TEXTURE), Some("mr.png"));
        assert_eq!(material.texture(keys::NORMAL_MAP), Some("normal.png"));
        assert_eq!(material.color(keys::EMISSIVE_COLOR), Some([1.0, 1.0, 1.0]));
        assert!(!material.contains(keys::SPECULAR));
    }

    #[test]
    fn test_gltf_extensions() {
        let material = normalize(
            &map(json!({
                "pbrMetallicRoughness": {
                    "baseColorTexture": {
                        "index": 0,
                        "uri": "albedo.png",
                        "extensions": {"KHR_texture_transform": {"offset": [0.5, 0.0], "scale": [2.0, 2.0]}}
                    }
                },
                "emissiveFactor": [0.25, 0.5, 1.0],
                "extensions": {
                    "KHR_materials_emissive_strength": {"emissiveStrength": 4.0},
                    "KHR_materials_transmission": {"transmissionFactor": 0.8},
                    "KHR_materials_specular": {"specularFactor": 0.3, "specularColorFactor": [1.0, 0.9, 0.8]}
                }
            })),
            "gltf",
        );
        assert_eq!(material.texture(keys::BASE_COLOR_TEXTURE), Some("albedo.png"));
        assert_eq!(material.color(keys::EMISSIVE_COLOR), Some([1.0, 2.0, 4.0]));
        assert_eq!(material.scalar(keys::TRANSMISSION), Some(0.8));
        assert_eq!(material.scalar(keys::SPECULAR), Some(0.3));
        assert_eq!(material.color(keys::SPECULAR_COLOR), Some([1.0, 0.9, 0.8]));
    }

    #[test]
    fn test_gltf_emissive_without_strength() {
        let material = normalize(&map(json!({"emissiveFactor": [0.5, 0.25, 0.0]})), "gltf");
        assert_eq!(material.color(keys::EMISSIVE_COLOR), Some([0.5, 0.25, 0.0]));
        assert!(!material.contains(keys::TRANSMISSION));
    }

    #[test]
    fn test_obj_mtl_mapping() {
        let material = normalize(
            &map(json!({"Kd": [0.1, 0.2, 0.3], "Ks": [0.3, 0.3, 0.3], "Ns": 250, "d": 0.5, "Tr": 0.1, "map_Kd": "kd.png", "bump": "b.png"})),
            "obj",
        );
        assert_eq!(material.color(keys::BASE_COLOR), Some([0.1, 0.2, 0.3]));
        assert!((material.scalar(keys::ROUGHNESS).unwrap() - 0.75).abs() < 1e-6);
        assert!((material.scalar(keys::SPECULAR).unwrap() - 0.3).abs() < 1e-6);
        assert!((material.scalar(keys::OPACITY).unwrap() - 0.9).abs() < 1e-6);
        assert_eq!(material.texture(keys::BASE_COLOR_TEXTURE), Some("kd.png"));
        assert_eq!(material.texture(keys::NORMAL_MAP), Some("b.png"));
    }

    #[test]
    fn test_obj_defaults() {
        let material = normalize(&Map::new(), "mtl");
        assert_eq!(material.color(keys::BASE_COLOR), Some(OBJ_DEFAULT_DIFFUSE));
        assert!((material.scalar(keys::ROUGHNESS).unwrap() - 0.9).abs() < 1e-6);
        assert!(!material.contains(keys::OPACITY));
    }

    #[test]
    fn test_generic_aliases() {
        let material = normalize(&map(json!({"diffuse": [0.2, 0.4, 0.6], "albedoTexture": "a.png"})), "collada");
        assert_eq!(material.color(keys::BASE_COLOR), Some([0.2, 0.4, 0.6]));
        assert_eq!(material.scalar(keys::METALLIC), Some(0.0));
        assert_eq!(material.scalar(keys::ROUGHNESS), Some(0.5));
        assert_eq!(material.scalar(keys::SPECULAR), Some(0.5));
        assert_eq!(material.texture(keys::BASE_COLOR_TEXTURE), Some("a.png"));
    }

    #[test]
    fn test_generic_texture_slots() {
        let material = normalize(
            &map(json!({
                "emissiveTexture": "glow.png",
                "roughnessTexture": "rough.png",
                "occlusionTexture": "ao.png",
                "displacementTexture": "height.png",
                "metallicTexture": ""
            })),
            "generic",
        );
        assert_eq!(material.texture(keys::EMISSIVE_TEXTURE), Some("glow.png"));
        assert_eq!(material.texture(keys::ROUGHNESS_TEXTURE), Some("rough.png"));
        assert_eq!(material.texture(keys::OCCLUSION_TEXTURE), Some("ao.png"));
        assert_eq!(material.texture(keys::DISPLACEMENT_TEXTURE), Some("height.png"));
        assert!(!material.contains(keys::METALLIC_TEXTURE));
        assert!(!material.contains(keys::OPACITY_TEXTURE));
    }
}
