//! Scene traversal through the FBX SDK and Alembic Python bindings
//!
//! The Python side walks the source file and hands back one JSON document;
//! Rust turns it into a [`SourceScene`].

use std::path::Path;

use glam::{DMat4, Vec2, Vec3};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::converters::source::{
    LightKind, NodeContent, Primvar, SourceCamera, SourceLight, SourceMaterial, SourceMesh, SourceNode, SourceScene,
};
use crate::error::ConversionError;
use crate::scene::python::local_usd;

const FBX_READER: &std::ffi::CStr = c"import json
import fbx

PROPERTIES = ('DiffuseColor', 'SpecularColor', 'Shininess', 'ReflectionFactor', 'SpecularFactor',
              'TransparencyFactor', 'Emissive', 'SubsurfaceColor', 'SubsurfaceFactor')
TEXTURES = {'DiffuseColor': 'Diffuse', 'NormalMap': 'NormalMap', 'Bump': 'Bump', 'EmissiveColor': 'EmissiveTexture'}

def _vec(v, n):
    return [float(v[i]) for i in range(n)]

def _element(element, poly, corner, vertex):
    mode = element.GetMappingMode()
    if mode == fbx.FbxLayerElement.EMappingMode.eByControlPoint:
        index = vertex
    elif mode == fbx.FbxLayerElement.EMappingMode.eByPolygonVertex:
        index = corner
    elif mode == fbx.FbxLayerElement.EMappingMode.eByPolygon:
        index = poly
    else:
        index = 0
    if element.GetReferenceMode() != fbx.FbxLayerElement.EReferenceMode.eDirect:
        index = element.GetIndexArray().GetAt(index)
    return element.GetDirectArray().GetAt(index)

def _mesh(mesh, want_normals, want_uvs):
    points = [_vec(p, 3) for p in mesh.GetControlPoints()]
    counts, indices, normals, uvs = [], [], [], []
    normal_element = mesh.GetElementNormal(0) if want_normals and mesh.GetElementNormalCount() else None
    uv_element = mesh.GetElementUV(0) if want_uvs and mesh.GetElementUVCount() else None
    corner = 0
    for poly in range(mesh.GetPolygonCount()):
        size = mesh.GetPolygonSize(poly)
        counts.append(size)
        for j in range(size):
            vertex = mesh.GetPolygonVertex(poly, j)
            indices.append(vertex)
            if normal_element:
                normals.append(_vec(_element(normal_element, poly, corner, vertex), 3))
            if uv_element:
                uvs.append(_vec(_element(uv_element, poly, corner, vertex), 2))
            corner += 1
    return {'points': points, 'counts': counts, 'indices': indices,
            'normals': normals or None, 'uvs': uvs or None, 'samples': []}

def _material(material):
    props = {}
    for name in PROPERTIES:
        prop = material.FindProperty(name)
        if not prop.IsValid():
            continue
        try:
            props[name] = _vec(fbx.FbxPropertyDouble3(prop).Get(), 3)
        except Exception:
            try:
                props[name] = float(fbx.FbxPropertyDouble1(prop).Get())
            except Exception:
                pass
    for name, key in TEXTURES.items():
        prop = material.FindProperty(name)
        if prop.IsValid():
            texture = prop.GetSrcObject(fbx.FbxCriteria.ObjectType(fbx.FbxFileTexture.ClassId), 0)
            if texture:
                props[key] = texture.GetFileName()
    return {'name': material.GetName() or 'Material', 'properties': props}

def read(path, want_normals, want_uvs):
    manager = fbx.FbxManager.Create()
    try:
        manager.SetIOSettings(fbx.FbxIOSettings.Create(manager, fbx.IOSROOT))
        importer = fbx.FbxImporter.Create(manager, '')
        if not importer.Initialize(path, -1, manager.GetIOSettings()):
            raise RuntimeError('FBX import failed: ' + importer.GetStatus().GetErrorString())
        scene = fbx.FbxScene.Create(manager, 'scene')
        importer.Import(scene)
        importer.Destroy()

        materials, material_index = [], {}

        def node(fbx_node):
            matrix = fbx_node.EvaluateGlobalTransform()
            out = {'name': fbx_node.GetName() or 'Node', 'kind': 'group',
                   'matrix': [matrix.Get(i, j) for i in range(4) for j in range(4)],
                   'material': None, 'children': []}
            attr = fbx_node.GetNodeAttribute()
            kind = attr.GetAttributeType() if attr else None
            if kind == fbx.FbxNodeAttribute.EType.eMesh:
                out['kind'] = 'mesh'
                out['mesh'] = _mesh(attr, want_normals, want_uvs)
                if fbx_node.GetMaterialCount():
                    material = fbx_node.GetMaterial(0)
                    key = material.GetUniqueID()
                    if key not in material_index:
                        material_index[key] = len(materials)
                        materials.append(_material(material))
                    out['material'] = material_index[key]
            elif kind == fbx.FbxNodeAttribute.EType.eCamera:
                out['kind'] = 'camera'
                out['camera'] = {'focal_length': attr.FocalLength.Get(),
                                 'horizontal_aperture': attr.GetApertureWidth() * 25.4,
                                 'vertical_aperture': attr.GetApertureHeight() * 25.4}
            elif kind == fbx.FbxNodeAttribute.EType.eLight:
                names = {fbx.FbxLight.EType.ePoint: 'point', fbx.FbxLight.EType.eDirectional: 'directional',
                         fbx.FbxLight.EType.eSpot: 'spot'}
                out['kind'] = 'light'
                out['light'] = {'kind': names.get(attr.LightType.Get(), 'other'),
                                'color': _vec(attr.Color.Get(), 3),
                                'intensity': attr.Intensity.Get() / 100.0}
            for i in range(fbx_node.GetChildCount()):
                out['children'].append(node(fbx_node.GetChild(i)))
            return out

        root = scene.GetRootNode()
        nodes = [node(root.GetChild(i)) for i in range(root.GetChildCount())]
        return json.dumps({'nodes': nodes, 'materials': materials, 'time_range': None})
    finally:
        manager.Destroy()
";

const ALEMBIC_READER: &std::ffi::CStr = c"import json
import alembic
from alembic import Abc, AbcGeom

def _flat(m):
    return [m[i][j] for i in range(4) for j in range(4)]

def _mul(a, b):
    return [sum(a[r * 4 + k] * b[k * 4 + c] for k in range(4)) for r in range(4) for c in range(4)]

IDENTITY = [1.0 if i % 5 == 0 else 0.0 for i in range(16)]

def _reverse_winding(counts, indices):
    out, start = [], 0
    for count in counts:
        face = indices[start:start + count]
        out.extend([face[0]] + face[1:][::-1])
        start += count
    return out

def _mesh(obj, want_normals, want_uvs, fps, all_samples):
    schema = AbcGeom.IPolyMesh(obj, Abc.WrapExistingFlag.kWrapExisting).getSchema()
    sample = schema.getValue(Abc.ISampleSelector(0))
    counts = [int(c) for c in sample.getFaceCounts()]
    indices = _reverse_winding(counts, [int(i) for i in sample.getFaceIndices()])
    out = {'points': [[p[0], p[1], p[2]] for p in sample.getPositions()],
           'counts': counts, 'indices': indices, 'normals': None, 'uvs': None, 'samples': []}
    normals = schema.getNormalsParam()
    if want_normals and normals.valid():
        values = normals.getExpandedValue().getVals()
        if len(values) == len(indices):
            out['normals'] = _reverse_winding(counts, [[n[0], n[1], n[2]] for n in values])
    uvs = schema.getUVsParam()
    if want_uvs and uvs.valid():
        values = uvs.getExpandedValue().getVals()
        if len(values) == len(indices):
            out['uvs'] = _reverse_winding(counts, [[uv[0], uv[1]] for uv in values])
    if all_samples and schema.getNumSamples() > 1:
        timing = schema.getTimeSampling()
        for i in range(schema.getNumSamples()):
            positions = schema.getValue(Abc.ISampleSelector(i)).getPositions()
            out['samples'].append([timing.getSampleTime(i) * fps, [[p[0], p[1], p[2]] for p in positions]])
    return out

def read(path, want_normals, want_uvs, fps, all_samples):
    archive = Abc.IArchive(path)

    def node(obj, parent_world):
        world = parent_world
        out = {'name': obj.getName(), 'kind': 'group', 'material': None, 'children': []}
        if AbcGeom.IXform.matches(obj.getMetaData()):
            local = AbcGeom.IXform(obj, Abc.WrapExistingFlag.kWrapExisting).getSchema().getValue().getMatrix()
            world = _mul(_flat(local), parent_world)
        elif AbcGeom.IPolyMesh.matches(obj.getMetaData()):
            out['kind'] = 'mesh'
            out['mesh'] = _mesh(obj, want_normals, want_uvs, fps, all_samples)
        elif AbcGeom.ICamera.matches(obj.getMetaData()):
            sample = AbcGeom.ICamera(obj, Abc.WrapExistingFlag.kWrapExisting).getSchema().getValue()
            out['kind'] = 'camera'
            out['camera'] = {'focal_length': sample.getFocalLength(),
                             'horizontal_aperture': sample.getHorizontalAperture() * 10.0,
                             'vertical_aperture': sample.getVerticalAperture() * 10.0}
        out['matrix'] = world
        out['children'] = [node(obj.getChild(i), world) for i in range(obj.getNumChildren())]
        return out

    top = archive.getTop()
    nodes = [node(top.getChild(i), IDENTITY) for i in range(top.getNumChildren())]
    start, end = Abc.GetArchiveStartAndEndTime(archive)
    time_range = [start * fps, end * fps] if end > start else None
    return json.dumps({'nodes': nodes, 'materials': [], 'time_range': time_range})
";

#[derive(Debug, Deserialize)]
struct SdkScene {
    nodes: Vec<SdkNode>,
    materials: Vec<SdkMaterial>,
    time_range: Option<(f64, f64)>,
}

#[derive(Debug, Deserialize)]
struct SdkNode {
    name: String,
    kind: String,
    matrix: Vec<f64>,
    material: Option<usize>,
    mesh: Option<SdkMesh>,
    camera: Option<SdkCamera>,
    light: Option<SdkLight>,
    children: Vec<SdkNode>,
}

#[derive(Debug, Deserialize)]
struct SdkMesh {
    points: Vec<[f32; 3]>,
    counts: Vec<i32>,
    indices: Vec<i32>,
    normals: Option<Vec<[f32; 3]>>,
    uvs: Option<Vec<[f32; 2]>>,
    samples: Vec<(f64, Vec<[f32; 3]>)>,
}

#[derive(Debug, Deserialize)]
struct SdkCamera {
    focal_length: f32,
    horizontal_aperture: f32,
    vertical_aperture: f32,
}

#[derive(Debug, Deserialize)]
struct SdkLight {
    kind: String,
    color: [f32; 3],
    intensity: f32,
}

#[derive(Debug, Deserialize)]
struct SdkMaterial {
    name: String,
    properties: Map<String, Value>,
}

fn points(values: Vec<[f32; 3]>) -> Vec<Vec3> {
    values.into_iter().map(Vec3::from_array).collect()
}

impl SdkNode {
    fn into_source(self) -> SourceNode {
        let content = match (self.kind.as_str(), self.mesh, self.camera, self.light) {
            ("mesh", Some(mesh), _, _) => NodeContent::Mesh(SourceMesh {
                points: points(mesh.points),
                face_vertex_counts: mesh.counts,
                face_vertex_indices: mesh.indices,
                normals: mesh.normals.map(|n| Primvar::face_varying(points(n))),
                uvs: mesh
                    .uvs
                    .map(|uv| Primvar::face_varying(uv.into_iter().map(Vec2::from_array).collect())),
                colors: None,
                point_samples: mesh.samples.into_iter().map(|(t, p)| (t, points(p))).collect(),
            }),
            ("camera", _, Some(camera), _) => NodeContent::Camera(SourceCamera {
                focal_length: camera.focal_length,
                horizontal_aperture: camera.horizontal_aperture,
                vertical_aperture: camera.vertical_aperture,
                clipping_range: None,
            }),
            ("light", _, _, Some(light)) => NodeContent::Light(SourceLight {
                kind: LightKind::from_name(&light.kind),
                color: Vec3::from_array(light.color),
                intensity: light.intensity,
            }),
            _ => NodeContent::Group,
        };

        let world = <[f64; 16]>::try_from(self.matrix.as_slice())
            .map(|m| DMat4::from_cols_array(&m))
            .unwrap_or(DMat4::IDENTITY);
        let mut node = SourceNode::new(self.name, content)
            .with_transform(world)
            .with_material(self.material);
        node.children = self.children.into_iter().map(SdkNode::into_source).collect();
        node
    }
}

fn into_scene(json: &str, material_format: &str) -> Result<SourceScene, ConversionError> {
    let sdk: SdkScene =
        serde_json::from_str(json).map_err(|e| ConversionError::strategy("python sdk", e.to_string()))?;
    Ok(SourceScene {
        nodes: sdk.nodes.into_iter().map(SdkNode::into_source).collect(),
        materials: sdk
            .materials
            .into_iter()
            .map(|m| SourceMaterial {
                name: m.name,
                format: material_format.to_string(),
                properties: m.properties,
            })
            .collect(),
        time_range: sdk.time_range,
        frames_per_second: None,
    })
}

/// Imports `module`, runs `source` and calls its `read` with `args`
fn run_reader<'py>(
    py: Python<'py>,
    module: &str,
    source: &std::ffi::CStr,
    args: impl IntoPyObject<'py, Target = pyo3::types::PyTuple>,
) -> Result<String, ConversionError> {
    if py.import(module).is_err() {
        return Err(ConversionError::ExternalToolMissing(format!("python module `{}`", module)));
    }
    let globals = PyDict::new(py);
    let result = py
        .run(source, Some(&globals), None)
        .and_then(|()| {
            globals
                .get_item("read")?
                .ok_or_else(|| pyo3::exceptions::PyKeyError::new_err("read"))
        })
        .and_then(|read| {
            let args = args.into_pyobject(py).map_err(Into::<PyErr>::into)?;
            read.call1(args)?.extract::<String>()
        });
    result.map_err(|e| ConversionError::strategy(module, e.to_string()))
}

/// Walks an FBX file with the Autodesk FBX Python SDK
pub fn read_fbx(path: &Path, normals: bool, uvs: bool) -> Result<SourceScene, ConversionError> {
    local_usd::prepare_interpreter();
    let path = path.to_string_lossy().into_owned();
    let json = Python::with_gil(|py| run_reader(py, "fbx", FBX_READER, (path, normals, uvs)))?;
    into_scene(&json, "fbx")
}

/// Walks an Alembic archive with the `alembic` Python bindings
pub fn read_alembic(
    path: &Path,
    normals: bool,
    uvs: bool,
    fps: f64,
    all_samples: bool,
) -> Result<SourceScene, ConversionError> {
    local_usd::prepare_interpreter();
    let path = path.to_string_lossy().into_owned();
    let json = Python::with_gil(|py| {
        run_reader(py, "alembic", ALEMBIC_READER, (path, normals, uvs, fps, all_samples))
    })?;
    let mut scene = into_scene(&json, "generic")?;
    scene.frames_per_second = Some(fps);
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_to_source_scene() {
        let json = r#"{
            "nodes": [{
                "name": "Cube", "kind": "mesh", "material": 0,
                "matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 5,0,0,1],
                "mesh": {"points": [[0,0,0],[1,0,0],[0,1,0]], "counts": [3], "indices": [0,1,2],
                         "normals": [[0,0,1],[0,0,1],[0,0,1]], "uvs": null, "samples": []},
                "children": [{"name": "Lamp", "kind": "light", "matrix": [], "material": null,
                              "light": {"kind": "spot", "color": [1,1,1], "intensity": 2.0}, "children": []}]
            }],
            "materials": [{"name": "Mat", "properties": {"Shininess": 100}}],
            "time_range": null
        }"#;
        let scene = into_scene(json, "fbx").unwrap();
        let cube = &scene.nodes[0];
        assert_eq!(cube.world_transform.w_axis.x, 5.0);
        assert_eq!(cube.material, Some(0));
        let NodeContent::Mesh(mesh) = &cube.content else {
            panic!("expected mesh");
        };
        assert_eq!(mesh.normals.as_ref().map(|n| n.values.len()), Some(3));
        assert!(matches!(&cube.children[0].content, NodeContent::Light(l) if l.kind == LightKind::Spot));
        assert_eq!(cube.children[0].world_transform, DMat4::IDENTITY);
        assert_eq!(scene.materials[0].format, "fbx");
    }
}
