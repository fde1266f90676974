//! Scene backend driving the `pxr` Python API through pyo3

pub mod local_usd;

use std::path::Path;

use glam::{DMat4, DVec3, Vec2, Vec3, Vec4};
use pyo3::prelude::*;
use pyo3::sync::GILOnceCell;
use pyo3::types::{PyDict, PyTuple};
use pyo3::IntoPyObjectExt;

use crate::error::SceneError;
use crate::scene::value::AttributeValue;
use crate::scene::{SceneBackend, Stage, StageMetadata, TimeCode};

static HELPERS: GILOnceCell<Py<PyDict>> = GILOnceCell::new();

/// Small Python shims so Rust only exchanges plain lists, tuples and strings
fn helpers(py: Python<'_>) -> PyResult<&Bound<'_, PyDict>> {
    HELPERS
        .get_or_try_init(py, || {
            let globals = PyDict::new(py);
            py.run(
                c"from pxr import Usd, Sdf, Gf, Plug

def _time(t):
    return Usd.TimeCode.Default() if t is None else Usd.TimeCode(t)

def _plain(value):
    if isinstance(value, Sdf.AssetPath):
        return value.path
    if isinstance(value, Gf.Matrix4d):
        return [value[i][j] for i in range(4) for j in range(4)]
    if isinstance(value, (str, bool, int, float)):
        return value
    try:
        return [_plain(v) for v in value]
    except TypeError:
        return value

def get_attribute(stage, path, name, time):
    attr = stage.GetPrimAtPath(path).GetAttribute(name)
    if not attr:
        return None
    if time is None and not attr.HasAuthoredValue():
        return None
    value = attr.Get(_time(time))
    if value is None:
        return None
    return (str(attr.GetTypeName()), _plain(value))

def create_attribute(stage, path, name, type_name):
    prim = stage.GetPrimAtPath(path)
    if not prim:
        raise ValueError('no prim at ' + path)
    attr = prim.GetAttribute(name)
    if not attr:
        attr = prim.CreateAttribute(name, Sdf.ValueTypeNames.Find(type_name))
    return attr

def set_attribute(stage, path, name, type_name, value, time):
    attr = create_attribute(stage, path, name, type_name)
    if type_name == 'matrix4d':
        value = Gf.Matrix4d(*value)
    attr.Set(value, _time(time))

def get_metadata(stage):
    layer = stage.GetRootLayer()
    default_prim = stage.GetDefaultPrim()
    def opt(key):
        return stage.GetMetadata(key) if stage.HasAuthoredMetadata(key) else None
    return {
        'up_axis': opt('upAxis'),
        'meters_per_unit': opt('metersPerUnit'),
        'start_time_code': opt('startTimeCode'),
        'end_time_code': opt('endTimeCode'),
        'frames_per_second': opt('framesPerSecond'),
        'time_codes_per_second': opt('timeCodesPerSecond'),
        'default_prim': default_prim.GetName() if default_prim else None,
        'doc': layer.documentation or None,
        'sublayers': list(layer.subLayerPaths),
    }

def set_metadata(stage, data):
    for key, name in (('up_axis', 'upAxis'), ('meters_per_unit', 'metersPerUnit'),
                      ('start_time_code', 'startTimeCode'), ('end_time_code', 'endTimeCode'),
                      ('frames_per_second', 'framesPerSecond'),
                      ('time_codes_per_second', 'timeCodesPerSecond')):
        if data[key] is not None:
            stage.SetMetadata(name, data[key])
    if data['default_prim']:
        prim = stage.GetPrimAtPath('/' + data['default_prim'])
        if prim:
            stage.SetDefaultPrim(prim)
    layer = stage.GetRootLayer()
    if data['doc']:
        layer.documentation = data['doc']
    layer.subLayerPaths[:] = data['sublayers']

def prim_paths(stage):
    return [str(p.GetPath()) for p in Usd.PrimRange.AllPrims(stage.GetPseudoRoot()) if not p.IsPseudoRoot()]

def has_plugin(name):
    return Plug.Registry().GetPluginWithName(name) is not None
",
                Some(&globals),
                None,
            )?;
            Ok::<_, PyErr>(globals.unbind())
        })
        .map(|globals| globals.bind(py))
}

fn call<'py, A>(py: Python<'py>, name: &str, args: A) -> PyResult<Bound<'py, PyAny>>
where
    A: IntoPyObject<'py, Target = PyTuple>,
{
    let args = args.into_pyobject(py).map_err(Into::<PyErr>::into)?;
    let function = helpers(py)?
        .get_item(name)?
        .ok_or_else(|| pyo3::exceptions::PyKeyError::new_err(name.to_string()))?;
    function.call1(args)
}

fn backend_err(e: PyErr) -> SceneError {
    SceneError::Backend(e.to_string())
}

fn time_arg(time: TimeCode) -> Option<f64> {
    match time {
        TimeCode::Default => None,
        TimeCode::At(t) => Some(t),
    }
}

fn to_python(py: Python<'_>, value: &AttributeValue) -> PyResult<PyObject> {
    let vec2 = |v: &Vec2| (v.x, v.y);
    let vec3 = |v: &Vec3| (v.x, v.y, v.z);
    match value {
        AttributeValue::Bool(v) => v.into_py_any(py),
        AttributeValue::Int(v) => v.into_py_any(py),
        AttributeValue::Float(v) => v.into_py_any(py),
        AttributeValue::Double(v) => v.into_py_any(py),
        AttributeValue::String(v) | AttributeValue::Token(v) | AttributeValue::Asset(v) => v.into_py_any(py),
        AttributeValue::Float2(v) | AttributeValue::TexCoord2f(v) => vec2(v).into_py_any(py),
        AttributeValue::Float3(v)
        | AttributeValue::Color3f(v)
        | AttributeValue::Normal3f(v)
        | AttributeValue::Point3f(v)
        | AttributeValue::Vector3f(v) => vec3(v).into_py_any(py),
        AttributeValue::Float4(v) => (v.x, v.y, v.z, v.w).into_py_any(py),
        AttributeValue::Double3(v) => (v.x, v.y, v.z).into_py_any(py),
        // Row-major for Gf.Matrix4d, which is glam's column order
        AttributeValue::Matrix4d(m) => m.to_cols_array().to_vec().into_py_any(py),
        AttributeValue::IntArray(v) => v.clone().into_py_any(py),
        AttributeValue::FloatArray(v) => v.clone().into_py_any(py),
        AttributeValue::DoubleArray(v) => v.clone().into_py_any(py),
        AttributeValue::TokenArray(v) => v.clone().into_py_any(py),
        AttributeValue::Float2Array(v) | AttributeValue::TexCoord2fArray(v) => {
            v.iter().map(vec2).collect::<Vec<_>>().into_py_any(py)
        }
        AttributeValue::Float3Array(v)
        | AttributeValue::Color3fArray(v)
        | AttributeValue::Normal3fArray(v)
        | AttributeValue::Point3fArray(v)
        | AttributeValue::Vector3fArray(v) => v.iter().map(vec3).collect::<Vec<_>>().into_py_any(py),
    }
}

fn from_python(type_name: &str, value: &Bound<'_, PyAny>) -> PyResult<Option<AttributeValue>> {
    let v2 = |v: Vec<f32>| Vec2::new(v[0], v[1]);
    let v3 = |v: Vec<f32>| Vec3::new(v[0], v[1], v[2]);
    let value = match type_name {
        "bool" => AttributeValue::Bool(value.extract()?),
        "int" | "uint" | "int64" | "uchar" => AttributeValue::Int(value.extract()?),
        "float" | "half" => AttributeValue::Float(value.extract()?),
        "double" | "timecode" => AttributeValue::Double(value.extract()?),
        "string" => AttributeValue::String(value.extract()?),
        "token" => AttributeValue::Token(value.extract()?),
        "asset" => AttributeValue::Asset(value.extract()?),
        "float2" | "half2" => AttributeValue::Float2(Vec2::from_array(value.extract()?)),
        "texCoord2f" => AttributeValue::TexCoord2f(Vec2::from_array(value.extract()?)),
        "float3" | "half3" => AttributeValue::Float3(Vec3::from_array(value.extract()?)),
        "double3" => AttributeValue::Double3(DVec3::from_array(value.extract()?)),
        "float4" | "color4f" => AttributeValue::Float4(Vec4::from_array(value.extract()?)),
        "color3f" => AttributeValue::Color3f(Vec3::from_array(value.extract()?)),
        "normal3f" => AttributeValue::Normal3f(Vec3::from_array(value.extract()?)),
        "point3f" => AttributeValue::Point3f(Vec3::from_array(value.extract()?)),
        "vector3f" => AttributeValue::Vector3f(Vec3::from_array(value.extract()?)),
        "matrix4d" => AttributeValue::Matrix4d(DMat4::from_cols_array(&value.extract::<[f64; 16]>()?)),
        "int[]" => AttributeValue::IntArray(value.extract()?),
        "float[]" => AttributeValue::FloatArray(value.extract()?),
        "double[]" => AttributeValue::DoubleArray(value.extract()?),
        "token[]" | "string[]" => AttributeValue::TokenArray(value.extract()?),
        "float2[]" => AttributeValue::Float2Array(value.extract::<Vec<Vec<f32>>>()?.into_iter().map(v2).collect()),
        "texCoord2f[]" => {
            AttributeValue::TexCoord2fArray(value.extract::<Vec<Vec<f32>>>()?.into_iter().map(v2).collect())
        }
        "float3[]" => AttributeValue::Float3Array(value.extract::<Vec<Vec<f32>>>()?.into_iter().map(v3).collect()),
        "color3f[]" => AttributeValue::Color3fArray(value.extract::<Vec<Vec<f32>>>()?.into_iter().map(v3).collect()),
        "normal3f[]" => AttributeValue::Normal3fArray(value.extract::<Vec<Vec<f32>>>()?.into_iter().map(v3).collect()),
        "point3f[]" => AttributeValue::Point3fArray(value.extract::<Vec<Vec<f32>>>()?.into_iter().map(v3).collect()),
        "vector3f[]" => AttributeValue::Vector3fArray(value.extract::<Vec<Vec<f32>>>()?.into_iter().map(v3).collect()),
        other => {
            log::debug!("skipping unsupported attribute type {}", other);
            return Ok(None);
        }
    };
    Ok(Some(value))
}

/// Scene backend over `pxr.Usd`
pub struct PyUsdBackend;

impl PyUsdBackend {
    pub fn new() -> Result<Self, SceneError> {
        local_usd::init_local_usd()?;
        Ok(Self)
    }
}

impl SceneBackend for PyUsdBackend {
    fn name(&self) -> &'static str {
        "pxr"
    }

    fn create_new(&self, path: &Path) -> Result<Box<dyn Stage>, SceneError> {
        let path_str = path.to_string_lossy().into_owned();
        Python::with_gil(|py| {
            let stage = py
                .import("pxr.Usd")?
                .getattr("Stage")?
                .call_method1("CreateNew", (path_str,))?;
            Ok(Box::new(PyUsdStage { stage: stage.unbind() }) as Box<dyn Stage>)
        })
        .map_err(backend_err)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Stage>, SceneError> {
        let path_str = path.to_string_lossy().into_owned();
        let stage = Python::with_gil(|py| -> PyResult<Option<PyObject>> {
            let stage = py
                .import("pxr.Usd")?
                .getattr("Stage")?
                .call_method1("Open", (path_str,))?;
            Ok((!stage.is_none()).then(|| stage.unbind()))
        })
        .map_err(backend_err)?;
        match stage {
            Some(stage) => Ok(Box::new(PyUsdStage { stage })),
            None => Err(SceneError::FormatNotSupported(format!("USD could not open {}", path.display()))),
        }
    }

    fn has_plugin(&self, name: &str) -> bool {
        Python::with_gil(|py| call(py, "has_plugin", (name,))?.extract::<bool>()).unwrap_or(false)
    }

    fn supports_materialx(&self) -> bool {
        Python::with_gil(|py| py.import("pxr.UsdMtlx").is_ok())
    }
}

/// A stage owned by the Python USD runtime
pub struct PyUsdStage {
    stage: PyObject,
}

impl PyUsdStage {
    fn with_prim<T>(
        &self,
        path: &str,
        f: impl for<'py> FnOnce(Python<'py>, Bound<'py, PyAny>) -> PyResult<T>,
    ) -> PyResult<T> {
        Python::with_gil(|py| {
            let prim = self.stage.bind(py).call_method1("GetPrimAtPath", (path,))?;
            f(py, prim)
        })
    }

    fn strings(&self, f: impl for<'py> FnOnce(Python<'py>, &Bound<'py, PyAny>) -> PyResult<Vec<String>>) -> Vec<String> {
        Python::with_gil(|py| f(py, self.stage.bind(py))).unwrap_or_default()
    }
}

impl Stage for PyUsdStage {
    fn identifier(&self) -> String {
        Python::with_gil(|py| {
            self.stage
                .bind(py)
                .call_method0("GetRootLayer")?
                .getattr("identifier")?
                .extract::<String>()
        })
        .unwrap_or_default()
    }

    fn metadata(&self) -> StageMetadata {
        Python::with_gil(|py| -> PyResult<StageMetadata> {
            let data = call(py, "get_metadata", (self.stage.bind(py),))?;
            let get = |key: &str| data.get_item(key);
            Ok(StageMetadata {
                up_axis: get("up_axis")?.extract()?,
                meters_per_unit: get("meters_per_unit")?.extract()?,
                start_time_code: get("start_time_code")?.extract()?,
                end_time_code: get("end_time_code")?.extract()?,
                frames_per_second: get("frames_per_second")?.extract()?,
                time_codes_per_second: get("time_codes_per_second")?.extract()?,
                default_prim: get("default_prim")?.extract()?,
                doc: get("doc")?.extract()?,
                sublayers: get("sublayers")?.extract()?,
            })
        })
        .unwrap_or_default()
    }

    fn set_metadata(&mut self, metadata: StageMetadata) -> Result<(), SceneError> {
        Python::with_gil(|py| {
            let data = PyDict::new(py);
            data.set_item("up_axis", metadata.up_axis)?;
            data.set_item("meters_per_unit", metadata.meters_per_unit)?;
            data.set_item("start_time_code", metadata.start_time_code)?;
            data.set_item("end_time_code", metadata.end_time_code)?;
            data.set_item("frames_per_second", metadata.frames_per_second)?;
            data.set_item("time_codes_per_second", metadata.time_codes_per_second)?;
            data.set_item("default_prim", metadata.default_prim)?;
            data.set_item("doc", metadata.doc)?;
            data.set_item("sublayers", metadata.sublayers)?;
            call(py, "set_metadata", (self.stage.bind(py), data))?;
            Ok(())
        })
        .map_err(backend_err)
    }

    fn define_prim(&mut self, path: &str, type_name: &str) -> Result<(), SceneError> {
        Python::with_gil(|py| {
            self.stage.bind(py).call_method1("DefinePrim", (path, type_name))?;
            Ok(())
        })
        .map_err(backend_err)
    }

    fn remove_prim(&mut self, path: &str) -> Result<(), SceneError> {
        let removed = Python::with_gil(|py| self.stage.bind(py).call_method1("RemovePrim", (path,))?.extract::<bool>())
            .map_err(backend_err)?;
        if removed {
            Ok(())
        } else {
            Err(SceneError::NoSuchPrim(path.to_string()))
        }
    }

    fn has_prim(&self, path: &str) -> bool {
        self.with_prim(path, |_, prim| prim.call_method0("IsValid")?.extract::<bool>())
            .unwrap_or(false)
    }

    fn prim_type(&self, path: &str) -> Option<String> {
        self.with_prim(path, |_, prim| {
            if prim.call_method0("IsValid")?.extract::<bool>()? {
                Ok(Some(prim.call_method0("GetTypeName")?.str()?.to_string()))
            } else {
                Ok(None)
            }
        })
        .ok()
        .flatten()
    }

    fn prim_paths(&self) -> Vec<String> {
        self.strings(|py, stage| call(py, "prim_paths", (stage,))?.extract())
    }

    fn children(&self, path: &str) -> Vec<String> {
        self.with_prim(path, |_, prim| {
            prim.call_method0("GetChildren")?
                .try_iter()?
                .map(|child| -> PyResult<String> { Ok(child?.call_method0("GetPath")?.str()?.to_string()) })
                .collect()
        })
        .unwrap_or_default()
    }

    fn declare_attribute(&mut self, prim: &str, name: &str, type_name: &str) -> Result<(), SceneError> {
        Python::with_gil(|py| {
            call(py, "create_attribute", (self.stage.bind(py), prim, name, type_name))?;
            Ok(())
        })
        .map_err(backend_err)
    }

    fn set_attribute(&mut self, prim: &str, name: &str, value: AttributeValue, time: TimeCode) -> Result<(), SceneError> {
        Python::with_gil(|py| {
            let py_value = to_python(py, &value)?;
            call(
                py,
                "set_attribute",
                (self.stage.bind(py), prim, name, value.type_name(), py_value, time_arg(time)),
            )?;
            Ok(())
        })
        .map_err(backend_err)
    }

    fn attribute(&self, prim: &str, name: &str, time: TimeCode) -> Option<AttributeValue> {
        Python::with_gil(|py| -> PyResult<Option<AttributeValue>> {
            let result = call(py, "get_attribute", (self.stage.bind(py), prim, name, time_arg(time)))?;
            if result.is_none() {
                return Ok(None);
            }
            let type_name: String = result.get_item(0)?.extract()?;
            from_python(&type_name, &result.get_item(1)?)
        })
        .ok()
        .flatten()
    }

    fn time_samples(&self, prim: &str, name: &str) -> Vec<f64> {
        self.with_prim(prim, |_, p| {
            p.call_method1("GetAttribute", (name,))?
                .call_method0("GetTimeSamples")?
                .extract()
        })
        .unwrap_or_default()
    }

    fn attribute_names(&self, prim: &str) -> Vec<String> {
        self.with_prim(prim, |_, p| {
            p.call_method0("GetAuthoredAttributes")?
                .try_iter()?
                .map(|a| a?.call_method0("GetName")?.extract::<String>())
                .collect()
        })
        .unwrap_or_default()
    }

    fn attribute_type(&self, prim: &str, name: &str) -> Option<String> {
        self.with_prim(prim, |_, p| {
            let attr = p.call_method1("GetAttribute", (name,))?;
            if attr.is_truthy()? {
                Ok(Some(attr.call_method0("GetTypeName")?.str()?.to_string()))
            } else {
                Ok(None)
            }
        })
        .ok()
        .flatten()
    }

    fn set_attribute_metadata(&mut self, prim: &str, name: &str, key: &str, value: &str) -> Result<(), SceneError> {
        self.with_prim(prim, |_, p| {
            p.call_method1("GetAttribute", (name,))?
                .call_method1("SetMetadata", (key, value))?;
            Ok(())
        })
        .map_err(backend_err)
    }

    fn attribute_metadata(&self, prim: &str, name: &str, key: &str) -> Option<String> {
        self.with_prim(prim, |_, p| {
            let value = p.call_method1("GetAttribute", (name,))?.call_method1("GetMetadata", (key,))?;
            if value.is_none() {
                Ok(None)
            } else {
                Ok(Some(value.str()?.to_string()))
            }
        })
        .ok()
        .flatten()
    }

    fn set_connection(&mut self, prim: &str, name: &str, type_name: &str, source: &str) -> Result<(), SceneError> {
        Python::with_gil(|py| {
            let attr = call(py, "create_attribute", (self.stage.bind(py), prim, name, type_name))?;
            let sdf_path = py.import("pxr.Sdf")?.getattr("Path")?.call1((source,))?;
            attr.call_method1("SetConnections", (vec![sdf_path],))?;
            Ok(())
        })
        .map_err(backend_err)
    }

    fn connection(&self, prim: &str, name: &str) -> Option<String> {
        self.with_prim(prim, |_, p| {
            let attr = p.call_method1("GetAttribute", (name,))?;
            if !attr.is_truthy()? {
                return Ok(None);
            }
            let targets: Vec<String> = attr
                .call_method0("GetConnections")?
                .try_iter()?
                .map(|t| -> PyResult<String> { Ok(t?.str()?.to_string()) })
                .collect::<PyResult<_>>()?;
            Ok(targets.into_iter().next())
        })
        .ok()
        .flatten()
    }

    fn set_relationship_targets(&mut self, prim: &str, name: &str, targets: &[String]) -> Result<(), SceneError> {
        Python::with_gil(|py| {
            let sdf_path = py.import("pxr.Sdf")?.getattr("Path")?;
            let paths = targets
                .iter()
                .map(|t| sdf_path.call1((t.as_str(),)))
                .collect::<PyResult<Vec<_>>>()?;
            self.stage
                .bind(py)
                .call_method1("GetPrimAtPath", (prim,))?
                .call_method1("CreateRelationship", (name,))?
                .call_method1("SetTargets", (paths,))?;
            Ok(())
        })
        .map_err(backend_err)
    }

    fn relationship_targets(&self, prim: &str, name: &str) -> Vec<String> {
        self.with_prim(prim, |_, p| {
            let rel = p.call_method1("GetRelationship", (name,))?;
            if !rel.is_truthy()? {
                return Ok(Vec::new());
            }
            rel.call_method0("GetTargets")?
                .try_iter()?
                .map(|t| -> PyResult<String> { Ok(t?.str()?.to_string()) })
                .collect()
        })
        .unwrap_or_default()
    }

    fn relationship_names(&self, prim: &str) -> Vec<String> {
        self.with_prim(prim, |_, p| {
            p.call_method0("GetAuthoredRelationships")?
                .try_iter()?
                .map(|r| r?.call_method0("GetName")?.extract::<String>())
                .collect()
        })
        .unwrap_or_default()
    }

    fn set_prim_metadata(&mut self, prim: &str, key: &str, value: &str) -> Result<(), SceneError> {
        self.with_prim(prim, |_, p| {
            p.call_method1("SetCustomDataByKey", (key, value))?;
            Ok(())
        })
        .map_err(backend_err)
    }

    fn prim_metadata(&self, prim: &str, key: &str) -> Option<String> {
        self.with_prim(prim, |_, p| {
            let value = p.call_method1("GetCustomDataByKey", (key,))?;
            if value.is_none() {
                Ok(None)
            } else {
                Ok(Some(value.str()?.to_string()))
            }
        })
        .ok()
        .flatten()
    }

    fn prim_metadata_keys(&self, prim: &str) -> Vec<String> {
        self.with_prim(prim, |_, p| {
            p.call_method0("GetCustomData")?
                .call_method0("keys")?
                .try_iter()?
                .map(|k| k?.extract::<String>())
                .collect()
        })
        .unwrap_or_default()
    }

    fn save(&mut self) -> Result<(), SceneError> {
        Python::with_gil(|py| {
            self.stage.bind(py).call_method0("GetRootLayer")?.call_method0("Save")?;
            Ok(())
        })
        .map_err(backend_err)
    }

    fn export(&self, path: &Path) -> Result<(), SceneError> {
        let path_str = path.to_string_lossy().into_owned();
        let ok = Python::with_gil(|py| self.stage.bind(py).call_method1("Export", (path_str,))?.extract::<bool>())
            .map_err(backend_err)?;
        if ok {
            Ok(())
        } else {
            Err(SceneError::Backend(format!("USD failed to export {}", path.display())))
        }
    }
}
