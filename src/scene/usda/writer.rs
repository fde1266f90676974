//! USDA text writer

use glam::{DMat4, Vec2, Vec3};

use crate::scene::memory::{AttributeSpec, MemoryStage, PrimSpec};
use crate::scene::value::AttributeValue;
use crate::scene::{child_path, prim_name, Stage, StageMetadata};

/// Attributes authored with `uniform` variability
const UNIFORM_ATTRIBUTES: &[&str] = &["info:id", "xformOpOrder", "subdivisionScheme", "orientation"];

/// Serializes a stage as a USDA 1.0 layer
pub fn write_stage(stage: &MemoryStage) -> String {
    let mut builder = UsdaBuilder::new();
    builder.write_header(&stage.metadata);
    for child in stage.children("/") {
        builder.write_prim(stage, &child);
    }
    builder.output
}

struct UsdaBuilder {
    output: String,
    indent: usize,
}

impl UsdaBuilder {
    fn new() -> Self {
        Self {
            output: String::with_capacity(4096),
            indent: 0,
        }
    }

    fn write_line(&mut self, line: &str) {
        for _ in 0..self.indent {
            self.output.push_str("    ");
        }
        self.output.push_str(line);
        self.output.push('\n');
    }

    fn write_header(&mut self, metadata: &StageMetadata) {
        self.write_line("#usda 1.0");
        self.write_line("(");
        self.indent += 1;
        if let Some(prim) = &metadata.default_prim {
            self.write_line(&format!("defaultPrim = \"{}\"", escape_string(prim)));
        }
        if let Some(doc) = &metadata.doc {
            self.write_line(&format!("doc = \"{}\"", escape_string(doc)));
        }
        if let Some(end) = metadata.end_time_code {
            self.write_line(&format!("endTimeCode = {}", format_real(end)));
        }
        if let Some(fps) = metadata.frames_per_second {
            self.write_line(&format!("framesPerSecond = {}", format_real(fps)));
        }
        if let Some(mpu) = metadata.meters_per_unit {
            self.write_line(&format!("metersPerUnit = {}", format_real(mpu)));
        }
        if let Some(start) = metadata.start_time_code {
            self.write_line(&format!("startTimeCode = {}", format_real(start)));
        }
        if !metadata.sublayers.is_empty() {
            self.write_line("subLayers = [");
            self.indent += 1;
            let count = metadata.sublayers.len();
            for (i, layer) in metadata.sublayers.iter().enumerate() {
                let sep = if i + 1 < count { "," } else { "" };
                self.write_line(&format!("@{}@{}", layer, sep));
            }
            self.indent -= 1;
            self.write_line("]");
        }
        if let Some(tcps) = metadata.time_codes_per_second {
            self.write_line(&format!("timeCodesPerSecond = {}", format_real(tcps)));
        }
        if let Some(axis) = &metadata.up_axis {
            self.write_line(&format!("upAxis = \"{}\"", escape_string(axis)));
        }
        self.indent -= 1;
        self.write_line(")");
    }

    fn write_prim(&mut self, stage: &MemoryStage, path: &str) {
        let Some(spec) = stage.prim(path) else {
            return;
        };
        self.write_line("");
        let name = prim_name(path);
        let header = if spec.type_name.is_empty() {
            format!("def \"{}\"", name)
        } else {
            format!("def {} \"{}\"", spec.type_name, name)
        };

        if spec.metadata.is_empty() {
            self.write_line(&header);
        } else {
            self.write_line(&format!("{} (", header));
            self.indent += 1;
            self.write_line("customData = {");
            self.indent += 1;
            for (key, value) in &spec.metadata {
                self.write_line(&format!("string \"{}\" = \"{}\"", escape_string(key), escape_string(value)));
            }
            self.indent -= 1;
            self.write_line("}");
            self.indent -= 1;
            self.write_line(")");
        }

        self.write_line("{");
        self.indent += 1;
        self.write_properties(spec);
        for child in &spec.children {
            self.write_prim(stage, &child_path(path, child));
        }
        self.indent -= 1;
        self.write_line("}");
    }

    fn write_properties(&mut self, spec: &PrimSpec) {
        for (name, attr) in &spec.attributes {
            self.write_attribute(name, attr);
        }
        for (name, targets) in &spec.relationships {
            let line = match targets.as_slice() {
                [] => format!("rel {}", name),
                [single] => format!("rel {} = <{}>", name, single),
                many => {
                    let list: Vec<String> = many.iter().map(|t| format!("<{}>", t)).collect();
                    format!("rel {} = [{}]", name, list.join(", "))
                }
            };
            self.write_line(&line);
        }
    }

    fn write_attribute(&mut self, name: &str, attr: &AttributeSpec) {
        let decl = if UNIFORM_ATTRIBUTES.contains(&name) {
            format!("uniform {} {}", attr.type_name, name)
        } else {
            format!("{} {}", attr.type_name, name)
        };

        match (&attr.default, attr.metadata.is_empty()) {
            (Some(value), true) => self.write_line(&format!("{} = {}", decl, format_value(value))),
            (Some(value), false) => {
                self.write_line(&format!("{} = {} (", decl, format_value(value)));
                self.write_attribute_metadata(attr);
            }
            (None, true) if attr.samples.is_empty() && attr.connection.is_none() => self.write_line(&decl),
            (None, false) => {
                self.write_line(&format!("{} (", decl));
                self.write_attribute_metadata(attr);
            }
            (None, true) => {}
        }

        if !attr.samples.is_empty() {
            self.write_line(&format!("{}.timeSamples = {{", decl));
            self.indent += 1;
            for (time, value) in &attr.samples {
                self.write_line(&format!("{}: {},", format_real(*time), format_value(value)));
            }
            self.indent -= 1;
            self.write_line("}");
        }

        if let Some(source) = &attr.connection {
            self.write_line(&format!("{}.connect = <{}>", decl, source));
        }
    }

    fn write_attribute_metadata(&mut self, attr: &AttributeSpec) {
        self.indent += 1;
        for (key, value) in &attr.metadata {
            self.write_line(&format!("{} = \"{}\"", key, escape_string(value)));
        }
        self.indent -= 1;
        self.write_line(")");
    }
}

fn format_value(value: &AttributeValue) -> String {
    match value {
        AttributeValue::Bool(v) => if *v { "1" } else { "0" }.to_string(),
        AttributeValue::Int(v) => v.to_string(),
        AttributeValue::Float(v) => format_real(*v as f64),
        AttributeValue::Double(v) => format_real(*v),
        AttributeValue::String(v) | AttributeValue::Token(v) => format!("\"{}\"", escape_string(v)),
        AttributeValue::Asset(v) => format!("@{}@", v),
        AttributeValue::Float2(v) | AttributeValue::TexCoord2f(v) => format_vec2(*v),
        AttributeValue::Float3(v)
        | AttributeValue::Color3f(v)
        | AttributeValue::Normal3f(v)
        | AttributeValue::Point3f(v)
        | AttributeValue::Vector3f(v) => format_vec3(*v),
        AttributeValue::Float4(v) => format_tuple(&v.to_array().map(|c| c as f64)),
        AttributeValue::Double3(v) => format_tuple(&v.to_array()),
        AttributeValue::Matrix4d(m) => format_matrix(m),
        AttributeValue::IntArray(v) => format_list(v.iter().map(|i| i.to_string())),
        AttributeValue::FloatArray(v) => format_list(v.iter().map(|f| format_real(*f as f64))),
        AttributeValue::DoubleArray(v) => format_list(v.iter().map(|f| format_real(*f))),
        AttributeValue::TokenArray(v) => format_list(v.iter().map(|s| format!("\"{}\"", escape_string(s)))),
        AttributeValue::Float2Array(v) | AttributeValue::TexCoord2fArray(v) => {
            format_list(v.iter().map(|p| format_vec2(*p)))
        }
        AttributeValue::Float3Array(v)
        | AttributeValue::Color3fArray(v)
        | AttributeValue::Normal3fArray(v)
        | AttributeValue::Point3fArray(v)
        | AttributeValue::Vector3fArray(v) => format_list(v.iter().map(|p| format_vec3(*p))),
    }
}

fn format_list(items: impl Iterator<Item = String>) -> String {
    let items: Vec<String> = items.collect();
    format!("[{}]", items.join(", "))
}

fn format_tuple(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format_real(*v)).collect();
    format!("({})", parts.join(", "))
}

fn format_vec2(v: Vec2) -> String {
    format_tuple(&[v.x as f64, v.y as f64])
}

fn format_vec3(v: Vec3) -> String {
    format_tuple(&[v.x as f64, v.y as f64, v.z as f64])
}

/// USD matrices are row-major with translation in the last row, which is
/// glam's column layout read row by row.
fn format_matrix(m: &DMat4) -> String {
    let rows: Vec<String> = (0..4).map(|i| format_tuple(&m.col(i).to_array())).collect();
    format!("( {} )", rows.join(", "))
}

pub(crate) fn format_real(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else if value.abs() < 0.0001 || value.abs() >= 1e6 {
        format!("{:e}", value)
    } else if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        let s = format!("{:.6}", value);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

pub(crate) fn escape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            _ => result.push(c),
        }
    }
    result
}
