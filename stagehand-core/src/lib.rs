//! Stagehand Core - shader graph data model
//!
//! Materials produced by the conversion pipeline are described as a small
//! DAG of shader nodes before they are authored into a scene. This crate
//! holds that model and the rules for wiring it.

pub mod graph;
pub mod node;
pub mod port;

pub use graph::{GraphError, MaterialOutput, ShaderGraph};
pub use node::{NodeId, ShaderNode};
pub use port::{Connection, ShaderInput, ShaderValue, ValueType};

#[cfg(test)]
mod tests {
    use super::*;

    fn texture_graph() -> ShaderGraph {
        let mut graph = ShaderGraph::new();

        let mut surface = ShaderNode::new("Surface", "UsdPreviewSurface");
        surface
            .set_input("roughness", ShaderValue::Float(0.5))
            .add_output("surface", ValueType::Token);
        graph.add_node(surface).unwrap();

        let mut texture = ShaderNode::new("diffuseTexture", "UsdUVTexture");
        texture
            .set_input("file", ShaderValue::Asset("albedo.png".into()))
            .add_output("rgb", ValueType::Float3);
        graph.add_node(texture).unwrap();

        graph
    }

    #[test]
    fn test_basic_graph_operations() {
        let mut graph = texture_graph();
        assert_eq!(graph.nodes.len(), 2);

        let duplicate = graph.add_node(ShaderNode::new("Surface", "UsdPreviewSurface"));
        assert_eq!(duplicate, Err(GraphError::DuplicateNode("Surface".into())));

        graph
            .set_output(MaterialOutput::Surface, Connection::new("Surface", "surface"))
            .unwrap();
        assert_eq!(graph.surface_shader().map(|n| n.shader_id.as_str()), Some("UsdPreviewSurface"));
    }

    #[test]
    fn test_connection_creation() {
        let mut graph = texture_graph();
        let result = graph.connect(
            Connection::new("diffuseTexture", "rgb"),
            "Surface",
            "diffuseColor",
            ValueType::Color3,
        );
        assert!(result.is_ok());
        assert_eq!(graph.connections().len(), 1);

        let input = graph.node("Surface").unwrap().input("diffuseColor").unwrap();
        assert!(input.is_connected());
        assert_eq!(input.value_type, ValueType::Color3);
    }

    #[test]
    fn test_connection_keeps_literal() {
        let mut graph = texture_graph();
        graph
            .nodes
            .get_mut("Surface")
            .unwrap()
            .set_input("diffuseColor", ShaderValue::Color3([0.18, 0.18, 0.18]));
        graph
            .connect(Connection::new("diffuseTexture", "rgb"), "Surface", "diffuseColor", ValueType::Color3)
            .unwrap();

        let input = graph.node("Surface").unwrap().input("diffuseColor").unwrap();
        assert_eq!(input.connection(), Some(&Connection::new("diffuseTexture", "rgb")));
        assert_eq!(input.value(), Some(&ShaderValue::Color3([0.18, 0.18, 0.18])));
    }

    #[test]
    fn test_rejected_connections() {
        let mut graph = texture_graph();

        let to_self = graph.connect(Connection::new("Surface", "surface"), "Surface", "x", ValueType::Token);
        assert_eq!(to_self, Err(GraphError::SelfConnection("Surface".into())));

        let missing = graph.connect(Connection::new("nope", "out"), "Surface", "x", ValueType::Float);
        assert_eq!(missing, Err(GraphError::UnknownNode("nope".into())));

        let bad_output = graph.connect(Connection::new("diffuseTexture", "out"), "Surface", "x", ValueType::Float);
        assert!(matches!(bad_output, Err(GraphError::UnknownOutput { .. })));
    }

    #[test]
    fn test_cycles_are_rejected() {
        let mut graph = texture_graph();
        graph
            .nodes
            .get_mut("Surface")
            .unwrap()
            .add_output("out", ValueType::Float3);
        graph
            .connect(Connection::new("diffuseTexture", "rgb"), "Surface", "diffuseColor", ValueType::Color3)
            .unwrap();

        let back_edge = graph.connect(Connection::new("Surface", "out"), "diffuseTexture", "st", ValueType::Float2);
        assert!(matches!(back_edge, Err(GraphError::Cycle { .. })));
    }

    #[test]
    fn test_topological_order() {
        let mut graph = texture_graph();
        graph
            .connect(Connection::new("diffuseTexture", "rgb"), "Surface", "diffuseColor", ValueType::Color3)
            .unwrap();

        let order: Vec<&str> = graph.topological_order().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(order, vec!["diffuseTexture", "Surface"]);
    }
}
