//! Material normalization, shader graph building and validation

pub mod canonical;
pub mod creator;
pub mod normalizer;
pub mod validator;

pub use canonical::{keys, CanonicalMaterial, MaterialValue};
pub use creator::{author_graph, bind_material, BuiltMaterial, MaterialCreator};
pub use normalizer::{normalize, SourceFormat};
pub use validator::{MaterialIssue, MaterialValidator, Severity, ValidationTarget};
