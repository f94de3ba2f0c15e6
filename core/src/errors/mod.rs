mod config_error;
mod mesh_error;

pub use config_error::ConfigError;
pub use mesh_error::{MeshError, NO_ARTIFACT_PRODUCED};
