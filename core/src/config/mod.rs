mod load;
mod types;

pub use load::{apply_env_overrides, load, validate, DEFAULT_CONFIG_FILE};
pub use types::*;
