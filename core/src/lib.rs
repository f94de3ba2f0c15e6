//! Artifact delivery pipeline: format normalization, scratch workspaces,
//! renderer invocation, artifact transfer and deferred cleanup.

pub mod api;
pub mod artifact;
pub mod config;
pub mod context;
pub mod errors;
pub mod normalize;
pub mod options;
pub mod pipeline;
pub mod process;
pub mod renderer;
pub mod transfer;
pub mod workspace;
