//! Adapters that connect the molmesh pipeline to real external programs.

pub mod converter;
pub mod factory;
pub mod process;
pub mod services;

pub use services::PluginServicesFactory;
