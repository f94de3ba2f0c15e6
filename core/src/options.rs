//! Typed renderer options and their command-line flag mapping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Representation style passed to the renderer as `--type <mode>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepresentationMode {
    #[default]
    Mesh,
    Surface,
    Cartoon,
    All,
}

impl RepresentationMode {
    pub const ALL_MODES: [RepresentationMode; 4] = [
        RepresentationMode::Mesh,
        RepresentationMode::Surface,
        RepresentationMode::Cartoon,
        RepresentationMode::All,
    ];

    pub fn as_arg(&self) -> &'static str {
        match self {
            RepresentationMode::Mesh => "mesh",
            RepresentationMode::Surface => "surface",
            RepresentationMode::Cartoon => "cartoon",
            RepresentationMode::All => "all",
        }
    }
}

impl fmt::Display for RepresentationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

impl FromStr for RepresentationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL_MODES
            .into_iter()
            .find(|m| m.as_arg() == wanted)
            .ok_or_else(|| ConfigError::UnknownMode(s.to_string()))
    }
}

/// Options for one renderer invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    #[serde(default)]
    pub mode: RepresentationMode,

    #[serde(default)]
    pub show_hydrogens: bool,

    #[serde(default = "default_show_branched_sticks")]
    pub show_branched_sticks: bool,

    #[serde(default)]
    pub ensemble_shades: bool,

    #[serde(default)]
    pub force_bfactor: bool,
}

fn default_show_branched_sticks() -> bool {
    true
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            mode: RepresentationMode::Mesh,
            show_hydrogens: false,
            show_branched_sticks: default_show_branched_sticks(),
            ensemble_shades: false,
            force_bfactor: false,
        }
    }
}

impl RenderOptions {
    /// Boolean flags in the fixed order hydrogens, branched sticks, ensemble shades, b-factor.
    pub fn flags(&self) -> Vec<&'static str> {
        [
            (self.show_hydrogens, "--show-hydrogens"),
            (self.show_branched_sticks, "--show-branched-sticks"),
            (self.ensemble_shades, "--ensemble-shades"),
            (self.force_bfactor, "--force-bfactor"),
        ]
        .into_iter()
        .filter_map(|(on, flag)| on.then_some(flag))
        .collect()
    }
}

/// Per-request overrides; unset fields keep the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptionsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_hydrogens: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_branched_sticks: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ensemble_shades: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_bfactor: Option<bool>,
}

impl RenderOptionsPatch {
    pub fn apply(&self, base: RenderOptions) -> Result<RenderOptions, ConfigError> {
        let mode = match self.mode.as_deref() {
            Some(m) => m.parse()?,
            None => base.mode,
        };
        Ok(RenderOptions {
            mode,
            show_hydrogens: self.show_hydrogens.unwrap_or(base.show_hydrogens),
            show_branched_sticks: self
                .show_branched_sticks
                .unwrap_or(base.show_branched_sticks),
            ensemble_shades: self.ensemble_shades.unwrap_or(base.ensemble_shades),
            force_bfactor: self.force_bfactor.unwrap_or(base.force_bfactor),
        })
    }
}
