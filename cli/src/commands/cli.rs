use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use molmesh_core::api::RenderOptionsPatch;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Turn molecular structures into 3D mesh artifacts")]
pub struct Args {
    /// Config file (defaults to ./molmesh.toml when present).
    #[arg(long, global = true, env = "MOLMESH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Render a structure identifier on a running server and save the result.
    Fetch(FetchArgs),
    /// Upload a structure file to a running server and save the result.
    Upload(UploadArgs),
    /// Print the effective configuration as TOML.
    Config,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct RenderFlags {
    /// Representation mode (mesh, surface, cartoon, all).
    #[arg(long)]
    pub mode: Option<String>,

    #[arg(long)]
    pub show_hydrogens: Option<bool>,

    #[arg(long)]
    pub show_branched_sticks: Option<bool>,

    #[arg(long)]
    pub ensemble_shades: Option<bool>,

    #[arg(long)]
    pub force_bfactor: Option<bool>,
}

impl RenderFlags {
    pub fn to_patch(&self) -> RenderOptionsPatch {
        RenderOptionsPatch {
            mode: self.mode.clone(),
            show_hydrogens: self.show_hydrogens,
            show_branched_sticks: self.show_branched_sticks,
            ensemble_shades: self.ensemble_shades,
            force_bfactor: self.force_bfactor,
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ClientArgs {
    /// Server base URL; built from `server.host`/`server.port` when omitted.
    #[arg(long)]
    pub server: Option<String>,

    /// Directory the artifacts are written to.
    #[arg(long, default_value = ".")]
    pub out: PathBuf,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct FetchArgs {
    pub id: String,

    /// Download every artifact as one zip archive.
    #[arg(long, conflicts_with = "stream")]
    pub batch: bool,

    /// Receive every artifact over the chunked stream.
    #[arg(long)]
    pub stream: bool,

    #[command(flatten)]
    pub render: RenderFlags,

    #[command(flatten)]
    pub client: ClientArgs,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct UploadArgs {
    pub file: PathBuf,

    #[arg(long)]
    pub batch: bool,

    #[command(flatten)]
    pub render: RenderFlags,

    #[command(flatten)]
    pub client: ClientArgs,
}
