//! Per-request scratch directories.
//!
//! A [`Workspace`] is created right before the renderer runs, receives the
//! normalized input and the renderer output, and is removed exactly once after
//! the response for its request has gone out (see [`cleanup`]).

pub mod cleanup;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Local};
use tracing::{debug, warn};

use crate::artifact::Artifact;
use crate::errors::MeshError;

pub use cleanup::{CleanupScheduler, CleanupTicket};

#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    request_id: String,
    created_at: DateTime<Local>,
    entries: Vec<PathBuf>,
    destroyed: AtomicBool,
}

impl Workspace {
    /// Allocates a uniquely named directory `<root>/<prefix><random>`.
    pub fn create(root: &Path, prefix: &str, request_id: &str) -> Result<Self, MeshError> {
        std::fs::create_dir_all(root)
            .map_err(|e| MeshError::storage(format!("create scratch root {}", root.display()), e))?;

        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(root)
            .map_err(|e| MeshError::storage(format!("create workspace in {}", root.display()), e))?;
        let path = dir.keep();

        debug!(request_id, workspace = %path.display(), "workspace created");
        Ok(Self {
            path,
            request_id: request_id.to_string(),
            created_at: Local::now(),
            entries: Vec::new(),
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    /// Files written into the workspace by this process (the renderer's own
    /// output is discovered through [`Workspace::list_artifacts`]).
    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// Writes `data` to `<workspace>/<file_name>` and records the entry.
    pub fn write_entry(&mut self, file_name: &str, data: &[u8]) -> Result<PathBuf, MeshError> {
        let path = self.path.join(file_name);
        std::fs::write(&path, data)
            .map_err(|e| MeshError::storage(format!("write {}", path.display()), e))?;
        self.entries.push(path.clone());
        Ok(path)
    }

    /// Records a file that some external tool wrote into the workspace.
    pub fn record_entry(&mut self, path: PathBuf) {
        self.entries.push(path);
    }

    /// Loads every regular file ending in `suffix`, sorted by file name.
    pub fn list_artifacts(&self, suffix: &str) -> Result<Vec<Artifact>, MeshError> {
        let read_dir = std::fs::read_dir(&self.path)
            .map_err(|e| MeshError::storage(format!("scan {}", self.path.display()), e))?;

        let mut names = Vec::new();
        for entry in read_dir {
            let entry =
                entry.map_err(|e| MeshError::storage(format!("scan {}", self.path.display()), e))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if is_file && name.ends_with(suffix) {
                names.push(name);
            }
        }
        names.sort();

        names
            .into_iter()
            .map(|name| {
                let path = self.path.join(&name);
                let data = std::fs::read(&path)
                    .map_err(|e| MeshError::storage(format!("read {}", path.display()), e))?;
                Ok(Artifact::new(name, data))
            })
            .collect()
    }

    /// Recursively removes the directory. Only the first call does any work;
    /// failures are logged, never raised.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            debug!(workspace = %self.path.display(), "workspace already destroyed");
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(
                request_id = %self.request_id,
                workspace = %self.path.display(),
                "workspace removed"
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => debug!(
                workspace = %self.path.display(),
                "workspace was already gone"
            ),
            Err(e) => warn!(
                workspace = %self.path.display(),
                error = %e,
                "failed to remove workspace"
            ),
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn create_allocates_distinct_prefixed_dirs() {
        let root = tempfile::tempdir().unwrap();
        let a = Workspace::create(root.path(), "pdb_images_output_", "req-a").unwrap();
        let b = Workspace::create(root.path(), "pdb_images_output_", "req-b").unwrap();

        assert_ne!(a.path(), b.path());
        assert!(a.path().is_dir());
        let name = a.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("pdb_images_output_"));
        assert_eq!(a.request_id(), "req-a");
    }

    #[test]
    fn create_builds_missing_scratch_root() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a").join("b");
        let ws = Workspace::create(&nested, "ws_", "req").unwrap();
        assert!(ws.path().starts_with(&nested));
    }

    #[test]
    fn list_artifacts_filters_by_suffix_and_sorts() {
        let root = tempfile::tempdir().unwrap();
        let mut ws = Workspace::create(root.path(), "ws_", "req").unwrap();
        ws.write_entry("structure.cif", b"data_x").unwrap();
        std::fs::write(ws.path().join("b.usdz"), b"bb").unwrap();
        std::fs::write(ws.path().join("a.usdz"), b"a").unwrap();
        std::fs::create_dir(ws.path().join("dir.usdz")).unwrap();

        let artifacts = ws.list_artifacts(".usdz").unwrap();
        let names: Vec<_> = artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a.usdz", "b.usdz"]);
        assert_eq!(artifacts[1].data.as_ref(), b"bb");
        assert_eq!(ws.entries().len(), 1);
    }

    #[test]
    fn list_artifacts_on_empty_workspace_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path(), "ws_", "req").unwrap();
        assert!(ws.list_artifacts(".usdz").unwrap().is_empty());
    }

    #[test]
    fn destroy_twice_is_harmless() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path(), "ws_", "req").unwrap();
        std::fs::write(ws.path().join("x.usdz"), b"x").unwrap();

        ws.destroy();
        assert!(!ws.path().exists());
        assert!(ws.is_destroyed());

        ws.destroy();
        assert!(!ws.path().exists());
    }

    #[test]
    fn destroy_tolerates_externally_removed_dir() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path(), "ws_", "req").unwrap();
        std::fs::remove_dir_all(ws.path()).unwrap();
        ws.destroy();
        assert!(ws.is_destroyed());
    }
}
