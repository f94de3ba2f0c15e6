//! Turns uploaded structure files into the canonical format the renderer reads.
//!
//! Work is split in two steps so that every caller error is reported before
//! any scratch space is committed:
//!
//! 1. [`Normalizer::prepare`] is pure: it recognises the format by extension and,
//!    for structure-data tables, it picks the first valid molecule record.
//! 2. [`Normalizer::materialize`] runs the external conversions and writes
//!    the canonical file into the request workspace. Intermediate files live
//!    in a private staging directory that is removed on every exit path.

pub mod sdf;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use crate::errors::MeshError;
use crate::renderer::entry_id_from_file_name;
use crate::workspace::Workspace;

const STAGING_PREFIX: &str = "molmesh_convert_";
const CANONICAL_FILE: &str = "structure.cif";
const CANONICAL_BINARY_FILE: &str = "structure.bcif";

/// Opaque external structure transforms. Each call either leaves a file at
/// `output` or fails.
pub trait StructureConverter: Send + Sync {
    /// Legacy atomic-coordinate file → canonical structure file.
    fn legacy_to_canonical(&self, input: &Path, output: &Path) -> Result<(), MeshError>;

    /// Single-molecule table record → legacy atomic-coordinate file.
    fn table_to_legacy(&self, input: &Path, output: &Path) -> Result<(), MeshError>;
}

/// Recognised upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// mmCIF text, already canonical.
    Canonical,
    /// BinaryCIF, already canonical.
    CanonicalBinary,
    /// PDB coordinates.
    Legacy,
    /// SDF / MOL table.
    Table,
}

impl InputFormat {
    pub fn from_file_name(name: &str) -> Result<Self, MeshError> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "cif" | "mmcif" => Ok(InputFormat::Canonical),
            "bcif" => Ok(InputFormat::CanonicalBinary),
            "pdb" | "ent" => Ok(InputFormat::Legacy),
            "sdf" | "sd" | "mol" => Ok(InputFormat::Table),
            _ => Err(MeshError::UnsupportedFormat {
                name: name.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
enum Payload {
    Canonical { file: &'static str, data: Bytes },
    Legacy(Bytes),
    Table { molecule: String },
}

/// An upload that passed every check that does not need scratch space.
#[derive(Debug, Clone)]
pub struct PreparedUpload {
    file_name: String,
    entry_id: String,
    payload: Payload,
}

impl PreparedUpload {
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Renderer entry id derived from the file stem.
    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn format(&self) -> InputFormat {
        match &self.payload {
            Payload::Canonical { file, .. } if *file == CANONICAL_BINARY_FILE => {
                InputFormat::CanonicalBinary
            }
            Payload::Canonical { .. } => InputFormat::Canonical,
            Payload::Legacy(_) => InputFormat::Legacy,
            Payload::Table { .. } => InputFormat::Table,
        }
    }
}

pub struct Normalizer {
    converter: Arc<dyn StructureConverter>,
    staging_root: PathBuf,
}

impl Normalizer {
    pub fn new(converter: Arc<dyn StructureConverter>, staging_root: PathBuf) -> Self {
        Self {
            converter,
            staging_root,
        }
    }

    /// Fails with `UnsupportedFormat` or `NoMoleculeFound` without touching disk.
    pub fn prepare(file_name: &str, data: Bytes) -> Result<PreparedUpload, MeshError> {
        let format = InputFormat::from_file_name(file_name)?;
        let payload = match format {
            InputFormat::Canonical => Payload::Canonical {
                file: CANONICAL_FILE,
                data,
            },
            InputFormat::CanonicalBinary => Payload::Canonical {
                file: CANONICAL_BINARY_FILE,
                data,
            },
            InputFormat::Legacy => Payload::Legacy(data),
            InputFormat::Table => {
                let text = String::from_utf8_lossy(&data);
                let molecule = sdf::first_valid_molecule(&text).ok_or_else(|| {
                    MeshError::NoMoleculeFound {
                        name: file_name.to_string(),
                    }
                })?;
                Payload::Table { molecule }
            }
        };

        Ok(PreparedUpload {
            file_name: file_name.to_string(),
            entry_id: entry_id_from_file_name(file_name),
            payload,
        })
    }

    /// Writes the canonical structure into `workspace` and returns its path.
    pub fn materialize(
        &self,
        upload: PreparedUpload,
        workspace: &mut Workspace,
    ) -> Result<PathBuf, MeshError> {
        let PreparedUpload {
            file_name, payload, ..
        } = upload;

        let path = match payload {
            Payload::Canonical { file, data } => {
                debug!(file_name = %file_name, "upload already canonical");
                return workspace.write_entry(file, &data);
            }
            Payload::Legacy(data) => {
                let staging = self.staging_dir()?;
                let legacy = write_stage(staging.path(), "input.pdb", data.as_ref())?;
                self.to_canonical(&legacy, workspace)?
            }
            Payload::Table { molecule } => {
                let staging = self.staging_dir()?;
                let record = write_stage(staging.path(), "molecule.sdf", molecule.as_bytes())?;
                let legacy = staging.path().join("molecule.pdb");
                self.converter.table_to_legacy(&record, &legacy)?;
                expect_output("table_to_legacy", &legacy)?;
                self.to_canonical(&legacy, workspace)?
            }
        };

        info!(
            request_id = %workspace.request_id(),
            file_name = %file_name,
            output = %path.display(),
            "upload converted to canonical format"
        );
        Ok(path)
    }

    fn to_canonical(&self, legacy: &Path, workspace: &mut Workspace) -> Result<PathBuf, MeshError> {
        let output = workspace.path().join(CANONICAL_FILE);
        self.converter.legacy_to_canonical(legacy, &output)?;
        expect_output("legacy_to_canonical", &output)?;
        workspace.record_entry(output.clone());
        Ok(output)
    }

    fn staging_dir(&self) -> Result<tempfile::TempDir, MeshError> {
        std::fs::create_dir_all(&self.staging_root).map_err(|e| {
            MeshError::storage(format!("create {}", self.staging_root.display()), e)
        })?;
        tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.staging_root)
            .map_err(|e| MeshError::storage("create conversion staging dir", e))
    }
}

fn write_stage(dir: &Path, name: &str, data: &[u8]) -> Result<PathBuf, MeshError> {
    let path = dir.join(name);
    std::fs::write(&path, data)
        .map_err(|e| MeshError::storage(format!("write {}", path.display()), e))?;
    Ok(path)
}

fn expect_output(stage: &'static str, path: &Path) -> Result<(), MeshError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(MeshError::Conversion {
            stage,
            message: format!("converter produced no output at {}", path.display()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const WATER: &str = "water\n  test\n\n  1  0  0  0  0  0  0  0  0  0999 V2000\n    0.0000    0.0000    0.0000 O   0  0\nM  END\n$$$$\n";

    /// Copies input to output with a tag, remembering every staging path it saw.
    #[derive(Default)]
    struct TaggingConverter {
        fail_legacy: bool,
        seen_inputs: Mutex<Vec<PathBuf>>,
    }

    impl StructureConverter for TaggingConverter {
        fn legacy_to_canonical(&self, input: &Path, output: &Path) -> Result<(), MeshError> {
            self.seen_inputs.lock().unwrap().push(input.to_path_buf());
            if self.fail_legacy {
                return Err(MeshError::Conversion {
                    stage: "legacy_to_canonical",
                    message: "boom".into(),
                });
            }
            let data = std::fs::read(input).unwrap();
            std::fs::write(output, [&b"CIF:"[..], &data[..]].concat()).unwrap();
            Ok(())
        }

        fn table_to_legacy(&self, input: &Path, output: &Path) -> Result<(), MeshError> {
            self.seen_inputs.lock().unwrap().push(input.to_path_buf());
            let data = std::fs::read(input).unwrap();
            std::fs::write(output, [&b"PDB:"[..], &data[..]].concat()).unwrap();
            Ok(())
        }
    }

    fn setup(converter: Arc<TaggingConverter>) -> (tempfile::TempDir, Normalizer, Workspace) {
        let root = tempfile::tempdir().unwrap();
        let normalizer = Normalizer::new(converter, root.path().join("staging"));
        let ws = Workspace::create(&root.path().join("work"), "ws_", "req").unwrap();
        (root, normalizer, ws)
    }

    fn staging_is_empty(root: &Path) -> bool {
        std::fs::read_dir(root.join("staging"))
            .map(|mut d| d.next().is_none())
            .unwrap_or(true)
    }

    #[test]
    fn format_detection_by_extension() {
        assert_eq!(InputFormat::from_file_name("1abc.CIF").unwrap(), InputFormat::Canonical);
        assert_eq!(InputFormat::from_file_name("1abc.bcif").unwrap(), InputFormat::CanonicalBinary);
        assert_eq!(InputFormat::from_file_name("1abc.pdb").unwrap(), InputFormat::Legacy);
        assert_eq!(InputFormat::from_file_name("lig.sdf").unwrap(), InputFormat::Table);
        assert!(matches!(
            InputFormat::from_file_name("notes.txt"),
            Err(MeshError::UnsupportedFormat { .. })
        ));
        assert!(InputFormat::from_file_name("noext").is_err());
    }

    #[test]
    fn table_without_molecules_fails_in_prepare() {
        let err = Normalizer::prepare("ligand.sdf", Bytes::from_static(b"nothing here\n$$$$\n"))
            .unwrap_err();
        assert!(matches!(err, MeshError::NoMoleculeFound { ref name } if name == "ligand.sdf"));
    }

    #[test]
    fn canonical_passes_through_unchanged() {
        let conv = Arc::new(TaggingConverter::default());
        let (_root, normalizer, mut ws) = setup(conv.clone());
        let upload = Normalizer::prepare("1ABC.bcif", Bytes::from_static(b"\x00binary")).unwrap();
        assert_eq!(upload.entry_id(), "1abc");
        assert_eq!(upload.format(), InputFormat::CanonicalBinary);

        let path = normalizer.materialize(upload, &mut ws).unwrap();
        assert_eq!(path, ws.path().join("structure.bcif"));
        assert_eq!(std::fs::read(&path).unwrap(), b"\x00binary");
        assert!(conv.seen_inputs.lock().unwrap().is_empty());
    }

    #[test]
    fn legacy_is_converted_once_and_staging_removed() {
        let conv = Arc::new(TaggingConverter::default());
        let (root, normalizer, mut ws) = setup(conv.clone());
        let upload = Normalizer::prepare("model.pdb", Bytes::from_static(b"ATOM")).unwrap();

        let path = normalizer.materialize(upload, &mut ws).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"CIF:ATOM");
        assert_eq!(ws.entries(), &[path.clone()]);
        assert_eq!(conv.seen_inputs.lock().unwrap().len(), 1);
        assert!(staging_is_empty(root.path()));
    }

    #[test]
    fn table_goes_through_both_stages() {
        let conv = Arc::new(TaggingConverter::default());
        let (root, normalizer, mut ws) = setup(conv.clone());
        let upload = Normalizer::prepare("ligand.sdf", Bytes::from(WATER)).unwrap();

        let path = normalizer.materialize(upload, &mut ws).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("CIF:PDB:water"));

        let seen = conv.seen_inputs.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|p| !p.exists()));
        assert!(staging_is_empty(root.path()));
    }

    #[test]
    fn failed_conversion_still_removes_intermediates() {
        let conv = Arc::new(TaggingConverter {
            fail_legacy: true,
            ..Default::default()
        });
        let (root, normalizer, mut ws) = setup(conv.clone());
        let upload = Normalizer::prepare("ligand.sdf", Bytes::from(WATER)).unwrap();

        let err = normalizer.materialize(upload, &mut ws).unwrap_err();
        assert!(matches!(err, MeshError::Conversion { .. }));
        assert!(staging_is_empty(root.path()));
        assert!(ws.entries().is_empty());
    }
}
