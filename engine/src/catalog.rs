//! The catalog of one backup run.
//!
//! ```text
//! # START
//! # SOURCE\t/src
//! # CHECKSUM\tmd5
//! src.loc
//! src__a.loc
//! # END
//! ```
//!
//! Manifest lines keep the directory-walk order. Readers ignore blank lines
//! and any other `#` line; a catalog without both markers or without the
//! SOURCE declaration is unusable. The CHECKSUM line records the sidecar
//! algorithm chosen at preparation; catalogs without it leave the choice to
//! the caller.

use crate::checksums::{generate_sidecar, ChecksumAlgorithm};
use crate::error::{EngineError, Result};
use crate::fs_ops;
use crate::label::ManifestId;
use crate::manifest;
use std::io;
use std::path::{Path, PathBuf};

const START_MARKER: &str = "# START";
const SOURCE_MARKER: &str = "# SOURCE";
const END_MARKER: &str = "# END";
const CHECKSUM_MARKER: &str = "# CHECKSUM";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    source_root: PathBuf,
    manifest_refs: Vec<ManifestId>,
    checksum: Option<ChecksumAlgorithm>,
}

/// A catalog entry resolved to its manifest file and recorded directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRef {
    pub id: ManifestId,
    pub manifest_path: PathBuf,
    pub source_path: PathBuf,
}

impl Catalog {
    pub fn new(source_root: impl Into<PathBuf>, manifest_refs: Vec<ManifestId>) -> Self {
        Catalog {
            source_root: source_root.into(),
            manifest_refs,
            checksum: None,
        }
    }

    /// Record the sidecar algorithm of the run.
    pub fn with_checksum(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.checksum = Some(algorithm);
        self
    }

    /// Absolute path of the tree that was captured.
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn manifest_refs(&self) -> &[ManifestId] {
        &self.manifest_refs
    }

    /// Sidecar algorithm recorded at preparation, if any.
    pub fn checksum(&self) -> Option<ChecksumAlgorithm> {
        self.checksum
    }

    /// Pick the sidecar algorithm for working on this backup.
    ///
    /// The recorded algorithm wins over `fallback`. `requested` is an
    /// algorithm the caller asked for explicitly.
    ///
    /// # Errors
    /// `ChecksumConflict` if `requested` differs from the recorded algorithm.
    pub fn resolve_checksum(
        &self,
        origin: &Path,
        requested: Option<ChecksumAlgorithm>,
        fallback: ChecksumAlgorithm,
    ) -> Result<ChecksumAlgorithm> {
        match (self.checksum, requested) {
            (Some(recorded), Some(requested)) if recorded != requested => Err(EngineError::ChecksumConflict {
                path: origin.to_path_buf(),
                recorded,
                requested,
            }),
            (Some(recorded), _) => Ok(recorded),
            (None, Some(requested)) => Ok(requested),
            (None, None) => Ok(fallback),
        }
    }

    /// Write a new catalog at `catalog_path` and its checksum sidecar.
    ///
    /// # Errors
    /// `SourceMissing`/`NotADirectory` if `source_root` is not a directory,
    /// `DestinationExists` if a catalog is already present.
    pub fn create(
        catalog_path: &Path,
        source_root: &Path,
        manifest_refs: Vec<ManifestId>,
        algorithm: ChecksumAlgorithm,
    ) -> Result<Catalog> {
        fs_ops::require_directory(source_root)?;

        let catalog = Catalog::new(source_root, manifest_refs).with_checksum(algorithm);
        let text = catalog.to_text()?;
        fs_ops::write_new_file(catalog_path, text.as_bytes()).map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                EngineError::DestinationExists {
                    path: catalog_path.to_path_buf(),
                }
            } else {
                EngineError::WriteError {
                    path: catalog_path.to_path_buf(),
                    source: e,
                }
            }
        })?;
        generate_sidecar(catalog_path, algorithm)?;

        tracing::info!(
            catalog = %catalog_path.display(),
            manifests = catalog.manifest_refs.len(),
            "catalog written"
        );
        Ok(catalog)
    }

    pub fn to_text(&self) -> Result<String> {
        let root = match self.source_root.to_str() {
            Some(root) if !root.contains(['\t', '\n']) => root,
            _ => {
                return Err(EngineError::InvalidPath {
                    path: self.source_root.clone(),
                    reason: "source root cannot be written to a catalog".to_string(),
                })
            }
        };

        let mut out = String::new();
        out.push_str(START_MARKER);
        out.push('\n');
        out.push_str(&format!("{}\t{}\n", SOURCE_MARKER, root));
        if let Some(algorithm) = self.checksum {
            out.push_str(&format!("{}\t{}\n", CHECKSUM_MARKER, algorithm));
        }
        for id in &self.manifest_refs {
            out.push_str(&id.manifest_file_name());
            out.push('\n');
        }
        out.push_str(END_MARKER);
        out.push('\n');
        Ok(out)
    }

    /// Parse catalog text. `origin` only names the file in errors.
    pub fn parse(text: &str, origin: &Path) -> Result<Catalog> {
        let mut has_start = false;
        let mut has_end = false;
        let mut source_root = None;
        let mut checksum = None;
        let mut manifest_refs = Vec::new();

        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            if line.starts_with('#') {
                let marker = line.trim_end();
                if marker == START_MARKER {
                    has_start = true;
                } else if marker == END_MARKER {
                    has_end = true;
                } else if let Some((SOURCE_MARKER, root)) = line.split_once('\t') {
                    if !root.is_empty() {
                        source_root = Some(PathBuf::from(root));
                    }
                } else if let Some((CHECKSUM_MARKER, name)) = line.split_once('\t') {
                    let parsed = name.trim().parse().map_err(|reason| EngineError::CorruptCatalog {
                        path: origin.to_path_buf(),
                        reason,
                    })?;
                    checksum = Some(parsed);
                }
                continue;
            }
            let id = ManifestId::from_manifest_file_name(line)
                .unwrap_or_else(|| ManifestId::from_label(line));
            manifest_refs.push(id);
        }

        if !has_start || !has_end {
            return Err(EngineError::CorruptCatalog {
                path: origin.to_path_buf(),
                reason: "missing the start or end tag".to_string(),
            });
        }
        let source_root = source_root.ok_or_else(|| EngineError::CorruptCatalog {
            path: origin.to_path_buf(),
            reason: "missing the SOURCE tag".to_string(),
        })?;

        Ok(Catalog {
            source_root,
            manifest_refs,
            checksum,
        })
    }

    pub fn load(path: &Path) -> Result<Catalog> {
        let text = std::fs::read_to_string(path).map_err(|e| EngineError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Catalog::parse(&text, path)
    }

    /// Resolve every referenced manifest to the directory it recorded.
    ///
    /// Each manifest is opened only for its `PATH` header. Catalog order is
    /// preserved.
    ///
    /// # Errors
    /// `MissingPathHeader` for a manifest without a `PATH` line, `ReadError`
    /// if a manifest cannot be read.
    pub fn list_manifests(&self, files_dir: &Path) -> Result<Vec<ManifestRef>> {
        self.manifest_refs
            .iter()
            .map(|id| {
                let manifest_path = files_dir.join(id.manifest_file_name());
                let source_path = manifest::read_source_path(&manifest_path)?;
                Ok(ManifestRef {
                    id: id.clone(),
                    manifest_path,
                    source_path,
                })
            })
            .collect()
    }
}
