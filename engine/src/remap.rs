//! Translating recorded source paths into a restore destination.
//!
//! Remapping strips the recorded root as a component prefix, so a root of
//! `/data` never matches inside `/backup/data/x` or `/data2/x`. A path that
//! does not live under the recorded root is rejected with `PathNotUnderRoot`.

use crate::catalog::Catalog;
use crate::error::{EngineError, Result};
use crate::fs_ops;
use crate::manifest::Manifest;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// The part of `original` below `recorded_root`.
pub fn relative_to_root<'a>(original: &'a Path, recorded_root: &Path) -> Result<&'a Path> {
    original
        .strip_prefix(recorded_root)
        .map_err(|_| EngineError::PathNotUnderRoot {
            path: original.to_path_buf(),
            root: recorded_root.to_path_buf(),
        })
}

/// Move `original` from under `recorded_root` to under `new_root`.
pub fn remap(original: &Path, recorded_root: &Path, new_root: &Path) -> Result<PathBuf> {
    let relative = relative_to_root(original, recorded_root)?;
    if relative.as_os_str().is_empty() {
        Ok(new_root.to_path_buf())
    } else {
        Ok(new_root.join(relative))
    }
}

/// A directory skeleton: a name and its uniquely named, ordered children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirTree {
    name: String,
    children: BTreeMap<String, DirTree>,
}

impl DirTree {
    /// An unnamed root node.
    pub fn root() -> Self {
        DirTree::default()
    }

    fn named(name: &str) -> Self {
        DirTree {
            name: name.to_string(),
            children: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> impl Iterator<Item = &DirTree> {
        self.children.values()
    }

    pub fn child(&self, name: &str) -> Option<&DirTree> {
        self.children.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Insert the path described by `segments`, creating intermediate nodes.
    pub fn insert<I, S>(&mut self, segments: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut node = self;
        for segment in segments {
            let segment = segment.as_ref();
            node = node
                .children
                .entry(segment.to_string())
                .or_insert_with(|| DirTree::named(segment));
        }
    }

    /// Number of directories below this node.
    pub fn len(&self) -> usize {
        self.children.values().map(|c| 1 + c.len()).sum()
    }

    /// Relative paths of every directory, parents before children.
    pub fn paths(&self) -> Vec<PathBuf> {
        fn collect(node: &DirTree, prefix: &Path, out: &mut Vec<PathBuf>) {
            for child in node.children.values() {
                let path = prefix.join(&child.name);
                out.push(path.clone());
                collect(child, &path, out);
            }
        }
        let mut out = Vec::new();
        collect(self, Path::new(""), &mut out);
        out
    }
}

fn segments(relative: &Path) -> Result<Vec<String>> {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_str().map(str::to_string).ok_or_else(|| {
                EngineError::InvalidPath {
                    path: relative.to_path_buf(),
                    reason: "path is not valid UTF-8".to_string(),
                }
            })),
            _ => None,
        })
        .collect()
}

/// Fold the `Directory` entries of every manifest in the catalog into one
/// tree relative to the recorded root.
pub fn build_tree(catalog: &Catalog, files_dir: &Path) -> Result<DirTree> {
    let mut tree = DirTree::root();
    for entry in catalog.list_manifests(files_dir)? {
        let manifest = Manifest::load(&entry.manifest_path)?;
        for name in manifest.directories() {
            let full = manifest.source_path.join(name);
            let relative = relative_to_root(&full, catalog.source_root())?;
            tree.insert(segments(relative)?);
        }
    }
    tracing::debug!(directories = tree.len(), "built restore directory tree");
    Ok(tree)
}

/// Create every directory of `tree` under `destination_root`, parents first.
///
/// Directories that already exist are kept. Returns how many were created.
///
/// # Errors
/// `DirectoryCreateFailed` naming the first path that could not be created;
/// nothing after it is attempted.
pub fn materialize(tree: &DirTree, destination_root: &Path) -> Result<usize> {
    if tree.is_empty() {
        return Ok(0);
    }
    let mut created = 0;
    for relative in tree.paths() {
        let path = destination_root.join(&relative);
        if fs_ops::create_dir(&path)? {
            created += 1;
        }
    }
    tracing::debug!(created, root = %destination_root.display(), "materialized directory tree");
    Ok(created)
}
