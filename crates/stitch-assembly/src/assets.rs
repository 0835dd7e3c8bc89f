//! Static asset root
//!
//! Asset paths are relative to one allowed root. They are normalized
//! lexically; when the target exists on disk it is also canonicalized so a
//! symlink cannot point outside the root.

use crate::error::AssemblyError;
use std::path::{Component, Path, PathBuf};

/// Directory that static assets must live under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRoot {
    root: PathBuf,
    require_existing: bool,
}

impl AssetRoot {
    /// Root at `root`; missing files are allowed
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            require_existing: false,
        }
    }

    /// Also fail when the asset does not exist
    #[must_use]
    pub fn require_existing(mut self, require: bool) -> Self {
        self.require_existing = require;
        self
    }

    /// Root directory
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Validate an asset path and return its normalized relative form
    ///
    /// # Errors
    /// - `PathTraversal` if the path is absolute or escapes the root
    /// - `MissingAsset` if existence is required and the file is absent
    pub fn check(&self, asset: &str) -> Result<String, AssemblyError> {
        let traversal = || AssemblyError::PathTraversal {
            path: asset.to_string(),
        };

        if asset.is_empty() || asset.contains('\\') || asset.contains('\0') {
            return Err(traversal());
        }
        if lower_contains_encoded_dots(asset) {
            return Err(traversal());
        }

        let mut parts: Vec<&str> = Vec::new();
        for component in Path::new(asset).components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str().ok_or_else(traversal)?),
                Component::CurDir => {}
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        return Err(traversal());
                    }
                }
                Component::RootDir | Component::Prefix(_) => return Err(traversal()),
            }
        }
        if parts.is_empty() {
            return Err(traversal());
        }
        let relative = parts.join("/");

        let full = self.root.join(&relative);
        match (full.canonicalize(), self.root.canonicalize()) {
            (Ok(target), Ok(root)) => {
                if !target.starts_with(&root) {
                    return Err(traversal());
                }
            }
            _ if self.require_existing => {
                return Err(AssemblyError::MissingAsset { path: relative });
            }
            _ => {}
        }
        Ok(relative)
    }
}

fn lower_contains_encoded_dots(asset: &str) -> bool {
    let lower = asset.to_ascii_lowercase();
    lower.contains("%2e") || lower.contains("%2f") || lower.contains("%5c")
}
