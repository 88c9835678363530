//! Invocation context for bridged host calls.
//!
//! An `InvokeContext` is created when a surface is mounted and identifies the
//! extension behind every request that surface sends.

use std::path::{Path, PathBuf};

use crate::extensions::permissions::{resolve_scoped_path, PermissionResult};

/// Context handed to the dispatcher with each command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeContext {
    /// Extension name.
    pub extension: String,

    /// Managed directory name of the extension.
    pub directory: String,

    /// Absolute path of the managed directory.
    pub extension_dir: PathBuf,

    /// Whether file paths are confined to `extension_dir`.
    pub scoped: bool,
}

impl InvokeContext {
    pub fn new(extension: String, directory: String, extension_dir: PathBuf) -> Self {
        Self {
            extension,
            directory,
            extension_dir,
            scoped: true,
        }
    }

    /// Allow paths anywhere on the host file system.
    pub fn unscoped(mut self) -> Self {
        self.scoped = false;
        self
    }

    /// Resolve a path supplied by the extension.
    pub fn resolve_path(&self, requested: &str) -> PermissionResult<PathBuf> {
        if self.scoped {
            resolve_scoped_path(&self.extension_dir, requested)
        } else {
            Ok(self.extension_dir.join(requested))
        }
    }

    /// Render `path` for the extension, relative to its directory when possible.
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.extension_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}
