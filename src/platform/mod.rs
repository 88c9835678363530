//! Host capability layer.
//!
//! This module defines the traits through which the extension subsystem
//! reaches the native host: the file system and the directory chooser. The
//! extension code never touches `std::fs` directly, so a webview host can
//! route these calls through its own IPC and tests can substitute fakes.

mod local;

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use local::LocalFs;

/// Name of the managed bundle directory under the app data root.
pub const EXTENSIONS_DIR: &str = "Extensions";

/// A file or directory found while listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntryInfo {
    /// Final path segment.
    pub name: String,
    /// Full path of the entry.
    pub path: PathBuf,
    pub is_dir: bool,
}

impl DirEntryInfo {
    /// Whether this is a file with the given extension (case-insensitive,
    /// without the dot).
    pub fn has_extension(&self, ext: &str) -> bool {
        !self.is_dir
            && Path::new(&self.name)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// File-system operations provided by the host.
#[async_trait]
pub trait HostFs: Send + Sync {
    /// Base directory for application-owned data.
    ///
    /// Managed bundles live under `<root>/Extensions/<directoryName>/`.
    fn app_local_data_root(&self) -> PathBuf;

    /// Every entry below `path`, depth-first, excluding `path` itself.
    async fn list_directory_recursive(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>>;

    /// Direct children of `path`.
    async fn list_directory(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>>;

    async fn read_text_file(&self, path: &Path) -> io::Result<String>;

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;

    async fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Delete a file, or a directory with everything in it.
    async fn delete_path(&self, path: &Path) -> io::Result<()>;

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Copy the directory `source` into `managed_root`, keeping its final
    /// path segment as the name. Returns that name.
    ///
    /// Fails with `AlreadyExists` instead of merging into an existing
    /// directory, and leaves nothing behind on failure.
    async fn copy_directory_into(&self, source: &Path, managed_root: &Path) -> io::Result<String>;
}

/// User-driven directory chooser.
#[async_trait]
pub trait DirectoryPicker: Send + Sync {
    /// `None` when the user cancels.
    async fn pick_directory(&self) -> Option<PathBuf>;
}

/// Root directory holding managed extension bundles.
pub fn extensions_root(fs: &dyn HostFs) -> PathBuf {
    fs.app_local_data_root().join(EXTENSIONS_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, is_dir: bool) -> DirEntryInfo {
        DirEntryInfo {
            name: name.to_string(),
            path: PathBuf::from("/bundle").join(name),
            is_dir,
        }
    }

    #[test]
    fn test_has_extension() {
        assert!(entry("manifest.json", false).has_extension("json"));
        assert!(entry("INDEX.HTML", false).has_extension("html"));
        assert!(!entry("index.htm", false).has_extension("html"));
        assert!(!entry("data.json", true).has_extension("json"));
        assert!(!entry("json", false).has_extension("json"));
    }
}
