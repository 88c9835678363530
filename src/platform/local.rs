//! Native file-system implementation of [`HostFs`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{DirEntryInfo, HostFs};

/// [`HostFs`] backed by the local disk.
#[derive(Debug, Clone)]
pub struct LocalFs {
    data_root: PathBuf,
}

impl LocalFs {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }
}

fn blocking_error(e: tokio::task::JoinError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

fn entry_info(path: &Path, is_dir: bool) -> DirEntryInfo {
    DirEntryInfo {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: path.to_path_buf(),
        is_dir,
    }
}

fn walk(root: &Path) -> io::Result<Vec<DirEntryInfo>> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", root.display()),
        ));
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        match entry {
            Ok(entry) => entries.push(entry_info(entry.path(), entry.file_type().is_dir())),
            Err(e) => warn!(root = %root.display(), error = %e, "skipping unreadable entry"),
        }
    }
    Ok(entries)
}

fn copy_tree(source: &Path, target: &Path) -> io::Result<()> {
    fs::create_dir_all(target)?;

    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let dest = target.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &dest)?;
        }
        // Symlinks are not followed into managed storage.
    }

    Ok(())
}

#[async_trait]
impl HostFs for LocalFs {
    fn app_local_data_root(&self) -> PathBuf {
        self.data_root.clone()
    }

    async fn list_directory_recursive(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>> {
        let root = path.to_path_buf();
        tokio::task::spawn_blocking(move || walk(&root))
            .await
            .map_err(blocking_error)?
    }

    async fn list_directory(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>> {
        let mut reader = tokio::fs::read_dir(path).await?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let is_dir = entry.file_type().await?.is_dir();
            entries.push(entry_info(&entry.path(), is_dir));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn read_text_file(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        tokio::fs::write(path, contents).await
    }

    async fn delete_path(&self, path: &Path) -> io::Result<()> {
        let meta = tokio::fs::symlink_metadata(path).await?;
        if meta.is_dir() {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        }
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn copy_directory_into(&self, source: &Path, managed_root: &Path) -> io::Result<String> {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} has no final path segment", source.display()),
                )
            })?;

        let source = source.to_path_buf();
        let target = managed_root.join(&name);

        tokio::task::spawn_blocking(move || {
            if target.exists() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} already exists", target.display()),
                ));
            }

            if let Err(e) = copy_tree(&source, &target) {
                let _ = fs::remove_dir_all(&target);
                return Err(e);
            }

            debug!(from = %source.display(), to = %target.display(), "bundle copied");
            Ok(())
        })
        .await
        .map_err(blocking_error)??;

        Ok(name)
    }
}
