//! Importing bundles into the managed extensions directory.
//!
//! An import runs scan → parse → copy → register. Nothing is written before
//! the copy, and a failed registry commit deletes the copy again, so the
//! registry and the managed directory never disagree about a bundle.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::platform::{extensions_root, DirEntryInfo, DirectoryPicker, HostFs};

use super::error::{BundleProblem, ConsistencyFault, ExtensionError, ExtensionResult};
use super::manifest::ExtensionManifest;
use super::registry::ExtensionRegistry;

/// Prefix of a managed directory that is being uninstalled.
const STAGED_PREFIX: &str = ".removing-";

/// Final path segment of `path`, splitting on both `/` and `\`.
pub fn directory_name(path: &Path) -> Option<String> {
    path.to_string_lossy()
        .split(['/', '\\'])
        .rfind(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Validates bundles and moves them in and out of the managed directory.
pub struct ExtensionInstaller {
    registry: Arc<ExtensionRegistry>,
    fs: Arc<dyn HostFs>,
    strict_manifest: bool,
}

impl ExtensionInstaller {
    pub fn new(registry: Arc<ExtensionRegistry>, fs: Arc<dyn HostFs>) -> Self {
        Self {
            registry,
            fs,
            strict_manifest: true,
        }
    }

    /// Accept bundles with several `.json` files, using the first one.
    pub fn with_strict_manifest(mut self, strict: bool) -> Self {
        self.strict_manifest = strict;
        self
    }

    fn managed_root(&self) -> PathBuf {
        extensions_root(self.fs.as_ref())
    }

    /// Let the user choose a bundle directory and import it.
    ///
    /// Returns `Ok(None)` when the picker is cancelled.
    pub async fn import_picked(
        &self,
        picker: &dyn DirectoryPicker,
    ) -> ExtensionResult<Option<ExtensionManifest>> {
        match picker.pick_directory().await {
            Some(path) => self.import_from_directory(&path).await.map(Some),
            None => {
                debug!("directory selection cancelled");
                Ok(None)
            }
        }
    }

    /// Validate the bundle at `path`, copy it into the managed directory and
    /// register it.
    pub async fn import_from_directory(&self, path: &Path) -> ExtensionResult<ExtensionManifest> {
        let entries = self
            .fs
            .list_directory_recursive(path)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    ExtensionError::from(BundleProblem::NotADirectory(path.to_path_buf()))
                }
                _ => ExtensionError::io(path, e),
            })?;

        let manifest_path = self.select_manifest(path, &entries)?;
        if !entries.iter().any(|e| e.has_extension("html")) {
            return Err(BundleProblem::MissingEntryDocument.into());
        }

        let directory = directory_name(path)
            .ok_or_else(|| BundleProblem::UnnamedDirectory(path.to_path_buf()))?;

        let content = self
            .fs
            .read_text_file(&manifest_path)
            .await
            .map_err(|e| ExtensionError::io(&manifest_path, e))?;
        let manifest = ExtensionManifest::parse(&manifest_path, &content)?;

        // Checked again by the registry; failing here avoids a useless copy.
        if self.registry.is_registered(&manifest.name) {
            return Err(ExtensionError::DuplicateName(manifest.name));
        }
        if let Some(owner) = self.registry.directory_owner(&directory) {
            return Err(ExtensionError::DirectoryInUse { directory, owner });
        }

        let root = self.managed_root();
        let copied = self
            .fs
            .copy_directory_into(path, &root)
            .await
            .map_err(|e| ExtensionError::io(root.join(&directory), e))?;

        if let Err(e) = self.registry.register_installed(manifest.clone(), &copied) {
            let copy = root.join(&copied);
            warn!(extension = %manifest.name, error = %e, "registration failed, removing copy");
            if let Err(cleanup) = self.fs.delete_path(&copy).await {
                error!(path = %copy.display(), error = %cleanup, "failed to remove managed copy");
            }
            return Err(e);
        }

        info!(extension = %manifest.name, directory = %copied, "extension imported");
        Ok(manifest)
    }

    fn select_manifest(&self, path: &Path, entries: &[DirEntryInfo]) -> ExtensionResult<PathBuf> {
        let candidates: Vec<&DirEntryInfo> =
            entries.iter().filter(|e| e.has_extension("json")).collect();

        match candidates.as_slice() {
            [] => Err(BundleProblem::MissingManifest.into()),
            [only] => Ok(only.path.clone()),
            [first, ..] => {
                let names: Vec<String> = candidates
                    .iter()
                    .map(|e| {
                        e.path
                            .strip_prefix(path)
                            .unwrap_or(&e.path)
                            .to_string_lossy()
                            .into_owned()
                    })
                    .collect();

                if self.strict_manifest {
                    return Err(BundleProblem::AmbiguousManifest(names).into());
                }
                warn!(
                    candidates = ?names,
                    chosen = %first.name,
                    "several manifest candidates, using the first"
                );
                Ok(first.path.clone())
            }
        }
    }

    /// Delete directories left behind by interrupted uninstalls.
    ///
    /// Returns how many were removed. Failures are logged and skipped.
    pub async fn sweep_staged(&self) -> usize {
        let root = self.managed_root();
        let entries = match self.fs.list_directory(&root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(path = %root.display(), error = %e, "cannot scan managed directory");
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries
            .iter()
            .filter(|e| e.is_dir && e.name.starts_with(STAGED_PREFIX))
            .filter(|e| self.registry.directory_owner(&e.name).is_none())
        {
            match self.fs.delete_path(&entry.path).await {
                Ok(()) => {
                    debug!(path = %entry.path.display(), "removed leftover staged directory");
                    removed += 1;
                }
                Err(e) => {
                    warn!(path = %entry.path.display(), error = %e, "failed to delete staged directory");
                }
            }
        }
        removed
    }

    /// Remove an extension and its managed directory.
    ///
    /// The directory is first renamed aside under a unique name, then the
    /// registry entries are removed, then the renamed directory is deleted.
    /// A failed registry commit renames the directory back.
    pub async fn uninstall(&self, name: &str) -> ExtensionResult<()> {
        let directory = match self.registry.resolve(name) {
            Ok(dir) => dir,
            Err(ExtensionError::ConsistencyFault {
                fault: ConsistencyFault::OrphanedDirectory(dir),
                ..
            }) => dir,
            Err(ExtensionError::ConsistencyFault { name, fault }) => {
                warn!(extension = %name, %fault, "purging registry entries without a directory");
                self.registry.remove(&name)?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let root = self.managed_root();
        let managed = root.join(&directory);
        let staged = root.join(format!(
            "{STAGED_PREFIX}{directory}-{}",
            Uuid::new_v4().simple()
        ));
        self.sweep_staged().await;

        let staged_ok = match self.fs.rename(&managed, &staged).await {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(extension = %name, directory = %directory, "managed directory already gone");
                false
            }
            Err(e) => return Err(ExtensionError::io(&managed, e)),
        };

        if let Err(e) = self.registry.remove(name) {
            if staged_ok {
                if let Err(restore) = self.fs.rename(&staged, &managed).await {
                    error!(
                        path = %staged.display(),
                        error = %restore,
                        "failed to restore staged directory"
                    );
                }
            }
            return Err(e);
        }

        if staged_ok {
            if let Err(e) = self.fs.delete_path(&staged).await {
                warn!(path = %staged.display(), error = %e, "failed to delete staged directory");
            }
        }

        info!(extension = %name, directory = %directory, "extension uninstalled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::storage::StateStore;
    use crate::extensions::test_support::{write_bundle, FixedPicker, FlakyStore};
    use crate::platform::LocalFs;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        store: Arc<FlakyStore>,
        registry: Arc<ExtensionRegistry>,
        installer: ExtensionInstaller,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let store = Arc::new(FlakyStore::default());
            let registry = Arc::new(ExtensionRegistry::open(store.clone()).unwrap());
            let fs = Arc::new(LocalFs::new(temp.path().join("data")));
            let installer = ExtensionInstaller::new(registry.clone(), fs);
            Self {
                temp,
                store,
                registry,
                installer,
            }
        }

        fn source(&self) -> PathBuf {
            self.temp.path().join("source")
        }

        fn managed(&self, dir: &str) -> PathBuf {
            self.temp.path().join("data").join("Extensions").join(dir)
        }

        fn staged_leftovers(&self) -> Vec<String> {
            let root = self.temp.path().join("data").join("Extensions");
            let Ok(entries) = fs::read_dir(root) else {
                return Vec::new();
            };
            entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .filter(|name| name.starts_with(STAGED_PREFIX))
                .collect()
        }
    }

    #[test]
    fn test_directory_name() {
        assert_eq!(directory_name(Path::new("/a/b/foo-dir")), Some("foo-dir".into()));
        assert_eq!(directory_name(Path::new("/a/b/foo-dir/")), Some("foo-dir".into()));
        assert_eq!(directory_name(Path::new(r"C:\Users\me\bar")), Some("bar".into()));
        assert_eq!(directory_name(Path::new("/")), None);
    }

    #[tokio::test]
    async fn test_import_registers_and_copies() {
        let fx = Fixture::new();
        let bundle = write_bundle(&fx.source(), "foo-dir", "Foo", "<h1>Foo</h1>");

        let manifest = fx.installer.import_from_directory(&bundle).await.unwrap();

        assert_eq!(manifest.name, "Foo");
        assert_eq!(fx.registry.list_all(), vec![manifest]);
        assert_eq!(fx.registry.resolve_directory("Foo"), Some("foo-dir".to_string()));
        assert_eq!(
            fs::read_to_string(fx.managed("foo-dir").join("index.html")).unwrap(),
            "<h1>Foo</h1>"
        );
    }

    #[tokio::test]
    async fn test_import_without_entry_document_changes_nothing() {
        let fx = Fixture::new();
        let bundle = fx.source().join("no-html");
        fs::create_dir_all(&bundle).unwrap();
        fs::write(bundle.join("manifest.json"), r#"{"name": "Foo"}"#).unwrap();

        let err = fx.installer.import_from_directory(&bundle).await.unwrap_err();

        assert!(matches!(
            err,
            ExtensionError::InvalidBundle(BundleProblem::MissingEntryDocument)
        ));
        assert!(fx.registry.list_all().is_empty());
        assert!(!fx.managed("no-html").exists());
    }

    #[tokio::test]
    async fn test_import_without_manifest() {
        let fx = Fixture::new();
        let bundle = fx.source().join("no-json");
        fs::create_dir_all(&bundle).unwrap();
        fs::write(bundle.join("index.html"), "<p></p>").unwrap();

        let err = fx.installer.import_from_directory(&bundle).await.unwrap_err();
        assert!(matches!(
            err,
            ExtensionError::InvalidBundle(BundleProblem::MissingManifest)
        ));
    }

    #[tokio::test]
    async fn test_import_missing_directory() {
        let fx = Fixture::new();
        let err = fx
            .installer
            .import_from_directory(&fx.source().join("nope"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExtensionError::InvalidBundle(BundleProblem::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_ambiguous_manifest_strict_and_lenient() {
        let fx = Fixture::new();
        let bundle = write_bundle(&fx.source(), "two-json", "Foo", "<p></p>");
        fs::write(bundle.join("zz-extra.json"), r#"{"name": "Other"}"#).unwrap();

        let err = fx.installer.import_from_directory(&bundle).await.unwrap_err();
        match err {
            ExtensionError::InvalidBundle(BundleProblem::AmbiguousManifest(names)) => {
                assert_eq!(names, vec!["manifest.json", "zz-extra.json"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!fx.managed("two-json").exists());

        let lenient = ExtensionInstaller::new(
            fx.registry.clone(),
            Arc::new(LocalFs::new(fx.temp.path().join("data"))),
        )
        .with_strict_manifest(false);
        let manifest = lenient.import_from_directory(&bundle).await.unwrap();
        assert_eq!(manifest.name, "Foo");
    }

    #[tokio::test]
    async fn test_invalid_manifest_json() {
        let fx = Fixture::new();
        let bundle = fx.source().join("broken");
        fs::create_dir_all(&bundle).unwrap();
        fs::write(bundle.join("manifest.json"), "{ not json").unwrap();
        fs::write(bundle.join("index.html"), "<p></p>").unwrap();

        let err = fx.installer.import_from_directory(&bundle).await.unwrap_err();
        assert!(matches!(
            err,
            ExtensionError::InvalidBundle(BundleProblem::InvalidManifest { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_name_leaves_first_bundle() {
        let fx = Fixture::new();
        let first = write_bundle(&fx.source(), "foo-dir", "Foo", "<p>one</p>");
        let second = write_bundle(&fx.source(), "foo-again", "Foo", "<p>two</p>");

        fx.installer.import_from_directory(&first).await.unwrap();
        let err = fx.installer.import_from_directory(&second).await.unwrap_err();

        assert!(matches!(err, ExtensionError::DuplicateName(ref n) if n == "Foo"));
        assert_eq!(fx.registry.list_all().len(), 1);
        assert!(!fx.managed("foo-again").exists());
    }

    #[tokio::test]
    async fn test_directory_collision_is_rejected() {
        let fx = Fixture::new();
        let first = write_bundle(&fx.source().join("a"), "shared", "Foo", "<p>foo</p>");
        let second = write_bundle(&fx.source().join("b"), "shared", "Bar", "<p>bar</p>");

        fx.installer.import_from_directory(&first).await.unwrap();
        let err = fx.installer.import_from_directory(&second).await.unwrap_err();

        assert!(matches!(
            err,
            ExtensionError::DirectoryInUse { ref owner, .. } if owner == "Foo"
        ));
        assert_eq!(
            fs::read_to_string(fx.managed("shared").join("index.html")).unwrap(),
            "<p>foo</p>"
        );
    }

    #[tokio::test]
    async fn test_failed_registration_removes_copy() {
        let fx = Fixture::new();
        let bundle = write_bundle(&fx.source(), "foo-dir", "Foo", "<p></p>");
        fx.store.set_failing(true);

        let err = fx.installer.import_from_directory(&bundle).await.unwrap_err();

        assert!(matches!(err, ExtensionError::Storage(_)));
        assert!(!fx.managed("foo-dir").exists());
        assert!(fx.registry.list_all().is_empty());
        assert!(fx.store.load("allExtensions").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_import_picked() {
        let fx = Fixture::new();
        let bundle = write_bundle(&fx.source(), "foo-dir", "Foo", "<p></p>");

        let cancelled = fx.installer.import_picked(&FixedPicker(None)).await.unwrap();
        assert!(cancelled.is_none());
        assert!(fx.registry.list_all().is_empty());

        let picked = fx
            .installer
            .import_picked(&FixedPicker(Some(bundle)))
            .await
            .unwrap();
        assert_eq!(picked.map(|m| m.name), Some("Foo".to_string()));
    }

    #[tokio::test]
    async fn test_uninstall_removes_records_and_directory() {
        let fx = Fixture::new();
        let bundle = write_bundle(&fx.source(), "foo-dir", "Foo", "<p></p>");
        let manifest = fx.installer.import_from_directory(&bundle).await.unwrap();
        fx.registry.activate(&manifest).unwrap();

        fx.installer.uninstall("Foo").await.unwrap();

        assert!(fx.registry.list_all().is_empty());
        assert!(fx.registry.list_activated().is_empty());
        assert_eq!(fx.registry.resolve_directory("Foo"), None);
        assert!(!fx.managed("foo-dir").exists());
        assert!(fx.staged_leftovers().is_empty());
        // The source bundle is never touched.
        assert!(bundle.join("index.html").exists());
    }

    #[tokio::test]
    async fn test_uninstall_restores_directory_on_commit_failure() {
        let fx = Fixture::new();
        let bundle = write_bundle(&fx.source(), "foo-dir", "Foo", "<p></p>");
        fx.installer.import_from_directory(&bundle).await.unwrap();
        fx.store.set_failing(true);

        let err = fx.installer.uninstall("Foo").await.unwrap_err();

        assert!(matches!(err, ExtensionError::Storage(_)));
        assert!(fx.registry.is_registered("Foo"));
        assert!(fx.managed("foo-dir").join("index.html").exists());
        assert!(fx.staged_leftovers().is_empty());
    }

    #[tokio::test]
    async fn test_uninstall_after_leftover_staged_directory() {
        let fx = Fixture::new();
        let leftover = fx.managed(".removing-foo-dir");
        fs::create_dir_all(&leftover).unwrap();
        fs::write(leftover.join("index.html"), "<p>old</p>").unwrap();
        let bundle = write_bundle(&fx.source(), "foo-dir", "Foo", "<p></p>");
        fx.installer.import_from_directory(&bundle).await.unwrap();

        fx.installer.uninstall("Foo").await.unwrap();

        assert!(!fx.registry.is_registered("Foo"));
        assert!(!fx.managed("foo-dir").exists());
        assert!(fx.staged_leftovers().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_staged_keeps_installed_bundles() {
        let fx = Fixture::new();
        let bundle = write_bundle(&fx.source(), "foo-dir", "Foo", "<p></p>");
        fx.installer.import_from_directory(&bundle).await.unwrap();
        fs::create_dir_all(fx.managed(".removing-bar-dir-1")).unwrap();
        fs::create_dir_all(fx.managed(".removing-baz-dir-2").join("nested")).unwrap();

        assert_eq!(fx.installer.sweep_staged().await, 2);
        assert!(fx.staged_leftovers().is_empty());
        assert!(fx.managed("foo-dir").join("index.html").exists());
        assert_eq!(fx.installer.sweep_staged().await, 0);
    }

    #[tokio::test]
    async fn test_uninstall_with_missing_directory() {
        let fx = Fixture::new();
        let bundle = write_bundle(&fx.source(), "foo-dir", "Foo", "<p></p>");
        fx.installer.import_from_directory(&bundle).await.unwrap();
        fs::remove_dir_all(fx.managed("foo-dir")).unwrap();

        fx.installer.uninstall("Foo").await.unwrap();
        assert!(!fx.registry.is_registered("Foo"));
    }

    #[tokio::test]
    async fn test_uninstall_unknown() {
        let fx = Fixture::new();
        let err = fx.installer.uninstall("Ghost").await.unwrap_err();
        assert!(matches!(err, ExtensionError::ExtensionNotFound(_)));
    }

    #[tokio::test]
    async fn test_uninstall_manifest_without_directory_purges_entries() {
        let fx = Fixture::new();
        fx.registry
            .register(crate::extensions::test_support::manifest("Loose"))
            .unwrap();

        fx.installer.uninstall("Loose").await.unwrap();
        assert!(!fx.registry.is_registered("Loose"));
    }
}
