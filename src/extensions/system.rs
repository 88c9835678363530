//! Wiring of the extension subsystem.
//!
//! [`ExtensionSystem`] builds the store, registry, installer, bridge and
//! frame host once and hands out shared references. Operations that cross
//! components, like removing the extension that is on screen, live here.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::AiopResult;
use crate::platform::{DirectoryPicker, HostFs, LocalFs};

use super::error::{ExtensionError, ExtensionResult};
use super::host::{ExtensionFrameHost, FrameHostConfig, NavigationOutcome};
use super::installer::ExtensionInstaller;
use super::ipc::{CommandBridge, FsDispatcher};
use super::isolate::{SandboxPolicy, SurfaceFactory, SurfaceMessage};
use super::manifest::ExtensionManifest;
use super::registry::{ActivationRecord, ExtensionRegistry};
use super::storage::{JsonFileStore, StateStore};

/// The extension subsystem, ready to be driven by a UI.
pub struct ExtensionSystem {
    registry: Arc<ExtensionRegistry>,
    installer: ExtensionInstaller,
    bridge: Arc<CommandBridge>,
    frame: ExtensionFrameHost,
    picker: Arc<dyn DirectoryPicker>,
}

impl ExtensionSystem {
    /// Build the subsystem with state persisted under the host's data root.
    pub fn new(
        config: &Config,
        fs: Arc<dyn HostFs>,
        picker: Arc<dyn DirectoryPicker>,
        surfaces: Arc<dyn SurfaceFactory>,
    ) -> ExtensionResult<Self> {
        let state_path = fs.app_local_data_root().join(&config.storage.state_file);
        let store = Arc::new(JsonFileStore::open(state_path)?);
        Self::with_store(config, store, fs, picker, surfaces)
    }

    /// Build the subsystem on the local disk at the configured data root.
    pub fn open_local(
        config: &Config,
        picker: Arc<dyn DirectoryPicker>,
        surfaces: Arc<dyn SurfaceFactory>,
    ) -> AiopResult<Self> {
        let fs = Arc::new(LocalFs::new(config.data_root()?));
        Ok(Self::new(config, fs, picker, surfaces)?)
    }

    pub fn with_store(
        config: &Config,
        store: Arc<dyn StateStore>,
        fs: Arc<dyn HostFs>,
        picker: Arc<dyn DirectoryPicker>,
        surfaces: Arc<dyn SurfaceFactory>,
    ) -> ExtensionResult<Self> {
        let registry = Arc::new(ExtensionRegistry::open(store)?);
        for (name, fault) in registry.check_consistency() {
            warn!(extension = %name, %fault, "registry inconsistency");
        }

        let installer = ExtensionInstaller::new(registry.clone(), fs.clone())
            .with_strict_manifest(config.extensions.strict_manifest);

        let bridge = Arc::new(CommandBridge::new(
            Arc::new(FsDispatcher::new(fs.clone())),
            config.bridge.permissions(),
        ));

        let frame = ExtensionFrameHost::new(
            registry.clone(),
            fs,
            surfaces,
            bridge.clone(),
            FrameHostConfig {
                entry_document: config.extensions.entry_document.clone(),
                sandbox: SandboxPolicy::default(),
                scope_to_extension_dir: config.bridge.scope_to_extension_dir,
            },
        );

        info!(
            installed = registry.list_all().len(),
            activated = registry.list_activated().len(),
            "extension system ready"
        );

        Ok(Self {
            registry,
            installer,
            bridge,
            frame,
            picker,
        })
    }

    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    pub fn installer(&self) -> &ExtensionInstaller {
        &self.installer
    }

    pub fn bridge(&self) -> &Arc<CommandBridge> {
        &self.bridge
    }

    pub fn frame(&self) -> &ExtensionFrameHost {
        &self.frame
    }

    /// Ask the user for a bundle directory and import it.
    pub async fn import_picked(&self) -> ExtensionResult<Option<ExtensionManifest>> {
        self.installer.import_picked(self.picker.as_ref()).await
    }

    pub async fn import_from_directory(&self, path: &Path) -> ExtensionResult<ExtensionManifest> {
        self.installer.import_from_directory(path).await
    }

    pub fn activate(&self, name: &str) -> ExtensionResult<ActivationRecord> {
        let manifest = self
            .registry
            .get(name)
            .ok_or_else(|| ExtensionError::ExtensionNotFound(name.to_string()))?;
        self.registry.activate(&manifest)
    }

    /// Deactivate an extension, unmounting it if it is on screen.
    pub fn deactivate(&self, name: &str) -> ExtensionResult<bool> {
        let removed = self.registry.deactivate(name)?;
        if removed {
            self.frame.unmount_extension(name);
        }
        Ok(removed)
    }

    /// Flip activation, returning the new state.
    pub fn toggle(&self, name: &str) -> ExtensionResult<bool> {
        let active = self.registry.toggle(name)?;
        if !active {
            self.frame.unmount_extension(name);
        }
        Ok(active)
    }

    /// Unregister and delete an extension, then unmount it if it is shown.
    ///
    /// A failed uninstall leaves the frame as it was.
    pub async fn remove_extension(&self, name: &str) -> ExtensionResult<()> {
        self.installer.uninstall(name).await?;
        self.frame.unmount_extension(name);
        Ok(())
    }

    pub async fn navigate(&self, selection: &str) -> NavigationOutcome {
        self.frame.navigate(selection).await
    }

    /// Serve surface messages from `inbox` on the bridge until it closes.
    pub fn serve_bridge(&self, inbox: mpsc::UnboundedReceiver<SurfaceMessage>) -> JoinHandle<()> {
        tokio::spawn(self.bridge.clone().serve(inbox))
    }
}
