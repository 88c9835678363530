//! Extension host frame - shows one extension at a time.
//!
//! The frame host is responsible for:
//! - Resolving the selected extension to its managed directory
//! - Reading the entry document and mounting it in a fresh isolated surface
//! - Attaching the command bridge to the mounted surface
//! - Tearing surface and listener down exactly once on navigation away
//!
//! Loads are asynchronous. Each navigation bumps a generation counter, and a
//! load whose generation is no longer current is discarded before it mounts.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::platform::{extensions_root, HostFs};

use super::ipc::{CommandBridge, InvokeContext, ListenerId};
use super::isolate::{IsolatedSurface, SandboxPolicy, SurfaceFactory, SurfaceId};
use super::registry::ExtensionRegistry;

/// Prefix of navigation selections that name an extension.
pub const SELECTION_PREFIX: &str = "extension.";

/// A parsed navigation selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// `extension.<name>`
    Extension(String),
    /// Any other view of the host application.
    Other(String),
}

impl Selection {
    pub fn parse(selection: &str) -> Self {
        match selection.strip_prefix(SELECTION_PREFIX) {
            Some(name) if !name.is_empty() => Selection::Extension(name.to_string()),
            _ => Selection::Other(selection.to_string()),
        }
    }
}

/// Where the frame is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Loading { extension: String },
    Loaded { extension: String, surface: SurfaceId },
}

/// Why a navigation ended without a mounted surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameFailure {
    #[error("extension '{0}' is not installed or has no managed directory")]
    Unresolved(String),

    #[error("extension '{0}' is not activated")]
    NotActivated(String),

    #[error("failed to read entry document of '{extension}': {kind}")]
    Read { extension: String, kind: io::ErrorKind },

    #[error("entry document of '{0}' is empty")]
    EmptyDocument(String),

    #[error("failed to mount '{extension}': {message}")]
    Mount { extension: String, message: String },
}

/// Result of a call to [`ExtensionFrameHost::navigate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The extension is mounted in the given surface.
    Loaded(SurfaceId),
    /// The load failed; the frame is idle again.
    Failed(FrameFailure),
    /// The selection is not an extension; the frame is idle.
    Idle,
    /// A later navigation took over while this one was loading.
    Superseded,
    /// The extension was already loaded or loading.
    Unchanged,
}

/// Settings for the frame host.
#[derive(Debug, Clone)]
pub struct FrameHostConfig {
    /// Entry document file name inside a bundle.
    pub entry_document: String,

    /// Sandbox applied to every surface.
    pub sandbox: SandboxPolicy,

    /// Confine bridged file access to the extension's directory.
    pub scope_to_extension_dir: bool,
}

impl Default for FrameHostConfig {
    fn default() -> Self {
        Self {
            entry_document: "index.html".to_string(),
            sandbox: SandboxPolicy::default(),
            scope_to_extension_dir: true,
        }
    }
}

struct Mounted {
    extension: String,
    surface: Arc<dyn IsolatedSurface>,
    listener: ListenerId,
}

struct FrameInner {
    generation: u64,
    state: FrameState,
    mounted: Option<Mounted>,
    last_failure: Option<FrameFailure>,
}

impl FrameInner {
    fn teardown(&mut self, bridge: &CommandBridge) {
        if let Some(mounted) = self.mounted.take() {
            bridge.detach(mounted.listener);
            mounted.surface.destroy();
            info!(
                extension = %mounted.extension,
                surface = %mounted.surface.id(),
                "extension unmounted"
            );
        }
    }
}

/// Mounts the selected extension's entry document in an isolated surface.
pub struct ExtensionFrameHost {
    registry: Arc<ExtensionRegistry>,
    fs: Arc<dyn HostFs>,
    surfaces: Arc<dyn SurfaceFactory>,
    bridge: Arc<CommandBridge>,
    config: FrameHostConfig,
    inner: Mutex<FrameInner>,
}

impl ExtensionFrameHost {
    pub fn new(
        registry: Arc<ExtensionRegistry>,
        fs: Arc<dyn HostFs>,
        surfaces: Arc<dyn SurfaceFactory>,
        bridge: Arc<CommandBridge>,
        config: FrameHostConfig,
    ) -> Self {
        Self {
            registry,
            fs,
            surfaces,
            bridge,
            config,
            inner: Mutex::new(FrameInner {
                generation: 0,
                state: FrameState::Idle,
                mounted: None,
                last_failure: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrameInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> FrameState {
        self.lock().state.clone()
    }

    /// Name of the extension currently mounted.
    pub fn current_extension(&self) -> Option<String> {
        self.lock().mounted.as_ref().map(|m| m.extension.clone())
    }

    pub fn mounted_surface(&self) -> Option<SurfaceId> {
        self.lock().mounted.as_ref().map(|m| m.surface.id())
    }

    /// Failure of the most recent navigation, cleared by the next success.
    pub fn last_failure(&self) -> Option<FrameFailure> {
        self.lock().last_failure.clone()
    }

    pub fn bridge(&self) -> &Arc<CommandBridge> {
        &self.bridge
    }

    /// Navigate the frame to `selection`.
    pub async fn navigate(&self, selection: &str) -> NavigationOutcome {
        let name = match Selection::parse(selection) {
            Selection::Extension(name) => name,
            Selection::Other(_) => {
                self.unmount();
                return NavigationOutcome::Idle;
            }
        };

        let generation = {
            let mut inner = self.lock();
            match &inner.state {
                FrameState::Loading { extension } | FrameState::Loaded { extension, .. }
                    if *extension == name =>
                {
                    return NavigationOutcome::Unchanged;
                }
                _ => {}
            }

            inner.generation += 1;
            inner.teardown(&self.bridge);
            inner.state = FrameState::Loading {
                extension: name.clone(),
            };
            inner.generation
        };

        debug!(extension = %name, generation, "loading extension");
        let loaded = self.load(&name).await;

        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(extension = %name, generation, "discarding stale load");
            return NavigationOutcome::Superseded;
        }

        let mounted = loaded.and_then(|(directory, html)| self.mount(&name, &directory, &html));
        match mounted {
            Ok(mounted) => {
                let surface = mounted.surface.id();
                info!(extension = %name, %surface, "extension mounted");
                inner.state = FrameState::Loaded {
                    extension: name,
                    surface,
                };
                inner.mounted = Some(mounted);
                inner.last_failure = None;
                NavigationOutcome::Loaded(surface)
            }
            Err(failure) => {
                warn!(extension = %name, error = %failure, "extension failed to load");
                inner.state = FrameState::Idle;
                inner.last_failure = Some(failure.clone());
                NavigationOutcome::Failed(failure)
            }
        }
    }

    /// Resolve the directory and read the entry document.
    async fn load(&self, name: &str) -> Result<(String, String), FrameFailure> {
        let directory = self.registry.resolve(name).map_err(|e| {
            debug!(extension = %name, error = %e, "cannot resolve extension");
            FrameFailure::Unresolved(name.to_string())
        })?;
        if !self.registry.is_active(name) {
            return Err(FrameFailure::NotActivated(name.to_string()));
        }

        let path = self.extension_dir(&directory).join(&self.config.entry_document);
        let html = self
            .fs
            .read_text_file(&path)
            .await
            .map_err(|e| FrameFailure::Read {
                extension: name.to_string(),
                kind: e.kind(),
            })?;

        if html.trim().is_empty() {
            return Err(FrameFailure::EmptyDocument(name.to_string()));
        }
        Ok((directory, html))
    }

    fn extension_dir(&self, directory: &str) -> PathBuf {
        extensions_root(self.fs.as_ref()).join(directory)
    }

    fn mount(&self, name: &str, directory: &str, html: &str) -> Result<Mounted, FrameFailure> {
        let mount_failure = |message: String| FrameFailure::Mount {
            extension: name.to_string(),
            message,
        };

        let surface = self
            .surfaces
            .create(&self.config.sandbox)
            .map_err(|e| mount_failure(e.to_string()))?;

        let mut context = InvokeContext::new(
            name.to_string(),
            directory.to_string(),
            self.extension_dir(directory),
        );
        if !self.config.scope_to_extension_dir {
            context = context.unscoped();
        }

        // Listen before the document runs so its first request is not lost.
        let listener = self.bridge.attach(surface.clone(), context);

        if let Err(e) = surface.write_document(html) {
            self.bridge.detach(listener);
            surface.destroy();
            return Err(mount_failure(e.to_string()));
        }

        Ok(Mounted {
            extension: name.to_string(),
            surface,
            listener,
        })
    }

    /// Tear down the mounted surface and cancel any load in flight.
    pub fn unmount(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.teardown(&self.bridge);
        inner.state = FrameState::Idle;
    }

    /// Unmount if `name` is loaded or loading. Returns whether it was.
    pub fn unmount_extension(&self, name: &str) -> bool {
        let showing = match &self.lock().state {
            FrameState::Loading { extension } | FrameState::Loaded { extension, .. } => {
                extension == name
            }
            FrameState::Idle => false,
        };
        if showing {
            self.unmount();
        }
        showing
    }
}

impl Drop for ExtensionFrameHost {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        inner.teardown(&self.bridge);
    }
}
