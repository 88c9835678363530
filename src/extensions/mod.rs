//! Extension system for AIOP.
//!
//! Extensions are HTML bundles imported from a user-chosen directory into a
//! managed directory, then shown one at a time in an isolated surface whose
//! script reaches the host only through the command bridge.
//!
//! # Architecture
//!
//! ```text
//! ExtensionSystem
//! ├── registry: ExtensionRegistry (allExtensions, activatedExtensions,
//! │             selectedExtensionDirectories) over a StateStore
//! ├── installer: ExtensionInstaller (scan → parse → copy → register)
//! ├── frame: ExtensionFrameHost (Idle → Loading → Loaded)
//! └── bridge: CommandBridge (origin check → allowlist → HostDispatcher)
//! ```
//!
//! The registry is the only writer of persisted state. The installer and the
//! frame host read it through a shared `Arc`, never through a global.

mod error;
mod host;
mod installer;
pub mod ipc;
mod isolate;
mod manifest;
pub mod permissions;
mod registry;
pub mod storage;
mod system;

#[cfg(test)]
mod test_support;

pub use error::{BundleProblem, ConsistencyFault, ExtensionError, ExtensionResult};
pub use host::{
    ExtensionFrameHost, FrameFailure, FrameHostConfig, FrameState, NavigationOutcome, Selection,
    SELECTION_PREFIX,
};
pub use installer::{directory_name, ExtensionInstaller};
pub use isolate::{
    IsolatedSurface, SandboxPolicy, SurfaceError, SurfaceFactory, SurfaceId, SurfaceMessage,
};
pub use manifest::ExtensionManifest;
pub use permissions::{PermissionError, PermissionSet};
pub use registry::{
    ActivationRecord, ExtensionRegistry, ACTIVATED_EXTENSIONS_KEY, ALL_EXTENSIONS_KEY,
    DIRECTORY_MAP_KEY,
};
pub use storage::{JsonFileStore, MemoryStore, StateStore, StoreError};
pub use system::ExtensionSystem;
