//! AIOP - extension subsystem of the AIOP desktop shell.
//!
//! AIOP lets users import HTML extension bundles, enable them, and run them
//! in an isolated surface that can call back into the host only through a
//! narrow, allowlisted command bridge.
//!
//! # Architecture
//!
//! The library is organized into these main modules:
//!
//! - [`config`] - Configuration loading and management
//! - [`extensions`] - Registry, installer, frame host and command bridge
//! - [`platform`] - Host capabilities (file system, directory picker)
//! - [`logging`] - Tracing subscriber setup
//!
//! # Example
//!
//! ```ignore
//! use aiop::{Config, ExtensionSystem};
//!
//! aiop::logging::init();
//! let config = Config::load();
//! let system = ExtensionSystem::open_local(&config, picker, surfaces)?;
//!
//! if let Some(manifest) = system.import_picked().await? {
//!     system.activate(&manifest.name)?;
//!     system.navigate(&format!("extension.{}", manifest.name)).await;
//! }
//! ```

pub mod config;
pub mod extensions;
pub mod logging;
pub mod platform;

mod error;

// Re-export commonly used types for convenience
pub use config::Config;
pub use error::{AiopError, AiopResult};
pub use extensions::{ExtensionError, ExtensionManifest, ExtensionRegistry, ExtensionSystem};
pub use platform::{DirectoryPicker, HostFs, LocalFs};
