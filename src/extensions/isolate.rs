//! Isolated rendering surfaces for extension documents.
//!
//! A surface is the embedded, script-isolated region (an iframe in a webview
//! host) that an extension's entry document runs in. The host creates one per
//! mount and destroys it on navigation away; extension script can only reach
//! the host by posting messages, which the host forwards to the bridge tagged
//! with the surface's id.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::ipc::OutboundMessage;

/// Identity of a surface's content window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(u64);

impl SurfaceId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

/// Sandbox flags applied when a surface is created.
///
/// Same-origin access is never granted: with `allow-scripts` alone the
/// document runs in an opaque origin and cannot touch the host document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxPolicy {
    pub allow_scripts: bool,
    pub allow_forms: bool,
    pub allow_modals: bool,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            allow_scripts: true,
            allow_forms: false,
            allow_modals: false,
        }
    }
}

impl SandboxPolicy {
    /// Value for the iframe `sandbox` attribute.
    pub fn attribute(&self) -> String {
        let mut flags = Vec::new();
        if self.allow_scripts {
            flags.push("allow-scripts");
        }
        if self.allow_forms {
            flags.push("allow-forms");
        }
        if self.allow_modals {
            flags.push("allow-modals");
        }
        flags.join(" ")
    }
}

/// Errors raised by a surface implementation.
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("failed to create surface: {0}")]
    Create(String),

    #[error("failed to write document: {0}")]
    Write(String),
}

/// A mounted isolated surface.
pub trait IsolatedSurface: Send + Sync {
    fn id(&self) -> SurfaceId;

    /// Replace the surface's document with `html` in a single write.
    ///
    /// Implementations must not run any script before the whole document has
    /// been handed over.
    fn write_document(&self, html: &str) -> Result<(), SurfaceError>;

    /// Deliver a message to the surface's content window.
    fn post_message(&self, message: &OutboundMessage);

    /// Remove the surface and its content window.
    fn destroy(&self);
}

/// Creates surfaces on demand.
pub trait SurfaceFactory: Send + Sync {
    fn create(&self, policy: &SandboxPolicy) -> Result<Arc<dyn IsolatedSurface>, SurfaceError>;
}

/// A message received from a surface's content window.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceMessage {
    /// Content window the message came from.
    pub source: SurfaceId,
    pub data: Value,
}
