//! Permission checks for extension-originated host calls.
//!
//! This module provides:
//! - `PermissionSet` - the command allowlist a bridge enforces
//! - `resolve_scoped_path` - confinement of extension-supplied paths to the
//!   extension's own managed directory

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ipc::CommandKind;

/// Permission-related errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    #[error("command '{command}' is not allowed")]
    Denied { command: CommandKind },

    #[error("path '{path}' is outside the extension directory")]
    PathOutsideScope { path: String },
}

/// Result type for permission operations.
pub type PermissionResult<T> = Result<T, PermissionError>;

/// The set of host commands extension script may invoke.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionSet {
    #[serde(default)]
    allowed: BTreeSet<CommandKind>,
}

impl PermissionSet {
    /// Create a new empty permission set (all denied).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_commands(commands: impl IntoIterator<Item = CommandKind>) -> Self {
        Self {
            allowed: commands.into_iter().collect(),
        }
    }

    /// Read-only capabilities.
    pub fn read_only() -> Self {
        Self::from_commands([
            CommandKind::ReadFile,
            CommandKind::ListDirectory,
            CommandKind::Greet,
        ])
    }

    pub fn allow(&mut self, command: CommandKind) {
        self.allowed.insert(command);
    }

    pub fn revoke(&mut self, command: CommandKind) {
        self.allowed.remove(&command);
    }

    /// Check if a command is in the allowlist.
    pub fn check_command(&self, command: CommandKind) -> PermissionResult<()> {
        if self.allowed.contains(&command) {
            Ok(())
        } else {
            Err(PermissionError::Denied { command })
        }
    }

    /// Get a list of all commands that are enabled.
    pub fn enabled_commands(&self) -> Vec<CommandKind> {
        self.allowed.iter().copied().collect()
    }
}

/// Resolve an extension-supplied path against `scope`.
///
/// Relative paths are joined onto `scope`; absolute paths must already lie
/// inside it. Any `..` component is rejected outright, so the check is purely
/// lexical and works for paths that do not exist yet.
pub fn resolve_scoped_path(scope: &Path, requested: &str) -> PermissionResult<PathBuf> {
    let outside = || PermissionError::PathOutsideScope {
        path: requested.to_string(),
    };

    let requested_path = Path::new(requested);
    if requested.is_empty()
        || requested_path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(outside());
    }

    let resolved = if requested_path.is_absolute() {
        requested_path.to_path_buf()
    } else {
        scope.join(requested_path)
    };

    if resolved.starts_with(scope) {
        Ok(resolved)
    } else {
        Err(outside())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_denies_everything() {
        let perms = PermissionSet::new();
        for kind in CommandKind::ALL {
            assert_eq!(
                perms.check_command(kind),
                Err(PermissionError::Denied { command: kind })
            );
        }
    }

    #[test]
    fn test_read_only_set() {
        let mut perms = PermissionSet::read_only();
        assert!(perms.check_command(CommandKind::ReadFile).is_ok());
        assert!(perms.check_command(CommandKind::WriteFile).is_err());
        assert!(perms.check_command(CommandKind::DeleteFile).is_err());

        perms.allow(CommandKind::WriteFile);
        perms.revoke(CommandKind::Greet);
        assert_eq!(
            perms.enabled_commands(),
            vec![
                CommandKind::ReadFile,
                CommandKind::WriteFile,
                CommandKind::ListDirectory
            ]
        );
    }

    #[test]
    fn test_scoped_paths() {
        let scope = Path::new("/data/Extensions/foo");

        assert_eq!(
            resolve_scoped_path(scope, "notes/a.txt").unwrap(),
            PathBuf::from("/data/Extensions/foo/notes/a.txt")
        );
        assert_eq!(
            resolve_scoped_path(scope, "/data/Extensions/foo/index.html").unwrap(),
            PathBuf::from("/data/Extensions/foo/index.html")
        );

        assert!(resolve_scoped_path(scope, "../bar/index.html").is_err());
        assert!(resolve_scoped_path(scope, "notes/../../bar").is_err());
        assert!(resolve_scoped_path(scope, "/etc/passwd").is_err());
        assert!(resolve_scoped_path(scope, "/data/Extensions/foobar/x").is_err());
        assert!(resolve_scoped_path(scope, "").is_err());
    }
}
