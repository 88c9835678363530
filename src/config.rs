use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{AiopError, AiopResult};
use crate::extensions::ipc::CommandKind;
use crate::extensions::PermissionSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub extensions: ExtensionsConfig,
    pub bridge: BridgeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// App data root; `~` and environment variables are expanded.
    pub data_dir: String,
    /// State file name, relative to `data_dir`.
    pub state_file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionsConfig {
    pub entry_document: String,
    /// Reject bundles with more than one `.json` file.
    pub strict_manifest: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub allowed_commands: Vec<CommandKind>,
    pub scope_to_extension_dir: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            state_file: "extensions-state.json".to_string(),
        }
    }
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            entry_document: "index.html".to_string(),
            strict_manifest: true,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            allowed_commands: PermissionSet::read_only().enabled_commands(),
            scope_to_extension_dir: true,
        }
    }
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("AIOP").to_string_lossy().into_owned())
        .unwrap_or_else(|| "~/.local/share/AIOP".to_string())
}

impl BridgeConfig {
    pub fn permissions(&self) -> PermissionSet {
        PermissionSet::from_commands(self.allowed_commands.iter().copied())
    }
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".config"))
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
            })
            .join("aiop")
            .join("config.toml")
    }

    /// Load config from file, or return defaults if not found
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "using default config");
                Self::default()
            }
        }
    }

    /// Load and validate config from `path`.
    pub fn load_from(path: &Path) -> AiopResult<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.validate();
        Ok(config)
    }

    /// Normalize values that would otherwise break the extension system
    fn validate(&mut self) {
        if self.storage.state_file.trim().is_empty() {
            self.storage.state_file = StorageConfig::default().state_file;
        }
        if self.storage.data_dir.trim().is_empty() {
            self.storage.data_dir = default_data_dir();
        }

        // Entry document is a plain file name inside the bundle
        let entry = self.extensions.entry_document.trim();
        if entry.is_empty() || entry.contains(['/', '\\']) {
            warn!(entry_document = %entry, "invalid entry document, using index.html");
            self.extensions.entry_document = ExtensionsConfig::default().entry_document;
        }

        self.bridge.allowed_commands.sort();
        self.bridge.allowed_commands.dedup();
    }

    /// App data root with `~` and environment variables expanded.
    pub fn data_root(&self) -> AiopResult<PathBuf> {
        let expanded = shellexpand::full(&self.storage.data_dir)
            .map_err(|e| AiopError::Config(format!("cannot expand data_dir: {e}")))?;
        Ok(PathBuf::from(expanded.as_ref()))
    }

    /// Path of the registry state file.
    pub fn state_path(&self) -> AiopResult<PathBuf> {
        Ok(self.data_root()?.join(&self.storage.state_file))
    }

    /// Save config to file
    pub fn save(&self) -> AiopResult<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> AiopResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }
}
