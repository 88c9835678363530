//! Extension manifest parsing.
//!
//! Each bundle ships a JSON manifest describing the extension:
//! - `name` (unique identity, immutable once registered)
//! - display metadata (description, author, creation date, version)
//! - `iconClass`, the icon font class rendered in the navigation rail

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::BundleProblem;

/// Extension manifest parsed from the bundle's `.json` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionManifest {
    /// Unique identifier.
    pub name: String,

    /// Short description.
    #[serde(default)]
    pub description: String,

    /// Author name.
    #[serde(default)]
    pub author: String,

    /// Free-form creation date as written by the author.
    #[serde(default)]
    pub creation_date: String,

    /// Version string.
    #[serde(default)]
    pub version: String,

    /// Icon font class (e.g. `ri-puzzle-line`).
    #[serde(default)]
    pub icon_class: String,
}

impl ExtensionManifest {
    /// Parse a manifest from its JSON text. `path` is only used in errors.
    pub fn parse(path: &Path, content: &str) -> Result<Self, BundleProblem> {
        let manifest: Self =
            serde_json::from_str(content).map_err(|e| BundleProblem::InvalidManifest {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        manifest.validate(path)?;
        Ok(manifest)
    }

    /// Validate the manifest for required fields and constraints.
    pub fn validate(&self, path: &Path) -> Result<(), BundleProblem> {
        let invalid = |message: &str| BundleProblem::InvalidManifest {
            path: path.to_path_buf(),
            message: message.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name is required"));
        }

        if self.name.trim() != self.name {
            return Err(invalid("name must not have surrounding whitespace"));
        }

        // Names are used as navigation ids (`extension.<name>`) and map keys.
        if self.name.chars().any(char::is_control) {
            return Err(invalid("name must not contain control characters"));
        }

        Ok(())
    }
}
