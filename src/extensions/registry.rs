//! Extension registry - the durable record of installed extensions.
//!
//! The registry owns three persisted records:
//! - `allExtensions`: every installed manifest, in install order
//! - `activatedExtensions`: the enabled subset, one activation record each
//! - `selectedExtensionDirectories`: manifest name -> managed directory name
//!
//! It is the only writer of these records. Every mutation clones the current
//! state, applies the change, commits the touched records as one batch and
//! only then swaps the new state in, all under a single lock. A failed commit
//! therefore leaves both the in-memory view and the store untouched.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::{ConsistencyFault, ExtensionError, ExtensionResult};
use super::manifest::ExtensionManifest;
use super::storage::{StateStore, StoreBatch, StoreError};

pub const ALL_EXTENSIONS_KEY: &str = "allExtensions";
pub const ACTIVATED_EXTENSIONS_KEY: &str = "activatedExtensions";
pub const DIRECTORY_MAP_KEY: &str = "selectedExtensionDirectories";

/// An enabled extension as shown in the navigation rail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationRecord {
    #[serde(flatten)]
    pub manifest: ExtensionManifest,

    /// List identity for this activation, distinct from the manifest name.
    pub key: Uuid,

    pub is_active: bool,
}

impl ActivationRecord {
    fn new(manifest: ExtensionManifest) -> Self {
        Self {
            manifest,
            key: Uuid::new_v4(),
            is_active: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Record {
    All,
    Activated,
    Directories,
}

#[derive(Debug, Clone, Default)]
struct RegistryState {
    all: Vec<ExtensionManifest>,
    activated: Vec<ActivationRecord>,
    directories: BTreeMap<String, String>,
}

impl RegistryState {
    fn manifest(&self, name: &str) -> Option<&ExtensionManifest> {
        self.all.iter().find(|m| m.name == name)
    }

    fn activation(&self, name: &str) -> Option<&ActivationRecord> {
        self.activated.iter().find(|r| r.name() == name)
    }

    fn directory_owner(&self, directory: &str) -> Option<&str> {
        self.directories
            .iter()
            .find(|(_, dir)| dir.as_str() == directory)
            .map(|(name, _)| name.as_str())
    }

    fn batch(&self, records: &[Record]) -> Result<StoreBatch, StoreError> {
        records
            .iter()
            .map(|record| {
                Ok(match record {
                    Record::All => (
                        ALL_EXTENSIONS_KEY.to_string(),
                        serde_json::to_value(&self.all)?,
                    ),
                    Record::Activated => (
                        ACTIVATED_EXTENSIONS_KEY.to_string(),
                        serde_json::to_value(&self.activated)?,
                    ),
                    Record::Directories => (
                        DIRECTORY_MAP_KEY.to_string(),
                        serde_json::to_value(&self.directories)?,
                    ),
                })
            })
            .collect()
    }

    /// Drop entries that break the registry invariants, returning what was
    /// dropped. Duplicate manifests keep the first occurrence.
    fn reconcile(&mut self) -> Vec<Record> {
        let mut touched = Vec::new();

        let before = self.all.len();
        let mut seen = std::collections::HashSet::new();
        self.all.retain(|m| seen.insert(m.name.clone()));
        if self.all.len() != before {
            warn!(dropped = before - self.all.len(), "dropping duplicate manifests");
            touched.push(Record::All);
        }

        let before = self.activated.len();
        let all = &self.all;
        self.activated.retain(|record| {
            let known = all.iter().any(|m| m.name == record.name());
            if !known {
                warn!(extension = %record.name(), "dropping activation for unknown extension");
            }
            known
        });
        let mut seen = std::collections::HashSet::new();
        self.activated.retain(|r| seen.insert(r.name().to_string()));
        if self.activated.len() != before {
            touched.push(Record::Activated);
        }

        touched
    }
}

fn load_record<T: DeserializeOwned + Default>(
    store: &dyn StateStore,
    key: &str,
) -> Result<T, StoreError> {
    match store.load(key)? {
        Some(value) => serde_json::from_value(value).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(T::default()),
    }
}

/// The registry service. Construct once and share it behind an `Arc`.
pub struct ExtensionRegistry {
    store: Arc<dyn StateStore>,
    state: Mutex<RegistryState>,
}

impl ExtensionRegistry {
    /// Load the registry from `store`, repairing invariant violations.
    pub fn open(store: Arc<dyn StateStore>) -> ExtensionResult<Self> {
        let mut state = RegistryState {
            all: load_record(store.as_ref(), ALL_EXTENSIONS_KEY)?,
            activated: load_record(store.as_ref(), ACTIVATED_EXTENSIONS_KEY)?,
            directories: load_record(store.as_ref(), DIRECTORY_MAP_KEY)?,
        };

        let touched = state.reconcile();
        if !touched.is_empty() {
            if let Err(e) = state.batch(&touched).and_then(|batch| store.commit(batch)) {
                warn!(error = %e, "failed to persist repaired registry state");
            }
        }

        debug!(
            extensions = state.all.len(),
            activated = state.activated.len(),
            "extension registry loaded"
        );

        Ok(Self {
            store,
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist `next` and make it current. On failure the current state stays.
    fn commit(
        &self,
        current: &mut RegistryState,
        next: RegistryState,
        records: &[Record],
    ) -> ExtensionResult<()> {
        let batch = next.batch(records)?;
        self.store.commit(batch)?;
        *current = next;
        Ok(())
    }

    /// Every installed manifest, in install order.
    pub fn list_all(&self) -> Vec<ExtensionManifest> {
        self.lock().all.clone()
    }

    /// Every activation record, in activation order.
    pub fn list_activated(&self) -> Vec<ActivationRecord> {
        self.lock().activated.clone()
    }

    /// Look up an installed manifest by name.
    pub fn get(&self, name: &str) -> Option<ExtensionManifest> {
        self.lock().manifest(name).cloned()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.lock().manifest(name).is_some()
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.lock().activation(name).is_some()
    }

    /// Managed directory name for an extension.
    pub fn resolve_directory(&self, name: &str) -> Option<String> {
        self.lock().directories.get(name).cloned()
    }

    /// Extension that owns a managed directory name.
    pub fn directory_owner(&self, directory: &str) -> Option<String> {
        self.lock().directory_owner(directory).map(str::to_string)
    }

    /// Resolve an extension to its managed directory, reporting broken links.
    pub fn resolve(&self, name: &str) -> ExtensionResult<String> {
        let state = self.lock();
        match (state.manifest(name), state.directories.get(name)) {
            (Some(_), Some(dir)) => Ok(dir.clone()),
            (Some(_), None) => Err(ExtensionError::ConsistencyFault {
                name: name.to_string(),
                fault: ConsistencyFault::MissingDirectory,
            }),
            (None, Some(dir)) => Err(ExtensionError::ConsistencyFault {
                name: name.to_string(),
                fault: ConsistencyFault::OrphanedDirectory(dir.clone()),
            }),
            (None, None) => Err(ExtensionError::ExtensionNotFound(name.to_string())),
        }
    }

    /// All broken links between the persisted records.
    pub fn check_consistency(&self) -> Vec<(String, ConsistencyFault)> {
        let state = self.lock();
        let mut faults = Vec::new();

        for manifest in &state.all {
            if !state.directories.contains_key(&manifest.name) {
                faults.push((manifest.name.clone(), ConsistencyFault::MissingDirectory));
            }
        }
        for (name, dir) in &state.directories {
            if state.manifest(name).is_none() {
                faults.push((name.clone(), ConsistencyFault::OrphanedDirectory(dir.clone())));
            }
        }
        for record in &state.activated {
            if state.manifest(record.name()).is_none() {
                faults.push((record.name().to_string(), ConsistencyFault::OrphanedActivation));
            }
        }

        faults
    }

    /// Add a manifest to the installed set.
    pub fn register(&self, manifest: ExtensionManifest) -> ExtensionResult<()> {
        let mut state = self.lock();
        if state.manifest(&manifest.name).is_some() {
            return Err(ExtensionError::DuplicateName(manifest.name));
        }

        let mut next = state.clone();
        let name = manifest.name.clone();
        next.all.push(manifest);
        self.commit(&mut state, next, &[Record::All])?;

        info!(extension = %name, "extension registered");
        Ok(())
    }

    /// Add a manifest together with its managed directory in one commit.
    pub fn register_installed(
        &self,
        manifest: ExtensionManifest,
        directory: &str,
    ) -> ExtensionResult<()> {
        let mut state = self.lock();
        if state.manifest(&manifest.name).is_some() {
            return Err(ExtensionError::DuplicateName(manifest.name));
        }
        if let Some(owner) = state.directory_owner(directory) {
            if owner != manifest.name {
                return Err(ExtensionError::DirectoryInUse {
                    directory: directory.to_string(),
                    owner: owner.to_string(),
                });
            }
        }

        let mut next = state.clone();
        let name = manifest.name.clone();
        next.directories.insert(name.clone(), directory.to_string());
        next.all.push(manifest);
        self.commit(&mut state, next, &[Record::All, Record::Directories])?;

        info!(extension = %name, directory = %directory, "extension installed");
        Ok(())
    }

    /// Enable an installed extension. Activating an active one is a no-op
    /// that returns the existing record.
    pub fn activate(&self, manifest: &ExtensionManifest) -> ExtensionResult<ActivationRecord> {
        let mut state = self.lock();
        if let Some(existing) = state.activation(&manifest.name) {
            return Ok(existing.clone());
        }

        let stored = state
            .manifest(&manifest.name)
            .cloned()
            .ok_or_else(|| ExtensionError::ExtensionNotFound(manifest.name.clone()))?;

        let record = ActivationRecord::new(stored);
        let mut next = state.clone();
        next.activated.push(record.clone());
        self.commit(&mut state, next, &[Record::Activated])?;

        info!(extension = %record.name(), key = %record.key, "extension activated");
        Ok(record)
    }

    /// Disable an extension. Returns whether a record was removed.
    pub fn deactivate(&self, name: &str) -> ExtensionResult<bool> {
        let mut state = self.lock();
        if state.activation(name).is_none() {
            return Ok(false);
        }

        let mut next = state.clone();
        next.activated.retain(|r| r.name() != name);
        self.commit(&mut state, next, &[Record::Activated])?;

        info!(extension = %name, "extension deactivated");
        Ok(true)
    }

    /// Flip the activation state of an installed extension, returning the new
    /// state.
    pub fn toggle(&self, name: &str) -> ExtensionResult<bool> {
        let manifest = self
            .get(name)
            .ok_or_else(|| ExtensionError::ExtensionNotFound(name.to_string()))?;

        if self.deactivate(name)? {
            Ok(false)
        } else {
            self.activate(&manifest)?;
            Ok(true)
        }
    }

    /// Remove an extension from all three records in one commit.
    ///
    /// Returns the directory it was mapped to, if any.
    pub fn remove(&self, name: &str) -> ExtensionResult<Option<String>> {
        let mut state = self.lock();

        let mut next = state.clone();
        next.all.retain(|m| m.name != name);
        next.activated.retain(|r| r.name() != name);
        let directory = next.directories.remove(name);

        let mut touched = Vec::new();
        if next.all.len() != state.all.len() {
            touched.push(Record::All);
        }
        if next.activated.len() != state.activated.len() {
            touched.push(Record::Activated);
        }
        if directory.is_some() {
            touched.push(Record::Directories);
        }
        if touched.is_empty() {
            return Ok(None);
        }

        self.commit(&mut state, next, &touched)?;

        info!(extension = %name, "extension removed");
        Ok(directory)
    }
}
