//! Fakes shared by the extension tests.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use crate::platform::{DirEntryInfo, DirectoryPicker, HostFs, LocalFs};

use super::ipc::{DispatchError, HostCommand, HostDispatcher, InvokeContext, OutboundMessage};
use super::isolate::{IsolatedSurface, SandboxPolicy, SurfaceError, SurfaceFactory, SurfaceId};
use super::manifest::ExtensionManifest;
use super::storage::{MemoryStore, StateStore, StoreBatch, StoreError, StoreResult};

pub fn manifest(name: &str) -> ExtensionManifest {
    ExtensionManifest {
        name: name.to_string(),
        description: format!("{name} extension"),
        author: "tester".to_string(),
        creation_date: "2024-01-01".to_string(),
        version: "1.0.0".to_string(),
        icon_class: "ri-puzzle-line".to_string(),
    }
}

/// Write a bundle directory `<parent>/<dir>` with a manifest and entry document.
pub fn write_bundle(parent: &Path, dir: &str, name: &str, html: &str) -> PathBuf {
    let bundle = parent.join(dir);
    fs::create_dir_all(&bundle).unwrap();
    fs::write(
        bundle.join("manifest.json"),
        serde_json::to_string(&manifest(name)).unwrap(),
    )
    .unwrap();
    fs::write(bundle.join("index.html"), html).unwrap();
    bundle
}

/// Memory store whose commits can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail: AtomicBool,
}

impl FlakyStore {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl StateStore for FlakyStore {
    fn load(&self, key: &str) -> StoreResult<Option<Value>> {
        self.inner.load(key)
    }

    fn commit(&self, batch: StoreBatch) -> StoreResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk full".to_string()));
        }
        self.inner.commit(batch)
    }
}

/// Surface that records everything done to it.
pub struct RecordingSurface {
    id: SurfaceId,
    fail_writes: bool,
    documents: Mutex<Vec<String>>,
    posted: Mutex<Vec<OutboundMessage>>,
    destroyed: AtomicUsize,
}

impl RecordingSurface {
    pub fn new(raw: u64) -> Arc<Self> {
        Self::build(raw, false)
    }

    fn build(raw: u64, fail_writes: bool) -> Arc<Self> {
        Arc::new(Self {
            id: SurfaceId::new(raw),
            fail_writes,
            documents: Mutex::new(Vec::new()),
            posted: Mutex::new(Vec::new()),
            destroyed: AtomicUsize::new(0),
        })
    }

    pub fn documents(&self) -> Vec<String> {
        self.documents.lock().unwrap().clone()
    }

    pub fn posted(&self) -> Vec<OutboundMessage> {
        self.posted.lock().unwrap().clone()
    }

    pub fn destroy_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl IsolatedSurface for RecordingSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn write_document(&self, html: &str) -> Result<(), SurfaceError> {
        if self.fail_writes {
            return Err(SurfaceError::Write("document closed".to_string()));
        }
        self.documents.lock().unwrap().push(html.to_string());
        Ok(())
    }

    fn post_message(&self, message: &OutboundMessage) {
        self.posted.lock().unwrap().push(message.clone());
    }

    fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory handing out [`RecordingSurface`]s with increasing ids.
#[derive(Default)]
pub struct RecordingFactory {
    next: AtomicU64,
    fail_writes: AtomicBool,
    created: Mutex<Vec<Arc<RecordingSurface>>>,
    policies: Mutex<Vec<SandboxPolicy>>,
}

impl RecordingFactory {
    pub fn set_failing_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<Arc<RecordingSurface>> {
        self.created.lock().unwrap().clone()
    }

    pub fn policies(&self) -> Vec<SandboxPolicy> {
        self.policies.lock().unwrap().clone()
    }
}

impl SurfaceFactory for RecordingFactory {
    fn create(&self, policy: &SandboxPolicy) -> Result<Arc<dyn IsolatedSurface>, SurfaceError> {
        let raw = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        let surface = RecordingSurface::build(raw, self.fail_writes.load(Ordering::SeqCst));
        self.created.lock().unwrap().push(surface.clone());
        self.policies.lock().unwrap().push(policy.clone());
        Ok(surface)
    }
}

enum Mode {
    Reply,
    Fail,
    Gated,
}

/// Dispatcher that records commands and answers `"ok:<command>"`.
pub struct RecordingDispatcher {
    mode: Mode,
    calls: Mutex<Vec<HostCommand>>,
    entered: Notify,
    release: Notify,
}

impl Default for RecordingDispatcher {
    fn default() -> Self {
        Self::with_mode(Mode::Reply)
    }
}

impl RecordingDispatcher {
    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            calls: Mutex::new(Vec::new()),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Every dispatch fails.
    pub fn failing() -> Self {
        Self::with_mode(Mode::Fail)
    }

    /// Every dispatch blocks until [`release`](Self::release) is called.
    pub fn gated() -> Self {
        Self::with_mode(Mode::Gated)
    }

    pub fn calls(&self) -> Vec<HostCommand> {
        self.calls.lock().unwrap().clone()
    }

    pub async fn wait_for_call(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl HostDispatcher for RecordingDispatcher {
    async fn dispatch(
        &self,
        _ctx: &InvokeContext,
        command: HostCommand,
    ) -> Result<Value, DispatchError> {
        let kind = command.kind();
        self.calls.lock().unwrap().push(command);
        match self.mode {
            Mode::Reply => {}
            Mode::Fail => return Err(DispatchError::Io(io::ErrorKind::NotFound)),
            Mode::Gated => {
                self.entered.notify_one();
                self.release.notified().await;
            }
        }
        Ok(json!(format!("ok:{kind}")))
    }
}

/// Local file system whose text reads under one directory can be held open.
pub struct GatedFs {
    inner: LocalFs,
    held: Mutex<Option<PathBuf>>,
    entered: Notify,
    release: Notify,
}

impl GatedFs {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: LocalFs::new(root),
            held: Mutex::new(None),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Block the next text read of a file below `dir`.
    pub fn hold_reads_under(&self, dir: PathBuf) {
        *self.held.lock().unwrap() = Some(dir);
    }

    pub async fn wait_for_read(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl HostFs for GatedFs {
    fn app_local_data_root(&self) -> PathBuf {
        self.inner.app_local_data_root()
    }

    async fn list_directory_recursive(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>> {
        self.inner.list_directory_recursive(path).await
    }

    async fn list_directory(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>> {
        self.inner.list_directory(path).await
    }

    async fn read_text_file(&self, path: &Path) -> io::Result<String> {
        let hold = {
            let mut held = self.held.lock().unwrap();
            let matches = held.as_ref().is_some_and(|dir| path.starts_with(dir));
            if matches {
                held.take();
            }
            matches
        };
        if hold {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.read_text_file(path).await
    }

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.inner.read_file(path).await
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.inner.write_file(path, contents).await
    }

    async fn delete_path(&self, path: &Path) -> io::Result<()> {
        self.inner.delete_path(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.inner.rename(from, to).await
    }

    async fn copy_directory_into(&self, source: &Path, managed_root: &Path) -> io::Result<String> {
        self.inner.copy_directory_into(source, managed_root).await
    }
}

/// Picker that returns a fixed answer.
pub struct FixedPicker(pub Option<PathBuf>);

#[async_trait]
impl DirectoryPicker for FixedPicker {
    async fn pick_directory(&self) -> Option<PathBuf> {
        self.0.clone()
    }
}
