//! Host-side execution of bridged commands.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::extensions::permissions::PermissionError;
use crate::platform::HostFs;

use super::commands::HostCommand;
use super::context::InvokeContext;

/// Failure of a dispatched command.
///
/// The `Display` output is what the extension sees, so variants carry only
/// information the extension already had or a generic reason.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error("{0}")]
    Io(io::ErrorKind),

    #[error("{0}")]
    Rejected(String),
}

impl From<io::Error> for DispatchError {
    fn from(e: io::Error) -> Self {
        DispatchError::Io(e.kind())
    }
}

/// Executes allowlisted commands on behalf of an extension.
#[async_trait]
pub trait HostDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        ctx: &InvokeContext,
        command: HostCommand,
    ) -> Result<Value, DispatchError>;
}

/// Dispatcher that serves file commands through [`HostFs`].
pub struct FsDispatcher {
    fs: Arc<dyn HostFs>,
}

impl FsDispatcher {
    pub fn new(fs: Arc<dyn HostFs>) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl HostDispatcher for FsDispatcher {
    async fn dispatch(
        &self,
        ctx: &InvokeContext,
        command: HostCommand,
    ) -> Result<Value, DispatchError> {
        debug!(extension = %ctx.extension, command = %command.kind(), "dispatching");

        match command {
            HostCommand::ReadFile { path } => {
                let path = ctx.resolve_path(&path)?;
                let text = self.fs.read_text_file(&path).await?;
                Ok(Value::String(text))
            }
            HostCommand::WriteFile { path, contents } => {
                let path = ctx.resolve_path(&path)?;
                self.fs.write_file(&path, contents.as_bytes()).await?;
                Ok(Value::Null)
            }
            HostCommand::ListDirectory { path } => {
                let path = ctx.resolve_path(&path)?;
                let entries = self.fs.list_directory(&path).await?;
                Ok(Value::Array(
                    entries
                        .iter()
                        .map(|entry| {
                            json!({
                                "name": entry.name,
                                "kind": if entry.is_dir { "directory" } else { "file" },
                                "path": ctx.display_path(&entry.path),
                            })
                        })
                        .collect(),
                ))
            }
            HostCommand::DeleteFile { path } => {
                let resolved = ctx.resolve_path(&path)?;
                if ctx.scoped && resolved == ctx.extension_dir {
                    return Err(DispatchError::Rejected(
                        "cannot delete the extension directory".to_string(),
                    ));
                }
                self.fs.delete_path(&resolved).await?;
                Ok(Value::Null)
            }
            HostCommand::Greet { name } => Ok(Value::String(format!("Hello, {name}!"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::LocalFs;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, InvokeContext, FsDispatcher) {
        let temp = TempDir::new().unwrap();
        let ext_dir = temp.path().join("Extensions").join("foo-dir");
        fs::create_dir_all(ext_dir.join("notes")).unwrap();
        fs::write(ext_dir.join("index.html"), "<p>hi</p>").unwrap();
        fs::write(ext_dir.join("notes").join("a.txt"), "alpha").unwrap();

        let ctx = InvokeContext::new("Foo".to_string(), "foo-dir".to_string(), ext_dir);
        let dispatcher = FsDispatcher::new(Arc::new(LocalFs::new(temp.path())));
        (temp, ctx, dispatcher)
    }

    #[tokio::test]
    async fn test_read_and_write() {
        let (_temp, ctx, dispatcher) = setup();

        let text = dispatcher
            .dispatch(&ctx, HostCommand::ReadFile { path: "notes/a.txt".into() })
            .await
            .unwrap();
        assert_eq!(text, json!("alpha"));

        dispatcher
            .dispatch(
                &ctx,
                HostCommand::WriteFile {
                    path: "notes/b.txt".into(),
                    contents: "beta".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(
            fs::read_to_string(ctx.extension_dir.join("notes/b.txt")).unwrap(),
            "beta"
        );
    }

    #[tokio::test]
    async fn test_list_directory_hides_host_paths() {
        let (_temp, ctx, dispatcher) = setup();

        let listing = dispatcher
            .dispatch(&ctx, HostCommand::ListDirectory { path: "notes".into() })
            .await
            .unwrap();
        assert_eq!(
            listing,
            json!([{"name": "a.txt", "kind": "file", "path": "notes/a.txt"}])
        );
    }

    #[tokio::test]
    async fn test_scope_violations() {
        let (_temp, ctx, dispatcher) = setup();

        let err = dispatcher
            .dispatch(&ctx, HostCommand::ReadFile { path: "../../secret".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Permission(_)));

        let err = dispatcher
            .dispatch(
                &ctx,
                HostCommand::DeleteFile {
                    path: ctx.extension_dir.to_string_lossy().into_owned(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Rejected(_)));
        assert!(ctx.extension_dir.exists());
    }

    #[tokio::test]
    async fn test_io_errors_do_not_leak_paths() {
        let (_temp, ctx, dispatcher) = setup();

        let err = dispatcher
            .dispatch(&ctx, HostCommand::ReadFile { path: "missing.txt".into() })
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(!message.contains(&*ctx.extension_dir.to_string_lossy()));
        assert!(matches!(err, DispatchError::Io(io::ErrorKind::NotFound)));
    }

    #[tokio::test]
    async fn test_greet() {
        let (_temp, ctx, dispatcher) = setup();
        let reply = dispatcher
            .dispatch(&ctx, HostCommand::Greet { name: "Ada".into() })
            .await
            .unwrap();
        assert_eq!(reply, json!("Hello, Ada!"));
    }
}
