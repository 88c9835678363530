//! Command bridge between isolated surfaces and the host.
//!
//! At most one surface is attached at a time. A message is only acted on when
//! its source is the attached surface; anything else is dropped without a
//! reply. Replies go back to the originating surface only, and only if it is
//! still attached when the command completes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::extensions::isolate::{IsolatedSurface, SurfaceId, SurfaceMessage};
use crate::extensions::permissions::{PermissionError, PermissionSet};

use super::commands::{CommandKind, HostCommand};
use super::context::InvokeContext;
use super::dispatch::{DispatchError, HostDispatcher};
use super::types::{Inbound, InvokeErrorPayload, OutboundMessage};

/// Why a request was answered with `INVOKE_ERROR`.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("malformed request: {0}")]
    InvalidRequest(String),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error(transparent)]
    Disallowed(#[from] PermissionError),

    #[error("invalid payload for '{command}': {message}")]
    InvalidPayload { command: CommandKind, message: String },

    #[error("command '{command}' failed: {source}")]
    Dispatch {
        command: CommandKind,
        #[source]
        source: DispatchError,
    },
}

impl BridgeError {
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::InvalidRequest(_) => "invalid_request",
            BridgeError::UnknownCommand(_) => "unknown_command",
            BridgeError::Disallowed(_) => "disallowed",
            BridgeError::InvalidPayload { .. } => "invalid_payload",
            BridgeError::Dispatch { .. } => "failed",
        }
    }

    fn payload(&self, command: &str) -> InvokeErrorPayload {
        InvokeErrorPayload {
            command: command.to_string(),
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Handle for one attachment of a surface to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// What happened to an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeOutcome {
    /// Source is not the attached surface; nothing was forwarded or posted.
    Dropped,
    /// Not an invoke request.
    Ignored,
    /// A reply was posted to the originating surface.
    Replied(OutboundMessage),
    /// The surface was torn down before the reply was ready.
    Discarded,
}

struct Attachment {
    listener: ListenerId,
    surface: Arc<dyn IsolatedSurface>,
    context: Arc<InvokeContext>,
}

/// Relays invoke requests from the attached surface to a [`HostDispatcher`].
pub struct CommandBridge {
    dispatcher: Arc<dyn HostDispatcher>,
    permissions: PermissionSet,
    attached: Mutex<Option<Attachment>>,
    next_listener: AtomicU64,
}

impl CommandBridge {
    pub fn new(dispatcher: Arc<dyn HostDispatcher>, permissions: PermissionSet) -> Self {
        Self {
            dispatcher,
            permissions,
            attached: Mutex::new(None),
            next_listener: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Attachment>> {
        self.attached.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    /// Start listening to `surface`, replacing any previous attachment.
    pub fn attach(&self, surface: Arc<dyn IsolatedSurface>, context: InvokeContext) -> ListenerId {
        let listener = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        let mut attached = self.lock();

        if let Some(previous) = attached.as_ref() {
            warn!(
                surface = %previous.surface.id(),
                "replacing a bridge listener that was never detached"
            );
        }

        debug!(surface = %surface.id(), extension = %context.extension, "bridge attached");
        *attached = Some(Attachment {
            listener,
            surface,
            context: Arc::new(context),
        });
        listener
    }

    /// Stop listening. Only the attachment identified by `listener` is
    /// removed; returns whether it was still attached.
    pub fn detach(&self, listener: ListenerId) -> bool {
        let mut attached = self.lock();
        match attached.as_ref() {
            Some(current) if current.listener == listener => {
                debug!(surface = %current.surface.id(), "bridge detached");
                *attached = None;
                true
            }
            _ => false,
        }
    }

    /// Number of live listeners (zero or one).
    pub fn listener_count(&self) -> usize {
        usize::from(self.lock().is_some())
    }

    /// Surface currently attached, if any.
    pub fn attached_surface(&self) -> Option<SurfaceId> {
        self.lock().as_ref().map(|a| a.surface.id())
    }

    /// Handle one message posted by a surface's content window.
    pub async fn handle_message(&self, source: SurfaceId, message: &Value) -> BridgeOutcome {
        let (listener, surface, context) = {
            let attached = self.lock();
            match attached.as_ref() {
                Some(a) if a.surface.id() == source => {
                    (a.listener, a.surface.clone(), a.context.clone())
                }
                _ => {
                    debug!(source = %source, "dropping message from unattached source");
                    return BridgeOutcome::Dropped;
                }
            }
        };

        let (id, command_name, result) = match Inbound::classify(message) {
            Inbound::Other => return BridgeOutcome::Ignored,
            Inbound::Malformed { id, message } => {
                (id, String::new(), Err(BridgeError::InvalidRequest(message)))
            }
            Inbound::Request(request) => {
                let result = self.invoke(&context, &request.command, request.payload).await;
                (request.id, request.command, result)
            }
        };

        let reply = match result {
            Ok(response) => OutboundMessage::InvokeResponse { id, response },
            Err(e) => {
                warn!(
                    extension = %context.extension,
                    command = %command_name,
                    error = %e,
                    "bridged command failed"
                );
                OutboundMessage::InvokeError {
                    id,
                    error: e.payload(&command_name),
                }
            }
        };

        // Re-check after the await: a surface torn down mid-call gets nothing.
        let still_attached = self
            .lock()
            .as_ref()
            .is_some_and(|a| a.listener == listener);
        if !still_attached {
            debug!(source = %source, "discarding reply for detached surface");
            return BridgeOutcome::Discarded;
        }

        surface.post_message(&reply);
        BridgeOutcome::Replied(reply)
    }

    async fn invoke(
        &self,
        context: &InvokeContext,
        command: &str,
        payload: Value,
    ) -> Result<Value, BridgeError> {
        let kind: CommandKind = command
            .parse()
            .map_err(|_| BridgeError::UnknownCommand(command.to_string()))?;

        self.permissions.check_command(kind)?;

        let command = HostCommand::decode(kind, payload).map_err(|e| BridgeError::InvalidPayload {
            command: kind,
            message: e.to_string(),
        })?;

        self.dispatcher
            .dispatch(context, command)
            .await
            .map_err(|source| BridgeError::Dispatch {
                command: kind,
                source,
            })
    }

    /// Process messages from `inbox` until it closes.
    ///
    /// Each message is handled on its own task so a slow command never holds
    /// up later ones.
    pub async fn serve(self: Arc<Self>, mut inbox: mpsc::UnboundedReceiver<SurfaceMessage>) {
        while let Some(message) = inbox.recv().await {
            let bridge = self.clone();
            tokio::spawn(async move {
                bridge.handle_message(message.source, &message.data).await;
            });
        }
    }
}
